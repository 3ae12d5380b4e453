use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tracing::warn;


lazy_static! {
    pub static ref RECORDS_APPLIED: IntCounter =
        IntCounter::new("records_applied", "Change records that advanced known state")
            .expect("metric can not be created");

    pub static ref DUPLICATE_RECORDS: IntCounter =
        IntCounter::new("duplicate_records", "Change records discarded as stale or replayed")
            .expect("metric can not be created");

    pub static ref PENDING_MARKS: IntCounter =
        IntCounter::new("pending_marks", "Ids newly added to a subscription pending set")
            .expect("metric can not be created");

    pub static ref RECONCILIATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("reconciliations", "Reconciliations after a rejected resume token"),
        &["strategy"]
    )
    .expect("metric can not be created");

    pub static ref READER_RETRIES: IntCounter =
        IntCounter::new("reader_retries", "Change log reads retried after a transient fault")
            .expect("metric can not be created");

    pub static ref ACTIVE_SUBSCRIPTIONS: IntGauge =
        IntGauge::new("active_subscriptions", "Subscriptions currently registered")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new_custom(Some("statewatch".to_string()), None)
            .expect("registry can be created");
        register_custom_metrics(&registry);
        registry
    };
}

pub fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(RECORDS_APPLIED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DUPLICATE_RECORDS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(PENDING_MARKS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(RECONCILIATIONS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(READER_RETRIES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ACTIVE_SUBSCRIPTIONS.clone()))
        .expect("collector can be registered");
}

/// Text exposition of the watcher metrics, for Prometheus to scrape
pub fn gather_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("could not encode watcher metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        warn!("watcher metrics are not valid utf8: {}", e);
        String::new()
    })
}
