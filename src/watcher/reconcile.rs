//! Recovery after a change log discontinuity.
//!
//! When the resume token is rejected the core can no longer prove it saw every
//! record. A [`Reconciler`] decides which documents must be treated as
//! possibly changed. Every strategy must uphold the same rule: a change that
//! happened during the gap is never left unreported, while extra wake-ups are
//! acceptable.

use std::collections::BTreeSet;
use std::collections::HashSet;

use tracing::debug;

use super::KnownState;
use crate::changelog::DocRef;
use crate::changelog::Snapshot;
use crate::constants::RECONCILE_ASSUME_CHANGED;
use crate::constants::RECONCILE_SNAPSHOT;
use crate::ReconcileMode;

/// Outcome of a reconciliation pass, applied by the core
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Documents to mark pending for every interested subscription
    pub suspects: BTreeSet<DocRef>,
    /// Also mark every entity subscription, known document or not
    pub all_watched_entities: bool,
}

/// Pluggable reconciliation strategy
pub trait Reconciler: Send + 'static {
    /// Label used in logs and metrics
    fn name(&self) -> &'static str;

    /// Updates `known` from `snapshot` where possible and returns the
    /// documents to report. `snapshot` is `None` when the source cannot
    /// provide one.
    fn reconcile(
        &self,
        known: &mut KnownState,
        snapshot: Option<&Snapshot>,
    ) -> Reconciliation;
}

/// Re-derives known revnos from a snapshot and reports only documents whose
/// revno moved or that disappeared. Degrades to [`AssumeChangedReconciler`]
/// without a snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotReconciler;

impl Reconciler for SnapshotReconciler {
    fn name(&self) -> &'static str {
        RECONCILE_SNAPSHOT
    }

    fn reconcile(
        &self,
        known: &mut KnownState,
        snapshot: Option<&Snapshot>,
    ) -> Reconciliation {
        let Some(snapshot) = snapshot else {
            debug!("no snapshot available, assuming every known document changed");
            return AssumeChangedReconciler.reconcile(known, None);
        };

        let mut suspects = BTreeSet::new();
        let mut present = HashSet::with_capacity(snapshot.records.len());
        for record in &snapshot.records {
            present.insert(record.doc_ref());
            if known.observe(record) {
                suspects.insert(record.doc_ref());
            }
        }

        // Known live documents missing from the snapshot were purged in the gap
        for (doc, revision) in known.docs() {
            if !revision.removed && !present.contains(&doc) {
                suspects.insert(doc);
            }
        }

        Reconciliation {
            suspects,
            all_watched_entities: false,
        }
    }
}

/// Reports every known document and every watched entity as changed.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeChangedReconciler;

impl Reconciler for AssumeChangedReconciler {
    fn name(&self) -> &'static str {
        RECONCILE_ASSUME_CHANGED
    }

    fn reconcile(
        &self,
        known: &mut KnownState,
        snapshot: Option<&Snapshot>,
    ) -> Reconciliation {
        if let Some(snapshot) = snapshot {
            for record in &snapshot.records {
                known.observe(record);
            }
        }

        Reconciliation {
            suspects: known.docs().map(|(doc, _)| doc).collect(),
            all_watched_entities: true,
        }
    }
}

/// Strategy selected by configuration
pub fn reconciler_for(mode: ReconcileMode) -> Box<dyn Reconciler> {
    match mode {
        ReconcileMode::Snapshot => Box::new(SnapshotReconciler),
        ReconcileMode::AssumeChanged => Box::new(AssumeChangedReconciler),
    }
}
