use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing::warn;

use super::run_checked;
use super::CommandRunner;
use super::Service;
use super::ServiceError;
use super::ServiceSpec;
use super::ServiceStatus;

const SYSTEMCTL: &str = "systemctl";
const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

pub struct SystemdService {
    spec: ServiceSpec,
    unit_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl fmt::Debug for SystemdService {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SystemdService")
            .field("spec", &self.spec)
            .field("unit_dir", &self.unit_dir)
            .finish()
    }
}

impl SystemdService {
    pub fn new(
        spec: ServiceSpec,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            spec,
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
            runner,
        }
    }

    pub fn with_unit_dir(
        mut self,
        dir: impl AsRef<Path>,
    ) -> Self {
        self.unit_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn unit_name(&self) -> String {
        format!("{}.service", self.spec.name)
    }

    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(self.unit_name())
    }

    pub fn render_unit(&self) -> String {
        format!(
            "[Unit]\n\
             Description={description}\n\
             After=network-online.target\n\
             \n\
             [Service]\n\
             ExecStart={exec}\n\
             Restart=on-failure\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            description = self.spec.description,
            exec = self.spec.command_line(),
        )
    }

    fn systemctl(
        &self,
        verb: &str,
    ) -> Result<(), ServiceError> {
        let unit = self.unit_name();
        run_checked(self.runner.as_ref(), SYSTEMCTL, &[verb, &unit]).map(|_| ())
    }
}

impl Service for SystemdService {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn install(&self) -> Result<(), ServiceError> {
        self.spec.validate()?;
        fs::create_dir_all(&self.unit_dir)?;
        fs::write(self.unit_path(), self.render_unit())?;
        run_checked(self.runner.as_ref(), SYSTEMCTL, &["daemon-reload"])?;
        self.systemctl("enable")?;
        info!(unit = %self.unit_name(), "systemd unit installed");
        Ok(())
    }

    fn start(&self) -> Result<(), ServiceError> {
        self.systemctl("start")
    }

    fn stop(&self) -> Result<(), ServiceError> {
        self.systemctl("stop")
    }

    fn status(&self) -> Result<ServiceStatus, ServiceError> {
        if !self.unit_path().exists() {
            return Ok(ServiceStatus::NotInstalled);
        }
        // Non-zero exit just means "not running" here
        let output = self
            .runner
            .run(SYSTEMCTL, vec!["status".to_string(), self.unit_name()])?;
        Ok(parse_systemctl_status(&output.stdout))
    }
}

/// Reads the `Active:` line of `systemctl status`, e.g. `active (running)`.
pub(crate) fn parse_systemctl_status(output: &str) -> ServiceStatus {
    let Some(active) = output
        .lines()
        .find_map(|line| line.trim_start().strip_prefix("Active:"))
        .map(str::trim)
    else {
        warn!("unable to determine status from:\n{}", output);
        return ServiceStatus::Unknown(output.trim().to_string());
    };

    if active.starts_with("active (running)") {
        ServiceStatus::Running
    } else if active.starts_with("inactive") || active.starts_with("failed") {
        ServiceStatus::Stopped
    } else {
        ServiceStatus::Unknown(active.to_string())
    }
}
