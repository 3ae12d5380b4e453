use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::run_checked;
use super::CommandRunner;
use super::Service;
use super::ServiceError;
use super::ServiceSpec;
use super::ServiceStatus;

const SC: &str = "sc.exe";
/// `ERROR_SERVICE_DOES_NOT_EXIST`
const SERVICE_DOES_NOT_EXIST: &str = "1060";

/// Service controlled through the Windows service control manager
pub struct WindowsService {
    spec: ServiceSpec,
    runner: Arc<dyn CommandRunner>,
}

impl fmt::Debug for WindowsService {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WindowsService").field("spec", &self.spec).finish()
    }
}

impl WindowsService {
    pub fn new(
        spec: ServiceSpec,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self { spec, runner }
    }
}

impl Service for WindowsService {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn install(&self) -> Result<(), ServiceError> {
        self.spec.validate()?;
        if self.status()? != ServiceStatus::NotInstalled {
            run_checked(self.runner.as_ref(), SC, &["delete", &self.spec.name])?;
        }
        let command_line = self.spec.command_line();
        run_checked(
            self.runner.as_ref(),
            SC,
            &[
                "create",
                &self.spec.name,
                "binPath=",
                &command_line,
                "start=",
                "auto",
                "DisplayName=",
                &self.spec.description,
            ],
        )?;
        info!(service = %self.spec.name, "windows service installed");
        Ok(())
    }

    fn start(&self) -> Result<(), ServiceError> {
        if self.status()? == ServiceStatus::Running {
            return Ok(());
        }
        run_checked(self.runner.as_ref(), SC, &["start", &self.spec.name]).map(|_| ())
    }

    fn stop(&self) -> Result<(), ServiceError> {
        if self.status()? != ServiceStatus::Running {
            return Ok(());
        }
        run_checked(self.runner.as_ref(), SC, &["stop", &self.spec.name]).map(|_| ())
    }

    fn status(&self) -> Result<ServiceStatus, ServiceError> {
        let output = self
            .runner
            .run(SC, vec!["query".to_string(), self.spec.name.clone()])?;
        if !output.success {
            if output.stdout.contains(SERVICE_DOES_NOT_EXIST) || output.stderr.contains(SERVICE_DOES_NOT_EXIST) {
                return Ok(ServiceStatus::NotInstalled);
            }
            return Err(ServiceError::CommandFailed {
                command: format!("{SC} query {}", self.spec.name),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(parse_sc_query(&output.stdout))
    }
}

/// Reads the `STATE` line of `sc.exe query`, e.g. `STATE : 4  RUNNING`.
pub(crate) fn parse_sc_query(output: &str) -> ServiceStatus {
    let state = output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("STATE"))
        .and_then(|line| line.split_whitespace().last());

    match state {
        Some("RUNNING") => ServiceStatus::Running,
        Some("STOPPED") => ServiceStatus::Stopped,
        Some(other) => ServiceStatus::Unknown(other.to_string()),
        None => ServiceStatus::Unknown(output.trim().to_string()),
    }
}
