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

const DEFAULT_JOB_DIR: &str = "/etc/init";

pub struct UpstartService {
    spec: ServiceSpec,
    job_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl fmt::Debug for UpstartService {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("UpstartService")
            .field("spec", &self.spec)
            .field("job_dir", &self.job_dir)
            .finish()
    }
}

impl UpstartService {
    pub fn new(
        spec: ServiceSpec,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            spec,
            job_dir: PathBuf::from(DEFAULT_JOB_DIR),
            runner,
        }
    }

    pub fn with_job_dir(
        mut self,
        dir: impl AsRef<Path>,
    ) -> Self {
        self.job_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn job_path(&self) -> PathBuf {
        self.job_dir.join(format!("{}.conf", self.spec.name))
    }

    pub fn render_job(&self) -> String {
        format!(
            "description \"{description}\"\n\
             start on runlevel [2345]\n\
             stop on runlevel [!2345]\n\
             respawn\n\
             \n\
             exec {exec}\n",
            description = self.spec.description,
            exec = self.spec.command_line(),
        )
    }
}

impl Service for UpstartService {
    fn name(&self) -> &str {
        &self.spec.name
    }

    /// Upstart picks up new job files on its own.
    fn install(&self) -> Result<(), ServiceError> {
        self.spec.validate()?;
        fs::create_dir_all(&self.job_dir)?;
        fs::write(self.job_path(), self.render_job())?;
        info!(job = %self.spec.name, "upstart job installed");
        Ok(())
    }

    fn start(&self) -> Result<(), ServiceError> {
        if self.status()? == ServiceStatus::Running {
            return Ok(());
        }
        run_checked(self.runner.as_ref(), "start", &[&self.spec.name]).map(|_| ())
    }

    fn stop(&self) -> Result<(), ServiceError> {
        if self.status()? != ServiceStatus::Running {
            return Ok(());
        }
        run_checked(self.runner.as_ref(), "stop", &[&self.spec.name]).map(|_| ())
    }

    fn status(&self) -> Result<ServiceStatus, ServiceError> {
        if !self.job_path().exists() {
            return Ok(ServiceStatus::NotInstalled);
        }
        let output = run_checked(self.runner.as_ref(), "status", &[&self.spec.name])?;
        Ok(parse_upstart_status(&self.spec.name, &output.stdout))
    }
}

/// Reads `<job> <goal>/<state>[, process N]`, e.g. `agent start/running, process 42`.
pub(crate) fn parse_upstart_status(
    job: &str,
    output: &str,
) -> ServiceStatus {
    let state = output
        .lines()
        .filter_map(|line| line.trim().strip_prefix(job))
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .find_map(|rest| rest.split_whitespace().next())
        .map(|state| state.trim_end_matches(','));

    match state {
        Some("start/running") => ServiceStatus::Running,
        Some(state) if state.starts_with("stop/") => ServiceStatus::Stopped,
        Some(state) => ServiceStatus::Unknown(state.to_string()),
        None => {
            warn!("unable to determine status from:\n{}", output);
            ServiceStatus::Unknown(output.trim().to_string())
        }
    }
}
