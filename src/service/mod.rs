//! OS service management for the agents that host watchers.
//!
//! One [`Service`] capability with a variant per init system. The variant is
//! chosen by [`InitSystem::detect`]; every external command goes through a
//! [`CommandRunner`] so the platform logic can be exercised without touching
//! the host.

mod systemd;
mod upstart;
mod windows;

pub use systemd::*;
pub use upstart::*;
pub use windows::*;


use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Service file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Unsupported init system: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid service definition: {0}")]
    InvalidSpec(String),
}

/// Observed state of an installed service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    Stopped,
    NotInstalled,
    /// The init system answered with something we do not recognise
    Unknown(String),
}

/// What to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub description: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
}

impl ServiceSpec {
    pub fn new(
        name: impl Into<String>,
        executable: impl Into<PathBuf>,
    ) -> Self {
        let name = name.into();
        Self {
            description: format!("{name} agent"),
            name,
            executable: executable.into(),
            args: Vec::new(),
        }
    }

    pub fn with_description(
        mut self,
        description: impl Into<String>,
    ) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_args<I, A>(
        mut self,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ServiceError> {
        if self.name.is_empty() {
            return Err(ServiceError::InvalidSpec("empty service name".into()));
        }
        if self
            .name
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
        {
            return Err(ServiceError::InvalidSpec(format!(
                "service name {:?} contains unsupported characters",
                self.name
            )));
        }
        if self.executable.as_os_str().is_empty() {
            return Err(ServiceError::InvalidSpec("empty executable path".into()));
        }
        Ok(())
    }

    /// Executable followed by its arguments, quoted where needed
    pub(crate) fn command_line(&self) -> String {
        std::iter::once(self.executable.display().to_string())
            .chain(self.args.iter().cloned())
            .map(|part| {
                if part.contains(char::is_whitespace) {
                    format!("\"{part}\"")
                } else {
                    part
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of one external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[cfg_attr(test, automock)]
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: Vec<String>,
    ) -> Result<CommandOutput, ServiceError>;
}

/// Runs commands on the host
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        program: &str,
        args: Vec<String>,
    ) -> Result<CommandOutput, ServiceError> {
        debug!("$ {} {}", program, args.join(" "));
        let output = Command::new(program).args(&args).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs `program args` and fails unless it exits successfully.
pub(crate) fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput, ServiceError> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let command = format!("{} {}", program, args.join(" "));
    let output = runner.run(program, args)?;
    if !output.success {
        return Err(ServiceError::CommandFailed {
            command,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

/// Service lifecycle capability
pub trait Service {
    fn name(&self) -> &str;

    /// Registers the service with the init system. Re-installing overwrites
    /// the previous definition.
    fn install(&self) -> Result<(), ServiceError>;

    fn start(&self) -> Result<(), ServiceError>;

    fn stop(&self) -> Result<(), ServiceError>;

    fn status(&self) -> Result<ServiceStatus, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSystem {
    Systemd,
    Upstart,
    Windows,
}

impl InitSystem {
    /// Detects the init system of the running host.
    pub fn detect() -> Result<Self, ServiceError> {
        if cfg!(windows) {
            return Ok(InitSystem::Windows);
        }
        let comm = std::fs::read_to_string("/proc/1/comm")?;
        Self::from_process_name(&comm)
    }

    /// Maps the name of PID 1 to an init system.
    pub fn from_process_name(name: &str) -> Result<Self, ServiceError> {
        match name.trim() {
            "systemd" => Ok(InitSystem::Systemd),
            "init" | "upstart" => Ok(InitSystem::Upstart),
            other => Err(ServiceError::UnsupportedPlatform(other.to_string())),
        }
    }
}

/// A service on whichever init system the host runs
#[derive(Debug)]
pub enum PlatformService {
    Systemd(SystemdService),
    Upstart(UpstartService),
    Windows(WindowsService),
}

impl PlatformService {
    pub fn new(
        init: InitSystem,
        spec: ServiceSpec,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        match init {
            InitSystem::Systemd => PlatformService::Systemd(SystemdService::new(spec, runner)),
            InitSystem::Upstart => PlatformService::Upstart(UpstartService::new(spec, runner)),
            InitSystem::Windows => PlatformService::Windows(WindowsService::new(spec, runner)),
        }
    }

    /// Service for the detected host init system, using real commands.
    pub fn for_host(spec: ServiceSpec) -> Result<Self, ServiceError> {
        let init = InitSystem::detect()?;
        debug!(?init, service = %spec.name, "init system detected");
        Ok(Self::new(init, spec, Arc::new(SystemCommandRunner)))
    }

    pub fn init_system(&self) -> InitSystem {
        match self {
            PlatformService::Systemd(_) => InitSystem::Systemd,
            PlatformService::Upstart(_) => InitSystem::Upstart,
            PlatformService::Windows(_) => InitSystem::Windows,
        }
    }

    fn inner(&self) -> &dyn Service {
        match self {
            PlatformService::Systemd(service) => service,
            PlatformService::Upstart(service) => service,
            PlatformService::Windows(service) => service,
        }
    }
}

impl Service for PlatformService {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn install(&self) -> Result<(), ServiceError> {
        self.inner().install()
    }

    fn start(&self) -> Result<(), ServiceError> {
        self.inner().start()
    }

    fn stop(&self) -> Result<(), ServiceError> {
        self.inner().stop()
    }

    fn status(&self) -> Result<ServiceStatus, ServiceError> {
        self.inner().status()
    }
}
