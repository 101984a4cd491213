use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Worker script, relative to `working_dir`.
    pub entry_point: PathBuf,
    /// Interpreter of the project-local isolated environment, relative to `working_dir`.
    pub venv_interpreter: PathBuf,
    /// Interpreter looked up on `PATH` when no isolated environment exists.
    pub system_interpreter: String,
    pub working_dir: PathBuf,
    pub health_url: String,
    pub startup_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
    #[serde(with = "humantime_serde")]
    pub restart_cooldown: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            entry_point: PathBuf::from("app.py"),
            venv_interpreter: PathBuf::from(".venv/bin/python"),
            system_interpreter: "python3".into(),
            working_dir: PathBuf::from("."),
            health_url: "http://localhost:3000/".into(),
            startup_attempts: 30,
            poll_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(2),
            grace_period: Duration::from_secs(5),
            restart_cooldown: Duration::from_secs(2),
        }
    }
}

impl SupervisorConfig {
    pub fn entry_point_path(&self) -> PathBuf {
        self.working_dir.join(&self.entry_point)
    }

    pub fn venv_interpreter_path(&self) -> PathBuf {
        self.working_dir.join(&self.venv_interpreter)
    }
}

/// Lifecycle of the supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    StartFailed,
}

impl ProcessState {
    pub fn label(self) -> &'static str {
        match self {
            ProcessState::NotStarted => "not started",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::StartFailed => "start failed",
        }
    }
}

/// Outcome of a bounded readiness wait. Not being ready is a normal result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready { attempts: u32 },
    TimedOut { attempts: u32 },
    /// The URL answered, but the launched worker had already exited: another process is
    /// serving the port.
    WorkerExited { attempts: u32 },
    /// Shutdown began while waiting; the wait was abandoned early.
    Interrupted,
}

impl Readiness {
    pub fn is_ready(self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No live worker; nothing was done.
    NotRunning,
    /// Worker exited within the grace period.
    Exited,
    /// Worker ignored the termination request and was killed.
    Killed,
}

/// Point-in-time view of the worker, as shown by the status command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub url: String,
    pub responding: bool,
    pub process_alive: bool,
    pub pid: Option<u32>,
    pub state: ProcessState,
    #[serde(with = "humantime_serde")]
    pub uptime: Option<Duration>,
    pub checked_at: String,
}

/// Result of the standalone `probe` subcommand.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub url: String,
    pub responding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    pub checked_at: String,
}

/// Operator-facing notices emitted while managing the worker.
#[derive(Debug, Clone)]
pub enum Notice {
    UsingIsolatedRuntime { path: PathBuf },
    UsingSystemInterpreter { name: String },
    Launched { pid: Option<u32> },
    Stopping { pid: Option<u32> },
    ForcingKill,
    Stopped,
    Restarting,
}

impl Notice {
    pub fn to_message(&self) -> String {
        match self {
            Notice::UsingIsolatedRuntime { path } => {
                format!("Using isolated runtime: {}", path.display())
            }
            Notice::UsingSystemInterpreter { name } => {
                format!("Isolated runtime not found, using system interpreter `{name}`")
            }
            Notice::Launched { pid } => match pid {
                Some(pid) => format!("Worker started (PID {pid})"),
                None => "Worker started".to_string(),
            },
            Notice::Stopping { pid } => match pid {
                Some(pid) => format!("Stopping worker (PID {pid})..."),
                None => "Stopping worker...".to_string(),
            },
            Notice::ForcingKill => "Worker did not exit in time, forcing shutdown...".to_string(),
            Notice::Stopped => "Worker stopped".to_string(),
            Notice::Restarting => "Restarting worker...".to_string(),
        }
    }
}

/// RFC 3339 timestamp for reports.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}
