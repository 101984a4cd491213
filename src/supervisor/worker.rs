use crate::console::Console;
use crate::error::LaunchError;
use crate::model::{Notice, StopOutcome, SupervisorConfig};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// Which interpreter runs the worker script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Interpreter {
    Isolated(PathBuf),
    System(String),
}

impl Interpreter {
    /// Prefer the project-local environment when its interpreter exists.
    pub fn resolve(cfg: &SupervisorConfig) -> Self {
        let venv = cfg.venv_interpreter_path();
        if venv.is_file() {
            Interpreter::Isolated(venv)
        } else {
            Interpreter::System(cfg.system_interpreter.clone())
        }
    }

    pub fn display(&self) -> String {
        match self {
            Interpreter::Isolated(p) => p.display().to_string(),
            Interpreter::System(name) => name.clone(),
        }
    }

    fn notice(&self) -> Notice {
        match self {
            Interpreter::Isolated(path) => Notice::UsingIsolatedRuntime { path: path.clone() },
            Interpreter::System(name) => Notice::UsingSystemInterpreter { name: name.clone() },
        }
    }
}

/// Exclusive handle to one running worker process.
pub(crate) struct WorkerHandle {
    child: Child,
    pid: Option<u32>,
    started: Instant,
}

impl WorkerHandle {
    pub fn spawn(cfg: &SupervisorConfig, console: &Console) -> Result<Self, LaunchError> {
        let script = cfg.entry_point_path();
        if !script.is_file() {
            return Err(LaunchError::EntryPointMissing(script));
        }

        let interpreter = Interpreter::resolve(cfg);
        console.out(interpreter.notice().to_message());

        let program = match &interpreter {
            Interpreter::Isolated(p) => p.as_os_str().to_owned(),
            Interpreter::System(name) => name.into(),
        };
        let mut child = Command::new(program)
            .arg(&cfg.entry_point)
            .current_dir(&cfg.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                interpreter: interpreter.display(),
                source,
            })?;

        let pid = child.id();
        tracing::info!(?pid, interpreter = %interpreter.display(), "worker spawned");

        // Both streams feed the same sink; the drains end on their own when the child exits.
        if let Some(stdout) = child.stdout.take() {
            relay_output(stdout, console.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            relay_output(stderr, console.clone());
        }

        Ok(Self {
            child,
            pid,
            started: Instant::now(),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Request termination, wait out the grace period, then kill.
    pub async fn terminate(&mut self, grace: Duration, console: &Console) -> StopOutcome {
        if !self.is_alive() {
            return StopOutcome::NotRunning;
        }
        console.out(Notice::Stopping { pid: self.pid }.to_message());
        tracing::info!(pid = ?self.pid, "stopping worker");

        self.request_exit();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(pid = ?self.pid, %status, "worker exited");
                StopOutcome::Exited
            }
            Ok(Err(e)) => {
                tracing::warn!(pid = ?self.pid, error = %e, "waiting on worker failed, killing");
                self.kill().await;
                StopOutcome::Killed
            }
            Err(_) => {
                console.out(Notice::ForcingKill.to_message());
                tracing::warn!(pid = ?self.pid, ?grace, "worker still alive after grace period");
                self.kill().await;
                StopOutcome::Killed
            }
        }
    }

    fn request_exit(&mut self) {
        let signalled = match self.pid {
            Some(pid) if cfg!(unix) => match crate::reaper::terminate(pid) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(pid, error = %e, "graceful termination request failed");
                    false
                }
            },
            _ => false,
        };
        if !signalled {
            let _ = self.child.start_kill();
        }
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::error!(pid = ?self.pid, error = %e, "failed to kill worker");
        }
    }
}

fn relay_output<R>(stream: R, console: Console)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::debug!(target: "worker", "{line}");
                    console.out(format!("[worker] {line}"));
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "failed reading worker output");
                    console.err(format!("Error reading worker output: {e}"));
                    break;
                }
            }
        }
    });
}
