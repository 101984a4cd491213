//! Worker process supervision.
//!
//! A [`Supervisor`] owns at most one worker at a time. It is shared by `Arc` between the
//! operator control loop and the shutdown hook, so every operation takes `&self`.

mod readiness;
mod worker;

use crate::console::Console;
use crate::error::LaunchError;
use crate::model::{
    now_rfc3339, Notice, ProcessState, Readiness, StatusSnapshot, StopOutcome, SupervisorConfig,
};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

pub(crate) use readiness::{wait_until_ready, HealthProbe, ReadinessParams};
use worker::WorkerHandle;

pub(crate) struct Supervisor {
    cfg: SupervisorConfig,
    probe: HealthProbe,
    console: Console,
    shutdown: CancellationToken,
    // Held for the whole of launch/stop so those never interleave.
    worker: Mutex<Option<WorkerHandle>>,
    state: watch::Sender<ProcessState>,
    running: AtomicBool,
}

impl Supervisor {
    pub fn new(
        cfg: SupervisorConfig,
        console: Console,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let probe = HealthProbe::new(cfg.health_url.clone(), cfg.probe_timeout)?;
        let (state, _) = watch::channel(ProcessState::NotStarted);
        Ok(Self {
            cfg,
            probe,
            console,
            shutdown,
            worker: Mutex::new(None),
            state,
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Whether the worker has been confirmed ready and not stopped since.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the worker. Any previous worker must have been stopped first.
    pub async fn launch(&self) -> Result<Option<u32>, LaunchError> {
        let mut slot = self.worker.lock().await;
        // Checked under the lock: a concurrent shutdown either sees the new worker or we see it.
        if self.shutdown.is_cancelled() {
            return Err(LaunchError::Interrupted);
        }
        if let Some(old) = slot.as_mut() {
            if old.is_alive() {
                tracing::warn!(pid = ?old.pid(), "launch requested while a worker is alive");
                old.terminate(self.cfg.grace_period, &self.console).await;
            }
        }

        self.state.send_replace(ProcessState::Starting);
        match WorkerHandle::spawn(&self.cfg, &self.console) {
            Ok(handle) => {
                let pid = handle.pid();
                self.console.out(Notice::Launched { pid }.to_message());
                *slot = Some(handle);
                Ok(pid)
            }
            Err(e) => {
                tracing::error!(error = %e, "worker launch failed");
                *slot = None;
                self.state.send_replace(ProcessState::StartFailed);
                Err(e)
            }
        }
    }

    /// Poll the health URL up to `attempts` times; never fails.
    ///
    /// An answer while the launched worker is dead means something else owns the port, which
    /// is reported as [`Readiness::WorkerExited`] rather than ready.
    pub async fn wait_until_ready(&self, attempts: u32) -> Readiness {
        let console = &self.console;
        let outcome = wait_until_ready(
            ReadinessParams {
                probe: &self.probe,
                attempts,
                interval: self.cfg.poll_interval,
                shutdown: &self.shutdown,
            },
            |_| console.prompt("."),
        )
        .await;

        match outcome {
            Readiness::Ready { attempts } => {
                if self.worker_alive().await {
                    self.running.store(true, Ordering::SeqCst);
                    self.state.send_replace(ProcessState::Running);
                    return outcome;
                }
                tracing::error!(
                    url = self.probe.url(),
                    "health URL answered but the launched worker is not alive"
                );
                console.out("");
                self.state.send_replace(ProcessState::StartFailed);
                Readiness::WorkerExited { attempts }
            }
            Readiness::WorkerExited { .. } => {
                self.state.send_replace(ProcessState::StartFailed);
                outcome
            }
            Readiness::TimedOut { .. } => {
                console.out("");
                if self.state() == ProcessState::Starting {
                    self.state.send_replace(ProcessState::StartFailed);
                }
                outcome
            }
            Readiness::Interrupted => {
                console.out("");
                outcome
            }
        }
    }

    pub async fn status(&self) -> StatusSnapshot {
        let responding = self.probe.is_responding().await;
        let (process_alive, pid, uptime) = {
            let mut slot = self.worker.lock().await;
            match slot.as_mut() {
                Some(w) => {
                    if w.is_alive() {
                        (true, w.pid(), Some(w.uptime()))
                    } else {
                        (false, None, None)
                    }
                }
                None => (false, None, None),
            }
        };
        let snapshot = StatusSnapshot {
            url: self.probe.url().to_string(),
            responding,
            process_alive,
            pid,
            state: self.state(),
            uptime,
            checked_at: now_rfc3339(),
        };
        tracing::info!(
            responding,
            process_alive,
            running = self.is_running(),
            ?pid,
            "status checked"
        );
        snapshot
    }

    /// Stop the worker if it is alive. Safe to call repeatedly and from several tasks at once.
    pub async fn stop(&self) -> StopOutcome {
        let mut slot = self.worker.lock().await;
        let outcome = match slot.take() {
            Some(mut worker) => {
                if worker.is_alive() {
                    self.state.send_replace(ProcessState::Stopping);
                }
                let outcome = worker.terminate(self.cfg.grace_period, &self.console).await;
                if outcome != StopOutcome::NotRunning {
                    self.console.out(Notice::Stopped.to_message());
                }
                outcome
            }
            None => StopOutcome::NotRunning,
        };
        self.state.send_replace(ProcessState::NotStarted);
        self.running.store(false, Ordering::SeqCst);
        outcome
    }

    /// Stop, cool down, launch again and wait for readiness.
    ///
    /// A worker that does not become ready is stopped again so the operator can retry.
    pub async fn restart(&self) -> Result<Readiness, LaunchError> {
        self.console.out(Notice::Restarting.to_message());
        tracing::info!("restarting worker");
        self.stop().await;

        tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(Readiness::Interrupted),
            _ = tokio::time::sleep(self.cfg.restart_cooldown) => {}
        }

        self.launch().await?;
        let outcome = self.wait_until_ready(self.cfg.startup_attempts).await;
        if matches!(
            outcome,
            Readiness::TimedOut { .. } | Readiness::WorkerExited { .. }
        ) {
            tracing::error!(?outcome, "worker did not become ready after restart");
            self.stop().await;
        }
        Ok(outcome)
    }

    async fn worker_alive(&self) -> bool {
        let mut slot = self.worker.lock().await;
        slot.as_mut().map(|w| w.is_alive()).unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    pub(crate) use super::readiness::tests::{closed_url, stub_server};
    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) fn fast_config(dir: &Path, url: String) -> SupervisorConfig {
        SupervisorConfig {
            working_dir: dir.to_path_buf(),
            system_interpreter: "sh".into(),
            health_url: url,
            startup_attempts: 5,
            poll_interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(300),
            grace_period: Duration::from_secs(2),
            restart_cooldown: Duration::from_millis(20),
            ..Default::default()
        }
    }

    pub(crate) fn write_worker(dir: &Path) {
        std::fs::write(dir.join("app.py"), "echo worker up\nexec sleep 30\n").unwrap();
    }

    fn supervisor(cfg: SupervisorConfig) -> Supervisor {
        let (console, _rx) = Console::capture();
        Supervisor::new(cfg, console, CancellationToken::new()).unwrap()
    }

    #[tokio::test]
    async fn stop_without_launch_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(fast_config(dir.path(), closed_url().await));
        assert_eq!(sup.stop().await, StopOutcome::NotRunning);
        assert_eq!(sup.stop().await, StopOutcome::NotRunning);
        assert_eq!(sup.state(), ProcessState::NotStarted);
        assert!(!sup.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launch_then_stop_leaves_nothing_running() {
        let dir = tempfile::tempdir().unwrap();
        write_worker(dir.path());
        let sup = supervisor(fast_config(dir.path(), closed_url().await));

        let pid = sup.launch().await.unwrap();
        assert!(pid.is_some());
        assert_eq!(sup.state(), ProcessState::Starting);

        assert_eq!(sup.stop().await, StopOutcome::Exited);
        let status = sup.status().await;
        assert!(!status.responding);
        assert!(!status.process_alive);
        assert_eq!(status.pid, None);
        assert_eq!(status.state, ProcessState::NotStarted);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ready_worker_reports_running() {
        let dir = tempfile::tempdir().unwrap();
        write_worker(dir.path());
        let (url, _hits) = stub_server(200).await;
        let sup = supervisor(fast_config(dir.path(), url));

        sup.launch().await.unwrap();
        assert!(sup.wait_until_ready(5).await.is_ready());
        assert!(sup.is_running());
        assert_eq!(sup.state(), ProcessState::Running);

        let status = sup.status().await;
        assert!(status.responding);
        assert!(status.process_alive);
        assert!(status.uptime.is_some());

        sup.stop().await;
        assert!(!sup.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unready_worker_is_marked_start_failed() {
        let dir = tempfile::tempdir().unwrap();
        write_worker(dir.path());
        let (url, hits) = stub_server(500).await;
        let sup = supervisor(fast_config(dir.path(), url));

        sup.launch().await.unwrap();
        assert_eq!(
            sup.wait_until_ready(3).await,
            Readiness::TimedOut { attempts: 3 }
        );
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(sup.state(), ProcessState::StartFailed);
        assert!(!sup.is_running());
        sup.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn answer_from_another_process_is_a_failed_start() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "exit 0\n").unwrap();
        let (url, _hits) = stub_server(200).await;
        let sup = supervisor(fast_config(dir.path(), url));

        sup.launch().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while sup.status().await.process_alive {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let outcome = sup.wait_until_ready(3).await;
        assert_eq!(outcome, Readiness::WorkerExited { attempts: 1 });
        assert!(!outcome.is_ready());
        assert_eq!(sup.state(), ProcessState::StartFailed);
        assert!(!sup.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn restart_on_fresh_supervisor_matches_launch_and_wait() {
        let dir = tempfile::tempdir().unwrap();
        write_worker(dir.path());
        let (url, _hits) = stub_server(200).await;

        let fresh = supervisor(fast_config(dir.path(), url.clone()));
        fresh.launch().await.unwrap();
        let direct = fresh.wait_until_ready(5).await;
        let direct_state = fresh.state();
        fresh.stop().await;

        let restarted = supervisor(fast_config(dir.path(), url));
        let via_restart = restarted.restart().await.unwrap();
        assert_eq!(via_restart, direct);
        assert_eq!(restarted.state(), direct_state);
        assert!(restarted.status().await.process_alive);

        // A second restart replaces the worker rather than adding one.
        let first_pid = restarted.status().await.pid;
        restarted.restart().await.unwrap();
        let second_pid = restarted.status().await.pid;
        assert_ne!(first_pid, second_pid);
        restarted.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn restart_that_never_becomes_ready_returns_to_not_started() {
        let dir = tempfile::tempdir().unwrap();
        write_worker(dir.path());
        let sup = supervisor(fast_config(dir.path(), closed_url().await));

        let outcome = sup.restart().await.unwrap();
        assert_eq!(outcome, Readiness::TimedOut { attempts: 5 });
        assert_eq!(sup.state(), ProcessState::NotStarted);
        assert!(!sup.status().await.process_alive);
    }

    #[tokio::test]
    async fn restart_surfaces_launch_errors() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(fast_config(dir.path(), closed_url().await));
        let err = sup.restart().await.unwrap_err();
        assert!(matches!(err, LaunchError::EntryPointMissing(_)));
        assert_eq!(sup.state(), ProcessState::StartFailed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn concurrent_stops_terminate_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        write_worker(dir.path());
        let sup = Arc::new(supervisor(fast_config(dir.path(), closed_url().await)));
        sup.launch().await.unwrap();

        let a = tokio::spawn({
            let sup = sup.clone();
            async move { sup.stop().await }
        });
        let b = tokio::spawn({
            let sup = sup.clone();
            async move { sup.stop().await }
        });
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        let terminated = outcomes
            .iter()
            .filter(|o| **o != StopOutcome::NotRunning)
            .count();
        assert_eq!(terminated, 1, "{outcomes:?}");
        assert!(!sup.status().await.process_alive);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launch_after_shutdown_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        write_worker(dir.path());
        let (console, _rx) = Console::capture();
        let token = CancellationToken::new();
        let sup = Supervisor::new(
            fast_config(dir.path(), closed_url().await),
            console,
            token.clone(),
        )
        .unwrap();

        token.cancel();
        assert!(matches!(sup.launch().await, Err(LaunchError::Interrupted)));
        assert_eq!(sup.restart().await.unwrap(), Readiness::Interrupted);
    }
}
