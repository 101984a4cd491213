//! OS shutdown hook.
//!
//! On SIGINT/SIGTERM (Ctrl-C elsewhere) the session is flipped inactive and the worker is
//! stopped, so the launcher never leaves an orphaned worker behind.

use crate::console::Console;
use crate::model::StopOutcome;
use crate::supervisor::Supervisor;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Register the hook once at startup. The returned task finishes after the worker is stopped.
///
/// Signal handlers are installed before this returns, so a signal arriving before the task is
/// first polled is still seen.
pub(crate) fn spawn_shutdown_hook(
    supervisor: Arc<Supervisor>,
    console: Console,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    spawn_hook_with(ShutdownSignals::install(), supervisor, console, shutdown)
}

fn spawn_hook_with(
    mut signals: ShutdownSignals,
    supervisor: Arc<Supervisor>,
    console: Console,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let signal = signals.recv().await;
        tracing::info!(signal, "shutdown signal received");
        console.out("");
        console.out("Shutting down...");
        run_shutdown(&supervisor, &shutdown).await;
    })
}

/// Cancel first so in-flight waits abort and no new worker can launch, then stop.
pub(crate) async fn run_shutdown(
    supervisor: &Supervisor,
    shutdown: &CancellationToken,
) -> StopOutcome {
    shutdown.cancel();
    supervisor.stop().await
}

/// Installed OS signal streams.
struct ShutdownSignals {
    #[cfg(unix)]
    streams: Vec<(&'static str, tokio::signal::unix::Signal)>,
}

impl ShutdownSignals {
    #[cfg(unix)]
    fn install() -> Self {
        use tokio::signal::unix::SignalKind;
        Self::install_kinds(&[
            ("SIGINT", SignalKind::interrupt()),
            ("SIGTERM", SignalKind::terminate()),
        ])
    }

    #[cfg(unix)]
    fn install_kinds(kinds: &[(&'static str, tokio::signal::unix::SignalKind)]) -> Self {
        let mut streams = Vec::with_capacity(kinds.len());
        for &(name, kind) in kinds {
            match tokio::signal::unix::signal(kind) {
                Ok(stream) => streams.push((name, stream)),
                Err(e) => tracing::warn!(signal = name, error = %e, "could not install handler"),
            }
        }
        Self { streams }
    }

    #[cfg(not(unix))]
    fn install() -> Self {
        Self {}
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> &'static str {
        use std::task::Poll;
        if self.streams.is_empty() {
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
        std::future::poll_fn(|cx| {
            for (name, stream) in self.streams.iter_mut() {
                if let Poll::Ready(Some(())) = stream.poll_recv(cx) {
                    return Poll::Ready(*name);
                }
            }
            Poll::Pending
        })
        .await
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "CTRL-C"
    }
}
