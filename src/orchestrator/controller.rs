//! Operator control loop.
//!
//! Dispatches menu commands one at a time against the shared supervisor until the operator
//! quits, input ends, or the shutdown hook flips the session inactive.

use crate::console::Console;
use crate::model::Readiness;
use crate::supervisor::Supervisor;
use crate::text_summary::build_status_summary;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

const MENU: &str = "
===========================================
               CONTROL MENU
===========================================
1. Open in browser
2. Show worker status
3. Restart worker
4. Stop worker and exit
===========================================";

const PROMPT: &str = "Select an option (1-4): ";

/// Commands accepted from the operator console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MenuCommand {
    OpenBrowser,
    Status,
    Restart,
    Quit,
}

impl MenuCommand {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(MenuCommand::OpenBrowser),
            "2" => Some(MenuCommand::Status),
            "3" => Some(MenuCommand::Restart),
            "4" => Some(MenuCommand::Quit),
            _ => None,
        }
    }
}

/// Why the control loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    OperatorQuit,
    InputClosed,
    Shutdown,
}

pub(crate) async fn run_controller(
    supervisor: Arc<Supervisor>,
    console: Console,
    mut input_rx: UnboundedReceiver<String>,
    shutdown: CancellationToken,
) -> SessionEnd {
    let end = loop {
        if shutdown.is_cancelled() {
            break SessionEnd::Shutdown;
        }
        console.out(MENU);
        console.prompt(PROMPT);

        let line = tokio::select! {
            _ = shutdown.cancelled() => break SessionEnd::Shutdown,
            line = input_rx.recv() => line,
        };
        let Some(line) = line else {
            console.out("");
            tracing::info!("operator input closed");
            break SessionEnd::InputClosed;
        };

        match MenuCommand::parse(&line) {
            Some(MenuCommand::OpenBrowser) => open_browser(&supervisor, &console),
            Some(MenuCommand::Status) => {
                let status = supervisor.status().await;
                for line in build_status_summary(&status).lines {
                    console.out(line);
                }
            }
            Some(MenuCommand::Restart) => restart(&supervisor, &console).await,
            Some(MenuCommand::Quit) => {
                console.out("Goodbye!");
                break SessionEnd::OperatorQuit;
            }
            None => console.out("Invalid option. Please select 1-4."),
        }
    };

    tracing::info!(?end, "control session ended");
    supervisor.stop().await;
    end
}

fn open_browser(supervisor: &Supervisor, console: &Console) {
    let url = &supervisor.config().health_url;
    match crate::browser::open(url) {
        Ok(()) => console.out(format!("Opening {url} in the browser...")),
        Err(e) => {
            tracing::warn!(error = %e, "could not open browser");
            console.err(format!("Could not open browser: {e}"));
            console.out(format!("Open it manually: {url}"));
        }
    }
}

async fn restart(supervisor: &Supervisor, console: &Console) {
    match supervisor.restart().await {
        Ok(Readiness::Ready { .. }) => console.out("Worker restarted successfully!"),
        Ok(Readiness::TimedOut { attempts }) => console.err(format!(
            "Worker did not become ready after {attempts} attempt(s); it has been stopped. Choose 3 to retry."
        )),
        Ok(Readiness::WorkerExited { .. }) => console.err(format!(
            "{} answers, but the restarted worker exited. Stop stray workers with `devmatch-launcher kill name {}`.",
            supervisor.config().health_url,
            supervisor.config().entry_point.display()
        )),
        Ok(Readiness::Interrupted) => console.out("Restart interrupted by shutdown."),
        Err(e) => {
            tracing::error!(error = %e, "restart failed");
            console.err(format!("Restart failed: {e}"));
        }
    }
}
