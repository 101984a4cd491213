//! Operator console.
//!
//! All terminal output (menu, notices, relayed worker lines) goes through a single blocking
//! writer so lines from concurrent tasks never interleave mid-line and async tasks never block
//! on stdout.

use std::io::Write;
use tokio::sync::{mpsc, oneshot};

/// Output line routing for stdout/stderr writer.
#[derive(Debug)]
pub(crate) enum OutputLine {
    Stdout(String),
    Stderr(String),
    /// Written to stdout without a trailing newline, then flushed.
    Prompt(String),
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle to the console writer.
#[derive(Debug, Clone)]
pub(crate) struct Console {
    tx: mpsc::UnboundedSender<OutputLine>,
}

impl Console {
    /// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
    ///
    /// The std handles are locked per message, never for the writer's lifetime, so direct
    /// writes elsewhere in the process are not blocked while a sender is still alive.
    pub fn spawn() -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
        let handle = tokio::task::spawn_blocking(move || {
            let stdout = std::io::stdout();
            let stderr = std::io::stderr();

            while let Some(line) = rx.blocking_recv() {
                match line {
                    OutputLine::Stdout(msg) => {
                        let _ = writeln!(stdout.lock(), "{}", msg);
                    }
                    OutputLine::Stderr(msg) => {
                        let _ = writeln!(stderr.lock(), "{}", msg);
                    }
                    OutputLine::Prompt(msg) => {
                        let mut out = stdout.lock();
                        let _ = write!(out, "{}", msg);
                        let _ = out.flush();
                    }
                    OutputLine::Flush(ack) => {
                        let _ = stdout.lock().flush();
                        let _ = stderr.lock().flush();
                        let _ = ack.send(());
                    }
                }
            }

            let _ = stdout.lock().flush();
        });
        (Self { tx }, handle)
    }

    /// Console whose output is collected by the caller instead of written to the terminal.
    #[cfg(test)]
    pub fn capture() -> (Self, mpsc::UnboundedReceiver<OutputLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn out(&self, msg: impl Into<String>) {
        let _ = self.tx.send(OutputLine::Stdout(msg.into()));
    }

    pub fn err(&self, msg: impl Into<String>) {
        let _ = self.tx.send(OutputLine::Stderr(msg.into()));
    }

    pub fn prompt(&self, msg: impl Into<String>) {
        let _ = self.tx.send(OutputLine::Prompt(msg.into()));
    }

    /// Wait until everything queued so far has been written.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(OutputLine::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

/// Forward operator input lines from a dedicated blocking thread.
///
/// The channel closes when stdin reaches end of input or fails.
pub(crate) fn spawn_stdin_listener() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut buf = String::new();
        loop {
            buf.clear();
            match stdin.read_line(&mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(buf.trim().to_string()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}
