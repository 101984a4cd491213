use std::path::PathBuf;
use thiserror::Error;

/// Failures that prevent a worker from being started.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("worker entry point not found: {}", .0.display())]
    EntryPointMissing(PathBuf),
    #[error("failed to spawn `{interpreter}`: {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },
    #[error("launch aborted: shutdown in progress")]
    Interrupted,
}

#[derive(Debug, Error)]
pub enum BrowserOpenError {
    #[error("no browser launcher known for operating system `{0}`")]
    UnsupportedOs(String),
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum KillError {
    #[error("no process with PID {0}")]
    NotFound(u32),
    #[error("permission denied signalling PID {0}")]
    PermissionDenied(u32),
    #[error("failed to signal PID {pid}: {reason}")]
    Signal { pid: u32, reason: String },
    #[error("process lookup failed: {0}")]
    Lookup(#[source] std::io::Error),
    #[error("process signalling is not supported on this platform")]
    Unsupported,
}
