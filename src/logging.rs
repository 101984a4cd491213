//! File-based logging. The console belongs to the operator menu, so log output goes to a file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "devmatch-launcher";

/// Default log location: `<data_local_dir>/devmatch-launcher/launcher.log`.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join(APP_NAME).join("launcher.log"))
}

/// Install the global subscriber. Default INFO, `RUST_LOG` overrides.
///
/// If setup fails, prints a warning to stderr and continues without logging.
pub fn init(path: Option<&Path>) -> Option<PathBuf> {
    let path = match path.map(Path::to_path_buf).or_else(default_log_path) {
        Some(p) => p,
        None => {
            eprintln!("Warning: could not determine a log directory; logging disabled");
            return None;
        }
    };
    match init_file(&path) {
        Ok(()) => Some(path),
        Err(e) => {
            eprintln!("Warning: failed to set up file logging: {e:#}");
            None
        }
    }
}

fn init_file(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(filter)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_lives_under_app_dir() {
        if let Some(p) = default_log_path() {
            assert!(p.ends_with("devmatch-launcher/launcher.log"));
        }
    }

    #[test]
    fn init_file_fails_on_unwritable_target() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a log file.
        assert!(init_file(dir.path()).is_err());
    }
}
