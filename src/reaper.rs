//! Signal delivery to worker processes by PID or command-line pattern.
//!
//! Used by the supervisor for graceful termination and by the `kill` subcommand to clean up
//! workers orphaned by a previous launcher that died without stopping them.

use crate::error::KillError;

/// Ask a process to exit (SIGTERM).
pub(crate) fn terminate(pid: u32) -> Result<(), KillError> {
    send(pid, false)
}

/// Kill a process outright (SIGKILL).
pub(crate) fn force_kill(pid: u32) -> Result<(), KillError> {
    send(pid, true)
}

#[cfg(unix)]
fn send(pid: u32, force: bool) -> Result<(), KillError> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| KillError::NotFound(pid))?;
    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    match kill(Pid::from_raw(raw), signal) {
        Ok(()) => {
            tracing::debug!(pid, ?signal, "signal delivered");
            Ok(())
        }
        Err(Errno::ESRCH) => Err(KillError::NotFound(pid)),
        Err(Errno::EPERM) => Err(KillError::PermissionDenied(pid)),
        Err(e) => Err(KillError::Signal {
            pid,
            reason: e.desc().to_string(),
        }),
    }
}

#[cfg(not(unix))]
fn send(_pid: u32, _force: bool) -> Result<(), KillError> {
    Err(KillError::Unsupported)
}

/// PIDs whose full command line matches `pattern`, excluding this launcher itself.
pub(crate) fn find_by_pattern(pattern: &str) -> Result<Vec<u32>, KillError> {
    if !cfg!(unix) {
        return Err(KillError::Unsupported);
    }
    let output = std::process::Command::new("pgrep")
        .arg("-f")
        .arg(pattern)
        .output()
        .map_err(KillError::Lookup)?;

    // pgrep exits 1 when nothing matched.
    if !output.status.success() {
        return Ok(Vec::new());
    }
    Ok(parse_pids(&String::from_utf8_lossy(&output.stdout), std::process::id()))
}

fn parse_pids(stdout: &str, own_pid: u32) -> Vec<u32> {
    stdout
        .lines()
        .filter_map(|l| l.trim().parse::<u32>().ok())
        .filter(|pid| *pid != own_pid)
        .collect()
}

/// Per-PID outcome of a pattern kill.
pub(crate) struct PatternKill {
    pub terminated: Vec<u32>,
    pub failed: Vec<(u32, KillError)>,
}

/// SIGTERM every process whose command line matches `pattern`.
pub(crate) fn terminate_matching(pattern: &str) -> Result<PatternKill, KillError> {
    let mut result = PatternKill {
        terminated: Vec::new(),
        failed: Vec::new(),
    };
    for pid in find_by_pattern(pattern)? {
        match terminate(pid) {
            Ok(()) => result.terminated.push(pid),
            Err(e) => result.failed.push((pid, e)),
        }
    }
    Ok(result)
}
