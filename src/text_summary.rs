//! Text rendering for status and probe reports.

use crate::model::{ProbeReport, StatusSnapshot};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_status_summary(status: &StatusSnapshot) -> TextSummary {
    let mut lines = vec![
        String::new(),
        "WORKER STATUS".to_string(),
        format!("   URL:     {}", status.url),
        format!(
            "   Server:  {}",
            if status.responding {
                "responding"
            } else {
                "not responding"
            }
        ),
        format!(
            "   Process: {}",
            if status.process_alive {
                "running"
            } else {
                "not running"
            }
        ),
    ];
    if let Some(pid) = status.pid {
        lines.push(format!("   PID:     {pid}"));
    }
    if let Some(uptime) = status.uptime {
        // Whole seconds read better than humantime's nanosecond tail.
        let secs = std::time::Duration::from_secs(uptime.as_secs());
        lines.push(format!("   Uptime:  {}", humantime::format_duration(secs)));
    }
    lines.push(format!("   State:   {}", status.state.label()));
    TextSummary { lines }
}

pub(crate) fn build_probe_summary(report: &ProbeReport) -> TextSummary {
    let verdict = if report.responding {
        "ready"
    } else {
        "not ready"
    };
    let mut line = format!("{}: {verdict}", report.url);
    if let Some(attempts) = report.attempts {
        line.push_str(&format!(" after {attempts} attempt(s)"));
    }
    TextSummary { lines: vec![line] }
}
