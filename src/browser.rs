//! Best-effort "open this URL in the default browser".

use crate::error::BrowserOpenError;
use std::process::Stdio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OsFamily {
    MacOs,
    Windows,
    Unix,
}

impl OsFamily {
    pub fn detect() -> Option<Self> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Option<Self> {
        match os {
            "macos" | "ios" => Some(OsFamily::MacOs),
            "windows" => Some(OsFamily::Windows),
            "linux" | "android" | "freebsd" | "netbsd" | "openbsd" | "dragonfly" | "solaris"
            | "illumos" => Some(OsFamily::Unix),
            _ => None,
        }
    }
}

/// Command template per OS family; `{url}` is substituted.
const LAUNCHERS: &[(OsFamily, &[&str])] = &[
    (OsFamily::MacOs, &["open", "{url}"]),
    (
        OsFamily::Windows,
        &["rundll32", "url.dll,FileProtocolHandler", "{url}"],
    ),
    (OsFamily::Unix, &["xdg-open", "{url}"]),
];

pub(crate) fn launch_command(family: OsFamily, url: &str) -> Option<Vec<String>> {
    LAUNCHERS
        .iter()
        .find(|(f, _)| *f == family)
        .map(|(_, template)| template.iter().map(|p| p.replace("{url}", url)).collect())
}

/// Start the platform's URL handler without waiting for it.
pub(crate) fn open(url: &str) -> Result<(), BrowserOpenError> {
    let family = OsFamily::detect()
        .ok_or_else(|| BrowserOpenError::UnsupportedOs(std::env::consts::OS.to_string()))?;
    let argv = launch_command(family, url)
        .ok_or_else(|| BrowserOpenError::UnsupportedOs(std::env::consts::OS.to_string()))?;
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| BrowserOpenError::UnsupportedOs(std::env::consts::OS.to_string()))?;

    tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| BrowserOpenError::Spawn {
            program: program.clone(),
            source,
        })?;
    tracing::info!(url, ?family, "opened browser");
    Ok(())
}
