use std::{path::PathBuf, process::Stdio};

use tokio::process::Command;
use tracing::info;

use crate::log::LogLine;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    Ssh,
    Scp,
    Rsync,
    Sshpass,
}

impl Tool {
    pub fn binary_name(self) -> &'static str {
        match self {
            Tool::Ssh => "ssh",
            Tool::Scp => "scp",
            Tool::Rsync => "rsync",
            Tool::Sshpass => "sshpass",
        }
    }

    pub fn env_key(self) -> &'static str {
        match self {
            Tool::Ssh => "IPAX_SSH",
            Tool::Scp => "IPAX_SCP",
            Tool::Rsync => "IPAX_RSYNC",
            Tool::Sshpass => "IPAX_SSHPASS",
        }
    }

    /// Explicit override from the environment, otherwise the bare name so the
    /// OS resolves it through `PATH`.
    pub fn path(self) -> PathBuf {
        match std::env::var(self.env_key()) {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => PathBuf::from(self.binary_name()),
        }
    }

    fn version_args(self) -> &'static [&'static str] {
        match self {
            Tool::Sshpass | Tool::Ssh => &["-V"],
            Tool::Rsync => &["--version"],
            Tool::Scp => &[],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ToolAvailability {
    pub sshpass: bool,
    pub rsync: bool,
}

impl ToolAvailability {
    pub async fn detect() -> Self {
        let availability = Self {
            sshpass: tool_responds(Tool::Sshpass).await,
            rsync: tool_responds(Tool::Rsync).await,
        };
        info!(
            sshpass = availability.sshpass,
            rsync = availability.rsync,
            "local tool discovery finished"
        );
        availability
    }

    pub fn report(&self) -> Vec<LogLine> {
        let mut lines = Vec::new();
        if self.sshpass {
            lines.push(LogLine::success(
                "sshpass found. Password authentication from the form is supported.",
            ));
        } else {
            lines.push(LogLine::warning(
                "Warning: sshpass not found. Password authentication might require separate terminal interaction.",
            ));
            lines.push(LogLine::warning(
                "To install sshpass (Ubuntu/Debian): sudo apt-get install sshpass",
            ));
            lines.push(LogLine::warning(
                "To install sshpass (macOS with Homebrew): brew install hudochenkov/sshpass/sshpass",
            ));
        }
        if self.rsync {
            lines.push(LogLine::success(
                "rsync found. Download progress will be displayed.",
            ));
        } else {
            lines.push(LogLine::warning(
                "Warning: rsync not found. IPA download will use scp without progress display.",
            ));
            lines.push(LogLine::warning(
                "To install rsync (Ubuntu/Debian): sudo apt-get install rsync",
            ));
            lines.push(LogLine::warning(
                "To install rsync (macOS with Homebrew): brew install rsync",
            ));
        }
        lines
    }
}

fn quiet_command(tool: Tool) -> Command {
    let mut cmd = Command::new(tool.path());
    cmd.args(tool.version_args())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

/// A tool counts as available when it spawns and exits cleanly.
pub async fn tool_responds(tool: Tool) -> bool {
    quiet_command(tool)
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Only checks that the binary can be spawned; `scp` has no version flag and
/// exits non-zero when run bare.
pub async fn tool_installed(tool: Tool) -> bool {
    quiet_command(tool).status().await.is_ok()
}
