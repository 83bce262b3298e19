use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::profile::{remote_file_name, remote_parent, ConnectionProfile};
use crate::tools::{Tool, ToolAvailability};

const SSHPASS_ENV: &str = "SSHPASS";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Probe,
    ListBundles,
    Transfer,
    Execute,
    Download,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::Probe => "probe",
            Action::ListBundles => "list_bundles",
            Action::Transfer => "transfer",
            Action::Execute => "execute",
            Action::Download => "download",
        }
    }
}

/// A fully resolved invocation. Arguments are passed to the OS as-is; no
/// local shell is involved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCommand {
    pub action: Action,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Report `NN%` values seen on stdout as progress.
    pub track_progress: bool,
}

impl RemoteCommand {
    /// Shell-like rendering for logs. Environment values are never shown.
    pub fn display(&self) -> String {
        let mut out = String::new();
        for (key, _) in &self.env {
            out.push_str(key);
            out.push_str("=<redacted> ");
        }
        out.push_str(&shell_quote(&self.program.to_string_lossy()));
        for arg in &self.args {
            out.push(' ');
            out.push_str(&shell_quote(arg));
        }
        out
    }
}

pub struct CommandBuilder<'a> {
    profile: &'a ConnectionProfile,
    tools: ToolAvailability,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(profile: &'a ConnectionProfile, tools: ToolAvailability) -> Self {
        Self { profile, tools }
    }

    pub fn probe(&self) -> RemoteCommand {
        self.ssh(Action::Probe, "echo Connected".to_string())
    }

    pub fn list_bundles(&self, bundle_root: &str) -> RemoteCommand {
        self.ssh(Action::ListBundles, format!("ls {}", shell_quote(bundle_root)))
    }

    /// Copies `local` into the directory that will hold `remote_script`.
    pub fn transfer(&self, local: &Path, remote_script: &str) -> RemoteCommand {
        let mut args = self.scp_options();
        args.push(local.to_string_lossy().to_string());
        args.push(self.remote_spec(remote_parent(remote_script)));
        self.finish(Action::Transfer, Tool::Scp, args, false)
    }

    pub fn execute(&self, remote_script: &str, bundle_path: &str) -> RemoteCommand {
        let dir = remote_parent(remote_script);
        let script = format!("./{}", remote_file_name(remote_script));
        let remote = format!(
            "cd {dir} && chmod +x {script} && {script} {bundle}",
            dir = shell_quote(dir),
            script = shell_quote(&script),
            bundle = shell_quote(bundle_path),
        );
        self.ssh(Action::Execute, remote)
    }

    /// rsync with progress when available locally, scp otherwise.
    pub fn download(&self, remote_ipa: &str, local: &Path) -> RemoteCommand {
        let local = local.to_string_lossy().to_string();
        if self.tools.rsync {
            let args = vec![
                "-avz".to_string(),
                "-s".to_string(),
                "--info=progress2".to_string(),
                "-e".to_string(),
                format!(
                    "{} -p {} -o ConnectTimeout={}",
                    shell_quote(&Tool::Ssh.path().to_string_lossy()),
                    self.profile.port,
                    self.profile.connect_timeout_secs
                ),
                self.remote_spec(remote_ipa),
                local,
            ];
            self.finish(Action::Download, Tool::Rsync, args, true)
        } else {
            let mut args = self.scp_options();
            args.push(self.remote_spec(remote_ipa));
            args.push(local);
            self.finish(Action::Download, Tool::Scp, args, false)
        }
    }

    fn ssh(&self, action: Action, remote_command: String) -> RemoteCommand {
        let args = vec![
            "-p".to_string(),
            self.profile.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.profile.connect_timeout_secs),
            self.profile.destination(),
            remote_command,
        ];
        self.finish(action, Tool::Ssh, args, false)
    }

    fn scp_options(&self) -> Vec<String> {
        vec![
            "-P".to_string(),
            self.profile.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.profile.connect_timeout_secs),
        ]
    }

    /// `user@host:path` with the path unquoted. rsync protects it with `-s`
    /// and SFTP-mode scp (OpenSSH 9+) takes it literally; legacy-protocol
    /// scp hands it to the remote shell, so paths with spaces need a newer
    /// scp or rsync there.
    fn remote_spec(&self, path: &str) -> String {
        format!("{}:{}", self.profile.destination(), path)
    }

    fn finish(
        &self,
        action: Action,
        tool: Tool,
        args: Vec<String>,
        track_progress: bool,
    ) -> RemoteCommand {
        match self.profile.password.as_deref() {
            Some(password) if self.tools.sshpass => {
                let mut wrapped = Vec::with_capacity(args.len() + 2);
                wrapped.push("-e".to_string());
                wrapped.push(tool.path().to_string_lossy().to_string());
                wrapped.extend(args);
                RemoteCommand {
                    action,
                    program: Tool::Sshpass.path(),
                    args: wrapped,
                    env: vec![(SSHPASS_ENV.to_string(), password.to_string())],
                    track_progress,
                }
            }
            _ => RemoteCommand {
                action,
                program: tool.path(),
                args,
                env: Vec::new(),
                track_progress,
            },
        }
    }
}

/// Quotes one word for a POSIX shell. Plain words pass through unchanged.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '+' | ':' | '@' | '=' | ',')
        });
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
