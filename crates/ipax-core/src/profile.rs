use std::{fmt, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ToolError;

pub const DEFAULT_USERNAME: &str = "root";
pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u32 = 10;
pub const DEFAULT_REMOTE_DIR: &str = "/var/mobile/Documents";
pub const DEFAULT_SCRIPT_NAME: &str = "extract-ipa.sh";
pub const BUNDLE_ROOT: &str = "/var/containers/Bundle/Application/";

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub host: String,
    pub username: String,
    pub port: u16,
    pub password: Option<String>,
    pub connect_timeout_secs: u32,
}

impl ConnectionProfile {
    pub fn new(host: &str, username: &str) -> Self {
        Self {
            host: host.trim().to_string(),
            username: username.trim().to_string(),
            port: DEFAULT_PORT,
            password: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u32) -> Self {
        self.connect_timeout_secs = secs.max(1);
        self
    }

    /// An empty password means key-based or interactive authentication.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = if password.is_empty() {
            None
        } else {
            Some(password.to_string())
        };
        self
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    pub fn validate(&self) -> Result<(), ToolError> {
        if self.host.trim().is_empty() || self.username.trim().is_empty() {
            return Err(ToolError::invalid(
                "Please fill in the device IP and username first.",
            ));
        }
        if self.port == 0 {
            return Err(ToolError::invalid("SSH port must be between 1 and 65535."));
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptMode {
    /// Upload a script from this machine, then run it.
    #[default]
    Local,
    /// Run a script that already lives on the device.
    OnDevice,
}

impl ScriptMode {
    pub fn label(self) -> &'static str {
        match self {
            ScriptMode::Local => "SCP Script",
            ScriptMode::OnDevice => "Device Script",
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            ScriptMode::Local => "local",
            ScriptMode::OnDevice => "on_device",
        }
    }

    pub fn from_id(id: &str) -> Self {
        match id {
            "on_device" => ScriptMode::OnDevice,
            _ => ScriptMode::Local,
        }
    }

    /// Local and device script paths after switching to this mode. A device
    /// script forgets the local file and points back at the default path; an
    /// upload keeps a custom target.
    pub fn switch_paths(self, local: &str, remote: &str) -> (String, String) {
        match self {
            ScriptMode::OnDevice => (String::new(), default_remote_script_path()),
            ScriptMode::Local if remote.trim().is_empty() => {
                (local.to_string(), default_remote_script_path())
            }
            ScriptMode::Local => (local.to_string(), remote.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptSource {
    Local {
        local_path: PathBuf,
        remote_path: String,
    },
    OnDevice {
        remote_path: String,
    },
}

impl ScriptSource {
    pub fn mode(&self) -> ScriptMode {
        match self {
            ScriptSource::Local { .. } => ScriptMode::Local,
            ScriptSource::OnDevice { .. } => ScriptMode::OnDevice,
        }
    }

    pub fn remote_path(&self) -> &str {
        match self {
            ScriptSource::Local { remote_path, .. } => remote_path,
            ScriptSource::OnDevice { remote_path } => remote_path,
        }
    }

    pub fn validate(&self) -> Result<(), ToolError> {
        if let ScriptSource::Local { local_path, .. } = self {
            if local_path.as_os_str().is_empty() || !local_path.is_file() {
                return Err(ToolError::invalid(
                    "Please select a valid extract-ipa.sh script on this computer.",
                ));
            }
        }
        if self.remote_path().trim().is_empty() {
            return Err(ToolError::invalid(
                "Please fill in the script path on the device.",
            ));
        }
        Ok(())
    }
}

pub fn default_remote_script_path() -> String {
    format!("{DEFAULT_REMOTE_DIR}/{DEFAULT_SCRIPT_NAME}")
}

/// Where an uploaded script lands: the default remote directory, keeping the
/// local file name.
pub fn remote_path_for_local(local: &Path) -> String {
    match local.file_name().and_then(|name| name.to_str()) {
        Some(name) if !name.is_empty() => format!("{DEFAULT_REMOTE_DIR}/{name}"),
        _ => default_remote_script_path(),
    }
}

/// Directory part of a device path. Mirrors POSIX `dirname` for the shapes
/// the form produces.
pub fn remote_parent(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
        None => ".",
    }
}

pub fn remote_file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}
