use std::{
    fs, io,
    path::{Path, PathBuf},
};

use ipax_core::profile::{
    default_remote_script_path, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_USERNAME,
};
use ipax_core::ScriptMode;
use ipax_util::{env_value, state_file_path, write_json_atomic};
use serde::{Deserialize, Serialize};
use tracing::warn;

const UI_CONFIG_FILE: &str = "ui-config.json";

/// Form values restored on the next launch. The password is never stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) host: String,
    pub(crate) username: String,
    pub(crate) port: u16,
    pub(crate) connect_timeout_secs: u32,
    pub(crate) script_mode: ScriptMode,
    pub(crate) local_script_path: String,
    pub(crate) remote_script_path: String,
    pub(crate) verbose: bool,
    pub(crate) download_dir: String,
    pub(crate) rsync_notice_shown: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: DEFAULT_USERNAME.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            script_mode: ScriptMode::Local,
            local_script_path: String::new(),
            remote_script_path: default_remote_script_path(),
            verbose: false,
            download_dir: String::new(),
            rsync_notice_shown: false,
        }
    }
}

impl AppConfig {
    pub(crate) fn load() -> Self {
        let mut cfg = Self::load_from(&ui_config_path());
        cfg.apply_env();
        cfg
    }

    pub(crate) fn save(&self) -> io::Result<()> {
        self.save_to(&ui_config_path())
    }

    pub(crate) fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<AppConfig>(&data) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}", path.display());
                    AppConfig::default()
                }
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}", path.display());
                }
                AppConfig::default()
            }
        }
    }

    pub(crate) fn save_to(&self, path: &Path) -> io::Result<()> {
        write_json_atomic(path, self)
    }

    fn apply_env(&mut self) {
        let host = env_value("IPAX_HOST", "");
        if !host.trim().is_empty() {
            self.host = host.trim().to_string();
        }
        let user = env_value("IPAX_USER", "");
        if !user.trim().is_empty() {
            self.username = user.trim().to_string();
        }
        match env_value("IPAX_PORT", "").trim() {
            "" => {}
            raw => match raw.parse::<u16>() {
                Ok(port) if port > 0 => self.port = port,
                _ => warn!("Ignoring invalid IPAX_PORT value {raw:?}"),
            },
        }
    }
}

fn ui_config_path() -> PathBuf {
    state_file_path(UI_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempdir().unwrap();
        let cfg = AppConfig::load_from(&temp.path().join("ui-config.json"));
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.username, "root");
        assert_eq!(cfg.remote_script_path, "/var/mobile/Documents/extract-ipa.sh");
    }

    #[test]
    fn round_trips_and_fills_missing_fields() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state").join("ui-config.json");
        let cfg = AppConfig {
            host: "192.168.1.20".into(),
            port: 2222,
            script_mode: ScriptMode::OnDevice,
            verbose: true,
            rsync_notice_shown: true,
            ..AppConfig::default()
        };
        cfg.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path), cfg);

        fs::write(&path, r#"{"host":"10.0.0.9"}"#).unwrap();
        let partial = AppConfig::load_from(&path);
        assert_eq!(partial.host, "10.0.0.9");
        assert_eq!(partial.port, 22);
        assert_eq!(partial.script_mode, ScriptMode::Local);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("ui-config.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }

    #[test]
    fn saved_file_has_no_password_field() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("ui-config.json");
        AppConfig::default().save_to(&path).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("password"));
    }
}
