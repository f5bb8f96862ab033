//! Persistent configuration for camwire.
//!
//! Settings live in `~/.camwire/config.json` (the directory can be moved with
//! `CAMWIRE_HOME`). Every field has a default, so a partial file is fine and
//! a missing one means "use the defaults".
//!
//! # Example
//!
//! ```no_run
//! use camwire_core::config::CamwireConfig;
//!
//! let config = CamwireConfig::load();
//! println!("sending to {}:{}", config.server_host, config.server_port);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::capture::{CaptureFilter, CaptureRequest};
use crate::client::ClientConfig;

const CONFIG_FILENAME: &str = "config.json";

/// Environment variable overriding the camwire directory.
pub const HOME_ENV: &str = "CAMWIRE_HOME";

/// Errors loading or saving the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Returns the camwire directory (`$CAMWIRE_HOME` or `~/.camwire/`).
///
/// Creates the directory if it doesn't exist. Falls back to the system temp
/// directory when no home directory can be determined.
pub fn camwire_dir() -> PathBuf {
    let dir = match std::env::var_os(HOME_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".camwire"),
    };
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Returns the log directory inside [`camwire_dir`].
pub fn logs_dir() -> PathBuf {
    let dir = camwire_dir().join("logs");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Path of the configuration file.
pub fn config_path() -> PathBuf {
    camwire_dir().join(CONFIG_FILENAME)
}

/// Persistent camwire configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CamwireConfig {
    /// Relay server (or camera) address commands are sent to.
    pub server_host: String,
    pub server_port: u16,
    /// Device id placed in `devTarget`.
    pub dev_target: String,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub keepalive: bool,
    pub capture: CaptureSettings,
}

impl Default for CamwireConfig {
    fn default() -> Self {
        Self {
            server_host: "192.168.1.200".to_string(),
            server_port: 6123,
            dev_target: "deadbeef".to_string(),
            connect_timeout_ms: 5_000,
            write_timeout_ms: 5_000,
            read_timeout_ms: 30_000,
            keepalive: true,
            capture: CaptureSettings::default(),
        }
    }
}

/// Packet capture defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub interface: String,
    /// LAN address of the camera itself.
    pub camera_host: String,
    pub ports: Vec<u16>,
    pub duration_secs: u64,
    pub output_dir: PathBuf,
    /// Prefix the capture tool with `sudo`.
    pub use_sudo: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interface: "any".to_string(),
            camera_host: "192.168.1.104".to_string(),
            ports: vec![6123, 80],
            duration_secs: 30,
            output_dir: PathBuf::from("."),
            use_sudo: true,
        }
    }
}

impl CamwireConfig {
    /// Load from [`config_path`].
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        let path = config_path();
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                Self::default()
            }
        }
    }

    /// Load from an explicit path, failing on any error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Save to [`config_path`].
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = config_path();
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save to an explicit path as pretty-printed JSON.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Client timeouts derived from this config.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            keepalive: self.keepalive,
        }
    }
}

impl CaptureSettings {
    /// Build a capture request from these settings.
    pub fn request(&self) -> CaptureRequest {
        CaptureRequest {
            interface: self.interface.clone(),
            duration: Duration::from_secs(self.duration_secs),
            filter: CaptureFilter::new(self.camera_host.clone(), self.ports.clone()),
            output_dir: self.output_dir.clone(),
            use_sudo: self.use_sudo,
        }
    }
}
