use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use artnet::types::{ARTNET_PORT, DEFAULT_DISCOVERY_TIMEOUT_MS};
use artnet::{default_local_addr, DiscoveryConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] io::Error),
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid artnet_interface {0:?}")]
    InvalidInterface(String),
    #[error("no IPv4 interface available for discovery")]
    NoInterface,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Local IPv4 address used for discovery. Empty or "0.0.0.0" picks the
    /// first non-loopback interface.
    pub artnet_interface: String,
    pub artnet_port: u16,
    pub discovery_timeout_ms: u64,
    pub fixtures_root: Option<PathBuf>,
    pub session_path: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            artnet_interface: "0.0.0.0".to_string(),
            artnet_port: ARTNET_PORT,
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
            fixtures_root: None,
            session_path: None,
        }
    }
}

impl AppSettings {
    /// `<config dir>/patchbay/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("patchbay").join("settings.json"))
    }

    /// Read settings from `path`. A missing file gives the defaults; missing
    /// keys fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn local_addr(&self) -> Result<Ipv4Addr, SettingsError> {
        let interface = self.artnet_interface.trim();
        if interface.is_empty() || interface == "0.0.0.0" {
            return default_local_addr().ok_or(SettingsError::NoInterface);
        }
        interface
            .parse()
            .map_err(|_| SettingsError::InvalidInterface(self.artnet_interface.clone()))
    }

    pub fn discovery_config(&self) -> Result<DiscoveryConfig, SettingsError> {
        Ok(DiscoveryConfig::new(self.local_addr()?)
            .with_port(self.artnet_port)
            .with_timeout(Duration::from_millis(self.discovery_timeout_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AppSettings::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.artnet_port, 6454);
        assert_eq!(settings.discovery_timeout_ms, 2000);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"artnet_interface": "192.168.1.100"}"#).unwrap();

        let settings = AppSettings::load(&path).unwrap();
        assert_eq!(settings.artnet_interface, "192.168.1.100");
        assert_eq!(settings.artnet_port, 6454);

        let config = settings.discovery_config().unwrap();
        assert_eq!(config.local_addr, Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(config.timeout, Duration::from_secs(2));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = AppSettings {
            artnet_interface: "10.0.0.1".into(),
            artnet_port: 6455,
            discovery_timeout_ms: 500,
            fixtures_root: Some(PathBuf::from("/srv/fixtures")),
            session_path: None,
        };
        settings.save(&path).unwrap();
        assert_eq!(AppSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn bad_interface_is_an_error() {
        let settings = AppSettings {
            artnet_interface: "eth0".into(),
            ..AppSettings::default()
        };
        assert!(matches!(
            settings.local_addr(),
            Err(SettingsError::InvalidInterface(_))
        ));
    }

    #[test]
    fn bad_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{").unwrap();
        assert!(matches!(AppSettings::load(&path), Err(SettingsError::Json(_))));
    }
}
