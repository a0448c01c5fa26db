use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::MAX_HASH_SEQ_SIZE;
use crate::error::{Error, Result};
use crate::hash::{BlobHash, HashFormat};
use crate::ticket::TicketType;

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "sendme";
const APP_NAME: &str = "sendme";
const CONFIG_FILE: &str = "config.json";

/// Which relay servers an endpoint uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RelaySetting {
    Disabled,
    /// The public n0 relays.
    #[default]
    Default,
    /// Comma-separated list of relay URLs.
    Custom(Vec<String>),
}

impl fmt::Display for RelaySetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelaySetting::Disabled => f.write_str("disabled"),
            RelaySetting::Default => f.write_str("default"),
            RelaySetting::Custom(urls) => f.write_str(&urls.join(",")),
        }
    }
}

impl FromStr for RelaySetting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "disabled" => Ok(RelaySetting::Disabled),
            "default" => Ok(RelaySetting::Default),
            "" => Err(Error::InvalidConfig("empty relay setting".to_string())),
            urls => Ok(RelaySetting::Custom(
                urls.split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
        }
    }
}

impl TryFrom<String> for RelaySetting {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RelaySetting> for String {
    fn from(value: RelaySetting) -> Self {
        value.to_string()
    }
}

/// Persistent user defaults. Command-line flags override every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub relay: RelaySetting,
    pub ticket_type: TicketType,
    pub format: HashFormat,
    pub direct_timeout_secs: u64,
    pub relay_timeout_secs: u64,
    pub discovery_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_hash_seq_size: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            relay: RelaySetting::Default,
            ticket_type: TicketType::RelayAndAddresses,
            format: HashFormat::Hex,
            direct_timeout_secs: 10,
            relay_timeout_secs: 20,
            discovery_timeout_secs: 30,
            idle_timeout_secs: 60,
            max_hash_seq_size: MAX_HASH_SEQ_SIZE,
        }
    }
}

impl Settings {
    /// Location of the config file: `dir_override` if given, otherwise the
    /// platform config directory.
    pub fn path(dir_override: Option<&Path>) -> Option<PathBuf> {
        if let Some(dir) = dir_override {
            return Some(dir.join(CONFIG_FILE));
        }
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load settings, falling back to defaults when no file can be read.
    pub fn load(dir_override: Option<&Path>) -> Result<Self> {
        match Self::path(dir_override) {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config file unreadable, using defaults");
                return Ok(Self::default());
            }
        };
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| Error::InvalidConfig(format!("{}: {e}", path.display())))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("direct_timeout_secs", self.direct_timeout_secs),
            ("relay_timeout_secs", self.relay_timeout_secs),
            ("discovery_timeout_secs", self.discovery_timeout_secs),
            ("idle_timeout_secs", self.idle_timeout_secs),
        ] {
            if secs == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if self.max_hash_seq_size < BlobHash::LEN as u64 {
            return Err(Error::InvalidConfig(format!(
                "max_hash_seq_size must be at least {} bytes",
                BlobHash::LEN
            )));
        }
        if let RelaySetting::Custom(urls) = &self.relay {
            if urls.is_empty() {
                return Err(Error::InvalidConfig("custom relay list is empty".to_string()));
            }
        }
        Ok(())
    }

    pub fn direct_timeout(&self) -> Duration {
        Duration::from_secs(self.direct_timeout_secs)
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_timeout_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(dir.path())).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = Settings::path(Some(dir.path())).unwrap();
        let settings = Settings {
            relay: RelaySetting::Custom(vec!["https://relay.example.com".to_string()]),
            ticket_type: TicketType::Addresses,
            format: HashFormat::Cid,
            ..Default::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{ "relay": "disabled", "ticket_type": "id" }"#).unwrap();
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.relay, RelaySetting::Disabled);
        assert_eq!(settings.ticket_type, TicketType::Id);
        assert_eq!(settings.idle_timeout_secs, Settings::default().idle_timeout_secs);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        for bad in [
            r#"{ "direct_timeout_secs": 0 }"#,
            r#"{ "max_hash_seq_size": 1 }"#,
            r#"{ "ticket_type": "sometimes" }"#,
            "not json",
        ] {
            std::fs::write(&path, bad).unwrap();
            let err = Settings::load_from(&path).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Input, "{bad}");
        }
    }

    #[test]
    fn test_relay_setting_parse() {
        assert_eq!("disabled".parse::<RelaySetting>().unwrap(), RelaySetting::Disabled);
        assert_eq!(
            "https://a.example, https://b.example".parse::<RelaySetting>().unwrap(),
            RelaySetting::Custom(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
        assert!("".parse::<RelaySetting>().is_err());
    }
}
