//! Save manager configuration
//!
//! Loaded from TOML or built in code. Every field has a default, so an empty
//! document is a valid configuration:
//!
//! ```toml
//! device_root = "/vmu"
//! short_name_prefix = "VMUSAVE_"
//! short_description = "Saved Game"
//! app_id = "vmu-saves"
//! retain_packages = true
//! max_name_attempts = 4096
//! compress = true
//! ```

use crate::core::error::{Result, SaveError};
use crate::core::naming;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Save paths below this root are served from a memory card
    pub device_root: String,

    /// Private prefix of every short name this cache creates
    pub short_name_prefix: String,

    /// Short description shown by the host file manager
    pub short_description: String,

    /// Application identifier stamped into each package header
    pub app_id: String,

    /// Keep scanned packages in memory so reads skip the device
    pub retain_packages: bool,

    /// Upper bound on short name draws before giving up
    pub max_name_attempts: usize,

    /// Fixed seed for the short name generator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_seed: Option<u64>,

    /// Compress saves unless the caller says otherwise
    pub compress: bool,
}

impl Default for SaveConfig {
    fn default() -> Self {
        SaveConfig {
            device_root: "/vmu".to_string(),
            short_name_prefix: "VMUSAVE_".to_string(),
            short_description: "Saved Game".to_string(),
            app_id: "vmu-saves".to_string(),
            retain_packages: true,
            max_name_attempts: 4096,
            name_seed: None,
            compress: true,
        }
    }
}

impl SaveConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SaveConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.device_root.starts_with('/') || self.device_root.len() < 2 {
            return Err(SaveError::Config(format!(
                "device_root must be an absolute path, got {:?}",
                self.device_root
            )));
        }

        naming::validate_prefix(&self.short_name_prefix)?;

        if self.max_name_attempts == 0 {
            return Err(SaveError::Config(
                "max_name_attempts must be at least 1".to_string(),
            ));
        }

        if !self.short_description.is_ascii() || !self.app_id.is_ascii() {
            return Err(SaveError::Config(
                "package descriptions must be ASCII".to_string(),
            ));
        }

        Ok(())
    }

    /// The address part of `save_path` if it lives under the device root
    ///
    /// `/vmu/a1` yields `Some("/a1")`, `/vmux` and `/home/saves` yield `None`.
    pub fn device_path<'a>(&self, save_path: &'a str) -> Option<&'a str> {
        let rest = save_path.strip_prefix(self.device_root.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SaveConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(SaveConfig::from_toml_str("").unwrap(), SaveConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = SaveConfig::from_toml_str(
            r#"
            short_name_prefix = "LOOM_"
            retain_packages = false
            name_seed = 99
            "#,
        )
        .unwrap();
        assert_eq!(config.short_name_prefix, "LOOM_");
        assert!(!config.retain_packages);
        assert_eq!(config.name_seed, Some(99));
        assert_eq!(config.device_root, "/vmu");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            SaveConfig::from_toml_str(r#"short_name_prefix = "much_too_long""#),
            Err(SaveError::Config(_))
        ));
        assert!(matches!(
            SaveConfig::from_toml_str("max_name_attempts = 0"),
            Err(SaveError::Config(_))
        ));
        assert!(matches!(
            SaveConfig::from_toml_str(r#"device_root = "vmu""#),
            Err(SaveError::Config(_))
        ));
        assert!(matches!(
            SaveConfig::from_toml_str("retain_packages = 3"),
            Err(SaveError::Toml(_))
        ));
    }

    #[test]
    fn test_device_path() {
        let config = SaveConfig::default();
        assert_eq!(config.device_path("/vmu/a1"), Some("/a1"));
        assert_eq!(config.device_path("/vmu"), Some(""));
        assert_eq!(config.device_path("/vmux/a1"), None);
        assert_eq!(config.device_path("/sd/saves"), None);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saves.toml");
        std::fs::write(&path, "compress = false\n").unwrap();
        let config = SaveConfig::from_file(&path).unwrap();
        assert!(!config.compress);
    }
}
