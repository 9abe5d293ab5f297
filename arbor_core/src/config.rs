//! Store configuration file.
//!
//! A flat `key=value` file; blank lines and `#` comments are ignored:
//!
//! ```text
//! version=1
//! algo=blake3-256
//! user.name=Alice
//! user.email=alice@example.com
//! ```

use crate::error::{Error, Result};
use crate::hash::Algorithm;
use std::fs;
use std::io::Write;
use std::path::Path;

/// File name of the config inside the store root.
pub const CONFIG_FILE: &str = "config";

/// Supported config file version.
pub const CONFIG_VERSION: &str = "1";

/// Parsed store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Hash algorithm for object identity.
    pub algorithm: Algorithm,
    /// Default commit author name.
    pub user_name: Option<String>,
    /// Default commit author email.
    pub user_email: Option<String>,
}

impl StoreConfig {
    /// Configuration for a freshly initialized store.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            user_name: None,
            user_email: None,
        }
    }

    /// Parse config file content.
    pub fn parse(content: &str) -> Result<Self> {
        let mut version = None;
        let mut algo = None;
        let mut user_name = None;
        let mut user_email = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim();
                match key.trim() {
                    "version" => version = Some(value),
                    "algo" => algo = Some(value),
                    "user.name" if !value.is_empty() => user_name = Some(value.to_string()),
                    "user.email" if !value.is_empty() => user_email = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        if version != Some(CONFIG_VERSION) {
            return Err(Error::invalid_store(
                CONFIG_FILE,
                format!("Unsupported config version: {:?}", version),
            ));
        }

        let algo_str =
            algo.ok_or_else(|| Error::invalid_store(CONFIG_FILE, "Missing algo in config"))?;

        Ok(Self {
            algorithm: Algorithm::parse(algo_str)?,
            user_name,
            user_email,
        })
    }

    /// Render the config back to file content.
    pub fn render(&self) -> String {
        let mut out = format!(
            "version={}\nalgo={}\n",
            CONFIG_VERSION,
            self.algorithm.as_str()
        );
        if let Some(name) = &self.user_name {
            out.push_str(&format!("user.name={}\n", name));
        }
        if let Some(email) = &self.user_email {
            out.push_str(&format!("user.email={}\n", email));
        }
        out
    }

    /// Read and parse the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| match e {
            Error::InvalidStore { reason, .. } => Error::invalid_store(path, reason),
            other => other,
        })
    }

    /// Atomically replace the config file at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::invalid_store(path, "config path has no parent"))?;
        let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
        temp_file.write_all(self.render().as_bytes())?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_config() {
        let config = StoreConfig::parse("version=1\nalgo=blake3-256\n").unwrap();
        assert_eq!(config, StoreConfig::new(Algorithm::Blake3));
    }

    #[test]
    fn test_parse_config_with_comments_and_identity() {
        let content = "# Comment\nversion=1\nalgo=blake3-256\n\nuser.name = Alice\nuser.email=alice@example.com\n";
        let config = StoreConfig::parse(content).unwrap();
        assert_eq!(config.user_name.as_deref(), Some("Alice"));
        assert_eq!(config.user_email.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn test_parse_config_invalid_version() {
        assert!(matches!(
            StoreConfig::parse("version=99\nalgo=blake3-256\n"),
            Err(Error::InvalidStore { .. })
        ));
    }

    #[test]
    fn test_parse_config_missing_algo() {
        assert!(matches!(
            StoreConfig::parse("version=1\n"),
            Err(Error::InvalidStore { .. })
        ));
    }

    #[test]
    fn test_save_replaces_and_load_names_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);

        let mut config = StoreConfig::new(Algorithm::Blake3);
        config.save(&path).unwrap();
        config.user_name = Some("Alice".to_string());
        config.save(&path).unwrap();
        assert_eq!(StoreConfig::load(&path).unwrap(), config);
        // no temp files left next to it
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);

        fs::write(&path, "version=2\n").unwrap();
        match StoreConfig::load(&path) {
            Err(Error::InvalidStore { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected InvalidStore, got {:?}", other),
        }
    }

    #[test]
    fn test_render_parse_roundtrip() {
        let config = StoreConfig {
            algorithm: Algorithm::Blake3,
            user_name: Some("Bob".to_string()),
            user_email: Some("bob@example.com".to_string()),
        };
        assert_eq!(StoreConfig::parse(&config.render()).unwrap(), config);
    }
}
