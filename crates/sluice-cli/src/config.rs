//! Configuration file support.

use serde::Deserialize;
use sluice_core::{Culture, OverflowPolicy};
use std::path::PathBuf;

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default CLI options.
    pub defaults: Defaults,
}

/// Default CLI options.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Enable verbose output by default.
    pub verbose: bool,
    /// Enable quiet output by default.
    pub quiet: bool,
    /// Culture for workflows that do not name one.
    pub culture: Option<Culture>,
    /// Overflow policy for workflows that do not set one.
    pub overflow: Option<OverflowPolicy>,
}

impl Config {
    /// Load config from the default location.
    pub fn load() -> Self {
        Self::load_from_path(Self::default_path())
    }

    /// Load config from a specific path.
    ///
    /// A missing file gives the defaults; an unreadable or malformed one
    /// gives the defaults with a warning.
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sluice").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let config = Config::parse(
            r#"
[defaults]
quiet = true
culture = "de-DE"
overflow = "truncate"
"#,
        )
        .unwrap();
        assert!(config.defaults.quiet);
        assert!(!config.defaults.verbose);
        assert_eq!(config.defaults.culture.unwrap().name(), "de-DE");
        assert_eq!(config.defaults.overflow, Some(OverflowPolicy::Truncate));
    }

    #[test]
    fn test_empty_config() {
        let config = Config::parse("").unwrap();
        assert!(config.defaults.culture.is_none());
        assert!(config.defaults.overflow.is_none());
    }

    #[test]
    fn test_unknown_culture_is_an_error() {
        assert!(Config::parse("[defaults]\nculture = \"xx-XX\"\n").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(Some(dir.path().join("absent.toml")));
        assert!(!config.defaults.quiet);
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[defaults\nquiet = ").unwrap();
        let config = Config::load_from_path(Some(path));
        assert!(!config.defaults.quiet);
    }
}
