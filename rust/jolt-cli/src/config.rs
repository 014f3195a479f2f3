//! Configuration file parsing for `jolt.toml`.
//!
//! Searches the current directory then its ancestors, falling back to
//! `~/.config/jolt/jolt.toml` if no project-level file is found. Command
//! line flags override whatever the file says.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "jolt.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct JoltConfig {
    /// Directory under which each session stages its units.
    #[serde(default)]
    pub staging_root: Option<PathBuf>,
    #[serde(default)]
    pub history_path: Option<String>,
    #[serde(default = "default_color")]
    pub color: bool,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct LogSection {
    /// A level (`debug`) or a full filter directive (`jolt_engine=debug`).
    pub level: Option<String>,
}

fn default_color() -> bool {
    true
}

impl Default for JoltConfig {
    fn default() -> Self {
        Self {
            staging_root: None,
            history_path: None,
            color: default_color(),
            log: LogSection::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid toml in '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl JoltConfig {
    /// Find and load the nearest config. A missing file is not an error.
    pub fn load() -> Result<Option<(PathBuf, Self)>, ConfigError> {
        let Ok(cwd) = std::env::current_dir() else {
            return Ok(None);
        };
        match find_config(&cwd, global_config_path().as_deref()) {
            Some(path) => Self::load_from(&path).map(|cfg| Some((path, cfg))),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Where sessions stage units when nothing is configured.
    pub fn staging_root(&self) -> PathBuf {
        self.staging_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("jolt"))
    }
}

/// `jolt.toml` in `start` or its nearest ancestor, else `global` if it
/// exists.
pub fn find_config(start: &Path, global: Option<&Path>) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }
    global.filter(|p| p.is_file()).map(Path::to_path_buf)
}

pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("jolt").join(CONFIG_FILE))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: JoltConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, JoltConfig::default());
        assert!(cfg.color);
    }

    #[test]
    fn parses_every_key() {
        let cfg: JoltConfig = toml::from_str(
            r#"
staging_root = "/var/tmp/jolt"
history_path = "~/.jolt/history"
color = false

[log]
level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(cfg.staging_root(), PathBuf::from("/var/tmp/jolt"));
        assert_eq!(cfg.history_path.as_deref(), Some("~/.jolt/history"));
        assert!(!cfg.color);
        assert_eq!(cfg.log.level.as_deref(), Some("debug"));
    }

    #[test]
    fn default_staging_root_is_under_temp() {
        assert!(JoltConfig::default()
            .staging_root()
            .starts_with(std::env::temp_dir()));
    }
}
