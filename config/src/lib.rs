//! Proof configuration.
//!
//! A proof's thresholds are chosen once, at initialization, and written to
//! `<proof-dir>/proof.toml`. Later runs read that file back and never rewrite
//! it, so every process working on a proof agrees on the same limits.
//!
//! Initial values come from built-in defaults, optionally overridden by the
//! user's `~/.vetted/config.toml`:
//!
//! ```toml
//! [defaults]
//! max_depth = 12
//! warn_depth = 6
//! default_lease_secs = 900
//! ```

mod persist;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the per-proof configuration inside the proof directory.
pub const PROOF_CONFIG_FILE: &str = "proof.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Thresholds fixed for the lifetime of one proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProofConfig {
    /// Creating a node deeper than this is an error.
    pub max_depth: u32,
    /// Creating a node deeper than this logs a warning.
    pub warn_depth: u32,
    /// Lease length used when a claim does not name one.
    pub default_lease_secs: u64,
    /// How long a writer waits for another process holding the ledger lock.
    pub busy_timeout_ms: u64,
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            max_depth: 20,
            warn_depth: 10,
            default_lease_secs: 300,
            busy_timeout_ms: 5000,
        }
    }
}

impl ProofConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth < 1 {
            return Err(ConfigError::Invalid("max_depth must be at least 1".to_owned()));
        }
        if self.warn_depth < 1 || self.warn_depth > self.max_depth {
            return Err(ConfigError::Invalid(format!(
                "warn_depth must be between 1 and max_depth ({}), got {}",
                self.max_depth, self.warn_depth
            )));
        }
        if self.default_lease_secs == 0 {
            return Err(ConfigError::Invalid(
                "default_lease_secs must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn default_lease(&self) -> Duration {
        Duration::from_secs(self.default_lease_secs)
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Built-in defaults overlaid with the user's `[defaults]` section.
    ///
    /// A missing, unreadable, or invalid user file is logged and ignored.
    #[must_use]
    pub fn load_user_defaults() -> Self {
        match user_config_path() {
            Some(path) => Self::load_user_defaults_from(&path),
            None => Self::default(),
        }
    }

    /// Like [`ProofConfig::load_user_defaults`], reading an explicit file.
    #[must_use]
    pub fn load_user_defaults_from(path: &Path) -> Self {
        let Some(user) = UserConfig::load(path) else {
            return Self::default();
        };
        let config = user.defaults.unwrap_or_default().overlay(Self::default());
        match config.validate() {
            Ok(()) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), "Ignoring user defaults: {err}");
                Self::default()
            }
        }
    }

    /// Write this configuration to `<dir>/proof.toml`.
    ///
    /// Fails if the file already exists; a proof's configuration is never rewritten.
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, ConfigError> {
        self.validate()?;
        let path = dir.join(PROOF_CONFIG_FILE);
        let body = toml::to_string_pretty(self)?;
        persist::write_new(&path, body.as_bytes()).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Wrote proof configuration");
        Ok(path)
    }

    /// Read `<dir>/proof.toml` and validate it.
    pub fn read_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(PROOF_CONFIG_FILE);
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    defaults: Option<UserDefaults>,
}

#[derive(Debug, Default, Deserialize)]
struct UserDefaults {
    max_depth: Option<u32>,
    warn_depth: Option<u32>,
    default_lease_secs: Option<u64>,
    busy_timeout_ms: Option<u64>,
}

impl UserDefaults {
    fn overlay(self, base: ProofConfig) -> ProofConfig {
        ProofConfig {
            max_depth: self.max_depth.unwrap_or(base.max_depth),
            warn_depth: self.warn_depth.unwrap_or(base.warn_depth),
            default_lease_secs: self.default_lease_secs.unwrap_or(base.default_lease_secs),
            busy_timeout_ms: self.busy_timeout_ms.unwrap_or(base.busy_timeout_ms),
        }
    }
}

impl UserConfig {
    fn load(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return None;
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                None
            }
        }
    }
}

/// Location of the user-level configuration file, if a home directory is known.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".vetted").join("config.toml"))
}
