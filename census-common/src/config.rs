//! Configuration loading and root folder resolution
//!
//! Configuration lives in a single TOML file. Every key is optional; missing
//! keys fall back to compiled defaults so a fresh field laptop starts without
//! any configuration at all.
//!
//! ```toml
//! root_folder = "/srv/census"
//! database_file = "census.db"
//! current_survey = "bhs-year-2"
//!
//! [logging]
//! level = "debug"
//!
//! [eligibility]
//! min_age = 16
//! max_age = 64
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable that overrides the configured root folder
pub const ROOT_FOLDER_ENV: &str = "CENSUS_ROOT_FOLDER";

/// Top-level census configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CensusConfig {
    /// Folder holding the database (None = resolve from env/OS default)
    pub root_folder: Option<PathBuf>,
    /// Database file name inside the root folder
    pub database_file: String,
    /// Survey round new enumerations are recorded against
    pub current_survey: String,
    pub logging: LoggingConfig,
    pub eligibility: EligibilityRules,
}

impl Default for CensusConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_file: "census.db".to_string(),
            current_survey: "bhs-year-1".to_string(),
            logging: LoggingConfig::default(),
            eligibility: EligibilityRules::default(),
        }
    }
}

impl CensusConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CensusConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.eligibility.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration, falling back to defaults when the file is missing
    ///
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using compiled defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Age bounds used by the member eligibility rules
///
/// Bounds are inclusive. Age 0 is the "unknown age" sentinel and is never
/// inside the range as long as `min_age > 0`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EligibilityRules {
    /// Youngest age eligible for screening
    pub min_age: u8,
    /// Oldest age eligible for screening
    pub max_age: u8,
    /// Oldest age still treated as a minor (guardian required)
    pub minor_max_age: u8,
    /// Youngest age that can act as head of household
    pub hoh_min_age: u8,
}

impl EligibilityRules {
    /// Study protocol defaults
    pub const STANDARD: EligibilityRules = EligibilityRules {
        min_age: 16,
        max_age: 64,
        minor_max_age: 17,
        hoh_min_age: 18,
    };

    /// Reject bounds that would make the rules meaningless
    pub fn validate(&self) -> Result<()> {
        if self.min_age == 0 {
            return Err(Error::Config(
                "eligibility.min_age must be at least 1 (0 means unknown age)".to_string(),
            ));
        }
        if self.min_age > self.max_age {
            return Err(Error::Config(format!(
                "eligibility.min_age ({}) exceeds max_age ({})",
                self.min_age, self.max_age
            )));
        }
        if self.minor_max_age < self.min_age || self.minor_max_age > self.max_age {
            return Err(Error::Config(format!(
                "eligibility.minor_max_age ({}) must lie within {}..={}",
                self.minor_max_age, self.min_age, self.max_age
            )));
        }
        Ok(())
    }
}

impl Default for EligibilityRules {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Root folder resolution
///
/// Priority order:
/// 1. Explicit argument (highest priority)
/// 2. `CENSUS_ROOT_FOLDER` environment variable
/// 3. `root_folder` from the config file
/// 4. OS-dependent default (fallback)
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    explicit: Option<PathBuf>,
    config: CensusConfig,
}

impl RootFolderResolver {
    pub fn new(config: CensusConfig) -> Self {
        Self {
            explicit: None,
            config,
        }
    }

    /// Set an explicit root folder (e.g. from a command-line argument)
    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    /// Resolve the root folder
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.explicit {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.config.root_folder {
            return path.clone();
        }

        default_root_folder()
    }

    /// Full path of the database file inside the resolved root folder
    pub fn database_path(&self) -> PathBuf {
        self.resolve().join(&self.config.database_file)
    }
}

/// OS-dependent default root folder
///
/// `~/.local/share/census` on Linux, the platform data-local directory
/// elsewhere.
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("census"))
        .unwrap_or_else(|| PathBuf::from("./census_data"))
}
