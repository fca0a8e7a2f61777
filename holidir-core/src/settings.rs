//! Global holidir configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::batch::{BatchSettings, DEFAULT_RETRY_SEARCH_LIMIT, DEFAULT_SEARCH_LIMIT};
use crate::error::{HolidirError, HolidirResult};
use crate::holiday::DEFAULT_CATEGORY;

static DEFAULT_DATA_DIR: &str = "~/holidir";
static DEFAULT_PROVIDER: &str = "ews";
static DEFAULT_TRUSTED_ENDPOINT: &str =
    "https://autodiscover-s.outlook.com/autodiscover/autodiscover.xml";
static DEFAULT_PROVIDER_TIMEOUT: &str = "2m";

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn default_trusted_endpoint() -> String {
    DEFAULT_TRUSTED_ENDPOINT.to_string()
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_retry_search_limit() -> usize {
    DEFAULT_RETRY_SEARCH_LIMIT
}

fn default_concurrency() -> usize {
    1
}

fn default_provider_timeout() -> String {
    DEFAULT_PROVIDER_TIMEOUT.to_string()
}

/// Configuration at ~/.config/holidir/config.toml, overridable with
/// `HOLIDIR_*` environment variables.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Defaults to `{data_dir}/holidays.txt`.
    pub holidays_file: Option<PathBuf>,

    /// Defaults to `{data_dir}/mailboxes`.
    pub mailbox_dir: Option<PathBuf>,

    /// Defaults to `{data_dir}/logs`.
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_trusted_endpoint")]
    pub trusted_endpoint: String,

    #[serde(default = "default_category")]
    pub category: String,

    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    #[serde(default = "default_retry_search_limit")]
    pub retry_search_limit: usize,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_provider_timeout")]
    pub provider_timeout: String,

    pub mailbox_export_command: Option<String>,
}

impl Settings {
    pub fn config_path() -> HolidirResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| HolidirError::Config("Could not determine config directory".into()))?
            .join("holidir");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, writing a commented default file
    /// on first use.
    pub fn load() -> HolidirResult<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            Self::create_default_config(&path)?;
        }

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> HolidirResult<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(Environment::with_prefix("HOLIDIR"))
            .build()
            .map_err(|e| HolidirError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| HolidirError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> HolidirResult<()> {
        if self.search_limit == 0 || self.retry_search_limit == 0 {
            return Err(HolidirError::Config("search limits must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(HolidirError::Config("concurrency must be at least 1".into()));
        }
        if self.category.trim().is_empty() {
            return Err(HolidirError::Config("category must not be empty".into()));
        }
        self.provider_timeout()?;
        Ok(())
    }

    pub fn data_path(&self) -> PathBuf {
        expand(&self.data_dir)
    }

    pub fn holidays_path(&self) -> PathBuf {
        self.holidays_file
            .as_deref()
            .map(expand)
            .unwrap_or_else(|| self.data_path().join("holidays.txt"))
    }

    pub fn mailbox_path(&self) -> PathBuf {
        self.mailbox_dir
            .as_deref()
            .map(expand)
            .unwrap_or_else(|| self.data_path().join("mailboxes"))
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir
            .as_deref()
            .map(expand)
            .unwrap_or_else(|| self.data_path().join("logs"))
    }

    pub fn provider_timeout(&self) -> HolidirResult<Duration> {
        humantime::parse_duration(&self.provider_timeout).map_err(|e| {
            HolidirError::Config(format!(
                "invalid provider_timeout '{}': {e}",
                self.provider_timeout
            ))
        })
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            category: self.category.clone(),
            search_limit: self.search_limit,
            retry_search_limit: self.retry_search_limit,
        }
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> HolidirResult<()> {
        let contents = format!(
            "\
# holidir configuration

# Where holidays.txt, mailboxes/ and logs/ live:
# data_dir = \"{DEFAULT_DATA_DIR}\"

# Calendar provider binary (holidir-provider-<name>):
# provider = \"{DEFAULT_PROVIDER}\"

# The only endpoint discovery may return:
# trusted_endpoint = \"{DEFAULT_TRUSTED_ENDPOINT}\"

# Category tag written on inserted entries and searched on removal.
# Removal deletes every item carrying this tag, whoever created it.
# category = \"{DEFAULT_CATEGORY}\"

# Removal search bounds (primary pass / retry pass). Items beyond the
# bound are left in place.
# search_limit = {DEFAULT_SEARCH_LIMIT}
# retry_search_limit = {DEFAULT_RETRY_SEARCH_LIMIT}

# Shards processed at once:
# concurrency = 1

# provider_timeout = \"{DEFAULT_PROVIDER_TIMEOUT}\"

# Command that regenerates mailboxes/<key>_mailboxes.csv before full_insert.
# Receives HOLIDIR_USERNAME and HOLIDIR_PASSWORD in its environment.
# mailbox_export_command = \"pwsh ./mailboxes.ps1\"
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                HolidirError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| HolidirError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
