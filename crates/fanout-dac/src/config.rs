//! Service configuration and command line

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use fanout_storage::paths::DEFAULT_DATA_DOMAIN;
use fanout_storage::{EngineConfig, LogKind, OptimisticBackend, PrecreateMode, VersionedGateway};
use serde::{Deserialize, Serialize};

use crate::error::DacError;

/// Portal whose subdomains host apps
pub const DEFAULT_PORTAL_DOMAIN: &str = "siasky.net";

/// Configuration of a [`ContentRecordService`](crate::ContentRecordService)
///
/// Every field has a default, so an empty TOML file is a valid config:
///
/// ```toml
/// data_domain = "crqa.hns"
/// portal_domain = "siasky.net"
/// precreate = "materialize"
/// max_attempts = 5
///
/// [engine]
/// max_entry_size = 4096
///
/// [engine.interactions]
/// page_size = 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DacConfig {
    /// Top-level namespace of every key written
    pub data_domain: String,
    /// Portal suffix removed from referrer hosts; empty disables it
    pub portal_domain: String,
    /// Page sizes and entry size ceiling
    pub engine: EngineConfig,
    /// What precreation does on login
    pub precreate: PrecreateMode,
    /// Attempt budget for stores with conditional writes
    pub max_attempts: u32,
}

impl Default for DacConfig {
    fn default() -> Self {
        Self {
            data_domain: DEFAULT_DATA_DOMAIN.to_string(),
            portal_domain: DEFAULT_PORTAL_DOMAIN.to_string(),
            engine: EngineConfig::default(),
            precreate: PrecreateMode::default(),
            max_attempts: 5,
        }
    }
}

impl DacConfig {
    /// Parse a config from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, DacError> {
        let config: DacConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    ///
    /// # Errors
    ///
    /// Returns `Config` if `path` does not exist or holds an unusable config,
    /// and `Io` if it cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DacError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                DacError::config(format!("config file {} not found", path.display()))
            }
            _ => DacError::Io(e),
        })?;
        Self::from_toml(&contents)
    }

    /// Check the values a service cannot run with
    pub fn validate(&self) -> Result<(), DacError> {
        if self.data_domain.trim_matches('/').is_empty() {
            return Err(DacError::config("data_domain must not be empty"));
        }
        if self.max_attempts == 0 {
            return Err(DacError::config("max_attempts must be at least 1"));
        }
        self.engine.validate()?;
        Ok(())
    }

    /// Portal suffix, if one is configured
    pub fn portal(&self) -> Option<&str> {
        Some(self.portal_domain.as_str()).filter(|p| !p.is_empty())
    }

    /// Wrap `gateway` in an optimistic backend with this config's budget
    pub fn optimistic_backend<G: VersionedGateway>(&self, gateway: Arc<G>) -> OptimisticBackend<G> {
        OptimisticBackend::new(gateway).with_max_attempts(self.max_attempts)
    }
}

#[derive(Parser)]
#[command(name = "fanout-dac", about = "Record content and interactions into fanout logs")]
pub struct Cli {
    /// Directory holding the store documents
    #[arg(long, default_value = "./fanout-data")]
    pub root: PathBuf,

    /// URL of the app the records are made for
    #[arg(long, default_value = "https://localhost/")]
    pub referrer: String,

    /// TOML config file; defaults are used when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Precreate the log hierarchy and register the app
    Login,
    /// Record a piece of content the user created
    RecordContent {
        /// Skylink of the content
        content: String,
        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Record an interaction of the user with a piece of content
    RecordInteraction {
        /// Skylink of the content
        content: String,
        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Print the index of a log
    ShowIndex {
        #[arg(value_enum)]
        kind: KindArg,
    },
    /// Print a page of a log, the current one by default
    ShowPage {
        #[arg(value_enum)]
        kind: KindArg,
        /// Page number
        #[arg(long)]
        page: Option<u64>,
    },
    /// List the apps registered under the data domain
    Owners,
}

/// Log kind as named on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// New content log
    Content,
    /// Interactions log
    Interactions,
}

impl From<KindArg> for LogKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Content => LogKind::NewContent,
            KindArg::Interactions => LogKind::Interactions,
        }
    }
}
