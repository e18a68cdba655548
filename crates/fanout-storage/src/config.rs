//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::model::{DEFAULT_PAGE_SIZE, ENTRY_MAX_SIZE, LogKind};

/// Settings fixed when a log kind is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogKindConfig {
    /// Entries per page before rotating
    pub page_size: u64,
}

impl Default for LogKindConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Configuration for a [`LogEngine`](crate::LogEngine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Settings for the new-content log
    pub new_content: LogKindConfig,
    /// Settings for the interactions log
    pub interactions: LogKindConfig,
    /// Ceiling on the serialized size of one entry, in bytes
    pub max_entry_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            new_content: LogKindConfig::default(),
            interactions: LogKindConfig::default(),
            max_entry_size: ENTRY_MAX_SIZE,
        }
    }
}

impl EngineConfig {
    /// Settings for `kind`
    pub fn kind(&self, kind: LogKind) -> &LogKindConfig {
        match kind {
            LogKind::NewContent => &self.new_content,
            LogKind::Interactions => &self.interactions,
        }
    }

    /// Set the page size of one kind
    pub fn with_page_size(mut self, kind: LogKind, page_size: u64) -> Self {
        match kind {
            LogKind::NewContent => self.new_content.page_size = page_size,
            LogKind::Interactions => self.interactions.page_size = page_size,
        }
        self
    }

    /// Set the page size of every kind
    pub fn with_uniform_page_size(self, page_size: u64) -> Self {
        LogKind::ALL
            .iter()
            .fold(self, |config, kind| config.with_page_size(*kind, page_size))
    }

    /// Set the entry size ceiling
    pub fn with_max_entry_size(mut self, max_entry_size: usize) -> Self {
        self.max_entry_size = max_entry_size;
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), StorageError> {
        for kind in LogKind::ALL {
            if self.kind(kind).page_size == 0 {
                return Err(StorageError::InvalidConfig(format!(
                    "page size of {} must be positive",
                    kind
                )));
            }
        }
        if self.max_entry_size == 0 {
            return Err(StorageError::InvalidConfig(
                "max entry size must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.kind(LogKind::NewContent).page_size, 1000);
        assert_eq!(config.kind(LogKind::Interactions).page_size, 1000);
        assert_eq!(config.max_entry_size, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_per_kind_page_size() {
        let config = EngineConfig::default().with_page_size(LogKind::Interactions, 2);
        assert_eq!(config.kind(LogKind::NewContent).page_size, 1000);
        assert_eq!(config.kind(LogKind::Interactions).page_size, 2);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let config = EngineConfig::default().with_uniform_page_size(0);
        assert!(matches!(
            config.validate(),
            Err(StorageError::InvalidConfig(_))
        ));
    }
}
