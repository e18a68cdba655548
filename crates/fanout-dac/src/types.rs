//! Request and response types of the service surface

use fanout_storage::EntryRef;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A piece of content the user created or interacted with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentInfo {
    /// Skylink of the content
    pub content: String,
    /// Free-form JSON object describing the content
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ContentInfo {
    /// Content without metadata
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Answer of a detached record call
///
/// `submitted` only says the entry passed validation and was handed to a
/// background task. Whether it was stored is reported through logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DacResponse {
    pub submitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DacResponse {
    pub fn submitted() -> Self {
        Self {
            submitted: true,
            error: None,
        }
    }

    pub fn rejected(error: impl ToString) -> Self {
        Self {
            submitted: false,
            error: Some(error.to_string()),
        }
    }
}

/// Answer of an awaited record call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_ref: Option<EntryRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordResult {
    pub fn stored(entry_ref: EntryRef) -> Self {
        Self {
            success: true,
            entry_ref: Some(entry_ref),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            entry_ref: None,
            error: Some(error.to_string()),
        }
    }
}
