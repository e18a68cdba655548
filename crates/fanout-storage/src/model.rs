//! Documents persisted by the fanout log
//!
//! Field names follow the JSON layout already found in existing stores, so
//! the structs use camelCase renames throughout.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Format version written into every index and page
pub const INDEX_VERSION: u32 = 1;

/// Number of entries a page holds before the log rotates to the next page
pub const DEFAULT_PAGE_SIZE: u64 = 1000;

/// Ceiling on the serialized size of a single entry (4 KiB)
pub const ENTRY_MAX_SIZE: usize = 1 << 12;

/// The independent logs kept for every owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// Content created by the user
    NewContent,
    /// Interactions of the user with content
    Interactions,
}

impl LogKind {
    /// Every kind, in precreation order
    pub const ALL: [LogKind; 2] = [LogKind::NewContent, LogKind::Interactions];

    /// Directory segment used in store keys
    pub fn dir_name(&self) -> &'static str {
        match self {
            LogKind::NewContent => "newcontent",
            LogKind::Interactions => "interactions",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Per-kind pointer record naming the current page and its fill level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    /// Format version
    pub version: u32,
    /// Page currently accepting writes
    #[serde(rename = "currPageNumber")]
    pub curr_page_number: u64,
    /// Entries held by the current page
    #[serde(rename = "currPageNumEntries")]
    pub curr_page_num_entries: u64,
    /// Keys of every page ever reserved, in page order
    #[serde(default)]
    pub pages: Vec<String>,
    /// Rotation threshold, fixed when the log is created
    pub page_size: u64,
    /// Timestamp of the most recent append
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_item_timestamp: Option<i64>,
}

/// A bounded batch of entries
///
/// Pages carry back-references to their index and to their own key so a
/// page can be handed out on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<E = Value> {
    /// Format version
    pub version: u32,
    /// Key of the owning index
    pub index_path: String,
    /// Key of this page
    pub page_path: String,
    /// Entries in log order; duplicates are kept
    pub entries: Vec<E>,
}

impl<E> Page<E> {
    /// Number of entries on the page
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the page holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Page<Value> {
    /// Decode the raw entries into typed ones
    pub fn decode<T>(&self) -> Result<Page<Entry<T>>, serde_json::Error>
    where
        T: for<'de> Deserialize<'de>,
    {
        let entries = self
            .entries
            .iter()
            .map(|e| serde_json::from_value(e.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            version: self.version,
            index_path: self.index_path.clone(),
            page_path: self.page_path.clone(),
            entries,
        })
    }
}

/// A caller payload with its server-assigned timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry<T> {
    /// Caller-supplied fields
    #[serde(flatten)]
    pub data: T,
    /// Seconds since the epoch at append time
    pub timestamp: i64,
}

/// Location of an appended entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRef {
    /// Log the entry was appended to
    pub kind: LogKind,
    /// Number of the page holding the entry
    pub page_number: u64,
    /// Key of the page holding the entry
    pub page_path: String,
    /// Zero-based position on the page
    pub position: usize,
    /// Timestamp stamped onto the entry
    pub timestamp: i64,
}
