//! Entry codec
//!
//! Turns a caller payload into the form stored on a page: every caller field
//! is kept and a `timestamp` field is stamped on top. The encoded size is
//! checked here so an oversized entry never reaches the store.

use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::error::StorageError;
use crate::model::ENTRY_MAX_SIZE;

/// An entry ready to be pushed onto a page
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedEntry {
    /// JSON object with the caller fields and `timestamp`
    pub value: Value,
    /// Seconds since the epoch
    pub timestamp: i64,
    /// Size of the JSON encoding in bytes
    pub size: usize,
}

/// Stamps and size-checks entries
#[derive(Debug, Clone, Copy)]
pub struct EntryCodec {
    max_size: usize,
}

impl Default for EntryCodec {
    fn default() -> Self {
        Self::new(ENTRY_MAX_SIZE)
    }
}

impl EntryCodec {
    /// Create a codec rejecting entries larger than `max_size` bytes
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    /// Stamp `raw` with the current time and validate its size
    pub fn to_persistence<T>(&self, raw: &T) -> Result<PersistedEntry, StorageError>
    where
        T: Serialize + ?Sized,
    {
        self.to_persistence_at(raw, chrono::Utc::now().timestamp())
    }

    /// Stamp `raw` with `timestamp` and validate its size
    ///
    /// # Errors
    ///
    /// - `InvalidEntry` if `raw` does not serialize to a JSON object
    /// - `EntryTooLarge` if the stamped entry exceeds the ceiling
    pub fn to_persistence_at<T>(
        &self,
        raw: &T,
        timestamp: i64,
    ) -> Result<PersistedEntry, StorageError>
    where
        T: Serialize + ?Sized,
    {
        let value =
            serde_json::to_value(raw).map_err(|e| StorageError::invalid_entry(e.to_string()))?;

        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(StorageError::invalid_entry(format!(
                    "entry must be a JSON object, got {}",
                    json_type(&other)
                )));
            }
        };
        fields.insert("timestamp".to_string(), Value::from(timestamp));
        let value = Value::Object(fields);

        let size = serde_json::to_vec(&value)
            .map_err(|e| StorageError::invalid_entry(e.to_string()))?
            .len();
        if size > self.max_size {
            return Err(StorageError::EntryTooLarge {
                size,
                max: self.max_size,
            });
        }

        trace!(size, timestamp, "Encoded entry");
        Ok(PersistedEntry {
            value,
            timestamp,
            size,
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
