//! Common utility types.

use std::collections::BTreeMap;

use crate::error::RetrievalError;

/// Metadata map type.
///
/// Values are restricted to scalars (string, number, bool, null); see
/// [`validate_metadata`].
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Metadata key carrying the owning document id.
pub const DOCUMENT_ID_KEY: &str = "document_id";

/// Metadata key carrying the chunk ordinal within its document.
pub const ORDINAL_KEY: &str = "ordinal";

/// Metadata key carrying the document's source identifier.
pub const SOURCE_KEY: &str = "source";

/// Document id used when the caller does not name one.
pub const DEFAULT_DOCUMENT_ID: &str = "default";

/// Reject non-scalar metadata values.
pub fn validate_metadata(metadata: &Metadata) -> Result<(), RetrievalError> {
    for (key, value) in metadata {
        if value.is_array() || value.is_object() {
            return Err(RetrievalError::InvalidMetadata(key.clone()));
        }
    }
    Ok(())
}

/// Read a string-valued metadata key.
pub fn metadata_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(|v| v.as_str())
}

/// Read an ordinal from metadata, accepting integers and numeric strings.
pub fn metadata_ordinal(metadata: &Metadata) -> Option<u32> {
    match metadata.get(ORDINAL_KEY)? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
