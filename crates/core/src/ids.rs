//! Portable UUID encoding.
//!
//! PostgreSQL stores ids natively. Anything without a native UUID type
//! (queue payloads, file names, key/value stores) uses the 32-character
//! lowercase hex form produced here.

use crate::error::CoreError;
use crate::types::DbId;

/// Encode an id as 32 lowercase hex characters without hyphens.
pub fn to_hex(id: DbId) -> String {
    id.simple().to_string()
}

/// Decode an id from either the 32-char hex form or the hyphenated form.
pub fn from_hex(value: &str) -> Result<DbId, CoreError> {
    uuid::Uuid::try_parse(value.trim())
        .map_err(|e| CoreError::Validation(format!("Invalid id '{value}': {e}")))
}

/// Generate a new random id.
pub fn new_id() -> DbId {
    uuid::Uuid::new_v4()
}
