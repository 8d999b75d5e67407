//! Record encoding at the storage boundary.
//!
//! Stores hand back JSON values, but depending on the backend a record may
//! arrive as a JSON object or as a string holding serialized JSON (some
//! transports stringify values, some parse them eagerly). Every typed read
//! goes through [`decode_record`] so call sites never inspect the shape.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AppError;

/// Decodes a stored value into a typed record.
///
/// Accepts either an object or a string containing an object. Anything
/// else, or a payload that does not match `T`, is a
/// [`AppError::SerializationError`].
pub fn decode_record<T: DeserializeOwned>(value: Value) -> Result<T, AppError> {
    match value {
        Value::String(raw) => Ok(serde_json::from_str(&raw)?),
        other => Ok(serde_json::from_value(other)?),
    }
}

/// Encodes a record for storage. Always produces the object shape.
pub fn encode_record<T: Serialize>(record: &T) -> Result<Value, AppError> {
    Ok(serde_json::to_value(record)?)
}
