//! The external text form of a grammar (§6 "Grammar text format")
use serde_yml::Value;

use crate::error::Result;

/// Parse grammar text into the untyped serialized form used by [`crate::patch`].
pub fn parse(text: &str) -> Result<Value> {
    Ok(serde_yml::from_str(text)?)
}

/// Serialize the untyped form back to grammar text.
pub fn to_text(value: &Value) -> Result<String> {
    Ok(serde_yml::to_string(value)?)
}
