//! The as-written shape of a grammar document (§6 "Grammar text format")
//!
//! These types mirror the YAML document directly via `serde`, before any validation has run.
//! [`crate::lint`] deserializes into these, resolves the length/type/color sugar, and produces
//! the typed [`crate::grammar::ast::Grammar`].
use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawGrammar {
    pub format: String,
    pub endian: Option<String>,
    pub framing: RawFraming,
    #[serde(default)]
    pub types: BTreeMap<String, RawTypeDef>,
    pub record: RawRecordDispatch,
    #[serde(default)]
    pub registry: BTreeMap<String, RawRegistryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawFraming {
    pub repeat: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawTypeDef {
    #[serde(default)]
    pub fields: Vec<RawFieldDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawFieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub endian: Option<String>,
    pub length: Option<LengthSyntax>,
    pub encoding: Option<String>,
    pub validate: Option<RawValidateRule>,
    pub color: Option<String>,
}

/// The syntactic sugar for `length`: either a literal integer, or a string that the validator
/// must disambiguate as a field reference or an arithmetic expression.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum LengthSyntax {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) enum RawValidateRule {
    #[serde(rename = "equals")]
    Equals(i64),
    #[serde(rename = "equals_field")]
    EqualsField(String),
    #[serde(rename = "all_bytes")]
    AllBytes(u8),
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawRecordDispatch {
    #[serde(rename = "use")]
    pub use_type: Option<String>,
    pub switch: Option<RawSwitch>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawSwitch {
    pub expr: String,
    #[serde(default)]
    pub cases: BTreeMap<String, String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawRegistryEntry {
    pub decode: RawDecode,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawDecode {
    #[serde(rename = "as")]
    pub kind: String,
    pub field: Option<String>,
    pub encoding: Option<String>,
    pub endian: Option<String>,
}
