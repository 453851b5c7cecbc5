//! The validated grammar AST (§3 "Grammar", §4.C)
//!
//! Values of [`Grammar`] are only ever produced by [`crate::lint::lint_grammar`]; there is no
//! public constructor, so a `Grammar` in hand is always one that passed every check in §4.D.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Only `record_stream` is supported by this core; the variant exists so the format tag is
/// still explicit in serialized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    RecordStream,
}

/// Byte order, with `Unspecified` only valid as a grammar-level default, never as an effective
/// endian for a specific field (§3 invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum Endian {
    Little,
    Big,
    Unspecified,
}

/// The only framing strategy this core implements; an extension point per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    UntilEof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    U8,
    U16,
    U32,
    Bytes,
}

impl PrimitiveType {
    /// Static byte size for integer primitives; `bytes` has no static size.
    #[must_use]
    pub fn static_size(self) -> Option<usize> {
        match self {
            PrimitiveType::U8 => Some(1),
            PrimitiveType::U16 => Some(2),
            PrimitiveType::U32 => Some(4),
            PrimitiveType::Bytes => None,
        }
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(self, PrimitiveType::U8 | PrimitiveType::U16 | PrimitiveType::U32)
    }
}

/// A field's declared type: one of the four primitives, or the name of a nested [`TypeDef`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[display("{_0}")]
    Primitive(PrimitiveType),
    #[display("{_0}")]
    Named(String),
}

impl FieldType {
    #[must_use]
    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            FieldType::Primitive(p) => Some(*p),
            FieldType::Named(_) => None,
        }
    }
}

/// How a `bytes` field's length is determined (§3 FieldDef).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthSpec {
    Static(i64),
    Field(String),
    Expr(String),
}

/// A post-read consistency check applied to a field's parsed value (§4.E step 4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidateRule {
    Equals(i64),
    EqualsField(String),
    AllBytes(u8),
}

/// A single field within a [`TypeDef`], in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[non_exhaustive]
#[builder(on(String, into))]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
    /// Explicit endian override; only meaningful for `u16`/`u32` fields.
    #[builder(default)]
    pub endian: Option<Endian>,
    #[builder(default)]
    pub length: Option<LengthSpec>,
    /// Text encoding used to decode a `bytes` field's raw bytes, if any.
    #[builder(default)]
    pub encoding: Option<String>,
    #[builder(default)]
    pub validate: Option<ValidateRule>,
    /// Normalized `#rrggbb` color, already through [`crate::color::normalize_color`].
    #[builder(default)]
    pub color: Option<String>,
}

impl FieldDef {
    /// Resolve this field's effective endian given the grammar's default, per the precedence
    /// rule in §4.E ("field override > ... > grammar endian_default"). Returns `None` when no
    /// endian can be determined, which §4.D item 6 rejects for `u16`/`u32` fields.
    #[must_use]
    pub fn effective_endian(&self, default: Endian) -> Option<Endian> {
        match self.endian {
            Some(e) => Some(e),
            None if default != Endian::Unspecified => Some(default),
            None => None,
        }
    }
}

/// A named record/nested type: an ordered sequence of fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl TypeDef {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// How the parser chooses which [`TypeDef`] to parse a record as (§3 "record_dispatch").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordDispatch {
    UseType(String),
    Switch {
        expr: String,
        cases: BTreeMap<String, String>,
        default: Option<String>,
    },
}

/// The decoder kind a [`RegistryEntry`] uses to render a field's raw bytes (§4.H).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoderKind {
    String { encoding: String },
    U16 { endian: Endian },
    U32 { endian: Endian },
    Hex,
    PackedDateV1,
}

/// A user-level semantic annotation for a discriminator value (§3 "RegistryEntry").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Explicit target field name; if absent, resolved heuristically at decode time (§4.H.3).
    pub field: Option<String>,
    pub decoder: DecoderKind,
}

/// The validated grammar AST. Immutable once constructed; the only way to get one is through
/// [`crate::lint::lint_grammar`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grammar {
    pub format: Format,
    pub endian_default: Endian,
    pub framing: Framing,
    pub types: BTreeMap<String, TypeDef>,
    pub record_dispatch: RecordDispatch,
    /// Keyed by normalized discriminator literal (`"0x"` + uppercase hex).
    pub registry: BTreeMap<String, RegistryEntry>,
}

impl Grammar {
    /// Resolve a [`FieldType`] to the [`TypeDef`] it names, if it names one at all.
    #[must_use]
    pub fn resolve_type(&self, ty: &FieldType) -> Option<&TypeDef> {
        match ty {
            FieldType::Primitive(_) => None,
            FieldType::Named(name) => self.types.get(name),
        }
    }

    /// The type name the dispatch would target for a given discriminator value, or the
    /// default, or `None` if neither matches (§4.E step 2.b / `ParseFieldError::NoDispatch`).
    #[must_use]
    pub fn dispatch_target<'a>(&'a self, discriminator: Option<&str>) -> Option<&'a str> {
        match &self.record_dispatch {
            RecordDispatch::UseType(name) => Some(name.as_str()),
            RecordDispatch::Switch {
                cases, default, ..
            } => discriminator
                .and_then(|d| cases.get(d))
                .map(String::as_str)
                .or(default.as_deref()),
        }
    }
}
