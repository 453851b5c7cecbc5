//! The error and result types for formgram
//!
//! Most of the tools exposed by this crate never raise: [`crate::lint::lint_grammar`],
//! [`crate::decode::decode_field`] and [`crate::query::query_records`] all return structured
//! success/failure data instead of a [`Result`]. The [`Error`] type here is reserved for the
//! handful of operations that really can fail in a way the caller must propagate (I/O, config
//! loading, (de)serialization).
use std::path::PathBuf;

/// The result of a formgram operation that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// A formgram error
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The grammar text did not pass validation and the caller asked for a hard failure
    #[error("grammar is invalid: {0} error(s)")]
    Lint(usize),

    /// IO error while reading a grammar file, binary input or config file
    #[error("IO error for {path:?}: {err}")]
    Io { path: PathBuf, err: std::io::Error },

    /// Error loading the CLI configuration
    #[cfg(feature = "cli")]
    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),

    /// Error (de)serializing a run artifact or diagnostics payload
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Error parsing the grammar's external YAML text form
    #[error(transparent)]
    Yaml(#[from] serde_yml::Error),
}

/// Errors that can occur while evaluating a [`crate::expr`] arithmetic expression
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExprError {
    /// The expression referenced a name not present in the evaluation context
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),

    /// Division by zero was attempted
    #[error("division by zero")]
    DivisionByZero,

    /// The expression evaluated to a value that cannot be used as a length (negative)
    #[error("expression evaluated to an invalid result: {0}")]
    InvalidExprResult(i64),

    /// The expression text itself could not be parsed
    #[error("failed to parse expression `{0}`")]
    ParseFailure(String),
}

/// Structural and referential faults found by the grammar validator (§4.D)
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[non_exhaustive]
pub enum LintError {
    #[error("unsupported top-level format `{0}`, only `record_stream` is supported")]
    InvalidFormat(String),

    #[error("unknown endian default `{0}`, expected `little` or `big`")]
    InvalidEndianDefault(String),

    #[error("type `{0}` has no fields")]
    EmptyType(String),

    #[error("field in type `{0}` has an empty name")]
    EmptyFieldName(String),

    #[error("field `{field}` in type `{type_name}` references unknown type `{referenced}`")]
    UnknownType {
        type_name: String,
        field: String,
        referenced: String,
    },

    #[error(
        "bytes field `{type_name}.{field}` must specify exactly one of length_static, length_field or length_expr"
    )]
    AmbiguousLength { type_name: String, field: String },

    #[error("bytes field `{type_name}.{field}` has a negative length_static")]
    NegativeLength { type_name: String, field: String },

    #[error(
        "field `{type_name}.{field}` of type `{field_type}` has no determinable endian (no field override and no non-unspecified grammar default)"
    )]
    MissingEndian {
        type_name: String,
        field: String,
        field_type: String,
    },

    #[error("field `{type_name}.{field}` has an invalid color `{color}`")]
    InvalidColor {
        type_name: String,
        field: String,
        color: String,
    },

    #[error("record dispatch references unknown type `{0}`")]
    UnknownDispatchType(String),

    #[error(
        "record dispatch expr `{0}` must be a dotted `Type.field` path to an integer-typed field"
    )]
    InvalidDispatchExpr(String),

    #[error("registry discriminator `{0}` is not a valid hex literal")]
    InvalidDiscriminator(String),

    #[error("registry entry `{0}` has an unrecognized decoder kind `{1}`")]
    UnknownDecoderKind(String, String),

    #[error("length_expr `{type_name}.{field}` failed to parse: {source}")]
    InvalidLengthExpr {
        type_name: String,
        field: String,
        #[source]
        source: ExprError,
    },

    #[error("type `{0}` is declared twice")]
    DuplicateType(String),

    #[error("registry discriminator `{0}` is declared twice")]
    DuplicateRegistryEntry(String),

    #[error("failed to parse grammar text: {0}")]
    ParseFailure(String),
}

/// Non-fatal issues found by the grammar validator
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[non_exhaustive]
pub enum LintWarning {
    #[error("type `{0}` is declared but not reachable from record_dispatch")]
    UnusedType(String),

    #[error("switch dispatch has no cases")]
    EmptyDispatchCases,

    #[error("registry key `{0}` has no matching dispatch case")]
    UnmatchedRegistryKey(String),

    #[error(
        "field `{name}` in nested type `{shadowing_type}` shadows an earlier field of the same name reachable as a length_field target; the first declaration wins"
    )]
    ShadowedLengthRef { name: String, shadowing_type: String },
}

/// Errors that can occur while parsing a single record or field (§4.E, §7)
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[non_exhaustive]
pub enum ParseFieldError {
    #[error("short read at field `{field}`: needed {need} bytes, got {got}")]
    ShortRead {
        field: String,
        need: usize,
        got: usize,
    },

    #[error("record at offset {offset} would overrun the parse boundary")]
    BoundaryOverrun { offset: u64 },

    #[error("record at offset {offset} has zero length")]
    ZeroLengthRecord { offset: u64 },

    #[error("no dispatch case or default matched discriminator value {0}")]
    NoDispatch(String),

    #[error("validation failed for field `{field}`: expected {expected}, got {got}")]
    ValidationFailed {
        field: String,
        expected: String,
        got: String,
    },

    #[error("length expression error in field `{field}`: {source}")]
    Expr {
        field: String,
        #[source]
        source: ExprError,
    },

    /// A grammar invariant that validation should already guarantee was violated anyway; this
    /// should not be reachable for a [`crate::grammar::Grammar`] produced by
    /// [`crate::lint::lint_grammar`].
    #[error("{0}")]
    Internal(String),
}

/// Structural errors from applying a single [`crate::patch::PatchOp`] (§4.J, §7)
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PatchError {
    #[error("path does not resolve to an existing node: {0:?}")]
    UnknownPath(Vec<String>),

    #[error("index {index} out of range (0..={max}) for {path:?}")]
    IndexOutOfRange {
        path: Vec<String>,
        index: i64,
        max: usize,
    },

    #[error("key `{key}` already exists at {path:?}")]
    DuplicateKey { path: Vec<String>, key: String },

    #[error("lint failed after applying patch: {0} error(s)")]
    LintFailed(usize),
}

/// Reasons [`crate::decode::decode_field`] can fail to produce a value (§4.H, §7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, derive_more::Display)]
#[non_exhaustive]
pub enum DecodeError {
    #[display("no registry entry for this record's discriminator")]
    NoRegistry,
    #[display("no suitable field found for this decoder kind")]
    NoField,
    #[display("field's raw bytes are too short for this decoder kind")]
    Insufficient,
    #[display("raw bytes do not form a valid value for this decoder kind")]
    InvalidEncoding,
}

/// Reasons [`crate::query::query_records`] can reject a filter (§4.I, §7)
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, derive_more::Display)]
#[non_exhaustive]
pub enum QueryError {
    #[display("unknown filter kind `{_0}`")]
    UnknownFilter(String),
    #[display("invalid value for filter: {_0}")]
    InvalidFilterValue(String),
}
