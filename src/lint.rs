//! Grammar validation: turn raw text into a validated [`Grammar`] AST, or a list of faults
//! (§4.D).
//!
//! [`lint_grammar`] is the only way to obtain a [`Grammar`]; every other component in this
//! crate assumes the AST it's handed already passed every check here.
use std::collections::{BTreeMap, HashSet};

use crate::{
    error::{LintError, LintWarning},
    expr,
    grammar::{
        self,
        ast::{
            DecoderKind, Endian, FieldDef, FieldType, Format, Framing, Grammar, LengthSpec,
            PrimitiveType, RecordDispatch, RegistryEntry, TypeDef, ValidateRule,
        },
        raw::{self, LengthSyntax, RawFieldDef, RawGrammar, RawValidateRule},
    },
};

/// Validate grammar text end to end (§4.D).
///
/// Returns the validated AST only if `errors` is empty; checks short-circuit as soon as a
/// structural prerequisite (parseable YAML, supported format, resolvable endian default) is
/// missing, since later checks assume those hold. Within a single check, every applicable
/// fault is collected rather than stopping at the first one.
#[must_use]
pub fn lint_grammar(text: &str) -> (Option<Grammar>, Vec<LintError>, Vec<LintWarning>) {
    let mut errors = Vec::new();
    let warnings = Vec::new();

    let value = match grammar::text::parse(text) {
        Ok(v) => v,
        Err(err) => {
            errors.push(LintError::ParseFailure(err.to_string()));
            return (None, errors, warnings);
        }
    };
    let raw: RawGrammar = match serde_yml::from_value(value) {
        Ok(r) => r,
        Err(err) => {
            errors.push(LintError::ParseFailure(err.to_string()));
            return (None, errors, warnings);
        }
    };

    // check 1: top-level format
    if raw.format != "record_stream" {
        errors.push(LintError::InvalidFormat(raw.format.clone()));
        return (None, errors, warnings);
    }

    // check 2: endian default
    let endian_default = match raw.endian.as_deref() {
        None => Endian::Unspecified,
        Some("little") => Endian::Little,
        Some("big") => Endian::Big,
        Some(other) => {
            errors.push(LintError::InvalidEndianDefault(other.to_owned()));
            return (None, errors, warnings);
        }
    };

    // checks 3-7: per-type, per-field structural and referential checks
    let known_types: HashSet<&str> = raw.types.keys().map(String::as_str).collect();
    let mut types = BTreeMap::new();
    for (type_name, raw_type) in &raw.types {
        if raw_type.fields.is_empty() {
            errors.push(LintError::EmptyType(type_name.clone()));
        }
        let mut fields = Vec::with_capacity(raw_type.fields.len());
        for raw_field in &raw_type.fields {
            if let Some(field) =
                lint_field(type_name, raw_field, &known_types, endian_default, &mut errors)
            {
                fields.push(field);
            }
        }
        types.insert(type_name.clone(), TypeDef {
            name: type_name.clone(),
            fields,
        });
    }

    // record dispatch, resolved before the registry since registry keys must normalize to the
    // same width as the dispatch's discriminator field (§9 design note)
    let (record_dispatch, discriminator_width) =
        lint_dispatch(&raw, &known_types, &mut errors);

    // registry (check 8)
    let mut registry = BTreeMap::new();
    for (key, raw_entry) in &raw.registry {
        let normalized = match discriminator_width {
            Some(width) => grammar::normalize_discriminator_for_width(key, width),
            None => grammar::normalize_discriminator_literal(key),
        };
        let Some(normalized) = normalized else {
            errors.push(LintError::InvalidDiscriminator(key.clone()));
            continue;
        };
        let Some(decoder) = lint_decoder_kind(&normalized, raw_entry, &mut errors) else {
            continue;
        };
        if registry
            .insert(normalized.clone(), RegistryEntry {
                field: raw_entry.decode.field.clone(),
                decoder,
            })
            .is_some()
        {
            errors.push(LintError::DuplicateRegistryEntry(normalized));
        }
    }

    let mut warnings = warnings;
    if errors.is_empty() {
        warnings.extend(shadow_warnings(&types));
        if let Some(dispatch) = &record_dispatch {
            warnings.extend(reachability_warnings(dispatch, &types));
            warnings.extend(registry_warnings(dispatch, &registry));
        }
    }

    let Some(record_dispatch) = record_dispatch else {
        return (None, errors, warnings);
    };

    if !errors.is_empty() {
        return (None, errors, warnings);
    }

    let grammar = Grammar {
        format: Format::RecordStream,
        endian_default,
        framing: Framing::UntilEof,
        types,
        record_dispatch,
        registry,
    };
    (Some(grammar), errors, warnings)
}

fn lint_field(
    type_name: &str,
    raw_field: &RawFieldDef,
    known_types: &HashSet<&str>,
    endian_default: Endian,
    errors: &mut Vec<LintError>,
) -> Option<FieldDef> {
    if raw_field.name.is_empty() {
        errors.push(LintError::EmptyFieldName(type_name.to_owned()));
        return None;
    }

    let ty = match raw_field.type_name.as_str() {
        "u8" => FieldType::Primitive(PrimitiveType::U8),
        "u16" => FieldType::Primitive(PrimitiveType::U16),
        "u32" => FieldType::Primitive(PrimitiveType::U32),
        "bytes" => FieldType::Primitive(PrimitiveType::Bytes),
        name if known_types.contains(name) => FieldType::Named(name.to_owned()),
        name => {
            errors.push(LintError::UnknownType {
                type_name: type_name.to_owned(),
                field: raw_field.name.clone(),
                referenced: name.to_owned(),
            });
            return None;
        }
    };

    let is_bytes = matches!(ty, FieldType::Primitive(PrimitiveType::Bytes));
    let length = match (&raw_field.length, is_bytes) {
        (None, true) => {
            errors.push(LintError::AmbiguousLength {
                type_name: type_name.to_owned(),
                field: raw_field.name.clone(),
            });
            None
        }
        (None, false) => None,
        (Some(LengthSyntax::Int(n)), _) => {
            if *n < 0 {
                errors.push(LintError::NegativeLength {
                    type_name: type_name.to_owned(),
                    field: raw_field.name.clone(),
                });
                None
            } else {
                Some(LengthSpec::Static(*n))
            }
        }
        (Some(LengthSyntax::Text(text)), _) => {
            if is_simple_identifier(text) {
                Some(LengthSpec::Field(text.clone()))
            } else {
                match expr::check_syntax(text) {
                    Ok(()) => Some(LengthSpec::Expr(text.clone())),
                    Err(source) => {
                        errors.push(LintError::InvalidLengthExpr {
                            type_name: type_name.to_owned(),
                            field: raw_field.name.clone(),
                            source,
                        });
                        None
                    }
                }
            }
        }
    };

    let endian = raw_field.endian.as_deref().and_then(|s| match s {
        "little" => Some(Endian::Little),
        "big" => Some(Endian::Big),
        _ => None,
    });
    if matches!(
        ty,
        FieldType::Primitive(PrimitiveType::U16 | PrimitiveType::U32)
    ) {
        let effective = endian.or(if endian_default != Endian::Unspecified {
            Some(endian_default)
        } else {
            None
        });
        if effective.is_none() {
            errors.push(LintError::MissingEndian {
                type_name: type_name.to_owned(),
                field: raw_field.name.clone(),
                field_type: raw_field.type_name.clone(),
            });
        }
    }

    let color = match &raw_field.color {
        None => None,
        Some(raw_color) => match crate::color::normalize_color(raw_color) {
            Some(normalized) => Some(normalized),
            None => {
                errors.push(LintError::InvalidColor {
                    type_name: type_name.to_owned(),
                    field: raw_field.name.clone(),
                    color: raw_color.clone(),
                });
                None
            }
        },
    };

    let validate = raw_field.validate.as_ref().map(|v| match v {
        RawValidateRule::Equals(n) => ValidateRule::Equals(*n),
        RawValidateRule::EqualsField(name) => ValidateRule::EqualsField(name.clone()),
        RawValidateRule::AllBytes(b) => ValidateRule::AllBytes(*b),
    });

    Some(FieldDef {
        name: raw_field.name.clone(),
        ty,
        endian,
        length,
        encoding: raw_field.encoding.clone(),
        validate,
        color,
    })
}

fn is_simple_identifier(text: &str) -> bool {
    let text = text.trim();
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn lint_decoder_kind(
    key: &str,
    raw_entry: &raw::RawRegistryEntry,
    errors: &mut Vec<LintError>,
) -> Option<DecoderKind> {
    match raw_entry.decode.kind.as_str() {
        "string" => Some(DecoderKind::String {
            encoding: raw_entry
                .decode
                .encoding
                .clone()
                .unwrap_or_else(|| "utf8".to_owned()),
        }),
        "u16" => Some(DecoderKind::U16 {
            endian: parse_endian_or_default(raw_entry.decode.endian.as_deref()),
        }),
        "u32" => Some(DecoderKind::U32 {
            endian: parse_endian_or_default(raw_entry.decode.endian.as_deref()),
        }),
        "hex" => Some(DecoderKind::Hex),
        "packed_date_v1" => Some(DecoderKind::PackedDateV1),
        other => {
            errors.push(LintError::UnknownDecoderKind(
                key.to_owned(),
                other.to_owned(),
            ));
            None
        }
    }
}

fn parse_endian_or_default(endian: Option<&str>) -> Endian {
    match endian {
        Some("big") => Endian::Big,
        _ => Endian::Little,
    }
}

/// Resolve `record.use`/`record.switch`. Returns the dispatch plus, for a switch, the byte
/// width of the discriminator field (used to normalize both case keys and registry keys).
fn lint_dispatch(
    raw: &RawGrammar,
    known_types: &HashSet<&str>,
    errors: &mut Vec<LintError>,
) -> (Option<RecordDispatch>, Option<usize>) {
    if let Some(name) = &raw.record.use_type {
        if !known_types.contains(name.as_str()) {
            errors.push(LintError::UnknownDispatchType(name.clone()));
            return (None, None);
        }
        return (Some(RecordDispatch::UseType(name.clone())), None);
    }
    let Some(switch) = raw.record.switch.as_ref() else {
        return (None, None);
    };
    let mut ok = true;
    for target in switch.cases.values() {
        if !known_types.contains(target.as_str()) {
            errors.push(LintError::UnknownDispatchType(target.clone()));
            ok = false;
        }
    }
    if let Some(default) = &switch.default
        && !known_types.contains(default.as_str())
    {
        errors.push(LintError::UnknownDispatchType(default.clone()));
        ok = false;
    }

    let width = resolve_discriminator_width(raw, &switch.expr, known_types, errors);
    if width.is_none() {
        ok = false;
    }
    if !ok {
        return (None, width);
    }

    let cases = switch
        .cases
        .iter()
        .filter_map(|(key, target)| {
            let normalized = width.and_then(|w| grammar::normalize_discriminator_for_width(key, w));
            match normalized {
                Some(key) => Some((key, target.clone())),
                None => {
                    errors.push(LintError::InvalidDiscriminator(key.clone()));
                    None
                }
            }
        })
        .collect();

    (
        Some(RecordDispatch::Switch {
            expr: switch.expr.clone(),
            cases,
            default: switch.default.clone(),
        }),
        width,
    )
}

/// Resolve a `switch.expr` dotted path (`Type.field`) to its field's byte width.
fn resolve_discriminator_width(
    raw: &RawGrammar,
    expr: &str,
    known_types: &HashSet<&str>,
    errors: &mut Vec<LintError>,
) -> Option<usize> {
    let (type_name, field_name) = expr.split_once('.')?;
    if !known_types.contains(type_name) {
        errors.push(LintError::InvalidDispatchExpr(expr.to_owned()));
        return None;
    }
    let width = raw
        .types
        .get(type_name)
        .and_then(|t| t.fields.iter().find(|f| f.name == field_name))
        .and_then(|f| match f.type_name.as_str() {
            "u8" => Some(1),
            "u16" => Some(2),
            "u32" => Some(4),
            _ => None,
        });
    if width.is_none() {
        errors.push(LintError::InvalidDispatchExpr(expr.to_owned()));
    }
    width
}

fn reachability_warnings(
    dispatch: &RecordDispatch,
    types: &BTreeMap<String, TypeDef>,
) -> Vec<LintWarning> {
    let mut reached: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = match dispatch {
        RecordDispatch::UseType(name) => vec![name.as_str()],
        RecordDispatch::Switch {
            cases, default, ..
        } => {
            let mut v: Vec<&str> = cases.values().map(String::as_str).collect();
            if let Some(d) = default {
                v.push(d.as_str());
            }
            v
        }
    };
    while let Some(name) = stack.pop() {
        if !reached.insert(name) {
            continue;
        }
        if let Some(type_def) = types.get(name) {
            for field in &type_def.fields {
                if let FieldType::Named(nested) = &field.ty {
                    stack.push(nested.as_str());
                }
            }
        }
    }
    types
        .keys()
        .filter(|name| !reached.contains(name.as_str()))
        .map(|name| LintWarning::UnusedType(name.clone()))
        .collect()
}

fn registry_warnings(
    dispatch: &RecordDispatch,
    registry: &BTreeMap<String, RegistryEntry>,
) -> Vec<LintWarning> {
    let RecordDispatch::Switch { cases, .. } = dispatch else {
        return Vec::new();
    };
    if cases.is_empty() {
        return vec![LintWarning::EmptyDispatchCases];
    }
    registry
        .keys()
        .filter(|key| !cases.contains_key(*key))
        .map(|key| LintWarning::UnmatchedRegistryKey(key.clone()))
        .collect()
}

/// Detect nested-type field name collisions within a single [`TypeDef`]'s flattened scope
/// (§9 design note "Name-based scope flattening for `length_field`").
fn shadow_warnings(types: &BTreeMap<String, TypeDef>) -> Vec<LintWarning> {
    let mut warnings = Vec::new();
    for type_def in types.values() {
        let mut seen: HashSet<&str> = HashSet::new();
        for field in &type_def.fields {
            match &field.ty {
                FieldType::Named(nested_name) => {
                    if let Some(nested) = types.get(nested_name) {
                        for nested_field in &nested.fields {
                            if !seen.insert(nested_field.name.as_str()) {
                                warnings.push(LintWarning::ShadowedLengthRef {
                                    name: nested_field.name.clone(),
                                    shadowing_type: nested_name.clone(),
                                });
                            }
                        }
                    }
                }
                FieldType::Primitive(_) => {
                    seen.insert(field.name.as_str());
                }
            }
        }
    }
    warnings
}
