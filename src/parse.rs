//! Record parser: grammar + reader → ordered records with field trees (§4.E)
use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::ParseFieldError,
    expr,
    grammar::{Endian, FieldDef, FieldType, Grammar, LengthSpec, PrimitiveType, TypeDef, ValidateRule},
    reader::ByteReader,
};

/// A field's decoded value (§3 "ParsedField" / §9 "Dynamically typed field values").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldValue {
    Integer(i64),
    Bytes(Vec<u8>),
    Text(String),
    Nested(Vec<ParsedField>),
}

/// A single decoded field within a [`ParsedRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedField {
    pub name: String,
    pub value: FieldValue,
    pub offset: u64,
    pub size: u64,
    pub raw_bytes: Vec<u8>,
    pub color: Option<String>,
}

/// One decoded record, or a failed attempt tagged with `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub offset: u64,
    pub size: u64,
    pub type_name: String,
    pub fields: Vec<ParsedField>,
    pub type_discriminator: Option<String>,
    pub error: Option<String>,
}

impl ParsedRecord {
    /// Look up a top-level field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&ParsedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The immutable output of a single [`parse_binary`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub records: Vec<ParsedRecord>,
    pub errors: Vec<String>,
    pub file_path: Option<String>,
    pub total_bytes_parsed: u64,
    pub parse_stopped_at: u64,
    pub grammar_format: String,
    pub created_at: u64,
    pub record_count: usize,
}

/// Parse a byte source into an ordered sequence of records (§4.E).
///
/// Never panics on malformed input: a field or record failure halts the stream and is recorded
/// in the returned [`ParseResult`] rather than propagated.
#[must_use]
pub fn parse_binary(
    grammar: &Grammar,
    reader: &dyn ByteReader,
    offset: u64,
    byte_limit: Option<u64>,
    record_limit: Option<usize>,
) -> ParseResult {
    let stop_offset = byte_limit
        .map(|limit| offset.saturating_add(limit))
        .unwrap_or(reader.len())
        .min(reader.len());

    let mut records = Vec::new();
    let mut errors = Vec::new();
    let mut cursor = offset;
    let mut stopped_at = cursor;

    while cursor < stop_offset && record_limit.is_none_or(|limit| records.len() < limit) {
        match parse_record(grammar, reader, cursor, stop_offset) {
            Ok(record) => {
                cursor = record.offset + record.size;
                records.push(record);
            }
            Err(message) => {
                stopped_at = cursor;
                errors.push(message);
                break;
            }
        }
    }
    if errors.is_empty() {
        stopped_at = cursor;
    }

    ParseResult {
        total_bytes_parsed: cursor.saturating_sub(offset),
        parse_stopped_at: stopped_at,
        record_count: records.len(),
        records,
        errors,
        file_path: None,
        grammar_format: "record_stream".to_owned(),
        created_at: now_millis(),
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn parse_record(
    grammar: &Grammar,
    reader: &dyn ByteReader,
    record_start: u64,
    stop_offset: u64,
) -> Result<ParsedRecord, String> {
    parse_record_inner(grammar, reader, record_start, stop_offset).map_err(|e| e.to_string())
}

fn parse_record_inner(
    grammar: &Grammar,
    reader: &dyn ByteReader,
    record_start: u64,
    stop_offset: u64,
) -> Result<ParsedRecord, ParseFieldError> {
    let (type_name, preamble, discriminator) =
        dispatch_target(grammar, reader, record_start, stop_offset)?;
    let Some(type_def) = grammar.types.get(type_name) else {
        return Err(ParseFieldError::Internal(format!(
            "record at offset {record_start}: dispatch target `{type_name}` does not exist"
        )));
    };

    let mut cursor = record_start;
    let mut context: HashMap<String, i64> = HashMap::new();
    let mut fields = Vec::with_capacity(type_def.fields.len());

    if let Some(preamble_fields) = preamble {
        for field in &preamble_fields {
            if let FieldValue::Integer(value) = &field.value {
                context.entry(field.name.clone()).or_insert(*value);
            }
            cursor = field.offset + field.size;
        }
        fields.extend(preamble_fields);
    }

    let already_parsed = fields.len();
    for field_def in type_def.fields.iter().skip(already_parsed) {
        let field = parse_field(grammar, reader, field_def, cursor, stop_offset, &context)?;
        if let FieldValue::Integer(value) = &field.value {
            context.entry(field.name.clone()).or_insert(*value);
        }
        if let FieldValue::Nested(nested) = &field.value {
            for inner in nested {
                if let FieldValue::Integer(value) = &inner.value {
                    context.entry(inner.name.clone()).or_insert(*value);
                }
            }
        }
        cursor = field.offset + field.size;
        fields.push(field);
    }

    let size = cursor - record_start;
    if size == 0 {
        return Err(ParseFieldError::ZeroLengthRecord { offset: record_start });
    }
    if cursor > stop_offset {
        return Err(ParseFieldError::BoundaryOverrun { offset: record_start });
    }

    Ok(ParsedRecord {
        offset: record_start,
        size,
        type_name: type_name.to_owned(),
        fields,
        type_discriminator: discriminator,
        error: None,
    })
}

/// Resolve which [`TypeDef`] to parse a record as, per §4.E step 2.
///
/// For a `switch` dispatch, tentatively parses the discriminator preamble type so its fields
/// can be reused rather than re-read.
fn dispatch_target<'g>(
    grammar: &'g Grammar,
    reader: &dyn ByteReader,
    record_start: u64,
    stop_offset: u64,
) -> Result<(&'g str, Option<Vec<ParsedField>>, Option<String>), ParseFieldError> {
    use crate::grammar::RecordDispatch;
    match &grammar.record_dispatch {
        RecordDispatch::UseType(name) => Ok((name.as_str(), None, None)),
        RecordDispatch::Switch { expr, cases, default } => {
            let Some((preamble_type, field_name)) = expr.split_once('.') else {
                return Err(ParseFieldError::Internal(format!(
                    "malformed dispatch expr `{expr}`"
                )));
            };
            let Some(preamble_def) = grammar.types.get(preamble_type) else {
                return Err(ParseFieldError::Internal(format!(
                    "dispatch references unknown type `{preamble_type}`"
                )));
            };
            let preamble_fields = parse_fields_flat(
                grammar,
                reader,
                preamble_def,
                record_start,
                stop_offset,
                &HashMap::new(),
            )?;
            let Some(discriminator_field) = preamble_fields.iter().find(|f| f.name == field_name)
            else {
                return Err(ParseFieldError::Internal(format!(
                    "dispatch field `{field_name}` not found in `{preamble_type}`"
                )));
            };
            let FieldValue::Integer(value) = discriminator_field.value else {
                return Err(ParseFieldError::Internal(format!(
                    "dispatch field `{field_name}` is not integer-typed"
                )));
            };
            let byte_size = usize::try_from(discriminator_field.size).unwrap_or(1).max(1);
            let key = crate::grammar::format_discriminator_value(value as u64, byte_size);
            let target = cases
                .get(&key)
                .map(String::as_str)
                .or(default.as_deref());
            match target {
                Some(target) => Ok((target, Some(preamble_fields), Some(key))),
                None => Err(ParseFieldError::NoDispatch(key)),
            }
        }
    }
}

fn parse_fields_flat(
    grammar: &Grammar,
    reader: &dyn ByteReader,
    type_def: &TypeDef,
    start: u64,
    stop_offset: u64,
    outer_context: &HashMap<String, i64>,
) -> Result<Vec<ParsedField>, ParseFieldError> {
    let mut cursor = start;
    let mut context = outer_context.clone();
    let mut fields = Vec::with_capacity(type_def.fields.len());
    for field_def in &type_def.fields {
        let field = parse_field(grammar, reader, field_def, cursor, stop_offset, &context)?;
        if let FieldValue::Integer(value) = &field.value {
            context.insert(field.name.clone(), *value);
        }
        cursor = field.offset + field.size;
        fields.push(field);
    }
    Ok(fields)
}

fn parse_field(
    grammar: &Grammar,
    reader: &dyn ByteReader,
    field_def: &FieldDef,
    offset: u64,
    stop_offset: u64,
    context: &HashMap<String, i64>,
) -> Result<ParsedField, ParseFieldError> {
    match &field_def.ty {
        FieldType::Primitive(PrimitiveType::U8) => {
            let bytes = read_exact(reader, offset, 1, &field_def.name)?;
            let value = bytes[0] as i64;
            check_validate(field_def, Some(value), &bytes, context)?;
            Ok(integer_field(field_def, offset, bytes, value))
        }
        FieldType::Primitive(PrimitiveType::U16) => {
            let bytes = read_exact(reader, offset, 2, &field_def.name)?;
            let endian = effective_endian(grammar, field_def)?;
            let value = decode_u16(&bytes, endian) as i64;
            check_validate(field_def, Some(value), &bytes, context)?;
            Ok(integer_field(field_def, offset, bytes, value))
        }
        FieldType::Primitive(PrimitiveType::U32) => {
            let bytes = read_exact(reader, offset, 4, &field_def.name)?;
            let endian = effective_endian(grammar, field_def)?;
            let value = decode_u32(&bytes, endian) as i64;
            check_validate(field_def, Some(value), &bytes, context)?;
            Ok(integer_field(field_def, offset, bytes, value))
        }
        FieldType::Primitive(PrimitiveType::Bytes) => {
            let length = resolve_length(field_def, context)?;
            let raw_bytes = read_exact(reader, offset, length, &field_def.name)?;
            check_validate(field_def, None, &raw_bytes, context)?;
            let value = match &field_def.encoding {
                Some(_) => FieldValue::Text(String::from_utf8_lossy(&raw_bytes).into_owned()),
                None => FieldValue::Bytes(raw_bytes.clone()),
            };
            Ok(ParsedField {
                name: field_def.name.clone(),
                value,
                offset,
                size: raw_bytes.len() as u64,
                raw_bytes,
                color: field_def.color.clone(),
            })
        }
        FieldType::Named(type_name) => {
            let Some(nested_type) = grammar.types.get(type_name) else {
                return Err(ParseFieldError::Internal(format!(
                    "field `{}` references unknown type `{type_name}`",
                    field_def.name
                )));
            };
            let nested =
                parse_fields_flat(grammar, reader, nested_type, offset, stop_offset, context)?;
            let size = nested.last().map(|f| f.offset + f.size - offset).unwrap_or(0);
            Ok(ParsedField {
                name: field_def.name.clone(),
                value: FieldValue::Nested(nested),
                offset,
                size,
                raw_bytes: Vec::new(),
                color: field_def.color.clone(),
            })
        }
    }
}

fn integer_field(field_def: &FieldDef, offset: u64, raw_bytes: Vec<u8>, value: i64) -> ParsedField {
    ParsedField {
        name: field_def.name.clone(),
        value: FieldValue::Integer(value),
        offset,
        size: raw_bytes.len() as u64,
        raw_bytes,
        color: field_def.color.clone(),
    }
}

fn effective_endian(grammar: &Grammar, field_def: &FieldDef) -> Result<Endian, ParseFieldError> {
    field_def
        .effective_endian(grammar.endian_default)
        .ok_or_else(|| {
            ParseFieldError::Internal(format!(
                "field `{}` has no determinable endian",
                field_def.name
            ))
        })
}

fn decode_u16(bytes: &[u8], endian: Endian) -> u16 {
    match endian {
        Endian::Big => u16::from_be_bytes([bytes[0], bytes[1]]),
        _ => u16::from_le_bytes([bytes[0], bytes[1]]),
    }
}

fn decode_u32(bytes: &[u8], endian: Endian) -> u32 {
    match endian {
        Endian::Big => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        _ => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

fn read_exact(
    reader: &dyn ByteReader,
    offset: u64,
    length: usize,
    field: &str,
) -> Result<Vec<u8>, ParseFieldError> {
    let bytes = reader.read(offset, length);
    if bytes.len() != length {
        return Err(ParseFieldError::ShortRead {
            field: field.to_owned(),
            need: length,
            got: bytes.len(),
        });
    }
    Ok(bytes)
}

fn resolve_length(
    field_def: &FieldDef,
    context: &HashMap<String, i64>,
) -> Result<usize, ParseFieldError> {
    let length = match field_def.length.as_ref() {
        Some(LengthSpec::Static(n)) => *n,
        Some(LengthSpec::Field(name)) => *context.get(name).ok_or_else(|| {
            ParseFieldError::Internal(format!(
                "field `{}` references unknown length field `{name}`",
                field_def.name
            ))
        })?,
        Some(LengthSpec::Expr(text)) => {
            expr::eval(text, context).map_err(|source| ParseFieldError::Expr {
                field: field_def.name.clone(),
                source,
            })?
        }
        None => {
            return Err(ParseFieldError::Internal(format!(
                "field `{}` has no length specification",
                field_def.name
            )))
        }
    };
    usize::try_from(length).map_err(|_| {
        ParseFieldError::Internal(format!("field `{}` has a negative length", field_def.name))
    })
}

fn check_validate(
    field_def: &FieldDef,
    integer_value: Option<i64>,
    raw_bytes: &[u8],
    context: &HashMap<String, i64>,
) -> Result<(), ParseFieldError> {
    let Some(rule) = &field_def.validate else {
        return Ok(());
    };
    match rule {
        ValidateRule::Equals(expected) => {
            if integer_value != Some(*expected) {
                return Err(ParseFieldError::ValidationFailed {
                    field: field_def.name.clone(),
                    expected: expected.to_string(),
                    got: format!("{integer_value:?}"),
                });
            }
        }
        ValidateRule::EqualsField(name) => {
            let expected = context.get(name).copied();
            if integer_value != expected {
                return Err(ParseFieldError::ValidationFailed {
                    field: field_def.name.clone(),
                    expected: format!("context[{name}]={expected:?}"),
                    got: format!("{integer_value:?}"),
                });
            }
        }
        ValidateRule::AllBytes(byte) => {
            if !raw_bytes.iter().all(|b| b == byte) {
                return Err(ParseFieldError::ValidationFailed {
                    field: field_def.name.clone(),
                    expected: format!("all bytes == {byte:#04x}"),
                    got: "mismatch".to_owned(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::{lint::lint_grammar, reader::SliceReader};

    fn grammar(text: &str) -> Grammar {
        let (grammar, errors, _) = lint_grammar(text);
        assert!(errors.is_empty(), "{errors:?}");
        grammar.expect("grammar should validate")
    }

    const S1: &str = "
format: record_stream
endian: little
framing: { repeat: until_eof }
types:
  R:
    fields:
      - { name: t, type: u16 }
      - { name: n, type: u8 }
      - { name: p, type: bytes, length: n }
record:
  use: R
";

    #[test]
    fn s1_minimal_loop() {
        let grammar = grammar(S1);
        let input: Vec<u8> = vec![0x01, 0x00, 0x03, 0x41, 0x42, 0x43, 0x02, 0x00, 0x00];
        let reader = SliceReader::new(&input);
        let result = parse_binary(&grammar, &reader, 0, None, None);
        assert!(result.errors.is_empty());
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].offset, 0);
        assert_eq!(result.records[0].size, 6);
        assert_eq!(result.records[1].offset, 6);
        assert_eq!(result.records[1].size, 3);
        assert_eq!(
            result.records[0].field("p").unwrap().value,
            FieldValue::Bytes(b"ABC".to_vec())
        );
    }

    const S3: &str = "
format: record_stream
endian: little
framing: { repeat: until_eof }
types:
  R:
    fields:
      - { name: total, type: u16, endian: little }
      - { name: text, type: bytes, length: \"total - 4\" }
record:
  use: R
";

    #[test]
    fn s3_expression_length() {
        let grammar = grammar(S3);
        let mut input = vec![0x0Au8, 0x00];
        input.extend_from_slice(b"abcdef");
        let reader = SliceReader::new(&input);
        let result = parse_binary(&grammar, &reader, 0, None, None);
        assert!(result.errors.is_empty());
        let record = &result.records[0];
        assert_eq!(record.field("text").unwrap().size, 6);
        assert_eq!(
            record.field("text").unwrap().value,
            FieldValue::Bytes(b"abcdef".to_vec())
        );
    }

    #[test]
    fn short_read_halts_stream() {
        let grammar = grammar(S1);
        let input: Vec<u8> = vec![0x01, 0x00, 0x05, 0x41];
        let reader = SliceReader::new(&input);
        let result = parse_binary(&grammar, &reader, 0, None, None);
        assert_eq!(result.records.len(), 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.parse_stopped_at, 0);
    }
}
