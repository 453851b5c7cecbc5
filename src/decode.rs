//! Field decoder: record + registry entry → rendered value (§4.H)
use serde::Serialize;

use crate::{
    error::DecodeError,
    grammar::{DecoderKind, Endian, Grammar},
    parse::{FieldValue, ParsedField, ParsedRecord},
};

/// The result of [`decode_field`]. Always produced, never raised (§4.H, §7).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedValue {
    pub success: bool,
    pub value: Option<String>,
    pub decoder_type: Option<String>,
    pub field_path: Option<String>,
    pub error: Option<DecodeError>,
}

impl DecodedValue {
    fn fail(error: DecodeError) -> Self {
        Self {
            success: false,
            value: None,
            decoder_type: None,
            field_path: None,
            error: Some(error),
        }
    }

    fn ok(value: String, decoder_type: &str, field_path: &str) -> Self {
        Self {
            success: true,
            value: Some(value),
            decoder_type: Some(decoder_type.to_owned()),
            field_path: Some(field_path.to_owned()),
            error: None,
        }
    }
}

/// Decode a record's payload using its registry entry (§4.H).
///
/// `field_name`, if given, overrides both the registry entry's explicit `field` and the
/// heuristic target-field selection.
#[must_use]
pub fn decode_field(record: &ParsedRecord, grammar: &Grammar, field_name: Option<&str>) -> DecodedValue {
    let Some(discriminator) = &record.type_discriminator else {
        return DecodedValue::fail(DecodeError::NoRegistry);
    };
    let Some(entry) = grammar.registry.get(discriminator) else {
        return DecodedValue::fail(DecodeError::NoRegistry);
    };

    let target_name = field_name.or(entry.field.as_deref());
    let Some(field) = resolve_target_field(record, &entry.decoder, target_name) else {
        return DecodedValue::fail(DecodeError::NoField);
    };

    match &entry.decoder {
        DecoderKind::String { encoding: _ } => {
            let text = String::from_utf8_lossy(&field.raw_bytes).into_owned();
            DecodedValue::ok(text, "string", &field.name)
        }
        DecoderKind::U16 { endian } => decode_int(field, *endian, 2, "u16"),
        DecoderKind::U32 { endian } => decode_int(field, *endian, 4, "u32"),
        DecoderKind::Hex => {
            let hex = field
                .raw_bytes
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<String>();
            DecodedValue::ok(hex, "hex", &field.name)
        }
        DecoderKind::PackedDateV1 => decode_packed_date(field),
    }
}

fn resolve_target_field<'r>(
    record: &'r ParsedRecord,
    decoder: &DecoderKind,
    explicit_name: Option<&str>,
) -> Option<&'r ParsedField> {
    if let Some(name) = explicit_name {
        return record.field(name);
    }
    match decoder {
        DecoderKind::String { .. } | DecoderKind::Hex | DecoderKind::PackedDateV1 => record
            .fields
            .iter()
            .find(|f| matches!(f.value, FieldValue::Bytes(_))),
        DecoderKind::U16 { .. } => record
            .fields
            .iter()
            .find(|f| matches!(f.value, FieldValue::Integer(_)) && f.raw_bytes.len() == 2),
        DecoderKind::U32 { .. } => record
            .fields
            .iter()
            .find(|f| matches!(f.value, FieldValue::Integer(_)) && f.raw_bytes.len() == 4),
    }
}

fn decode_int(field: &ParsedField, endian: Endian, need: usize, decoder_type: &str) -> DecodedValue {
    if field.raw_bytes.len() < need {
        return DecodedValue::fail(DecodeError::Insufficient);
    }
    let value: u64 = match (need, endian) {
        (2, Endian::Big) => u16::from_be_bytes([field.raw_bytes[0], field.raw_bytes[1]]) as u64,
        (2, _) => u16::from_le_bytes([field.raw_bytes[0], field.raw_bytes[1]]) as u64,
        (4, Endian::Big) => u32::from_be_bytes([
            field.raw_bytes[0],
            field.raw_bytes[1],
            field.raw_bytes[2],
            field.raw_bytes[3],
        ]) as u64,
        (4, _) => u32::from_le_bytes([
            field.raw_bytes[0],
            field.raw_bytes[1],
            field.raw_bytes[2],
            field.raw_bytes[3],
        ]) as u64,
        _ => return DecodedValue::fail(DecodeError::Insufficient),
    };
    DecodedValue::ok(value.to_string(), decoder_type, &field.name)
}

/// `packed_date_v1`: 4 bytes `[day<<3 | flags, month<<1 | reserved, year_lo, year_hi]`.
fn decode_packed_date(field: &ParsedField) -> DecodedValue {
    if field.raw_bytes.len() < 4 {
        return DecodedValue::fail(DecodeError::Insufficient);
    }
    let b0 = field.raw_bytes[0];
    let b1 = field.raw_bytes[1];
    if b1 & 0x01 != 0 {
        return DecodedValue::fail(DecodeError::InvalidEncoding);
    }
    let day = b0 >> 3;
    let month = b1 >> 1;
    let year = u16::from_le_bytes([field.raw_bytes[2], field.raw_bytes[3]]);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return DecodedValue::fail(DecodeError::InvalidEncoding);
    }
    DecodedValue::ok(
        format!("{year:04}-{month:02}-{day:02}"),
        "packed_date_v1",
        &field.name,
    )
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::{lint::lint_grammar, parse::parse_binary, reader::SliceReader};

    const S2: &str = "
format: record_stream
endian: little
framing: { repeat: until_eof }
types:
  Hdr:
    fields:
      - { name: type_raw, type: u16 }
      - { name: eid, type: u16 }
  Rec:
    fields:
      - { name: header, type: Hdr }
      - { name: len, type: u8 }
      - { name: payload, type: bytes, length: len }
record:
  switch:
    expr: Hdr.type_raw
    cases: { \"0x0065\": Rec }
    default: Rec
registry:
  \"0x0065\": { decode: { as: string, field: payload, encoding: ascii } }
";

    #[test]
    fn s2_dispatch_and_registry_decoding() {
        let (grammar, errors, _) = lint_grammar(S2);
        assert!(errors.is_empty(), "{errors:?}");
        let grammar = grammar.unwrap();
        let input: Vec<u8> = vec![0x65, 0x00, 0x07, 0x00, 0x05, 0x41, 0x6C, 0x69, 0x63, 0x65];
        let reader = SliceReader::new(&input);
        let result = parse_binary(&grammar, &reader, 0, None, None);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.records.len(), 1);

        let decoded = decode_field(&result.records[0], &grammar, None);
        assert!(decoded.success);
        assert_eq!(decoded.value.as_deref(), Some("Alice"));
        assert_eq!(decoded.decoder_type.as_deref(), Some("string"));
        assert_eq!(decoded.field_path.as_deref(), Some("payload"));
    }

    #[test]
    fn missing_registry_entry_fails_gracefully() {
        let (grammar, errors, _) = lint_grammar(S2);
        assert!(errors.is_empty());
        let grammar = grammar.unwrap();
        let record = ParsedRecord {
            offset: 0,
            size: 0,
            type_name: "Rec".to_owned(),
            fields: Vec::new(),
            type_discriminator: Some("0x0001".to_owned()),
            error: None,
        };
        let decoded = decode_field(&record, &grammar, None);
        assert!(!decoded.success);
        assert_eq!(decoded.error, Some(DecodeError::NoRegistry));
    }
}
