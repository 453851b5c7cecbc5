//! The grammar model: its validated AST (§4.C) and the untyped forms that feed it.
pub mod ast;
pub(crate) mod raw;
pub mod serialized;
pub mod text;

pub use ast::{
    DecoderKind, Endian, FieldDef, FieldType, Format, Framing, Grammar, LengthSpec,
    PrimitiveType, RecordDispatch, RegistryEntry, TypeDef, ValidateRule,
};

/// Parse a discriminator literal (`0x` + hex digits) into its integer value.
#[must_use]
pub fn parse_discriminator_value(literal: &str) -> Option<u64> {
    let lower = literal.trim().to_ascii_lowercase();
    let digits = lower.strip_prefix("0x")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Format a runtime discriminator value the way the parser builds dispatch/registry lookup
/// keys: `"0x"` + uppercase hex, padded to the discriminator field's byte size (§4.E step 2.b).
#[must_use]
pub fn format_discriminator_value(value: u64, byte_size: usize) -> String {
    let width = byte_size * 2;
    format!("0x{value:0width$X}", width = width)
}

/// Normalize a discriminator literal to the width of a known discriminator field, so dispatch
/// case keys and registry keys key into the same canonical form the parser computes at runtime
/// (§4.E step 2.b, §9 "String-keyed registry and dispatch literals").
#[must_use]
pub fn normalize_discriminator_for_width(literal: &str, byte_size: usize) -> Option<String> {
    let value = parse_discriminator_value(literal)?;
    Some(format_discriminator_value(value, byte_size))
}

/// Normalize a discriminator literal to a width derived only from its own digit count, rounded
/// up to the next even width. Used only when no discriminator field is known (a `use_type`
/// grammar still wants duplicate-registry-entry detection at lint time even though the registry
/// can never actually be consulted at parse time).
#[must_use]
pub fn normalize_discriminator_literal(literal: &str) -> Option<String> {
    let value = parse_discriminator_value(literal)?;
    let digit_count = literal
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .len();
    let width = digit_count + (digit_count % 2);
    Some(format!("0x{value:0width$X}", width = width))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_width() {
        assert_eq!(
            normalize_discriminator_literal("0X65"),
            Some("0x65".to_owned())
        );
        assert_eq!(
            normalize_discriminator_literal("0x5"),
            Some("0x05".to_owned())
        );
        assert_eq!(
            normalize_discriminator_literal("0x0065"),
            Some("0x0065".to_owned())
        );
    }

    #[test]
    fn rejects_non_hex() {
        assert_eq!(normalize_discriminator_literal("65"), None);
        assert_eq!(normalize_discriminator_literal("0xzz"), None);
    }

    #[test]
    fn formats_runtime_value_to_field_width() {
        assert_eq!(format_discriminator_value(0x65, 2), "0x0065");
        assert_eq!(format_discriminator_value(5, 1), "0x05");
    }
}
