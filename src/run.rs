//! Run artifact + anomaly detection: a frozen parse run tied to a grammar version (§4.L)
use std::{
    collections::HashSet,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    coverage::analyze_coverage,
    grammar::Grammar,
    parse::{FieldValue, ParseResult},
    store::VersionId,
};

/// Above this many bytes for a heuristically-detected "length" field, flag `absurd_length` at
/// `high` severity, regardless of the remaining bytes in the file (§9 "Anomaly heuristics").
pub const ABSURD_LENGTH_CAP: u64 = 1_048_576;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    ParseError,
    RecordError,
    AbsurdLength,
    FieldOverflow,
    BoundaryMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A heuristic flag raised while scanning a [`ParseResult`] (§4.L).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyType,
    pub severity: Severity,
    pub record_offset: u64,
    pub field_name: Option<String>,
    pub message: Option<String>,
    pub value: Option<i64>,
}

/// Summary counters over a single run (§3 "RunStats").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub record_count: usize,
    pub total_bytes_parsed: u64,
    pub parse_stopped_at: u64,
    pub file_size: u64,
    pub coverage_percentage: f64,
    pub error_count: usize,
    pub anomaly_count: usize,
    pub high_severity_anomalies: usize,
}

/// An immutable snapshot of a parse run (§3 "RunArtifact").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunArtifact {
    pub run_id: String,
    pub spec_version_id: Option<VersionId>,
    pub created_at: u64,
    pub parse_result: ParseResult,
    pub file_path: Option<String>,
    pub file_size: u64,
    pub anomalies: Vec<Anomaly>,
    pub stats: RunStats,
}

/// Freeze a [`ParseResult`] into a [`RunArtifact`], running the anomaly pass (§4.L).
#[must_use]
pub fn build_run_artifact(
    parse_result: ParseResult,
    grammar: &Grammar,
    spec_version_id: Option<VersionId>,
    file_size: u64,
) -> RunArtifact {
    let coverage = analyze_coverage(&parse_result, file_size);
    let length_field_names = length_field_names(grammar);

    let mut anomalies = Vec::new();
    for record in &parse_result.records {
        scan_record(record, file_size, &length_field_names, &mut anomalies);
    }
    for error in &parse_result.errors {
        anomalies.push(Anomaly {
            kind: AnomalyType::ParseError,
            severity: Severity::High,
            record_offset: parse_result.parse_stopped_at,
            field_name: None,
            message: Some(error.clone()),
            value: None,
        });
    }

    anomalies.sort_by(|a, b| {
        a.record_offset
            .cmp(&b.record_offset)
            .then_with(|| b.severity.cmp(&a.severity))
    });

    let high_severity_anomalies = anomalies.iter().filter(|a| a.severity == Severity::High).count();
    let error_count = parse_result.errors.len();
    let stats = RunStats {
        record_count: parse_result.record_count,
        total_bytes_parsed: parse_result.total_bytes_parsed,
        parse_stopped_at: parse_result.parse_stopped_at,
        file_size,
        coverage_percentage: coverage.coverage_percentage,
        error_count,
        anomaly_count: anomalies.len(),
        high_severity_anomalies,
    };

    RunArtifact {
        run_id: Uuid::new_v4().to_string(),
        spec_version_id,
        created_at: now_millis(),
        file_path: parse_result.file_path.clone(),
        parse_result,
        file_size,
        anomalies,
        stats,
    }
}

fn length_field_names(grammar: &Grammar) -> HashSet<String> {
    let mut names = HashSet::new();
    for type_def in grammar.types.values() {
        for field in &type_def.fields {
            if let Some(crate::grammar::LengthSpec::Field(name)) = &field.length {
                names.insert(name.clone());
            }
        }
    }
    names
}

fn looks_like_length_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with("_len") || lower.contains("length") || lower.starts_with("len_")
}

fn scan_record(
    record: &crate::parse::ParsedRecord,
    file_size: u64,
    length_field_names: &HashSet<String>,
    out: &mut Vec<Anomaly>,
) {
    if record.error.is_some() {
        out.push(Anomaly {
            kind: AnomalyType::RecordError,
            severity: Severity::High,
            record_offset: record.offset,
            field_name: None,
            message: record.error.clone(),
            value: None,
        });
    }

    if record.size > file_size.saturating_sub(record.offset) {
        out.push(Anomaly {
            kind: AnomalyType::FieldOverflow,
            severity: Severity::High,
            record_offset: record.offset,
            field_name: None,
            message: Some("declared record size exceeds remaining file bytes".to_owned()),
            value: Some(record.size as i64),
        });
    }

    let top_level_span: u64 = record.fields.iter().map(|f| f.size).sum();
    if top_level_span != record.size {
        out.push(Anomaly {
            kind: AnomalyType::BoundaryMismatch,
            severity: Severity::Medium,
            record_offset: record.offset,
            field_name: None,
            message: Some(format!(
                "record size {} does not match the sum of its top-level fields {top_level_span}",
                record.size
            )),
            value: None,
        });
    }

    let remaining_in_record = file_size.saturating_sub(record.offset);
    for field in &record.fields {
        let FieldValue::Integer(value) = &field.value else {
            continue;
        };
        let is_length_like =
            length_field_names.contains(&field.name) || looks_like_length_name(&field.name);
        if !is_length_like {
            continue;
        }
        let value = *value;
        if value < 0 {
            continue;
        }
        let value = value as u64;
        let cap = file_size.min(ABSURD_LENGTH_CAP);
        if value >= cap {
            out.push(Anomaly {
                kind: AnomalyType::AbsurdLength,
                severity: Severity::High,
                record_offset: record.offset,
                field_name: Some(field.name.clone()),
                message: Some(format!("value {value} meets or exceeds the absurd-length cap {cap}")),
                value: Some(value as i64),
            });
        } else if value > remaining_in_record {
            out.push(Anomaly {
                kind: AnomalyType::AbsurdLength,
                severity: Severity::Medium,
                record_offset: record.offset,
                field_name: Some(field.name.clone()),
                message: Some(format!(
                    "value {value} exceeds the {remaining_in_record} bytes remaining in the record"
                )),
                value: Some(value as i64),
            });
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::{lint::lint_grammar, parse::parse_binary, reader::SliceReader};

    const GRAMMAR: &str = "
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
    fn clean_run_has_no_high_severity_anomalies() {
        let (grammar, errors, _) = lint_grammar(GRAMMAR);
        assert!(errors.is_empty());
        let grammar = grammar.unwrap();
        let input: Vec<u8> = vec![0x01, 0x00, 0x03, 0x41, 0x42, 0x43, 0x02, 0x00, 0x00];
        let reader = SliceReader::new(&input);
        let result = parse_binary(&grammar, &reader, 0, None, None);
        let artifact = build_run_artifact(result, &grammar, None, 9);
        assert_eq!(artifact.stats.high_severity_anomalies, 0);
        assert_eq!(artifact.stats.error_count, 0);
    }

    #[test]
    fn absurd_length_is_flagged_high_when_it_exceeds_the_cap() {
        let (grammar, errors, _) = lint_grammar(GRAMMAR);
        assert!(errors.is_empty());
        let grammar = grammar.unwrap();
        // n is interpreted as a bytes length above the file size, so the bytes read short
        // and the record fails — this still surfaces as a record_error / parse_error pair.
        let input: Vec<u8> = vec![0x01, 0x00, 0xFF, 0x41];
        let reader = SliceReader::new(&input);
        let result = parse_binary(&grammar, &reader, 0, None, None);
        let artifact = build_run_artifact(result, &grammar, None, 4);
        assert!(artifact.stats.high_severity_anomalies >= 1);
    }
}
