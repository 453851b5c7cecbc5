//! End-to-end coverage of the literal scenarios S1-S6.
use similar_asserts::assert_eq;

use formgram::{
    decode::decode_field,
    diff::{diff_runs, score_run},
    lint::lint_grammar,
    parse::{parse_binary, FieldValue},
    patch::{Patch, PatchOp},
    reader::{ByteReader, OwnedReader, SliceReader},
    run::build_run_artifact,
    store::{apply_patch, create_initial_version, SpecStore},
};
use serde_yml::{Mapping, Value};
use temp_dir::TempDir;

const S1_GRAMMAR: &str = "
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
fn s1_minimal_loop_end_to_end() {
    let (grammar, errors, warnings) = lint_grammar(S1_GRAMMAR);
    assert!(errors.is_empty());
    assert!(warnings.is_empty());
    let grammar = grammar.unwrap();

    let input: Vec<u8> = vec![0x01, 0x00, 0x03, 0x41, 0x42, 0x43, 0x02, 0x00, 0x00];
    let reader = SliceReader::new(&input);
    let result = parse_binary(&grammar, &reader, 0, None, None);

    assert_eq!(result.record_count, 2);
    assert!(result.errors.is_empty());

    let first = &result.records[0];
    assert_eq!(first.offset, 0);
    assert_eq!(first.size, 6);
    assert_eq!(first.field("t").unwrap().value, FieldValue::Integer(1));
    assert_eq!(first.field("n").unwrap().value, FieldValue::Integer(3));
    assert_eq!(first.field("p").unwrap().value, FieldValue::Bytes(b"ABC".to_vec()));

    let second = &result.records[1];
    assert_eq!(second.offset, 6);
    assert_eq!(second.size, 3);
    assert_eq!(second.field("t").unwrap().value, FieldValue::Integer(2));
    assert_eq!(second.field("n").unwrap().value, FieldValue::Integer(0));

    let coverage = formgram::analyze_coverage(&result, 9);
    assert_eq!(coverage.coverage_percentage, 100.0);
    assert!(coverage.gaps.is_empty());
}

const S2_GRAMMAR: &str = "
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
  \"0x0065\":
    decode: { as: string, field: payload, encoding: ascii }
";

#[test]
fn s2_dispatch_and_registry_decoding_end_to_end() {
    let (grammar, errors, _warnings) = lint_grammar(S2_GRAMMAR);
    assert!(errors.is_empty(), "{errors:?}");
    let grammar = grammar.unwrap();

    let input: Vec<u8> = vec![0x65, 0x00, 0x07, 0x00, 0x05, 0x41, 0x6C, 0x69, 0x63, 0x65];
    let reader = SliceReader::new(&input);
    let result = parse_binary(&grammar, &reader, 0, None, None);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.record_count, 1);

    let decoded = decode_field(&result.records[0], &grammar, None);
    assert!(decoded.success);
    assert_eq!(decoded.value.as_deref(), Some("Alice"));
    assert_eq!(decoded.decoder_type.as_deref(), Some("string"));
    assert_eq!(decoded.field_path.as_deref(), Some("payload"));
}

const S3_GRAMMAR: &str = "
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
fn s3_expression_length_end_to_end() {
    let (grammar, errors, _warnings) = lint_grammar(S3_GRAMMAR);
    assert!(errors.is_empty(), "{errors:?}");
    let grammar = grammar.unwrap();

    let mut input: Vec<u8> = vec![0x0A, 0x00];
    input.extend_from_slice(b"abcdef");
    let reader = SliceReader::new(&input);
    let result = parse_binary(&grammar, &reader, 0, None, None);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let record = &result.records[0];
    let text = record.field("text").unwrap();
    assert_eq!(text.size, 6);
    assert_eq!(text.value, FieldValue::Bytes(b"abcdef".to_vec()));
}

#[test]
fn s1_minimal_loop_reads_from_disk() {
    let (grammar, errors, _warnings) = lint_grammar(S1_GRAMMAR);
    assert!(errors.is_empty());
    let grammar = grammar.unwrap();

    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("capture.bin");
    std::fs::write(&path, [0x01, 0x00, 0x03, 0x41, 0x42, 0x43, 0x02, 0x00, 0x00]).unwrap();

    let reader = OwnedReader::from_path(&path).expect("read capture");
    let result = parse_binary(&grammar, &reader.as_reader(), 0, None, None);
    assert_eq!(result.record_count, 2);
    assert_eq!(reader.as_reader().len(), 9);
}

#[test]
fn s5_patch_then_relint_then_rescan() {
    let mut store = SpecStore::new();
    let (root, outcome) = create_initial_version(&mut store, S1_GRAMMAR);
    assert!(outcome.valid);
    let root = root.unwrap();

    let mut field_def = Mapping::new();
    field_def.insert(Value::from("name"), Value::from("extra"));
    field_def.insert(Value::from("type"), Value::from("u8"));
    let patch = Patch {
        ops: vec![PatchOp::InsertField {
            type_name: "R".to_owned(),
            index: -1,
            field_def,
        }],
        description: "append a trailing byte field".to_owned(),
    };

    let (new_id, errors) = apply_patch(&mut store, root, patch);
    assert!(errors.is_empty(), "{errors:?}");
    let new_id = new_id.unwrap();
    let version = store.get(new_id).unwrap();
    assert!(version.lint_valid);
    let grammar = version.ast.clone().unwrap();

    let input: Vec<u8> = vec![0x01, 0x00, 0x03, 0x41, 0x42, 0x43, 0x02, 0x00, 0x00];
    let reader = SliceReader::new(&input);
    let result = parse_binary(&grammar, &reader, 0, None, None);
    assert!(!result.errors.is_empty());

    let artifact = build_run_artifact(result, &grammar, Some(new_id), input.len() as u64);
    let score = score_run(&artifact, None);
    assert_eq!(score.total_score, 0.0);
    assert!(!score.passed_hard_gates);
}

#[test]
fn s6_scoring_baseline_end_to_end() {
    use formgram::{parse::ParseResult, run::{RunArtifact, RunStats}};

    fn artifact(stats: RunStats) -> RunArtifact {
        RunArtifact {
            run_id: "run".to_owned(),
            spec_version_id: None,
            created_at: 0,
            parse_result: ParseResult {
                records: Vec::new(),
                errors: Vec::new(),
                file_path: None,
                total_bytes_parsed: 0,
                parse_stopped_at: 0,
                grammar_format: "record_stream".to_owned(),
                created_at: 0,
                record_count: stats.record_count,
            },
            file_path: None,
            file_size: stats.file_size,
            anomalies: Vec::new(),
            stats,
        }
    }

    let baseline = artifact(RunStats {
        record_count: 1,
        total_bytes_parsed: 1,
        parse_stopped_at: 1,
        file_size: 10,
        coverage_percentage: 50.0,
        error_count: 2,
        anomaly_count: 0,
        high_severity_anomalies: 0,
    });
    let candidate = artifact(RunStats {
        record_count: 1,
        total_bytes_parsed: 1,
        parse_stopped_at: 1,
        file_size: 10,
        coverage_percentage: 80.0,
        error_count: 0,
        anomaly_count: 1,
        high_severity_anomalies: 0,
    });

    let diff = diff_runs(&baseline, &candidate);
    assert_eq!(diff.coverage_delta, 30.0);
    assert_eq!(diff.error_delta, -2);
    assert!(diff.is_improvement);

    let score = score_run(&candidate, Some(&baseline));
    assert_eq!(score.total_score, 85.0);
}
