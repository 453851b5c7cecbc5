//! Span index: viewport-scoped offset → field lookup over a [`ParseResult`] (§4.F)
use std::cmp::Ordering;

use serde::Serialize;

use crate::parse::{FieldValue, ParseResult, ParsedField, ParsedRecord};

/// Display classification for a [`Span`], derived from the owning field's value variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum SpanGroup {
    Int,
    String,
    Bytes,
    Float,
    Unknown,
}

/// A leaf-level `[offset, offset+length)` interval tagged with a dotted field path.
///
/// Spans never overlap and never cover another span's bytes: the leaves of a record tile its
/// `[offset, offset+size)` range exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub offset: u64,
    pub length: u64,
    pub path: String,
    pub group: SpanGroup,
    pub color_override: Option<String>,
}

/// The output of [`update_viewport`]: all spans intersecting a viewport, sorted by offset.
#[derive(Debug, Clone, Serialize)]
pub struct SpanSet {
    pub spans: Vec<Span>,
    pub viewport_start: u64,
    pub viewport_end: u64,
}

struct RecordOffset {
    offset: u64,
    size: u64,
    record_index: usize,
}

/// A span index built once per [`ParseResult`], supporting cached viewport queries.
///
/// Rebuilding is cheap (`O(n log n)` over the record count) and is expected whenever the
/// underlying [`ParseResult`] changes; this type holds no reference back to it.
pub struct SpanIndex<'r> {
    result: &'r ParseResult,
    offsets: Vec<RecordOffset>,
    cached: Option<(u64, u64, Vec<Span>)>,
}

impl<'r> SpanIndex<'r> {
    /// Build the record-offset index once per [`ParseResult`] (§4.F "Build phase").
    #[must_use]
    pub fn new(result: &'r ParseResult) -> Self {
        let mut offsets: Vec<RecordOffset> = result
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.error.is_none())
            .map(|(i, r)| RecordOffset {
                offset: r.offset,
                size: r.size,
                record_index: i,
            })
            .collect();
        offsets.sort_by_key(|r| r.offset);
        Self {
            result,
            offsets,
            cached: None,
        }
    }

    /// Recompute (or return the cached) [`SpanSet`] for a half-open viewport (§4.F "Query phase").
    pub fn update_viewport(&mut self, viewport_start: u64, viewport_end: u64) -> SpanSet {
        if let Some((vs, ve, spans)) = &self.cached {
            if *vs == viewport_start && *ve == viewport_end {
                return SpanSet {
                    spans: spans.clone(),
                    viewport_start,
                    viewport_end,
                };
            }
        }

        let start_idx = self.predecessor(viewport_start);
        let mut spans = Vec::new();
        for entry in self.offsets.iter().skip(start_idx) {
            if entry.offset >= viewport_end {
                break;
            }
            if entry.offset + entry.size <= viewport_start {
                continue;
            }
            let record = &self.result.records[entry.record_index];
            emit_record_spans(record, &mut spans);
        }
        spans.sort_by_key(|s| s.offset);

        self.cached = Some((viewport_start, viewport_end, spans.clone()));
        SpanSet {
            spans,
            viewport_start,
            viewport_end,
        }
    }

    /// Binary search for a span covering `offset`, or `None` if uncovered.
    #[must_use]
    pub fn find(&self, offset: u64) -> Option<&Span> {
        let (_, _, spans) = self.cached.as_ref()?;
        spans
            .binary_search_by(|span| {
                if offset < span.offset {
                    Ordering::Greater
                } else if offset >= span.offset + span.length {
                    Ordering::Less
                } else {
                    Ordering::Equal
                }
            })
            .ok()
            .and_then(|idx| spans.get(idx))
    }

    /// Index of the first record whose offset is ≤ `vs` (predecessor search), or 0.
    fn predecessor(&self, vs: u64) -> usize {
        match self.offsets.binary_search_by_key(&vs, |r| r.offset) {
            Ok(idx) => idx,
            Err(0) => 0,
            Err(idx) => idx - 1,
        }
    }
}

/// Free-function convenience wrapper matching the §6 tool-surface signature: builds a fresh
/// index and runs a single viewport query. Callers issuing repeated queries over the same
/// [`ParseResult`] should keep a [`SpanIndex`] around instead to benefit from its cache.
#[must_use]
pub fn generate_spans(result: &ParseResult, viewport_start: u64, viewport_end: u64) -> SpanSet {
    let mut index = SpanIndex::new(result);
    index.update_viewport(viewport_start, viewport_end)
}

fn emit_record_spans(record: &ParsedRecord, out: &mut Vec<Span>) {
    for field in &record.fields {
        walk_field(&record.type_name, field, out);
    }
}

fn walk_field(ancestor_path: &str, field: &ParsedField, out: &mut Vec<Span>) {
    let path = format!("{ancestor_path}.{}", field.name);
    match &field.value {
        FieldValue::Nested(children) => {
            for child in children {
                walk_field(&path, child, out);
            }
        }
        FieldValue::Integer(_) => out.push(leaf(field, path, SpanGroup::Int)),
        FieldValue::Text(_) => out.push(leaf(field, path, SpanGroup::String)),
        FieldValue::Bytes(_) => out.push(leaf(field, path, SpanGroup::Bytes)),
    }
}

fn leaf(field: &ParsedField, path: String, group: SpanGroup) -> Span {
    Span {
        offset: field.offset,
        length: field.size,
        path,
        group,
        color_override: field.color.clone(),
    }
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

    fn result() -> ParseResult {
        let (grammar, errors, _) = lint_grammar(GRAMMAR);
        assert!(errors.is_empty());
        let grammar = grammar.unwrap();
        let input: Vec<u8> = vec![0x01, 0x00, 0x03, 0x41, 0x42, 0x43, 0x02, 0x00, 0x00];
        let reader = SliceReader::new(&input);
        parse_binary(&grammar, &reader, 0, None, None)
    }

    #[test]
    fn tiles_the_first_record() {
        let result = result();
        let set = generate_spans(&result, 0, 6);
        assert_eq!(set.spans.len(), 3);
        assert_eq!(set.spans[0].path, "R.t");
        assert_eq!(set.spans[0].offset, 0);
        assert_eq!(set.spans[1].path, "R.n");
        assert_eq!(set.spans[2].path, "R.p");
        assert_eq!(set.spans[2].group, SpanGroup::Bytes);
    }

    #[test]
    fn viewport_before_any_record_is_empty() {
        let result = result();
        let mut index = SpanIndex::new(&result);
        let set = index.update_viewport(100, 200);
        assert!(set.spans.is_empty());
    }

    #[test]
    fn find_locates_the_owning_span() {
        let result = result();
        let mut index = SpanIndex::new(&result);
        index.update_viewport(0, 9);
        let found = index.find(4).expect("offset 4 is inside R.p");
        assert_eq!(found.path, "R.p");
    }
}
