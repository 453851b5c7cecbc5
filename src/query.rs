//! Record query: pure filtering over a [`ParseResult`] (§4.I)
use serde::Serialize;

use crate::{
    error::QueryError,
    parse::{ParseResult, ParsedRecord},
};

/// A filter over a [`ParseResult`]'s records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    Type(String),
    OffsetRange(u64, u64),
    HasField(String),
    /// A filter that failed to parse from an untrusted source (e.g. the CLI); carried as data
    /// so [`query_records`] can stay a never-raising tool per §4.I/§7.
    Invalid(QueryError),
}

/// Parse a filter kind + optional value, as the CLI would receive them, into a [`RecordFilter`].
/// Never fails outright: an unrecognized kind or malformed value is captured as
/// `RecordFilter::Invalid` rather than propagated.
#[must_use]
pub fn parse_filter(kind: &str, value: Option<&str>) -> RecordFilter {
    match kind {
        "all" => RecordFilter::All,
        "type" => match value {
            Some(name) => RecordFilter::Type(name.to_owned()),
            None => RecordFilter::Invalid(QueryError::InvalidFilterValue(
                "type filter requires a value".to_owned(),
            )),
        },
        "has_field" => match value {
            Some(name) => RecordFilter::HasField(name.to_owned()),
            None => RecordFilter::Invalid(QueryError::InvalidFilterValue(
                "has_field filter requires a value".to_owned(),
            )),
        },
        "offset_range" => match value.and_then(parse_range) {
            Some((a, b)) => RecordFilter::OffsetRange(a, b),
            None => RecordFilter::Invalid(QueryError::InvalidFilterValue(
                "offset_range filter requires a value like `a..b`".to_owned(),
            )),
        },
        other => RecordFilter::Invalid(QueryError::UnknownFilter(other.to_owned())),
    }
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (a, b) = value.split_once("..")?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

/// The frozen output of [`query_records`]: the matching records plus the original count.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSet<'r> {
    pub records: Vec<&'r ParsedRecord>,
    pub total_count: usize,
    pub filter_applied: String,
    pub rejected: Option<QueryError>,
}

/// Filter a [`ParseResult`]'s records. Never raises: an unrecognized filter or value produces
/// an empty set with `rejected` describing why (§4.I, §7).
#[must_use]
pub fn query_records<'r>(result: &'r ParseResult, filter: &RecordFilter) -> RecordSet<'r> {
    let records = &result.records;
    let total_count = records.len();
    let (matched, description, rejected): (Vec<&ParsedRecord>, String, Option<QueryError>) = match filter {
        RecordFilter::All => (records.iter().collect(), "all".to_owned(), None),
        RecordFilter::Type(name) => (
            records.iter().filter(|r| &r.type_name == name).collect(),
            format!("type({name})"),
            None,
        ),
        RecordFilter::OffsetRange(a, b) => (
            records
                .iter()
                .filter(|r| overlaps(r.offset, r.offset + r.size, *a, *b))
                .collect(),
            format!("offset_range({a}, {b})"),
            None,
        ),
        RecordFilter::HasField(name) => (
            records
                .iter()
                .filter(|r| r.field(name).is_some())
                .collect(),
            format!("has_field({name})"),
            None,
        ),
        RecordFilter::Invalid(reason) => (Vec::new(), format!("invalid: {reason}"), Some(reason.clone())),
    };

    RecordSet {
        records: matched,
        total_count,
        filter_applied: description,
        rejected,
    }
}

/// Same overlap predicate as the span index's viewport scan (§4.F, §4.I).
fn overlaps(record_start: u64, record_end: u64, range_start: u64, range_end: u64) -> bool {
    record_start < range_end && record_end > range_start
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn record(offset: u64, size: u64, type_name: &str) -> ParsedRecord {
        ParsedRecord {
            offset,
            size,
            type_name: type_name.to_owned(),
            fields: Vec::new(),
            type_discriminator: None,
            error: None,
        }
    }

    fn result(records: Vec<ParsedRecord>) -> ParseResult {
        ParseResult {
            record_count: records.len(),
            records,
            errors: Vec::new(),
            file_path: None,
            total_bytes_parsed: 0,
            parse_stopped_at: 0,
            grammar_format: "record_stream".to_owned(),
            created_at: 0,
        }
    }

    #[test]
    fn all_returns_everything() {
        let result = result(vec![record(0, 4, "R"), record(4, 4, "R")]);
        let set = query_records(&result, &RecordFilter::All);
        assert_eq!(set.records.len(), 2);
        assert_eq!(set.total_count, 2);
    }

    #[test]
    fn type_filters_exact_match() {
        let result = result(vec![record(0, 4, "A"), record(4, 4, "B")]);
        let set = query_records(&result, &RecordFilter::Type("B".to_owned()));
        assert_eq!(set.records.len(), 1);
        assert_eq!(set.records[0].type_name, "B");
    }

    #[test]
    fn offset_range_uses_overlap_predicate() {
        let result = result(vec![record(0, 4, "A"), record(10, 4, "A")]);
        let set = query_records(&result, &RecordFilter::OffsetRange(2, 12));
        assert_eq!(set.records.len(), 2);
        let set = query_records(&result, &RecordFilter::OffsetRange(4, 10));
        assert!(set.records.is_empty());
    }

    #[test]
    fn unknown_filter_kind_is_rejected_not_raised() {
        let result = result(vec![record(0, 4, "A")]);
        let filter = parse_filter("nonsense", None);
        let set = query_records(&result, &filter);
        assert!(set.records.is_empty());
        assert!(matches!(set.rejected, Some(QueryError::UnknownFilter(_))));
    }
}
