//! Coverage analyzer: merge parsed ranges, find gaps, report percentage (§4.G)
use serde::Serialize;

use crate::parse::ParseResult;

/// A half-open `[start, end)` gap in coverage.
pub type Gap = (u64, u64);

/// Coverage over a single input, derived from a [`ParseResult`] and the file's total size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub file_size: u64,
    pub bytes_covered: u64,
    pub bytes_uncovered: u64,
    pub coverage_percentage: f64,
    pub gaps: Vec<Gap>,
    pub record_count: usize,
    pub largest_gap: Option<Gap>,
}

/// Merge the ranges of error-free records and report coverage (§4.G).
///
/// An empty file has zero gaps and 0% coverage. A file with no successfully parsed records has
/// a single gap spanning the whole file and 0% coverage.
#[must_use]
pub fn analyze_coverage(result: &ParseResult, file_size: u64) -> CoverageReport {
    if file_size == 0 {
        return CoverageReport {
            file_size: 0,
            bytes_covered: 0,
            bytes_uncovered: 0,
            coverage_percentage: 0.0,
            gaps: Vec::new(),
            record_count: result.records.len(),
            largest_gap: None,
        };
    }

    let mut ranges: Vec<(u64, u64)> = result
        .records
        .iter()
        .filter(|r| r.error.is_none())
        .map(|r| (r.offset, r.offset + r.size))
        .collect();
    ranges.sort_unstable_by_key(|&(start, _)| start);

    let mut merged: Vec<(u64, u64)> = Vec::new();
    for (start, end) in ranges {
        match merged.last_mut() {
            Some((_, last_end)) if start <= *last_end => {
                *last_end = (*last_end).max(end);
            }
            _ => merged.push((start, end)),
        }
    }

    let mut gaps = Vec::new();
    let mut cursor = 0u64;
    for &(start, end) in &merged {
        if start > cursor {
            gaps.push((cursor, start));
        }
        cursor = cursor.max(end);
    }
    if cursor < file_size {
        gaps.push((cursor, file_size));
    }

    let bytes_covered: u64 = merged.iter().map(|(s, e)| e - s).sum();
    let bytes_uncovered = file_size - bytes_covered;
    let coverage_percentage = 100.0 * bytes_covered as f64 / file_size as f64;

    let largest_gap = gaps
        .iter()
        .copied()
        .max_by(|a, b| {
            let len_a = a.1 - a.0;
            let len_b = b.1 - b.0;
            len_a.cmp(&len_b).then_with(|| b.0.cmp(&a.0))
        });

    CoverageReport {
        file_size,
        bytes_covered,
        bytes_uncovered,
        coverage_percentage,
        gaps,
        record_count: result.records.len(),
        largest_gap,
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::parse::ParsedRecord;

    fn record(offset: u64, size: u64, error: Option<&str>) -> ParsedRecord {
        ParsedRecord {
            offset,
            size,
            type_name: "R".to_owned(),
            fields: Vec::new(),
            type_discriminator: None,
            error: error.map(str::to_owned),
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
    fn s4_coverage_with_gaps() {
        let result = result(vec![record(0, 4, None), record(10, 6, None)]);
        let report = analyze_coverage(&result, 20);
        assert_eq!(report.gaps, vec![(4, 10), (16, 20)]);
        assert_eq!(report.coverage_percentage, 50.0);
        assert_eq!(report.largest_gap, Some((4, 10)));
    }

    #[test]
    fn empty_file_has_no_gaps() {
        let result = result(Vec::new());
        let report = analyze_coverage(&result, 0);
        assert_eq!(report.coverage_percentage, 0.0);
        assert!(report.gaps.is_empty());
    }

    #[test]
    fn no_records_is_one_full_gap() {
        let result = result(Vec::new());
        let report = analyze_coverage(&result, 10);
        assert_eq!(report.gaps, vec![(0, 10)]);
        assert_eq!(report.coverage_percentage, 0.0);
    }

    #[test]
    fn errored_records_do_not_count_as_covered() {
        let result = result(vec![record(0, 4, Some("boom"))]);
        let report = analyze_coverage(&result, 10);
        assert_eq!(report.gaps, vec![(0, 10)]);
    }
}
