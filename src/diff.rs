//! Diff and scoring: compare two run artifacts, compute a bounded 0-100 quality score (§4.M)
use serde::Serialize;

use crate::run::RunArtifact;

/// The hard gate names used by [`score_run`] (§4.M).
pub const GATE_PARSE_ADVANCED: &str = "parse_advanced";
pub const GATE_NO_SAFETY_VIOLATIONS: &str = "no_safety_violations";

/// Deterministic comparison of two [`RunArtifact`]s (§4.M `diff`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDiff {
    pub coverage_delta: f64,
    pub error_delta: i64,
    pub anomaly_delta: i64,
    pub record_count_delta: i64,
    pub is_improvement: bool,
    pub summary: String,
}

/// Compare a baseline and candidate run (§4.M `diff(baseline, candidate)`).
#[must_use]
pub fn diff_runs(baseline: &RunArtifact, candidate: &RunArtifact) -> RunDiff {
    let coverage_delta = candidate.stats.coverage_percentage - baseline.stats.coverage_percentage;
    let error_delta = candidate.stats.error_count as i64 - baseline.stats.error_count as i64;
    let anomaly_delta = candidate.stats.anomaly_count as i64 - baseline.stats.anomaly_count as i64;
    let record_count_delta = candidate.stats.record_count as i64 - baseline.stats.record_count as i64;
    let high_severity_increased =
        candidate.stats.high_severity_anomalies > baseline.stats.high_severity_anomalies;
    let is_improvement = coverage_delta >= 0.0 && error_delta <= 0 && !high_severity_increased;

    let summary = if is_improvement {
        format!("coverage {coverage_delta:+.1}pp, errors {error_delta:+}: improvement")
    } else {
        format!("coverage {coverage_delta:+.1}pp, errors {error_delta:+}: regression or no change")
    };

    RunDiff {
        coverage_delta,
        error_delta,
        anomaly_delta,
        record_count_delta,
        is_improvement,
        summary,
    }
}

/// Soft-metric and hard-gate breakdown of a single run's quality (§4.M `score`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub total_score: f64,
    pub passed_hard_gates: bool,
    pub failed_gates: Vec<String>,
    pub coverage_score: f64,
    pub quality_score: f64,
    pub soft_metrics: Vec<(String, f64)>,
    pub penalties: Vec<(String, f64)>,
    pub summary: String,
}

/// Score a run against its own stats, with hard gates zeroing the total on failure (§4.M).
///
/// `baseline`, if given, only changes `summary`'s wording (the total is derived from `run` alone,
/// per spec).
#[must_use]
pub fn score_run(run: &RunArtifact, baseline: Option<&RunArtifact>) -> ScoreBreakdown {
    let mut failed_gates = Vec::new();
    let parse_advanced = run.stats.parse_stopped_at > 0 || run.stats.record_count > 0;
    if !parse_advanced {
        failed_gates.push(GATE_PARSE_ADVANCED.to_owned());
    }
    if run.stats.high_severity_anomalies != 0 {
        failed_gates.push(GATE_NO_SAFETY_VIOLATIONS.to_owned());
    }

    if !failed_gates.is_empty() {
        return ScoreBreakdown {
            total_score: 0.0,
            passed_hard_gates: false,
            failed_gates,
            coverage_score: 0.0,
            quality_score: 0.0,
            soft_metrics: Vec::new(),
            penalties: Vec::new(),
            summary: "failed hard gate(s), total score is 0".to_owned(),
        };
    }

    let coverage_score = run.stats.coverage_percentage * 0.7;
    let quality_score = (30.0
        - 3.0 * run.stats.error_count as f64
        - 1.0 * run.stats.anomaly_count as f64)
        .max(0.0);
    let total_score = (coverage_score + quality_score).clamp(0.0, 100.0);
    let total_score = (total_score * 10.0).round() / 10.0;

    let summary = match baseline {
        Some(baseline) => {
            let delta = diff_runs(baseline, run);
            format!(
                "score {total_score:.1}/100 (coverage {coverage_score:.1}, quality {quality_score:.1}); \
                 vs baseline: coverage {:+.1}pp, errors {:+}",
                delta.coverage_delta, delta.error_delta
            )
        }
        None => format!("score {total_score:.1}/100 (coverage {coverage_score:.1}, quality {quality_score:.1})"),
    };

    ScoreBreakdown {
        total_score,
        passed_hard_gates: true,
        failed_gates: Vec::new(),
        coverage_score,
        quality_score,
        soft_metrics: vec![
            ("coverage_score".to_owned(), coverage_score),
            ("quality_score".to_owned(), quality_score),
        ],
        penalties: Vec::new(),
        summary,
    }
}

/// Rank candidate runs by `(total_score desc, coverage desc, error_count asc, anomaly_count asc,
/// created_at asc)` (§4.M "Ranking").
pub fn rank<'a>(runs: &[(&'a RunArtifact, ScoreBreakdown)]) -> Vec<&'a RunArtifact> {
    let mut ranked: Vec<&(&RunArtifact, ScoreBreakdown)> = runs.iter().collect();
    ranked.sort_by(|(run_a, score_a), (run_b, score_b)| {
        score_b
            .total_score
            .partial_cmp(&score_a.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                run_b
                    .stats
                    .coverage_percentage
                    .partial_cmp(&run_a.stats.coverage_percentage)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| run_a.stats.error_count.cmp(&run_b.stats.error_count))
            .then_with(|| run_a.stats.anomaly_count.cmp(&run_b.stats.anomaly_count))
            .then_with(|| run_a.created_at.cmp(&run_b.created_at))
    });
    ranked.into_iter().map(|(run, _)| *run).collect()
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::{parse::ParseResult, run::RunStats};

    fn artifact(stats: RunStats) -> RunArtifact {
        RunArtifact {
            run_id: "test".to_owned(),
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

    #[test]
    fn s6_scoring_baseline() {
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

    #[test]
    fn s5_hard_gate_failure_zeroes_the_score() {
        let run = artifact(RunStats {
            record_count: 0,
            total_bytes_parsed: 0,
            parse_stopped_at: 0,
            file_size: 10,
            coverage_percentage: 0.0,
            error_count: 1,
            anomaly_count: 0,
            high_severity_anomalies: 0,
        });
        let score = score_run(&run, None);
        assert_eq!(score.total_score, 0.0);
        assert!(!score.passed_hard_gates);
        assert!(score.failed_gates.contains(&GATE_PARSE_ADVANCED.to_owned()));
    }

    #[test]
    fn diff_of_identical_runs_is_an_improvement() {
        let run = artifact(RunStats {
            record_count: 1,
            total_bytes_parsed: 1,
            parse_stopped_at: 1,
            file_size: 10,
            coverage_percentage: 50.0,
            error_count: 0,
            anomaly_count: 0,
            high_severity_anomalies: 0,
        });
        assert!(diff_runs(&run, &run).is_improvement);
    }
}
