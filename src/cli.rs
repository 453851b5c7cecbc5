use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use miette::{miette, Report};

use crate::{
    config::{read_config, write_default_config, OutputArgs},
    coverage::analyze_coverage,
    diff::{diff_runs, score_run},
    error::{Error, Result},
    lint::lint_grammar,
    parse::parse_binary,
    reader::OwnedReader,
    run::build_run_artifact,
};

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create a `.formgram.toml` config file with default values
    Init,

    /// Validate a grammar file and report errors and warnings
    Lint {
        /// Path to the grammar file
        #[arg(value_hint = clap::ValueHint::FilePath)]
        grammar: PathBuf,
    },

    /// Parse a binary file against a grammar and print the resulting records
    Parse {
        /// Path to the grammar file
        #[arg(value_hint = clap::ValueHint::FilePath)]
        grammar: PathBuf,

        /// Path to the binary input file
        #[arg(value_hint = clap::ValueHint::FilePath)]
        input: PathBuf,

        /// Start parsing at this byte offset
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Stop after this many bytes have been parsed
        #[arg(long)]
        byte_limit: Option<u64>,

        /// Stop after this many records have been parsed
        #[arg(long)]
        record_limit: Option<usize>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Report byte coverage of a grammar's parse over a binary file
    Coverage {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        grammar: PathBuf,

        #[arg(value_hint = clap::ValueHint::FilePath)]
        input: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Parse, build a run artifact, and print its quality score
    Score {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        grammar: PathBuf,

        #[arg(value_hint = clap::ValueHint::FilePath)]
        input: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Compare two previously-saved run artifacts (as written by `score --json`)
    Diff {
        /// Path to the baseline run artifact JSON
        #[arg(value_hint = clap::ValueHint::FilePath)]
        baseline: PathBuf,

        /// Path to the candidate run artifact JSON
        #[arg(value_hint = clap::ValueHint::FilePath)]
        candidate: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

/// Canonicalize a user-supplied path, matching the teacher's path handling for every path
/// argument. `dunce::canonicalize` avoids the `\\?\` UNC prefix `std::fs::canonicalize` adds on
/// Windows, so error messages and output stay readable there.
fn canonicalize(path: &Path) -> Result<PathBuf> {
    dunce::canonicalize(path).map_err(|err| Error::Io {
        path: path.to_path_buf(),
        err,
    })
}

fn read_grammar_text(path: &PathBuf) -> Result<String> {
    let path = canonicalize(path)?;
    fs::read_to_string(&path).map_err(|err| Error::Io { path, err })
}

fn emit<T: serde::Serialize>(value: &T, output: &OutputArgs, human: impl FnOnce() -> String) -> Result<()> {
    let rendered = if output.json {
        if output.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        }
    } else {
        human()
    };
    match &output.out {
        Some(path) => std::fs::write(path, rendered + "\n").map_err(|err| Error::Io {
            path: path.clone(),
            err,
        }),
        None => {
            println!("{rendered}");
            Ok(())
        }
    }
}

/// Run the `init` subcommand.
pub fn run_init() -> Result<()> {
    let path = write_default_config()?;
    println!("Default config was written to {}", path.display());
    Ok(())
}

/// Run the `lint` subcommand. Returns `Ok(false)` (no hard error) when the grammar is invalid, so
/// `main` can set the process exit code without treating an invalid grammar as a crash.
pub fn run_lint(grammar: PathBuf) -> Result<bool> {
    let text = read_grammar_text(&grammar)?;
    let (_ast, errors, warnings) = lint_grammar(&text);
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    for error in &errors {
        eprintln!("error: {error}");
    }
    if errors.is_empty() {
        println!("{}: grammar is valid ({} warning(s))", grammar.display(), warnings.len());
    }
    Ok(errors.is_empty())
}

fn lint_or_report(grammar_text: &str) -> Result<crate::grammar::Grammar> {
    let (ast, errors, _warnings) = lint_grammar(grammar_text);
    match ast {
        Some(grammar) if errors.is_empty() => Ok(grammar),
        _ => Err(Error::Lint(errors.len())),
    }
}

pub fn run_parse(
    grammar: PathBuf,
    input: PathBuf,
    offset: u64,
    byte_limit: Option<u64>,
    record_limit: Option<usize>,
    output: &OutputArgs,
) -> Result<()> {
    let config = read_config(output)?;
    let output = resolve_output(output, &config);
    let byte_limit = byte_limit.or(config.byte_limit);
    let record_limit = record_limit.or(config.record_limit);

    let grammar_text = read_grammar_text(&grammar)?;
    let grammar = lint_or_report(&grammar_text)?;
    let input = canonicalize(&input)?;
    let reader = OwnedReader::from_path(&input).map_err(|err| Error::Io {
        path: input.clone(),
        err,
    })?;
    let result = parse_binary(&grammar, &reader.as_reader(), offset, byte_limit, record_limit);
    emit(&result, &output, || {
        format!(
            "parsed {} record(s), {} byte(s), stopped at {}, {} error(s)",
            result.record_count,
            result.total_bytes_parsed,
            result.parse_stopped_at,
            result.errors.len()
        )
    })
}

pub fn run_coverage(grammar: PathBuf, input: PathBuf, output: &OutputArgs) -> Result<()> {
    let output = resolve_output(output, &read_config(output)?);
    let grammar_text = read_grammar_text(&grammar)?;
    let grammar = lint_or_report(&grammar_text)?;
    let input = canonicalize(&input)?;
    let reader = OwnedReader::from_path(&input).map_err(|err| Error::Io {
        path: input.clone(),
        err,
    })?;
    let result = parse_binary(&grammar, &reader.as_reader(), 0, None, None);
    let report = analyze_coverage(&result, reader.as_reader().len());
    emit(&report, &output, || {
        format!(
            "{:.1}% covered, {} gap(s), largest {:?}",
            report.coverage_percentage,
            report.gaps.len(),
            report.largest_gap
        )
    })
}

pub fn run_score(grammar: PathBuf, input: PathBuf, output: &OutputArgs) -> Result<()> {
    let output = resolve_output(output, &read_config(output)?);
    let grammar_text = read_grammar_text(&grammar)?;
    let grammar = lint_or_report(&grammar_text)?;
    let input = canonicalize(&input)?;
    let reader = OwnedReader::from_path(&input).map_err(|err| Error::Io {
        path: input.clone(),
        err,
    })?;
    let file_size = reader.as_reader().len();
    let result = parse_binary(&grammar, &reader.as_reader(), 0, None, None);
    let artifact = build_run_artifact(result, &grammar, None, file_size);
    let breakdown = score_run(&artifact, None);
    emit(&breakdown, &output, || breakdown.summary.clone())
}

pub fn run_diff(baseline: PathBuf, candidate: PathBuf, output: &OutputArgs) -> Result<()> {
    let output = resolve_output(output, &read_config(output)?);
    let baseline = canonicalize(&baseline)?;
    let candidate = canonicalize(&candidate)?;
    let baseline_text = fs::read_to_string(&baseline).map_err(|err| Error::Io {
        path: baseline.clone(),
        err,
    })?;
    let candidate_text = fs::read_to_string(&candidate).map_err(|err| Error::Io {
        path: candidate.clone(),
        err,
    })?;
    let baseline: crate::run::RunArtifact = serde_json::from_str(&baseline_text)?;
    let candidate: crate::run::RunArtifact = serde_json::from_str(&candidate_text)?;
    let result = diff_runs(&baseline, &candidate);
    emit(&result, &output, || result.summary.clone())
}

/// Convert a terminal [`Error`] into a [`miette::Report`] for display.
#[must_use]
pub fn report(error: Error) -> Report {
    miette!("{error}")
}

/// Apply a resolved [`Config`](crate::config::Config)'s `json`/`compact` defaults to a
/// subcommand's [`OutputArgs`], letting an explicit `--json`/`--compact` flag win.
fn resolve_output(output: &OutputArgs, config: &crate::config::Config) -> OutputArgs {
    OutputArgs {
        json: output.json || config.json,
        compact: output.compact || config.compact,
        out: output.out.clone(),
    }
}
