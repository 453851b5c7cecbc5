#![allow(clippy::doc_markdown)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod color;
pub mod coverage;
pub mod decode;
pub mod diff;
pub mod error;
pub mod expr;
pub mod grammar;
pub mod lint;
pub mod parse;
pub mod patch;
pub mod query;
pub mod reader;
pub mod run;
pub mod span;
pub mod store;

#[cfg_attr(docsrs, doc(cfg(feature = "cli")))]
#[cfg(feature = "cli")]
pub mod cli;
#[cfg_attr(docsrs, doc(cfg(feature = "cli")))]
#[cfg(feature = "cli")]
pub mod config;

pub use coverage::analyze_coverage;
pub use decode::decode_field;
pub use diff::{diff_runs, score_run};
pub use lint::lint_grammar;
pub use parse::parse_binary;
pub use query::query_records;
pub use span::generate_spans;
pub use store::{apply_patch, create_initial_version};
