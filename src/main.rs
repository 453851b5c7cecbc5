#![cfg(feature = "cli")]
use clap::Parser as _;

use formgram::cli::{
    report, run_coverage, run_diff, run_init, run_lint, run_parse, run_score, Args, Commands,
};

fn main() -> miette::Result<()> {
    dotenvy::dotenv().ok(); // load .env file if present

    let args = Args::parse();

    let outcome = match args.command {
        Commands::Init => run_init().map(|()| true),
        Commands::Lint { grammar } => run_lint(grammar),
        Commands::Parse {
            grammar,
            input,
            offset,
            byte_limit,
            record_limit,
            output,
        } => run_parse(grammar, input, offset, byte_limit, record_limit, &output).map(|()| true),
        Commands::Coverage { grammar, input, output } => run_coverage(grammar, input, &output).map(|()| true),
        Commands::Score { grammar, input, output } => run_score(grammar, input, &output).map(|()| true),
        Commands::Diff {
            baseline,
            candidate,
            output,
        } => run_diff(baseline, candidate, &output).map(|()| true),
    };

    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(err) => Err(report(err)),
    }
}
