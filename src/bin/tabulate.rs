//! Fuzz many patterns over a worker pool and print the 2x2 table of
//! `{static pass/fail} x {dynamic pass/fail}` ratios.

use clap::Parser;
use color_eyre::Report;
use pdlcheck::analysis::AnalysisConfig;
use pdlcheck::fuzz::{run_tabulation, TabulateOptions};
use pdlcheck::{diagnostics_setup, DEFAULT_REGISTRY};
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "tabulate",
    about = "Fuzz-differential statistics for the PDL static analyzer"
)]
struct Args {
    /// Number of patterns to test.
    #[arg(long = "n", default_value_t = 10_000)]
    num_patterns: usize,

    /// Worker count.
    #[arg(short = 'j', default_value_t = num_cpus::get())]
    workers: usize,

    /// Master seed from which every task seed is derived.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Path to the reference rewrite executable.
    #[arg(long)]
    mlir_path: Option<String>,
}

fn main() -> ExitCode {
    if diagnostics_setup().is_err() {
        return ExitCode::from(2);
    }
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:?}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> Result<(), Report> {
    let options = TabulateOptions {
        num_patterns: args.num_patterns,
        workers: args.workers,
        master_seed: args.seed,
        mlir_path: args.mlir_path.clone(),
    };
    let report = run_tabulation(&options, &DEFAULT_REGISTRY, &AnalysisConfig::default())?;
    print!("{}", report.render());
    Ok(())
}
