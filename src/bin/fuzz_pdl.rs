//! Differentially check one PDL pattern: the static analyzer's verdict
//! against the external reference engine on fuzzed host programs.

use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use pdlcheck::analysis::{analyze_pattern, AnalysisConfig, MlirRunner};
use pdlcheck::dialects::pdl;
use pdlcheck::fuzz::{analyze_with_reference, generate_random_pdl_rewrite, DynamicVerdict};
use pdlcheck::{diagnostics_setup, print_op, IrGraph, Parser as IrParser, DEFAULT_REGISTRY};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "fuzz-pdl",
    about = "Differentially test one PDL pattern against the reference rewrite engine"
)]
struct Args {
    /// Input file holding one `pdl.pattern`; when absent, a random pattern
    /// is generated from the seed.
    input: Option<PathBuf>,

    /// Seed for pattern generation and host-IR fuzzing.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Path to the reference rewrite executable (defaults to `mlir-opt`
    /// found on PATH).
    #[arg(long)]
    mlir_path: Option<String>,
}

fn main() -> ExitCode {
    if diagnostics_setup().is_err() {
        return ExitCode::from(2);
    }
    let args = Args::parse();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{:?}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> Result<bool, Report> {
    let mut g = IrGraph::new();
    let pattern = match &args.input {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("failed to read {}", path.display()))?;
            IrParser::parse_module(&text, &mut g)
                .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
            let op = g
                .walk_all()
                .into_iter()
                .find(|op| g.op_name(*op) == Some(pdl::PATTERN))
                .ok_or_else(|| Report::msg("no `pdl.pattern` found in the input"))?;
            pdl::PatternOp::from_op(&g, op).map_err(|m| Report::msg(m.to_string()))?
        }
        None => generate_random_pdl_rewrite(&mut g, args.seed),
    };
    println!("{}", print_op(&g, pattern.0));

    let config = AnalysisConfig::default();
    let static_verdict = analyze_pattern(&g, pattern.0, &DEFAULT_REGISTRY, &config);
    match &static_verdict {
        Ok(()) => println!("static analysis: OK"),
        Err(abort) => println!("static analysis: {}", abort),
    }

    let runner = MlirRunner::new(args.mlir_path.clone());
    let mut rng = StdRng::seed_from_u64(args.seed);
    let dynamic = analyze_with_reference(&mut g, pattern, &mut rng, &runner, 10)?;
    match &dynamic {
        DynamicVerdict::Pass => println!("reference engine: OK"),
        DynamicVerdict::ReferenceFailure(msg) => {
            println!("reference engine: rewrite failed\n{}", msg)
        }
        DynamicVerdict::InfiniteLoop => println!("reference engine: timeout (infinite loop?)"),
    }
    Ok(static_verdict.is_ok() && dynamic.passed())
}
