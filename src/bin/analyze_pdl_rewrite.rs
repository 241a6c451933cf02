//! Statically verify the dynamic well-formedness of PDL rewrite patterns.
//!
//! Exit codes: 0 when every pattern is well-formed, 1 when at least one
//! pattern aborts, 2 on an internal error.

use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use pdlcheck::analysis::{analyze_pattern, AnalysisConfig, UseCheckingStrictness};
use pdlcheck::dialects::pdl;
use pdlcheck::fuzz::generate_random_pdl_rewrite;
use pdlcheck::{diagnostics_setup, print_op, IrGraph, OpId, Parser as IrParser, DEFAULT_REGISTRY};
use std::path::PathBuf;
use std::process::ExitCode;
use yansi::Paint;

#[derive(Parser)]
#[command(
    name = "analyze-pdl-rewrite",
    about = "Check that a PDL rewrite leaves any matching IR structurally valid"
)]
struct Args {
    /// Input file holding `pdl.pattern` operations; when absent, a random
    /// pattern is generated from the seed.
    input: Option<PathBuf>,

    /// Seed for the generated pattern when no input is given.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Assume matched results have no users outside the pattern.
    #[arg(long)]
    assume_no_use_outside: bool,
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
    let patterns: Vec<OpId> = match &args.input {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("failed to read {}", path.display()))?;
            IrParser::parse_module(&text, &mut g)
                .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
            g.walk_all()
                .into_iter()
                .filter(|op| g.op_name(*op) == Some(pdl::PATTERN))
                .collect()
        }
        None => {
            let pattern = generate_random_pdl_rewrite(&mut g, args.seed);
            println!("{}", print_op(&g, pattern.0));
            vec![pattern.0]
        }
    };
    if patterns.is_empty() {
        return Err(Report::msg("no `pdl.pattern` found in the input"));
    }

    let config = AnalysisConfig {
        strictness: if args.assume_no_use_outside {
            UseCheckingStrictness::AssumeNoUseOutside
        } else {
            UseCheckingStrictness::Strict
        },
    };
    let mut all_ok = true;
    for pattern in patterns {
        let name = pdl::PatternOp::from_op(&g, pattern)
            .ok()
            .and_then(|p| p.sym_name(&g))
            .unwrap_or_else(|| format!("{}", pattern));
        match analyze_pattern(&g, pattern, &DEFAULT_REGISTRY, &config) {
            Ok(()) => println!("pattern {}: {}", name, Paint::green("OK")),
            Err(abort) => {
                all_ok = false;
                println!("pattern {}: {}", name, Paint::red(&abort));
                println!("  offending op: {}", print_op(&g, abort.op));
            }
        }
    }
    Ok(all_ok)
}
