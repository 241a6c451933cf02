//! Verify that every PDL rewrite in the input preserves the invariants of
//! the IRDL dialect specification: lower each pattern to a subset check,
//! simplify it, and discharge it to the solver.

use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use pdlcheck::dialects::pdl;
use pdlcheck::passes::{lower_pattern, optimize_irdl};
use pdlcheck::smt::{encode_check_subset, restore_yield_name_hints, Solver, SolverVerdict, Z3Process};
use pdlcheck::{diagnostics_setup, IrGraph, OpId, Parser as IrParser};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "analyze-irdl-invariants",
    about = "Prove PDL rewrites type-safe against an IRDL specification"
)]
struct Args {
    /// File holding the PDL patterns.
    input: PathBuf,

    /// File holding the IRDL dialect definitions.
    irdl: PathBuf,

    /// Path to the SMT solver executable.
    #[arg(long)]
    solver: Option<String>,

    /// Print intermediate programs and the SMT-LIB script.
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    if diagnostics_setup().is_err() {
        return ExitCode::from(2);
    }
    let args = Args::parse();
    match run(&args) {
        Ok(true) => {
            println!("all patterns will not break IRDL invariants");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            println!("some patterns may break IRDL invariants");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("{:?}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> Result<bool, Report> {
    let pdl_text = std::fs::read_to_string(&args.input)
        .wrap_err_with(|| format!("failed to read {}", args.input.display()))?;
    let irdl_text = std::fs::read_to_string(&args.irdl)
        .wrap_err_with(|| format!("failed to read {}", args.irdl.display()))?;

    let pattern_count = {
        let mut g = IrGraph::new();
        IrParser::parse_module(&pdl_text, &mut g).wrap_err("failed to parse the PDL input")?;
        collect_patterns(&g).len()
    };
    if pattern_count == 0 {
        return Err(Report::msg("no `pdl.pattern` found in the input"));
    }

    let mut all_safe = true;
    for index in 0..pattern_count {
        // Each pattern gets a fresh graph holding the IRDL specification
        // and only that pattern.
        let mut g = IrGraph::new();
        IrParser::parse_module(&irdl_text, &mut g).wrap_err("failed to parse the IRDL input")?;
        IrParser::parse_module(&pdl_text, &mut g).wrap_err("failed to parse the PDL input")?;
        let patterns = collect_patterns(&g);
        for (i, other) in patterns.iter().enumerate() {
            if i != index {
                g.erase_op(*other);
            }
        }
        let pattern = pdl::PatternOp::from_op(&g, patterns[index])
            .map_err(|m| Report::msg(m.to_string()))?;
        let name = pattern
            .sym_name(&g)
            .unwrap_or_else(|| format!("#{}", index));
        println!("pattern {}", name);

        let check = lower_pattern(&mut g, pattern)?;
        if args.debug {
            eprintln!("converted program before optimization:\n{}", pdlcheck::print_op(&g, check.0));
        }
        optimize_irdl(&mut g, check.0)?;
        if args.debug {
            eprintln!("converted program after optimization:\n{}", pdlcheck::print_op(&g, check.0));
        }
        restore_yield_name_hints(&mut g, check);
        let script = encode_check_subset(&g, check)?;
        if args.debug {
            eprintln!("{}", script);
        }
        let mut solver = Z3Process::new(args.solver.clone());
        match solver.check(&script)? {
            SolverVerdict::Unsat => {
                println!("unsat: PDL rewrite will not break IRDL invariants")
            }
            SolverVerdict::Sat { model } => {
                println!("sat: PDL rewrite may break IRDL invariants");
                print!("model: {}", model);
                all_safe = false;
            }
            SolverVerdict::Unknown => {
                println!("unknown: the solver could not decide the query");
                all_safe = false;
            }
        }
    }
    Ok(all_safe)
}

fn collect_patterns(g: &IrGraph) -> Vec<OpId> {
    g.walk_all()
        .into_iter()
        .filter(|op| g.op_name(*op) == Some(pdl::PATTERN))
        .collect()
}
