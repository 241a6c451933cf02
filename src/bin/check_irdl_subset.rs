//! Encode one `irdl_ext.check_subset` program and discharge it to the
//! solver. Prints `sat` with the counter-example model, or `unsat`.

use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use pdlcheck::dialects::irdl::{self, CheckSubsetOp};
use pdlcheck::smt::{encode_check_subset, restore_yield_name_hints, Solver, SolverVerdict, Z3Process};
use pdlcheck::{diagnostics_setup, IrGraph, Parser as IrParser};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "check-irdl-subset",
    about = "Check whether one IRDL constraint set is a subset of another"
)]
struct Args {
    /// Input file; stdin when absent.
    input: Option<PathBuf>,

    /// Path to the SMT solver executable.
    #[arg(long)]
    solver: Option<String>,

    /// Print the generated SMT-LIB script.
    #[arg(long)]
    debug: bool,
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
    let text = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut s = String::new();
            std::io::stdin().read_to_string(&mut s)?;
            s
        }
    };
    let mut g = IrGraph::new();
    IrParser::parse_module(&text, &mut g).wrap_err("failed to parse the input")?;
    let check = g
        .walk_all()
        .into_iter()
        .filter(|op| g.op_name(*op) == Some(irdl::CHECK_SUBSET))
        .last()
        .ok_or_else(|| Report::msg("no `irdl_ext.check_subset` found in the input"))?;
    let check = CheckSubsetOp::from_op(&g, check).map_err(|m| Report::msg(m.to_string()))?;

    restore_yield_name_hints(&mut g, check);
    let script = encode_check_subset(&g, check)?;
    if args.debug {
        eprintln!("{}", script);
    }
    let mut solver = Z3Process::new(args.solver.clone());
    match solver.check(&script)? {
        SolverVerdict::Unsat => {
            println!("unsat");
            Ok(true)
        }
        SolverVerdict::Sat { model } => {
            println!("sat");
            print!("{}", model);
            Ok(false)
        }
        SolverVerdict::Unknown => {
            println!("unknown");
            Ok(false)
        }
    }
}
