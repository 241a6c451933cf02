/*!

  The fuzz-differential tabulator: many independently generated patterns,
  each analysed statically and executed through the reference engine, with
  a 2x2 pass/fail table at the end.

  Workers share nothing but a task channel, a bounded result channel, and a
  progress counter. Each task derives its RNG from its own seed, so a run
  is reproducible regardless of scheduling.

*/

use crate::analysis::{analyze_pattern, AnalysisConfig, MlirRunner, ReferenceRunner, RunOutcome};
use crate::core::{DialectRegistry, IrGraph};
use crate::dialects::pdl;
use crate::fuzz::dag::generate_all_dags;
use crate::fuzz::host::{
    build_reference_module, create_dag_in_region, for_each_placement, pdl_to_operations,
};
use crate::fuzz::pattern::generate_random_pdl_rewrite;
use color_eyre::Report;
use crossbeam_channel::bounded;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::ControlFlow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// How one fuzzed pattern fared dynamically.
#[derive(Clone, Debug)]
pub enum DynamicVerdict {
    Pass,
    /// The reference engine rejected the rewritten IR.
    ReferenceFailure(String),
    /// The reference engine hit the deadline.
    InfiniteLoop,
}

impl DynamicVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, DynamicVerdict::Pass)
    }
}

/// Run the pattern through the reference engine on fuzzed host programs.
pub fn analyze_with_reference(
    g: &mut IrGraph,
    pattern: pdl::PatternOp,
    rng: &mut StdRng,
    runner: &dyn ReferenceRunner,
    trials: usize,
) -> Result<DynamicVerdict, Report> {
    let all_dags = generate_all_dags(5);
    for _ in 0..trials {
        let (region, ops) = pdl_to_operations(g, pattern, rng)
            .map_err(|m| Report::msg(format!("host synthesis failed: {}", m)))?;
        let dag = &all_dags[rng.gen_range(0..all_dags.len())];
        create_dag_in_region(g, region, dag);
        let mut verdict = DynamicVerdict::Pass;
        let _ = for_each_placement(g, dag, region, &ops, &mut |g| {
            let module = build_reference_module(g, pattern, region);
            match runner.run(&module) {
                Ok(RunOutcome::Success(_)) => ControlFlow::Continue(()),
                Ok(RunOutcome::Failed(msg)) => {
                    verdict = DynamicVerdict::ReferenceFailure(msg);
                    ControlFlow::Break(())
                }
                Ok(RunOutcome::Timeout) => {
                    verdict = DynamicVerdict::InfiniteLoop;
                    ControlFlow::Break(())
                }
                Err(e) => {
                    verdict = DynamicVerdict::ReferenceFailure(e.to_string());
                    ControlFlow::Break(())
                }
            }
        });
        if !verdict.passed() {
            return Ok(verdict);
        }
    }
    Ok(DynamicVerdict::Pass)
}

/// One differential check: `(static passed, dynamic passed)`.
pub fn fuzz_pdl_matches(
    seed: u64,
    registry: &DialectRegistry,
    config: &AnalysisConfig,
    runner: &dyn ReferenceRunner,
) -> Result<(bool, bool), Report> {
    let mut g = IrGraph::new();
    let pattern = generate_random_pdl_rewrite(&mut g, seed);
    let static_ok = match analyze_pattern(&g, pattern.0, registry, config) {
        Ok(()) => true,
        Err(abort) => {
            debug!(seed, %abort, "static analysis rejected the pattern");
            false
        }
    };
    let mut rng = StdRng::seed_from_u64(seed);
    let dynamic = analyze_with_reference(&mut g, pattern, &mut rng, runner, 10)?;
    Ok((static_ok, dynamic.passed()))
}

/// Aggregated counts of `(static verdict, dynamic verdict)` per seed.
#[derive(Debug, Default)]
pub struct FuzzReport {
    /// `cells[static as usize][dynamic as usize]`.
    pub cells: [[Vec<u64>; 2]; 2],
    pub failed_analyses: Vec<u64>,
}

impl FuzzReport {
    pub fn record(&mut self, seed: u64, static_ok: bool, dynamic_ok: bool) {
        self.cells[static_ok as usize][dynamic_ok as usize].push(seed);
    }

    pub fn total(&self) -> usize {
        self.cells.iter().flatten().map(|v| v.len()).sum()
    }

    /// The 2x2 ratio table, in the shape used for reporting.
    pub fn render(&self) -> String {
        let count = |s: usize, d: usize| self.cells[s][d].len();
        let static_pass = count(1, 1) + count(1, 0);
        let static_fail = count(0, 1) + count(0, 0);
        let ratio = |n: usize, d: usize| {
            if d == 0 {
                0.0
            } else {
                n as f64 / d as f64
            }
        };
        let mut out = String::new();
        out.push_str(&format!(
            "{:<22} | {:>20} | {:>19} | {:>6}\n",
            "", "Passes Dynamic Check", "Fails Dynamic Check", "Total"
        ));
        out.push_str(&format!(
            "{:<22} | {:>20.4} | {:>19.4} | {:>6}\n",
            "Passes Static Check",
            ratio(count(1, 1), static_pass),
            ratio(count(1, 0), static_pass),
            static_pass
        ));
        out.push_str(&format!(
            "{:<22} | {:>20.4} | {:>19.4} | {:>6}\n",
            "Fails Static Check",
            ratio(count(0, 1), static_fail),
            ratio(count(0, 0), static_fail),
            static_fail
        ));
        out.push_str(&format!(
            "{:<22} | {:>20} | {:>19} | {:>6}\n",
            "Total",
            count(1, 1) + count(0, 1),
            count(1, 0) + count(0, 0),
            self.total()
        ));
        if !self.failed_analyses.is_empty() {
            out.push_str(&format!(
                "analysis raised an internal error on {} seed(s)\n",
                self.failed_analyses.len()
            ));
        }
        out
    }
}

pub struct TabulateOptions {
    pub num_patterns: usize,
    pub workers: usize,
    pub master_seed: u64,
    pub mlir_path: Option<String>,
}

impl Default for TabulateOptions {
    fn default() -> TabulateOptions {
        TabulateOptions {
            num_patterns: 10_000,
            workers: num_cpus::get(),
            master_seed: 42,
            mlir_path: None,
        }
    }
}

enum TaskResult {
    Classified { seed: u64, static_ok: bool, dynamic_ok: bool },
    FailedAnalysis { seed: u64 },
}

/// Run the whole tabulation over a worker pool.
pub fn run_tabulation(
    options: &TabulateOptions,
    registry: &DialectRegistry,
    config: &AnalysisConfig,
) -> Result<FuzzReport, Report> {
    let mut master = StdRng::seed_from_u64(options.master_seed);
    let seeds: Vec<u64> = (0..options.num_patterns)
        .map(|_| master.gen_range(0..1u64 << 30))
        .collect();

    let workers = options.workers.max(1);
    let (task_tx, task_rx) = bounded::<u64>(workers * 2);
    let (result_tx, result_rx) = bounded::<TaskResult>(1024);
    let progress = AtomicUsize::new(0);

    let mut report = FuzzReport::default();
    std::thread::scope(|scope| {
        for _ in 0..workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let progress = &progress;
            let runner = MlirRunner::new(options.mlir_path.clone());
            scope.spawn(move || {
                while let Ok(seed) = task_rx.recv() {
                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        fuzz_pdl_matches(seed, registry, config, &runner)
                    }));
                    let result = match outcome {
                        Ok(Ok((static_ok, dynamic_ok))) => TaskResult::Classified {
                            seed,
                            static_ok,
                            dynamic_ok,
                        },
                        Ok(Err(_)) | Err(_) => TaskResult::FailedAnalysis { seed },
                    };
                    let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % 100 == 0 {
                        info!(done, "tested patterns");
                    }
                    if result_tx.send(result).is_err() {
                        return;
                    }
                }
            });
        }
        drop(result_tx);

        scope.spawn(move || {
            for seed in seeds {
                if task_tx.send(seed).is_err() {
                    return;
                }
            }
        });

        for result in result_rx.iter() {
            match result {
                TaskResult::Classified {
                    seed,
                    static_ok,
                    dynamic_ok,
                } => report.record(seed, static_ok, dynamic_ok),
                TaskResult::FailedAnalysis { seed } => report.failed_analyses.push(seed),
            }
        }
    });
    Ok(report)
}
