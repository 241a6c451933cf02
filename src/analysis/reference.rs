/*!

  Invocation of the external reference rewrite engine used for differential
  testing. The engine is behind the `ReferenceRunner` trait; the default
  implementation shells out to `mlir-opt` with a fixed deadline.

*/

use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use crossbeam_channel::bounded;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

/// The outcome of one reference run. A failure or timeout is a
/// classification, not an error: both feed the disagreement table.
#[derive(Clone, Debug)]
pub enum RunOutcome {
    Success(String),
    Failed(String),
    Timeout,
}

pub trait ReferenceRunner {
    fn run(&self, module_text: &str) -> Result<RunOutcome, Report>;
}

/// Runs `mlir-opt --test-pdl-bytecode-pass` on a module holding the pattern
/// and the host IR.
#[derive(Clone, Debug)]
pub struct MlirRunner {
    pub executable: String,
    pub timeout: Duration,
}

impl MlirRunner {
    pub fn new(executable: Option<String>) -> MlirRunner {
        MlirRunner {
            executable: executable.unwrap_or_else(|| "mlir-opt".to_string()),
            timeout: Duration::from_secs(3),
        }
    }
}

impl ReferenceRunner for MlirRunner {
    fn run(&self, module_text: &str) -> Result<RunOutcome, Report> {
        let mut child = Command::new(&self.executable)
            .arg("--mlir-print-op-generic")
            .arg("-allow-unregistered-dialect")
            .arg("--test-pdl-bytecode-pass")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .wrap_err_with(|| format!("failed to spawn `{}`", self.executable))?;

        child
            .stdin
            .take()
            .expect("stdin was piped")
            .write_all(module_text.as_bytes())
            .wrap_err("failed to write the module to the reference engine")?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        let (out_tx, out_rx) = bounded(1);
        let (err_tx, err_rx) = bounded(1);
        std::thread::spawn(move || {
            let mut s = String::new();
            let mut stdout = stdout;
            std::io::Read::read_to_string(&mut stdout, &mut s).ok();
            out_tx.send(s).ok();
        });
        std::thread::spawn(move || {
            let mut s = String::new();
            let mut stderr = stderr;
            std::io::Read::read_to_string(&mut stderr, &mut s).ok();
            err_tx.send(s).ok();
        });

        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait().wrap_err("failed to wait for the engine")? {
                let out = out_rx.recv_timeout(Duration::from_secs(1)).unwrap_or_default();
                let err = err_rx.recv_timeout(Duration::from_secs(1)).unwrap_or_default();
                debug!(status = ?status, "reference engine finished");
                if status.success() {
                    return Ok(RunOutcome::Success(out));
                }
                return Ok(RunOutcome::Failed(err));
            }
            if Instant::now() >= deadline {
                debug!("reference engine timed out");
                child.kill().ok();
                child.wait().ok();
                return Ok(RunOutcome::Timeout);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
