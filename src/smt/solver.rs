/*!

  The SMT solver seam. The solver is a black box behind the `Solver`
  trait; the default implementation drives a `z3 -in` child process over
  SMT-LIB 2 text. Workers each own a fresh instance, so no locking is
  needed anywhere in the crate.

*/

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("failed to launch the solver `{0}`: {1}")]
    Launch(String, String),
    #[error("solver protocol error: {0}")]
    Protocol(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SolverVerdict {
    /// A counter-example exists; the model assigns the yielded values.
    Sat { model: String },
    Unsat,
    Unknown,
}

pub trait Solver {
    fn check(&mut self, script: &str) -> Result<SolverVerdict, SolverError>;
}

/// Pipes the script to a `z3` child process and asks for a model on `sat`.
#[derive(Clone, Debug)]
pub struct Z3Process {
    pub executable: String,
}

impl Z3Process {
    pub fn new(executable: Option<String>) -> Z3Process {
        Z3Process {
            executable: executable.unwrap_or_else(|| "z3".to_string()),
        }
    }

    /// Whether the solver binary can be spawned at all.
    pub fn available(&self) -> bool {
        Command::new(&self.executable)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Solver for Z3Process {
    fn check(&mut self, script: &str) -> Result<SolverVerdict, SolverError> {
        let mut child = Command::new(&self.executable)
            .arg("-in")
            .arg("-smt2")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SolverError::Launch(self.executable.clone(), e.to_string()))?;

        let mut stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let mut reader = BufReader::new(stdout);

        let send = |stdin: &mut std::process::ChildStdin, text: &str| {
            stdin
                .write_all(text.as_bytes())
                .and_then(|_| stdin.flush())
                .map_err(|e| SolverError::Protocol(e.to_string()))
        };
        send(&mut stdin, script)?;
        send(&mut stdin, "(check-sat)\n")?;

        let mut line = String::new();
        let verdict = loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .map_err(|e| SolverError::Protocol(e.to_string()))?;
            if read == 0 {
                return Err(SolverError::Protocol(
                    "solver exited before answering".to_string(),
                ));
            }
            match line.trim() {
                "sat" => break SolverVerdict::Sat {
                    model: String::new(),
                },
                "unsat" => break SolverVerdict::Unsat,
                "unknown" => break SolverVerdict::Unknown,
                other if other.starts_with("(error") => {
                    return Err(SolverError::Protocol(other.to_string()));
                }
                _ => continue,
            }
        };
        debug!(verdict = ?verdict, "solver answered");

        let verdict = match verdict {
            SolverVerdict::Sat { .. } => {
                send(&mut stdin, "(get-model)\n(exit)\n")?;
                drop(stdin);
                let mut model = String::new();
                reader
                    .read_to_string(&mut model)
                    .map_err(|e| SolverError::Protocol(e.to_string()))?;
                SolverVerdict::Sat { model }
            }
            other => {
                send(&mut stdin, "(exit)\n")?;
                drop(stdin);
                other
            }
        };
        child.wait().ok();
        Ok(verdict)
    }
}
