//! External command boundary
//!
//! The only place in the crate that spawns processes. Commands run with a
//! hard deadline; on expiry the child is killed and a timeout outcome
//! carrying whatever it printed so far is returned instead of hanging the
//! caller.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Outcome of a command that ran to completion or was cut off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal or the deadline
    pub exit_code: Option<i32>,
    /// Combined stdout followed by stderr
    pub output: String,
    /// Whether the deadline expired
    pub timed_out: bool,
    pub duration: Duration,
}

impl CommandOutput {
    /// Exit code 0 is the only success signal.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Human readable failure reason.
    pub fn failure_reason(&self, timeout: Duration) -> String {
        if self.timed_out {
            format!("timed out after {:?}", timeout)
        } else {
            match self.exit_code {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            }
        }
    }
}

/// Port for running external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv` (program first) under `timeout`.
    ///
    /// `Err` only when the program could not be started; non-zero exits and
    /// timeouts are reported through [`CommandOutput`].
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

/// Time allowed for output readers to reach EOF once the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Collects a child's stdout and stderr while it runs, so output written
/// before a kill is kept.
struct OutputCapture {
    stdout: Arc<Mutex<Vec<u8>>>,
    stderr: Arc<Mutex<Vec<u8>>>,
    readers: Vec<JoinHandle<()>>,
}

impl OutputCapture {
    fn start(child: &mut Child) -> Self {
        let (stdout, out_reader) = Self::drain(child.stdout.take());
        let (stderr, err_reader) = Self::drain(child.stderr.take());
        Self {
            stdout,
            stderr,
            readers: vec![out_reader, err_reader],
        }
    }

    fn drain<R>(pipe: Option<R>) -> (Arc<Mutex<Vec<u8>>>, JoinHandle<()>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let reader = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink.lock().extend_from_slice(&chunk[..n]),
                }
            }
        });
        (buf, reader)
    }

    /// Wait up to `grace` for the readers, then stop them and return
    /// stdout followed by stderr.
    async fn finish(mut self, grace: Duration) -> String {
        // grandchildren may still hold the pipes open
        let _ = tokio::time::timeout(grace, join_all(self.readers.iter_mut())).await;
        for reader in &self.readers {
            reader.abort();
        }
        let mut output = String::from_utf8_lossy(&self.stdout.lock()).into_owned();
        output.push_str(&String::from_utf8_lossy(&self.stderr.lock()));
        output
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Internal("empty command line".into()))?;

        let start = Instant::now();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::CommandFailed {
                command: program.clone(),
                reason: format!("failed to spawn: {}", e),
                output: String::new(),
            })?;
        let capture = OutputCapture::start(&mut child);

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let grace = timeout.saturating_sub(start.elapsed()).max(DRAIN_GRACE);
                let result = CommandOutput {
                    exit_code: status.code(),
                    output: capture.finish(grace).await,
                    timed_out: false,
                    duration: start.elapsed(),
                };
                debug!(
                    program = %program,
                    exit_code = ?result.exit_code,
                    elapsed_ms = result.duration.as_millis() as u64,
                    "Command finished"
                );
                Ok(result)
            }
            Ok(Err(e)) => Err(Error::CommandFailed {
                command: program.clone(),
                reason: format!("failed to wait: {}", e),
                output: capture.finish(Duration::ZERO).await,
            }),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    debug!(program = %program, error = %e, "Kill after timeout failed");
                }
                let output = capture.finish(DRAIN_GRACE).await;
                warn!(program = %program, ?timeout, output = %output.trim(), "Command timed out, killed");
                Ok(CommandOutput {
                    exit_code: None,
                    output,
                    timed_out: true,
                    duration: start.elapsed(),
                })
            }
        }
    }
}

/// Render argv for logs with credential options masked.
pub fn redact_argv(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            arg.split(',')
                .map(|opt| match opt.split_once('=') {
                    Some((key, _)) if matches!(key, "secret" | "password" | "secretfile") => {
                        format!("{}=***", key)
                    }
                    _ => opt.to_string(),
                })
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join(" ")
}
