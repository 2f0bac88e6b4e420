//! Scripted command runner
//!
//! A [`CommandRunner`] that never spawns anything. Every invocation is
//! recorded and answered from a rule table keyed by argv prefix, so the
//! lifecycle can be exercised in dry-run mode and in tests.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use super::command::{redact_argv, CommandOutput, CommandRunner};
use crate::error::Result;

#[derive(Debug, Clone)]
enum Behaviour {
    Succeed { delay: Duration, output: String },
    Fail { delay: Duration, exit_code: i32, output: String },
    TimeOut,
}

/// Runner answering from rules; unmatched commands succeed with no output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, Behaviour)>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, prefix: &str, behaviour: Behaviour) {
        self.rules.lock().push((prefix.to_string(), behaviour));
    }

    /// Commands starting with `prefix` exit with `exit_code`.
    pub fn fail(&self, prefix: &str, exit_code: i32, output: &str) {
        self.fail_after(prefix, Duration::ZERO, exit_code, output);
    }

    /// Like [`fail`](Self::fail), but only after `delay`.
    pub fn fail_after(&self, prefix: &str, delay: Duration, exit_code: i32, output: &str) {
        self.push(
            prefix,
            Behaviour::Fail {
                delay,
                exit_code,
                output: output.to_string(),
            },
        );
    }

    /// Commands starting with `prefix` hit their deadline.
    pub fn time_out(&self, prefix: &str) {
        self.push(prefix, Behaviour::TimeOut);
    }

    /// Commands starting with `prefix` succeed after `delay`.
    pub fn delay(&self, prefix: &str, delay: Duration) {
        self.push(
            prefix,
            Behaviour::Succeed {
                delay,
                output: String::new(),
            },
        );
    }

    /// Commands starting with `prefix` succeed and print `output`.
    pub fn respond(&self, prefix: &str, output: &str) {
        self.push(
            prefix,
            Behaviour::Succeed {
                delay: Duration::ZERO,
                output: output.to_string(),
            },
        );
    }

    /// Drop all rules; later commands succeed.
    pub fn clear_rules(&self) {
        self.rules.lock().clear();
    }

    /// Every argv received, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    /// Number of received commands starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|argv| argv.join(" ").starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<CommandOutput> {
        self.calls.lock().push(argv.to_vec());
        let line = argv.join(" ");
        info!(command = %redact_argv(argv), "Scripted command");

        let behaviour = self
            .rules
            .lock()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, b)| b.clone())
            .unwrap_or(Behaviour::Succeed {
                delay: Duration::ZERO,
                output: String::new(),
            });

        Ok(match behaviour {
            Behaviour::Succeed { delay, output } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                CommandOutput {
                    exit_code: Some(0),
                    output,
                    timed_out: false,
                    duration: delay,
                }
            }
            Behaviour::Fail {
                delay,
                exit_code,
                output,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                CommandOutput {
                    exit_code: Some(exit_code),
                    output,
                    timed_out: false,
                    duration: delay,
                }
            }
            Behaviour::TimeOut => CommandOutput {
                exit_code: None,
                output: String::new(),
                timed_out: true,
                duration: timeout,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_ok, block_on};

    fn argv(line: &str) -> Vec<String> {
        line.split(' ').map(str::to_string).collect()
    }

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let runner = ScriptedRunner::new();
        runner.fail("umount /", 32, "target is busy");
        runner.respond("umount", "");

        let graceful = assert_ok!(runner.run(&argv("umount /mnt/t"), Duration::from_secs(1)).await);
        let forced = assert_ok!(runner.run(&argv("umount -f /mnt/t"), Duration::from_secs(1)).await);

        assert!(!graceful.success());
        assert!(forced.success());
        assert_eq!(runner.count("umount"), 2);
    }

    #[test]
    fn test_unmatched_commands_succeed() {
        let runner = ScriptedRunner::new();
        let out = assert_ok!(block_on(runner.run(&argv("mount -t nfs a:/b /c"), Duration::from_secs(1))));
        assert!(out.success());
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_time_out_reports_deadline() {
        let runner = ScriptedRunner::new();
        runner.time_out("mount");
        let out = assert_ok!(block_on(runner.run(&argv("mount -t lustre m:/fs /t"), Duration::from_secs(7))));
        assert!(out.timed_out);
        assert_eq!(out.duration, Duration::from_secs(7));
        assert_eq!(out.failure_reason(Duration::from_secs(7)), "timed out after 7s");
    }
}
