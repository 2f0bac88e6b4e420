//! Mount Executor
//!
//! Process orchestration for OS-level mounts. This module owns the only
//! process-spawning code in the crate ([`ProcessRunner`]); everything that
//! needs an external program (mount, umount, stripe tooling) goes through
//! the [`CommandRunner`] port.

mod command;
mod executor;
mod scripted;

pub use command::{redact_argv, CommandOutput, CommandRunner, ProcessRunner};
pub use executor::{unmount_argv, MountExecutor, MountRequest};
pub use scripted::ScriptedRunner;
