//! Stripe layout tooling
//!
//! Reads and applies file layouts through the `lfs` utility.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::planner::StripeDescriptor;
use crate::error::{Error, Result};
use crate::mount::CommandRunner;

/// Port for querying and setting the stripe layout of a path.
#[async_trait]
pub trait StripeLayoutTool: Send + Sync {
    /// Layout of an existing file.
    async fn query_layout(&self, path: &Path) -> Result<StripeDescriptor>;

    /// Apply a layout to a directory, or create an empty file with it.
    async fn apply_layout(&self, path: &Path, descriptor: &StripeDescriptor) -> Result<()>;
}

/// [`StripeLayoutTool`] driving `lfs getstripe` / `lfs setstripe`.
#[derive(Clone)]
pub struct LfsStripeTool {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl LfsStripeTool {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    async fn run_lfs(&self, argv: Vec<String>) -> Result<String> {
        let out = self.runner.run(&argv, self.timeout).await?;
        if !out.success() {
            return Err(Error::CommandFailed {
                command: argv[..2].join(" "),
                reason: out.failure_reason(self.timeout),
                output: out.output,
            });
        }
        Ok(out.output)
    }
}

/// Argv for `lfs setstripe`; zero fields and an unset index are omitted.
pub fn setstripe_argv(path: &Path, descriptor: &StripeDescriptor) -> Vec<String> {
    let mut argv = vec!["lfs".to_string(), "setstripe".to_string()];
    if descriptor.stripe_count > 0 {
        argv.push("-c".into());
        argv.push(descriptor.stripe_count.to_string());
    }
    if descriptor.stripe_size > 0 {
        argv.push("-S".into());
        argv.push(descriptor.stripe_size.to_string());
    }
    if let Some(index) = descriptor.preferred_stripe_index {
        argv.push("-i".into());
        argv.push(index.to_string());
    }
    argv.push(path.display().to_string());
    argv
}

/// Parse `lfs getstripe -c -S -i` output: count, size and index on separate lines.
pub fn parse_getstripe(output: &str) -> Result<StripeDescriptor> {
    let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
    let mut field = |name: &str| {
        lines
            .next()
            .ok_or_else(|| Error::InvalidStripeLayout(format!("getstripe output missing {}", name)))
    };

    let count = field("stripe count")?;
    let size = field("stripe size")?;
    let index = field("stripe index")?;

    let stripe_count: u32 = count
        .parse()
        .map_err(|_| Error::InvalidStripeLayout(format!("invalid stripe count '{}'", count)))?;
    let stripe_size: u64 = size
        .parse()
        .map_err(|_| Error::InvalidStripeLayout(format!("invalid stripe size '{}'", size)))?;
    let index: i64 = index
        .parse()
        .map_err(|_| Error::InvalidStripeLayout(format!("invalid stripe index '{}'", index)))?;

    Ok(StripeDescriptor {
        stripe_count,
        stripe_size,
        preferred_stripe_index: u32::try_from(index).ok(),
    })
}

#[async_trait]
impl StripeLayoutTool for LfsStripeTool {
    async fn query_layout(&self, path: &Path) -> Result<StripeDescriptor> {
        let argv = vec![
            "lfs".to_string(),
            "getstripe".to_string(),
            "-c".to_string(),
            "-S".to_string(),
            "-i".to_string(),
            path.display().to_string(),
        ];
        let output = self.run_lfs(argv).await?;
        let descriptor = parse_getstripe(&output)?;
        debug!(path = %path.display(), ?descriptor, "Queried stripe layout");
        Ok(descriptor)
    }

    async fn apply_layout(&self, path: &Path, descriptor: &StripeDescriptor) -> Result<()> {
        self.run_lfs(setstripe_argv(path, descriptor)).await?;
        debug!(path = %path.display(), ?descriptor, "Applied stripe layout");
        Ok(())
    }
}
