//! Build command - configure a session and deploy one source file.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use crate::client::FlashClient;

/// Progress lines are suppressed when `quiet`; failures are always reported.
pub async fn run(client: &FlashClient, file: &Path, target: &str, destination: &str, quiet: bool) -> Result<bool> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let confirmation = client.select_target(target).await?;
    debug!("{}", confirmation);
    let confirmation = client.set_destination(destination).await?;
    debug!("{}", confirmation);

    if !quiet {
        eprintln!("{} {} for {}", "Building".cyan().bold(), file.display(), target);
    }
    let start = Instant::now();

    match client.build(&source).await? {
        Ok(()) => {
            if !quiet {
                eprintln!(
                    "{} deployed to {} in {:.1}s",
                    "Done:".green().bold(),
                    destination,
                    start.elapsed().as_secs_f64()
                );
            }
            Ok(true)
        }
        Err(failure) => {
            eprintln!(
                "{} {} while {} ({}, build {})",
                "Failed:".red().bold(),
                failure.error,
                failure.stage,
                failure.kind,
                failure.build_id
            );
            if let Some(log) = failure.log_tail {
                for line in log.lines() {
                    eprintln!("  {}", line.dimmed());
                }
            }
            Ok(false)
        }
    }
}
