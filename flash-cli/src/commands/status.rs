//! Status command - show daemon health and the last build.

use anyhow::Result;
use colored::Colorize;

use crate::client::FlashClient;

pub async fn run(client: &FlashClient, json: bool) -> Result<()> {
    let status = client.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let field = |key: &str| status.get(key).map(|v| v.to_string()).unwrap_or_default();

    println!("{} {}", "flashd".bold(), field("status").trim_matches('"').green());
    println!("  {:<12} {}", "Workspace:".cyan(), field("workspace").trim_matches('"'));
    println!("  {:<12} {}", "Toolchain:".cyan(), field("toolchain").trim_matches('"'));
    println!("  {:<12} {}", "Sessions:".cyan(), field("sessions"));
    println!(
        "  {:<12} {} ({} failed)",
        "Builds:".cyan(),
        field("builds_total"),
        field("builds_failed")
    );

    match status.get("last_build").filter(|v| !v.is_null()) {
        Some(last) if last["outcome"] == "done" => {
            println!(
                "  {:<12} {} for {}",
                "Last build:".cyan(),
                "done".green(),
                last["target"].as_str().unwrap_or("?")
            );
        }
        Some(last) => {
            println!(
                "  {:<12} {} while {}: {}",
                "Last build:".cyan(),
                "failed".red(),
                last["stage"].as_str().unwrap_or("?"),
                last["message"].as_str().unwrap_or("")
            );
        }
        None => println!("  {:<12} none yet", "Last build:".cyan()),
    }
    Ok(())
}
