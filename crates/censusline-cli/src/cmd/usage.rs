//! Usage subcommand - inspect or reset the API usage ledger

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use censusline_core::SystemClock;
use censusline_ledger::CallLog;

use super::pipeline::build_ledger;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct UsageArgs {
    /// Start a fresh quota window now
    #[arg(long)]
    pub reset: bool,
}

pub fn run(args: UsageArgs, config: &Config) -> Result<()> {
    let ledger = build_ledger(config, Arc::new(SystemClock))?;
    if args.reset {
        ledger.reset()?;
        log::info!("Usage ledger reset");
    }
    let status = ledger.status()?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("API usage").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    table.add_row(vec!["Ledger", &status.backend]);
    table.add_row(vec![
        "Window start",
        &status.record.window_start.to_rfc3339(),
    ]);
    table.add_row(vec![
        "Calls",
        &format!("{} / {}", status.record.call_count, status.quota),
    ]);
    table.add_row(vec!["Remaining", &status.remaining.to_string()]);
    table.add_row(vec![
        "Resets at",
        &status
            .resets_at
            .map_or_else(|| "-".to_string(), |t| t.to_rfc3339()),
    ]);
    if let Some(path) = &config.quota.audit_path {
        let entries = CallLog::new(path.clone()).read_all()?;
        let failed = entries
            .iter()
            .filter(|e| !matches!(e.status, Some(200..=299)))
            .count();
        table.add_row(vec![
            "Audit log",
            &format!(
                "{} ({} calls, {} failed)",
                path.display(),
                entries.len(),
                failed
            ),
        ]);
    }

    eprintln!("\n{table}");
    Ok(())
}
