//! censusline - ACS 5-year extracts into a warehouse
//!
//! Pulls American Community Survey tables from the Census API at ZCTA or
//! census tract level, relabels the variables, stages a CSV in object
//! storage and loads it into a DuckDB warehouse.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "censusline")]
#[command(about = "ACS 5-year Census extracts into a warehouse")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./censusline.toml or ~/.config/censusline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Maximum attempts per request for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Milliseconds to pause between consecutive pages
    #[arg(long, global = true)]
    page_delay_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Load ACS tables at ZIP Code Tabulation Area level
    Zcta(cmd::zcta::ZctaArgs),
    /// Load ACS tables at census tract level, all states
    Tract(cmd::tract::TractArgs),
    /// Show or reset the local API usage ledger
    Usage(cmd::usage::UsageArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(censusline_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, page bars show activity
    //   non-TTY: info unless --debug or --quiet
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = cli.quiet || (is_tty && !cli.debug);
    censusline_core::init_logging(quiet, cli.debug, multi);

    let mut config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    // CLI overrides
    if let Some(n) = cli.max_retries {
        config.http.retry_attempts = n;
    }
    if let Some(ms) = cli.page_delay_ms {
        config.http.page_delay_ms = ms;
    }

    match cli.command {
        Command::Zcta(args) => cmd::zcta::run(args, &config, &progress),
        Command::Tract(args) => cmd::tract::run(args, &config, &progress),
        Command::Usage(args) => cmd::usage::run(args, &config),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec!["API base URL", &config.census.base_url]);
            table.add_row(vec![
                "API key",
                if config.census.api_key.is_some() {
                    "configured"
                } else {
                    "not set"
                },
            ]);
            table.add_row(vec!["Year", &config.census.year.to_string()]);
            table.add_row(vec![
                "Quota",
                &format!(
                    "{} calls / {}s",
                    config.quota.per_window, config.quota.window_secs
                ),
            ]);
            table.add_row(vec![
                "Usage ledger",
                &config.quota.ledger_path.display().to_string(),
            ]);
            table.add_row(vec![
                "Max retries",
                &config.http.retry_attempts.to_string(),
            ]);
            table.add_row(vec![
                "Page delay",
                &format!("{}ms", config.http.page_delay_ms),
            ]);
            table.add_row(vec![
                "Field mapping",
                &config.mapping.path.display().to_string(),
            ]);
            let storage = match &config.storage.bucket {
                Some(bucket) => format!("s3://{bucket}/{}", config.storage.prefix),
                None => config.storage.local_dir.display().to_string(),
            };
            table.add_row(vec!["Object storage", &storage]);
            table.add_row(vec![
                "Warehouse",
                &config.warehouse.database.display().to_string(),
            ]);
            table.add_row(vec![
                "Schema",
                config.warehouse.schema.as_deref().unwrap_or("(default)"),
            ]);
            table.add_row(vec!["Table template", &config.warehouse.table]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
