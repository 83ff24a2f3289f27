//! Shared wiring for the `zcta` and `tract` subcommands

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use censusline_acs::{
    FieldMapping, Fetcher, GeographyLevel, Loader, PageParams, PipelineConfig, Product,
    ReqwestTransport, Sink, Summary,
};
use censusline_core::{Clock, SharedProgress, SystemClock, fmt_num};
use censusline_ledger::{CallLog, JsonFileStore, UsageLedger};
use censusline_load::{DuckDbWarehouse, LocalObjectStore, ObjectStore, S3ObjectStore};

use crate::config::Config;

/// Options common to both geography levels, already merged with config.
pub struct RunOptions {
    pub level: GeographyLevel,
    pub year: u16,
    pub products: Vec<Product>,
    pub pages: Vec<PageParams>,
    /// Write CSVs here instead of uploading and loading
    pub dry_run: Option<PathBuf>,
    pub skip_variable_check: bool,
}

pub fn build_ledger(config: &Config, clock: Arc<dyn Clock>) -> Result<UsageLedger> {
    UsageLedger::new(
        JsonFileStore::new(config.quota.ledger_path.clone()),
        clock,
        config.quota.per_window,
        config.quota.window(),
    )
}

fn load_mapping(config: &Config) -> Result<FieldMapping> {
    let path = &config.mapping.path;
    if !path.exists() {
        log::warn!(
            "Mapping file {} not found, columns keep their API codes",
            path.display()
        );
        return Ok(FieldMapping::default());
    }
    FieldMapping::from_csv_path(path, &config.mapping.code_column, &config.mapping.label_column)
}

fn build_loader(config: &Config) -> Result<Loader> {
    let store: Box<dyn ObjectStore> = match &config.storage.bucket {
        Some(bucket) => Box::new(S3ObjectStore::new(bucket.clone(), config.storage.region.clone())),
        None => Box::new(LocalObjectStore::new(config.storage.local_dir.clone())),
    };
    let warehouse = DuckDbWarehouse::open(&config.warehouse.database)?;
    Ok(Loader::new(store, Box::new(warehouse)))
}

pub fn execute(opts: RunOptions, config: &Config, progress: &SharedProgress) -> Result<()> {
    let api_key = config.census.api_key.clone().context(
        "Census API key not set (census.api_key in config or CENSUS_API_KEY env var)",
    )?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = build_ledger(config, clock.clone())?;
    let mut transport = ReqwestTransport::new(&config.http.settings(), Some(api_key), clock.clone())
        .context("Failed to build HTTP client")?;
    if let Some(path) = &config.quota.audit_path {
        transport = transport.with_audit(CallLog::new(path.clone()));
    }

    let fetcher = Fetcher::new(&transport, &ledger, clock)
        .with_policy(config.http.retry_policy())
        .with_base_url(config.census.base_url.clone())
        .with_page_delay(config.http.page_delay())
        .with_split_failed_pages(config.http.split_failed_pages);

    let mapping = load_mapping(config)?;

    let mut pipeline = PipelineConfig::new(opts.level, opts.year, opts.products, opts.pages);
    pipeline.prefix = config.storage.prefix.clone();
    pipeline.schema = config.warehouse.schema.clone();
    pipeline.table_template = config.warehouse.table.clone();
    pipeline.check_variables = !opts.skip_variable_check;

    let status = ledger.status()?;
    log::info!(
        "API quota: {}/{} calls left this window",
        status.remaining,
        status.quota
    );

    let loader;
    let sink = match opts.dry_run {
        Some(dir) => Sink::LocalDir(dir),
        None => {
            loader = build_loader(config)?;
            log::info!("Loading via {}", loader.describe());
            Sink::Warehouse(&loader)
        }
    };

    let summary = censusline_acs::run(&pipeline, &fetcher, &mapping, &sink, progress)?;
    print_summary(&summary);

    let status = ledger.status()?;
    log::info!(
        "API quota: {}/{} calls left this window",
        status.remaining,
        status.quota
    );
    Ok(())
}

fn print_summary(summary: &Summary) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(format!("{} {}", summary.level, summary.year)).fg(Color::Cyan),
            Cell::new("Table").fg(Color::Cyan),
            Cell::new("Rows").fg(Color::Cyan),
            Cell::new("Columns").fg(Color::Cyan),
            Cell::new("Destination").fg(Color::Cyan),
        ]);
    for p in &summary.products {
        let destination = match (&p.skipped, &p.destination) {
            (Some(reason), _) => format!("skipped: {reason}"),
            (None, Some(dest)) => dest.clone(),
            (None, None) => String::new(),
        };
        let rows = match p.loaded_rows {
            Some(loaded) => format!("{} (loaded {})", fmt_num(p.rows), fmt_num(loaded as usize)),
            None => fmt_num(p.rows),
        };
        table.add_row(vec![
            Cell::new(&p.product),
            Cell::new(&p.table),
            Cell::new(rows),
            Cell::new(p.columns),
            Cell::new(destination),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total"),
        Cell::new(""),
        Cell::new(fmt_num(summary.total_rows())),
        Cell::new(""),
        Cell::new(format!("{:.1}s", summary.elapsed.as_secs_f64())),
    ]);
    eprintln!("\n{table}");
}
