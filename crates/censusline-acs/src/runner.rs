//! Pipeline runner: fetch → map → upload → load, one product at a time

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use censusline_core::{ProgressContext, fmt_num};
use censusline_load::TableRef;

use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::fetcher::Fetcher;
use crate::loader::{Loader, object_key};
use crate::mapping::{FieldMapping, apply_mapping};
use crate::output::{table_layout, write_csv};

/// Where mapped datasets go.
pub enum Sink<'a> {
    /// Object storage plus warehouse ingestion
    Warehouse(&'a Loader),
    /// CSV files in a local directory, nothing loaded (`--dry-run`)
    LocalDir(PathBuf),
}

/// Outcome for one product
#[derive(Debug, Clone)]
pub struct ProductReport {
    pub product: String,
    pub table: String,
    pub rows: usize,
    pub columns: usize,
    /// Object URI or local file path
    pub destination: Option<String>,
    pub loaded_rows: Option<u64>,
    /// Why nothing was written, if so
    pub skipped: Option<String>,
}

impl ProductReport {
    fn skipped(product: &str, table: String, reason: impl Into<String>) -> Self {
        Self {
            product: product.to_string(),
            table,
            rows: 0,
            columns: 0,
            destination: None,
            loaded_rows: None,
            skipped: Some(reason.into()),
        }
    }
}

/// Summary statistics for one run
#[derive(Debug)]
pub struct Summary {
    pub level: String,
    pub year: u16,
    pub products: Vec<ProductReport>,
    pub elapsed: Duration,
}

impl Summary {
    pub fn total_rows(&self) -> usize {
        self.products.iter().map(|p| p.rows).sum()
    }
}

/// Run every configured product. The first fetch, upload or load error
/// aborts the run; rows already fetched for that product are discarded.
pub fn run(
    config: &PipelineConfig,
    fetcher: &Fetcher<'_>,
    mapping: &FieldMapping,
    sink: &Sink<'_>,
    progress: &ProgressContext,
) -> Result<Summary> {
    let start = Instant::now();
    let level = config.level;
    let year = config.year;
    anyhow::ensure!(
        level.supports_year(year),
        "ACS 5-year {level} data starts in {}, not available for {year}",
        level.first_year()
    );
    anyhow::ensure!(!config.pages.is_empty(), "No pages to fetch");
    anyhow::ensure!(!config.products.is_empty(), "No products configured");

    log::info!(
        "Starting {level} pipeline for {year}: {} products, {} pages each",
        config.products.len(),
        config.pages.len()
    );

    let mut reports = Vec::with_capacity(config.products.len());
    for product in &config.products {
        let table = config.table_name(product);

        // The table keeps every expected column even when a vintage lacks some.
        let mut dataset = Dataset::new(level, year, product.request_variables());

        let request = if config.check_variables {
            let available = fetcher
                .available_variables(year, product)
                .with_context(|| format!("Failed to list variables for {}", product.name))?;
            let (kept, missing) = product.retain_available(&available);
            if !missing.is_empty() {
                log::warn!(
                    "{}: {year} does not publish {}, leaving those columns empty",
                    product.name,
                    missing.join(", ")
                );
            }
            if kept.variables.is_empty() {
                log::warn!("{}: no available variables, skipping", product.name);
                reports.push(ProductReport::skipped(
                    &product.name,
                    table,
                    "no available variables",
                ));
                continue;
            }
            kept
        } else {
            product.clone()
        };

        let pb = progress.page_bar(&product.name, config.pages.len());
        let fetched = fetcher
            .fetch_into(&mut dataset, &request, &config.pages, &pb)
            .with_context(|| format!("Failed to fetch {}", product.name));
        pb.finish_and_clear();
        fetched?;
        let dataset = apply_mapping(dataset, mapping)
            .with_context(|| format!("Failed to map columns of {}", product.name))?;

        if dataset.is_empty() {
            log::warn!("{}: API returned no rows, nothing to load", product.name);
            reports.push(ProductReport::skipped(&product.name, table, "no rows"));
            continue;
        }

        let layout = table_layout(&dataset)?;
        let mut report = ProductReport {
            product: product.name.clone(),
            table: table.clone(),
            rows: dataset.len(),
            columns: dataset.columns().len(),
            destination: None,
            loaded_rows: None,
            skipped: None,
        };

        match sink {
            Sink::Warehouse(loader) => {
                let schema = config.schema.as_deref().unwrap_or("");
                let key = object_key(&config.prefix, schema, &table);
                let uri = loader.upload(&dataset, &key)?;
                let table_ref = TableRef::new(config.schema.clone(), table.as_str());
                let loaded = loader.load(&uri, &table_ref, &layout)?;
                if loaded != dataset.len() as u64 {
                    log::warn!(
                        "{table_ref}: loaded {loaded} rows but fetched {}",
                        dataset.len()
                    );
                }
                report.destination = Some(uri.to_string());
                report.loaded_rows = Some(loaded);
            }
            Sink::LocalDir(dir) => {
                let path = dir.join(format!("{table}.csv"));
                write_csv(&dataset, &path)?;
                report.destination = Some(path.display().to_string());
            }
        }

        log::info!("{}: {} rows → {table}", product.name, fmt_num(dataset.len()));
        reports.push(report);
    }

    let summary = Summary {
        level: level.to_string(),
        year,
        products: reports,
        elapsed: start.elapsed(),
    };

    log::info!("=== {} {} Pipeline Summary ===", summary.level, summary.year);
    log::info!(
        "Products: {}/{} written",
        summary.products.iter().filter(|p| p.skipped.is_none()).count(),
        summary.products.len()
    );
    log::info!("Rows: {}", fmt_num(summary.total_rows()));
    log::info!("Time: {:.1}s", summary.elapsed.as_secs_f64());

    Ok(summary)
}
