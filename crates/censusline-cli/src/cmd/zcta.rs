//! Zcta subcommand

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use censusline_acs::{GeographyLevel, PageParams};
use censusline_core::SharedProgress;

use super::pipeline::{self, RunOptions};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ZctaArgs {
    /// ACS 5-year vintage (default: [zcta].year, then [census].year)
    #[arg(short, long)]
    pub year: Option<u16>,

    /// Products to load, comma separated (default: [zcta].products)
    #[arg(short, long, value_delimiter = ',')]
    pub products: Vec<String>,

    /// Restrict to these ZCTAs, comma separated (default: all)
    #[arg(short, long, value_delimiter = ',')]
    pub zctas: Vec<String>,

    /// ZCTAs per request when a list is given
    #[arg(long)]
    pub per_page: Option<usize>,

    /// Write CSVs to this directory instead of uploading and loading
    #[arg(long, value_name = "DIR")]
    pub dry_run: Option<PathBuf>,

    /// Do not check variables.json before fetching
    #[arg(long)]
    pub skip_variable_check: bool,
}

pub fn run(args: ZctaArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let year = args
        .year
        .or(config.zcta.year)
        .unwrap_or(config.census.year);
    let names = if args.products.is_empty() {
        &config.zcta.products
    } else {
        &args.products
    };
    let zctas = if args.zctas.is_empty() {
        &config.zcta.zctas
    } else {
        &args.zctas
    };
    let per_page = args.per_page.unwrap_or(config.zcta.zctas_per_page);
    anyhow::ensure!(per_page > 0, "ZCTAs per page must be at least 1");

    let opts = RunOptions {
        level: GeographyLevel::Zcta,
        year,
        products: config.select_products(names)?,
        pages: PageParams::zcta_pages(zctas, per_page),
        dry_run: args.dry_run,
        skip_variable_check: args.skip_variable_check,
    };
    pipeline::execute(opts, config, progress)
}
