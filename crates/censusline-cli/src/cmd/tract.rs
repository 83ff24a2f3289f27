//! Tract subcommand

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use censusline_acs::{GeographyLevel, PageParams};
use censusline_core::SharedProgress;

use super::pipeline::{self, RunOptions};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct TractArgs {
    /// ACS 5-year vintage (default: [tract].year, then [census].year)
    #[arg(short, long)]
    pub year: Option<u16>,

    /// Products to load, comma separated (default: [tract].products)
    #[arg(short, long, value_delimiter = ',')]
    pub products: Vec<String>,

    /// States per request
    #[arg(long)]
    pub states_per_page: Option<usize>,

    /// Write CSVs to this directory instead of uploading and loading
    #[arg(long, value_name = "DIR")]
    pub dry_run: Option<PathBuf>,

    /// Do not check variables.json before fetching
    #[arg(long)]
    pub skip_variable_check: bool,
}

pub fn run(args: TractArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let year = args
        .year
        .or(config.tract.year)
        .unwrap_or(config.census.year);
    let names = if args.products.is_empty() {
        &config.tract.products
    } else {
        &args.products
    };
    let states_per_page = args.states_per_page.unwrap_or(config.tract.states_per_page);
    anyhow::ensure!(states_per_page > 0, "States per page must be at least 1");

    let opts = RunOptions {
        level: GeographyLevel::Tract,
        year,
        products: config.select_products(names)?,
        pages: PageParams::tract_pages(states_per_page),
        dry_run: args.dry_run,
        skip_variable_check: args.skip_variable_check,
    };
    pipeline::execute(opts, config, progress)
}
