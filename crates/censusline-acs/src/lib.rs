//! censusline-acs: American Community Survey extract-transform-load
//!
//! Fetches ACS products from the Census Data API one page at a time (a
//! page being a geography chunk), guarded by the usage ledger and a bounded
//! retry policy, renames variable codes to readable labels and hands the
//! result to object storage and the warehouse.

pub mod api;
pub mod config;
pub mod dataset;
pub mod fetcher;
pub mod geography;
pub mod loader;
pub mod mapping;
pub mod output;
pub mod product;
pub mod runner;

pub use api::{CensusTransport, RawTable, ReqwestTransport, parse_table, parse_variables};
pub use config::{DEFAULT_TABLE_TEMPLATE, PipelineConfig, render_table_name};
pub use dataset::{Dataset, GeographyUnit};
pub use fetcher::{DEFAULT_BASE_URL, FetchError, Fetcher};
pub use geography::{GeoId, GeographyLevel, PageParams, state_fips_codes};
pub use loader::{LoadError, Loader, object_key};
pub use mapping::{
    DEFAULT_CODE_COLUMN, DEFAULT_LABEL_COLUMN, FieldMapping, apply_mapping, normalize_code,
};
pub use output::{encode_csv, table_layout, write_csv};
pub use product::{Product, default_products};
pub use runner::{ProductReport, Sink, Summary, run};
