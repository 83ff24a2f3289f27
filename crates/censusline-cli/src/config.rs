//! Configuration loading from TOML files

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use censusline_acs::{
    DEFAULT_BASE_URL, DEFAULT_CODE_COLUMN, DEFAULT_LABEL_COLUMN, DEFAULT_TABLE_TEMPLATE, Product,
    default_products,
};
use censusline_core::{HttpSettings, RetryPolicy};
use serde::Deserialize;

/// Global configuration for censusline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub census: CensusConfig,
    pub quota: QuotaConfig,
    pub http: HttpConfig,
    pub mapping: MappingConfig,
    pub storage: StorageConfig,
    pub warehouse: WarehouseConfig,
    pub zcta: ZctaConfig,
    pub tract: TractConfig,
    /// Extra or overriding product definitions, keyed by product name
    pub products: BTreeMap<String, ProductConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CensusConfig {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_key: Option<String>,
    pub year: u16,
}

impl Default for CensusConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: std::env::var("CENSUS_API_KEY").ok(),
            year: 2023,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub per_window: u64,
    pub window_secs: u64,
    pub ledger_path: PathBuf,
    pub audit_path: Option<PathBuf>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            per_window: 500,
            window_secs: 86_400,
            ledger_path: PathBuf::from("census_api_usage.json"),
            audit_path: Some(PathBuf::from("census_api_usage.jsonl")),
        }
    }
}

impl QuotaConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub retry_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub max_rate_limit_waits: u32,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub page_delay_ms: u64,
    pub split_failed_pages: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 5,
            backoff_base_ms: 1000,
            backoff_max_ms: 60_000,
            max_rate_limit_waits: 10,
            connect_timeout_secs: 30,
            request_timeout_secs: 60,
            page_delay_ms: 10_000,
            split_failed_pages: true,
        }
    }
}

impl HttpConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
        .with_rate_limit_waits(self.max_rate_limit_waits)
    }

    pub fn settings(&self) -> HttpSettings {
        HttpSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub path: PathBuf,
    pub code_column: String,
    pub label_column: String,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("census_fields.csv"),
            code_column: DEFAULT_CODE_COLUMN.to_string(),
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3 bucket; local directory storage when unset
    pub bucket: Option<String>,
    pub prefix: String,
    pub region: Option<String>,
    pub local_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: "Demographics".to_string(),
            region: None,
            local_dir: PathBuf::from("./data/objects"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub database: PathBuf,
    pub schema: Option<String>,
    pub table: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("./data/census.duckdb"),
            schema: Some("acs".to_string()),
            table: DEFAULT_TABLE_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ZctaConfig {
    pub products: Vec<String>,
    /// Explicit ZCTA list; all ZCTAs in one request when empty
    pub zctas: Vec<String>,
    pub zctas_per_page: usize,
    pub year: Option<u16>,
}

impl Default for ZctaConfig {
    fn default() -> Self {
        Self {
            products: default_product_names(),
            zctas: Vec::new(),
            zctas_per_page: 50,
            year: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TractConfig {
    pub products: Vec<String>,
    pub states_per_page: usize,
    pub year: Option<u16>,
}

impl Default for TractConfig {
    fn default() -> Self {
        Self {
            products: default_product_names(),
            states_per_page: 3,
            year: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductConfig {
    pub dataset: String,
    pub variables: Vec<String>,
}

fn default_product_names() -> Vec<String> {
    default_products().into_iter().map(|p| p.name).collect()
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./censusline.toml (current directory)
    /// 2. ~/.config/censusline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("censusline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "censusline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Built-in products with `[products.*]` entries layered on top.
    pub fn product_catalog(&self) -> Vec<Product> {
        let mut catalog = default_products();
        for (name, pc) in &self.products {
            let product = Product::new(name.clone(), pc.dataset.clone(), pc.variables.clone());
            match catalog.iter_mut().find(|p| p.name == *name) {
                Some(existing) => *existing = product,
                None => catalog.push(product),
            }
        }
        catalog
    }

    /// Look up products by name, in the order given.
    pub fn select_products(&self, names: &[String]) -> Result<Vec<Product>> {
        let catalog = self.product_catalog();
        names
            .iter()
            .map(|name| {
                catalog
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
                    .cloned()
                    .with_context(|| {
                        let known: Vec<&str> = catalog.iter().map(|p| p.name.as_str()).collect();
                        format!("Unknown product {name:?} (known: {})", known.join(", "))
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.quota.per_window, 500);
        assert_eq!(config.quota.window(), Duration::from_secs(86_400));
        assert_eq!(config.http.retry_attempts, 5);
        assert_eq!(config.tract.states_per_page, 3);
        assert_eq!(config.storage.prefix, "Demographics");
        assert_eq!(config.zcta.products, ["dp02", "dp03", "dp05", "s0101"]);
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("CENSUSLINE_TEST_VAR", "test_value");
        assert_eq!(
            expand_env_var("${CENSUSLINE_TEST_VAR}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("CENSUSLINE_TEST_VAR");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[census]
api_key = "abc"
year = 2017

[quota]
per_window = 50
window_secs = 3600

[http]
retry_attempts = 3
page_delay_ms = 0

[storage]
bucket = "nigen"
region = "us-east-2"

[tract]
products = ["dp03"]
states_per_page = 5

[products.b19013]
dataset = "acs/acs5"
variables = ["B19013_001E"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.census.api_key.as_deref(), Some("abc"));
        assert_eq!(config.census.year, 2017);
        assert_eq!(config.quota.per_window, 50);
        assert_eq!(config.http.retry_policy().max_attempts, 3);
        assert_eq!(config.http.page_delay(), Duration::ZERO);
        assert_eq!(config.storage.bucket.as_deref(), Some("nigen"));
        assert_eq!(config.tract.products, ["dp03"]);
        assert_eq!(config.tract.states_per_page, 5);
        // untouched sections keep defaults
        assert_eq!(config.warehouse.table, DEFAULT_TABLE_TEMPLATE);

        let picked = config.select_products(&["B19013".to_string(), "dp02".to_string()]).unwrap();
        assert_eq!(picked[0].dataset, "acs/acs5");
        assert_eq!(picked[1].name, "dp02");
    }

    #[test]
    fn product_override_replaces_builtin() {
        let toml = r#"
[products.dp02]
dataset = "acs/acs5/profile"
variables = ["DP02_0001E"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let catalog = config.product_catalog();
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog[0].variables, ["DP02_0001E"]);
    }

    #[test]
    fn unknown_product_is_error() {
        let err = Config::default()
            .select_products(&["dp99".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("dp99"));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("censusline.toml");
        std::fs::write(&path, "[zcta]\nzctas = [\"00601\"]\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.zcta.zctas, ["00601"]);
        assert_eq!(config.zcta.zctas_per_page, 50);
    }
}
