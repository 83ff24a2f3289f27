//! Per-run pipeline settings

use crate::geography::{GeographyLevel, PageParams};
use crate::product::Product;

pub const DEFAULT_TABLE_TEMPLATE: &str = "{product}_{level}_{year}";

/// Everything one `zcta` or `tract` run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub level: GeographyLevel,
    pub year: u16,
    pub products: Vec<Product>,
    pub pages: Vec<PageParams>,
    /// Object key prefix
    pub prefix: String,
    pub schema: Option<String>,
    /// `{product}`, `{level}` and `{year}` are substituted
    pub table_template: String,
    /// Drop variables missing from the dataset's `variables.json` first
    pub check_variables: bool,
}

impl PipelineConfig {
    pub fn new(
        level: GeographyLevel,
        year: u16,
        products: Vec<Product>,
        pages: Vec<PageParams>,
    ) -> Self {
        Self {
            level,
            year,
            products,
            pages,
            prefix: String::new(),
            schema: None,
            table_template: DEFAULT_TABLE_TEMPLATE.to_string(),
            check_variables: true,
        }
    }

    pub fn table_name(&self, product: &Product) -> String {
        render_table_name(&self.table_template, &product.name, self.level, self.year)
    }
}

/// Substitute the template and fold to a lower-case SQL-friendly name.
pub fn render_table_name(
    template: &str,
    product: &str,
    level: GeographyLevel,
    year: u16,
) -> String {
    template
        .replace("{product}", product)
        .replace("{level}", level.name())
        .replace("{year}", &year.to_string())
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
