//! ACS products: which dataset endpoint and which variables to pull

use std::collections::HashSet;

/// Column the API returns with the geography's display name
pub const NAME_COLUMN: &str = "NAME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Short name used in table names (`dp02`, `s0101`)
    pub name: String,
    /// Dataset path below the year, e.g. `acs/acs5/profile`
    pub dataset: String,
    pub variables: Vec<String>,
}

impl Product {
    pub fn new(
        name: impl Into<String>,
        dataset: impl Into<String>,
        variables: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dataset: dataset.into(),
            variables,
        }
    }

    pub fn endpoint(&self, base_url: &str, year: u16) -> String {
        format!(
            "{}/{year}/{}",
            base_url.trim_end_matches('/'),
            self.dataset.trim_matches('/')
        )
    }

    /// `NAME` followed by the variables, de-duplicated, order kept.
    pub fn request_variables(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        std::iter::once(NAME_COLUMN.to_string())
            .chain(self.variables.iter().map(|v| v.trim().to_string()))
            .filter(|v| !v.is_empty() && seen.insert(v.clone()))
            .collect()
    }

    /// Split variables into those `available` publishes and those it does not.
    pub fn retain_available(&self, available: &HashSet<String>) -> (Product, Vec<String>) {
        let (kept, dropped): (Vec<String>, Vec<String>) = self
            .variables
            .iter()
            .filter(|v| v.as_str() != NAME_COLUMN)
            .cloned()
            .partition(|v| available.contains(v));
        (
            Product::new(self.name.clone(), self.dataset.clone(), kept),
            dropped,
        )
    }
}

fn vars(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

/// Social, economic and demographic profile tables plus the age/sex subject
/// table, as pulled for both geography levels.
pub fn default_products() -> Vec<Product> {
    vec![
        Product::new(
            "dp02",
            "acs/acs5/profile",
            vars(&[
                "DP02_0060E", "DP02_0061E", "DP02_0062E", "DP02_0063E", "DP02_0064E",
                "DP02_0068E",
            ]),
        ),
        Product::new(
            "dp03",
            "acs/acs5/profile",
            vars(&[
                "DP03_0062E", "DP03_0052E", "DP03_0053E", "DP03_0054E", "DP03_0055E",
                "DP03_0056E", "DP03_0057E", "DP03_0058E", "DP03_0059E", "DP03_0060E",
                "DP03_0061E", "DP03_0097PE", "DP03_0009PE",
            ]),
        ),
        Product::new(
            "dp05",
            "acs/acs5/profile",
            vars(&[
                "DP05_0076E", "DP05_0082E", "DP05_0083E", "DP05_0084E", "DP05_0085E",
                "DP05_0086E", "DP05_0087E", "DP05_0088E",
            ]),
        ),
        Product::new(
            "s0101",
            "acs/acs5/subject",
            vars(&[
                "S0101_C01_001E", "S0101_C01_002E", "S0101_C01_003E", "S0101_C01_004E",
                "S0101_C01_005E", "S0101_C01_006E", "S0101_C01_007E", "S0101_C01_008E",
                "S0101_C01_009E", "S0101_C01_010E", "S0101_C01_011E", "S0101_C01_012E",
                "S0101_C01_013E", "S0101_C01_014E", "S0101_C01_015E", "S0101_C01_016E",
                "S0101_C01_017E", "S0101_C01_018E", "S0101_C01_019E", "S0101_C01_020E",
                "S0101_C01_021E", "S0101_C01_022E", "S0101_C01_023E", "S0101_C01_024E",
                "S0101_C01_025E", "S0101_C01_026E", "S0101_C01_027E", "S0101_C01_028E",
                "S0101_C01_029E", "S0101_C01_030E", "S0101_C01_031E", "S0101_C01_032E",
                "S0101_C03_001E", "S0101_C05_001E", "S0101_C05_024E",
            ]),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let products = default_products();
        let names: Vec<&str> = products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["dp02", "dp03", "dp05", "s0101"]);
        assert_eq!(products[3].dataset, "acs/acs5/subject");
        assert_eq!(products[3].variables.len(), 35);
    }

    #[test]
    fn request_variables_name_first_no_duplicates() {
        let p = Product::new("x", "acs/acs5", vars(&["B01_001E", "NAME", "B01_001E", " "]));
        assert_eq!(p.request_variables(), vec!["NAME", "B01_001E"]);
    }

    #[test]
    fn endpoint_joins_cleanly() {
        let p = Product::new("dp02", "/acs/acs5/profile", vec![]);
        assert_eq!(
            p.endpoint("https://api.census.gov/data/", 2023),
            "https://api.census.gov/data/2023/acs/acs5/profile"
        );
    }

    #[test]
    fn retain_available_partitions() {
        let p = Product::new("dp02", "d", vars(&["NAME", "A", "B", "C"]));
        let available: HashSet<String> = ["A", "C", "NAME"].map(String::from).into();
        let (kept, dropped) = p.retain_available(&available);
        assert_eq!(kept.variables, vec!["A", "C"]);
        assert_eq!(dropped, vec!["B"]);
    }
}
