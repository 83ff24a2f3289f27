//! Variable code → readable label mapping

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use crate::dataset::Dataset;
use crate::product::NAME_COLUMN;

pub const DEFAULT_CODE_COLUMN: &str = "API pull code";
pub const DEFAULT_LABEL_COLUMN: &str = "Relevant Field in Tableau Extract";

/// `dp02-0001e ` → `DP02_0001E`
pub fn normalize_code(code: &str) -> String {
    code.replace('-', "_").to_uppercase().trim().to_string()
}

/// Read-only code → label table, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
    labels: BTreeMap<String, String>,
    label_set: HashSet<String>,
}

impl FieldMapping {
    pub fn from_pairs<I, C, L>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, L)>,
        C: AsRef<str>,
        L: AsRef<str>,
    {
        let mut labels = BTreeMap::new();
        for (code, label) in pairs {
            let code = normalize_code(code.as_ref());
            let label = label.as_ref().trim();
            if code.is_empty() {
                continue;
            }
            if label.is_empty() {
                log::warn!("Mapping for {code} has no label, ignoring");
                continue;
            }
            if let Some(prev) = labels.insert(code.clone(), label.to_string()) {
                if prev != label {
                    log::warn!(
                        "Mapping for {code} defined twice ({prev:?}, {label:?}), using the last"
                    );
                }
            }
        }
        let label_set = labels.values().cloned().collect();
        Self { labels, label_set }
    }

    pub fn from_csv_path(path: &Path, code_column: &str, label_column: &str) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open mapping file {}", path.display()))?;
        let mapping = Self::from_csv_reader(file, code_column, label_column)
            .with_context(|| format!("Failed to read mapping file {}", path.display()))?;
        log::info!("Loaded {} field mappings from {}", mapping.len(), path.display());
        Ok(mapping)
    }

    pub fn from_csv_reader<R: Read>(
        reader: R,
        code_column: &str,
        label_column: &str,
    ) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = rdr.headers().context("Missing header row")?.clone();
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .with_context(|| {
                    format!(
                        "Column {name:?} not found (have: {})",
                        headers.iter().collect::<Vec<_>>().join(", ")
                    )
                })
        };
        let code_idx = find(code_column)?;
        let label_idx = find(label_column)?;

        let mut pairs = Vec::new();
        for (i, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("Malformed row {}", i + 2))?;
            let code = record.get(code_idx).unwrap_or("");
            let label = record.get(label_idx).unwrap_or("");
            if code.trim().is_empty() && label.trim().is_empty() {
                continue;
            }
            pairs.push((code.to_string(), label.to_string()));
        }
        Ok(Self::from_pairs(pairs))
    }

    /// Label for a column name, after normalisation.
    pub fn label(&self, column: &str) -> Option<&str> {
        self.labels.get(&normalize_code(column)).map(String::as_str)
    }

    /// Whether `column` is already one of the labels.
    pub fn is_label(&self, column: &str) -> bool {
        self.label_set.contains(column)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Rename variable code columns to their labels.
///
/// Unknown codes keep their name and are reported once as unmapped. A
/// column that already carries a label is left alone, so applying the
/// mapping twice yields the same dataset as applying it once. A label that
/// would clash with another column, or with the level's key and part
/// columns, is not applied and the code is kept instead.
pub fn apply_mapping(mut dataset: Dataset, mapping: &FieldMapping) -> Result<Dataset> {
    let level = dataset.level();
    let reserved: HashSet<&str> = std::iter::once(level.key_column())
        .chain(level.part_columns().iter().copied())
        .collect();
    let columns = dataset.columns().to_vec();
    let targets: Vec<Option<&str>> = columns
        .iter()
        .map(|c| {
            if mapping.is_label(c) {
                None
            } else {
                mapping.label(c).filter(|t| *t != c)
            }
        })
        .collect();

    // Dropping a label can expose its code to a new clash, so settle to a fixpoint.
    let mut rejected = vec![false; columns.len()];
    loop {
        let names: Vec<&str> = columns
            .iter()
            .zip(&targets)
            .zip(&rejected)
            .map(|((code, target), &rej)| match target {
                Some(t) if !rej => *t,
                _ => code.as_str(),
            })
            .collect();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for n in &names {
            *counts.entry(*n).or_default() += 1;
        }
        let mut changed = false;
        for (i, name) in names.iter().enumerate() {
            if targets[i].is_some()
                && !rejected[i]
                && (counts[name] > 1 || reserved.contains(name))
            {
                log::warn!(
                    "Label {name:?} for {} collides with another column, keeping the code",
                    columns[i]
                );
                rejected[i] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut unmapped = Vec::new();
    let mut renamed = Vec::with_capacity(columns.len());
    for ((code, target), rej) in columns.iter().zip(&targets).zip(&rejected) {
        match target {
            Some(t) if !rej => renamed.push(t.to_string()),
            Some(_) => renamed.push(code.clone()),
            None => {
                if code != NAME_COLUMN && !mapping.is_label(code) {
                    unmapped.push(code.as_str());
                }
                renamed.push(code.clone());
            }
        }
    }
    if !unmapped.is_empty() {
        log::warn!("Unmapped columns: {}", unmapped.join(", "));
    }
    if let Some(clash) = renamed.iter().find(|n| reserved.contains(n.as_str())) {
        anyhow::bail!("Column {clash:?} clashes with the {level} key columns");
    }
    dataset
        .rename_columns(renamed)
        .map_err(|e| anyhow::anyhow!("Column mapping failed: {e}"))?;
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geography::GeographyLevel;

    fn dataset(columns: &[&str]) -> Dataset {
        Dataset::new(
            GeographyLevel::Zcta,
            2023,
            columns.iter().map(|c| c.to_string()).collect(),
        )
    }

    #[test]
    fn normalizes_codes() {
        assert_eq!(normalize_code(" dp02-0001e "), "DP02_0001E");
    }

    #[test]
    fn lookup_is_normalized() {
        let m = FieldMapping::from_pairs([("dp02_0001e", "Total Households")]);
        assert_eq!(m.label("DP02-0001E"), Some("Total Households"));
        assert_eq!(m.label("DP02_0002E"), None);
    }

    #[test]
    fn renames_and_passes_through() {
        let m = FieldMapping::from_pairs([("DP02_0001E", "Total Households")]);
        let out = apply_mapping(dataset(&["NAME", "DP02_0001E", "DP02_0999E"]), &m).unwrap();
        assert_eq!(out.columns(), ["NAME", "Total Households", "DP02_0999E"]);
    }

    fn assert_idempotent(m: &FieldMapping, columns: &[&str]) -> Dataset {
        let once = apply_mapping(dataset(columns), m).unwrap();
        let twice = apply_mapping(once.clone(), m).unwrap();
        assert_eq!(once, twice);
        once
    }

    #[test]
    fn idempotent() {
        let m = FieldMapping::from_pairs([
            ("DP02_0001E", "Total Households"),
            ("DP02_0002E", "Families"),
        ]);
        assert_idempotent(&m, &["NAME", "DP02_0001E", "DP02_0002E", "X"]);
    }

    #[test]
    fn chained_labels_are_not_renamed_again() {
        let m = FieldMapping::from_pairs([
            ("DP02_0001E", "DP02_0002E"),
            ("DP02_0002E", "Families"),
        ]);
        let out = assert_idempotent(&m, &["NAME", "DP02_0001E"]);
        assert_eq!(out.columns(), ["NAME", "DP02_0002E"]);
    }

    #[test]
    fn colliding_labels_keep_codes() {
        let m = FieldMapping::from_pairs([("A", "Same"), ("B", "Same"), ("C", "Other")]);
        let out = apply_mapping(dataset(&["A", "B", "C"]), &m).unwrap();
        assert_eq!(out.columns(), ["A", "B", "Other"]);
    }

    #[test]
    fn label_equal_to_existing_column_keeps_code() {
        let m = FieldMapping::from_pairs([("A", "NAME")]);
        let out = apply_mapping(dataset(&["NAME", "A"]), &m).unwrap();
        assert_eq!(out.columns(), ["NAME", "A"]);
    }

    #[test]
    fn kept_code_clash_cascades_without_losing_other_labels() {
        let m = FieldMapping::from_pairs([
            ("A", "X"),
            ("B", "X"),
            ("C", "A"),
            ("D", "Total Households"),
        ]);
        let out = assert_idempotent(&m, &["A", "B", "C", "D"]);
        // A is itself a label, so it stays put and B takes X alone
        assert_eq!(out.columns(), ["A", "X", "C", "Total Households"]);
    }

    #[test]
    fn label_equal_to_key_column_keeps_code() {
        let m = FieldMapping::from_pairs([("DP02_0001E", "zcta"), ("DP02_0002E", "Families")]);
        let out = assert_idempotent(&m, &["NAME", "DP02_0001E", "DP02_0002E"]);
        assert_eq!(out.columns(), ["NAME", "DP02_0001E", "Families"]);
    }

    #[test]
    fn label_equal_to_tract_part_column_keeps_code() {
        let m = FieldMapping::from_pairs([("DP03_0062E", "county_fips")]);
        let ds = Dataset::new(GeographyLevel::Tract, 2023, vec!["DP03_0062E".to_string()]);
        let out = apply_mapping(ds, &m).unwrap();
        assert_eq!(out.columns(), ["DP03_0062E"]);
    }

    #[test]
    fn csv_reader() {
        let csv = "\
API pull code,Relevant Field in Tableau Extract,Notes
DP02_0060E,Less than 9th grade,
dp02_0061e ,9th to 12th grade no diploma,lowercase
,,
DP02_0062E,,blank label
";
        let m =
            FieldMapping::from_csv_reader(csv.as_bytes(), DEFAULT_CODE_COLUMN, DEFAULT_LABEL_COLUMN)
                .unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.label("DP02_0061E"), Some("9th to 12th grade no diploma"));
        assert!(m.is_label("Less than 9th grade"));
    }

    #[test]
    fn csv_missing_column() {
        let csv = "code,label\nA,B\n";
        let err = FieldMapping::from_csv_reader(csv.as_bytes(), DEFAULT_CODE_COLUMN, "label")
            .unwrap_err();
        assert!(err.to_string().contains("API pull code"));
    }
}
