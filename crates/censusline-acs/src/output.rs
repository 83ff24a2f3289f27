//! CSV serialisation of a dataset

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use censusline_load::TableLayout;

use crate::dataset::Dataset;

/// Key column, key parts (tract only), then the dataset columns.
pub fn header(dataset: &Dataset) -> Vec<String> {
    let level = dataset.level();
    std::iter::once(level.key_column())
        .chain(level.part_columns().iter().copied())
        .map(str::to_string)
        .chain(dataset.columns().iter().cloned())
        .collect()
}

pub fn table_layout(dataset: &Dataset) -> Result<TableLayout> {
    TableLayout::new(dataset.level().key_column(), header(dataset))
        .with_context(|| format!("Invalid {} table layout", dataset.level()))
}

pub fn encode_csv(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(header(dataset))?;
    for unit in dataset.units() {
        let key = unit.geo.key();
        let record = std::iter::once(key.as_str())
            .chain(unit.geo.parts())
            .chain(unit.values.iter().map(|v| v.as_deref().unwrap_or("")));
        wtr.write_record(record)?;
    }
    wtr.into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV buffer: {}", e.error()))
}

pub fn write_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let bytes = encode_csv(dataset)?;
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Wrote {} rows to {}", dataset.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RawTable;
    use crate::geography::GeographyLevel;

    fn tract_dataset() -> Dataset {
        let mut ds = Dataset::new(
            GeographyLevel::Tract,
            2023,
            vec!["NAME".into(), "Median income".into()],
        );
        ds.append_page(&RawTable {
            header: ["NAME", "Median income", "state", "county", "tract"]
                .map(String::from)
                .to_vec(),
            rows: vec![
                vec![
                    Some("Census Tract 201, Autauga County, Alabama".into()),
                    Some("58750".into()),
                    Some("01".into()),
                    Some("001".into()),
                    Some("020100".into()),
                ],
                vec![
                    Some("Census Tract 202".into()),
                    None,
                    Some("01".into()),
                    Some("001".into()),
                    Some("020200".into()),
                ],
            ],
        })
        .unwrap();
        ds
    }

    #[test]
    fn tract_csv_layout() {
        let csv = String::from_utf8(encode_csv(&tract_dataset()).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "tract_fips,state_fips,county_fips,tract_code,NAME,Median income");
        assert_eq!(
            lines[1],
            "01001020100,01,001,020100,\"Census Tract 201, Autauga County, Alabama\",58750"
        );
        assert_eq!(lines[2], "01001020200,01,001,020200,Census Tract 202,");
    }

    #[test]
    fn layout_keyed_on_tract_fips() {
        let layout = table_layout(&tract_dataset()).unwrap();
        assert_eq!(layout.key_column, "tract_fips");
        assert_eq!(layout.columns.len(), 6);
    }

    #[test]
    fn write_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/dp03.csv");
        write_csv(&tract_dataset(), &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);
    }
}
