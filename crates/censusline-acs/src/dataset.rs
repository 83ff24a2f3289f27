//! Accumulated rows of one product fetch

use std::collections::HashSet;

use crate::api::RawTable;
use crate::geography::{GeoId, GeographyLevel};

/// One geography's values, aligned with [`Dataset::columns`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeographyUnit {
    pub geo: GeoId,
    pub values: Vec<Option<String>>,
}

/// Rows in the order the API returned them, across all pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    level: GeographyLevel,
    year: u16,
    columns: Vec<String>,
    units: Vec<GeographyUnit>,
}

impl Dataset {
    /// Empty dataset with a fixed column set (duplicates dropped, order kept).
    pub fn new(level: GeographyLevel, year: u16, columns: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        let columns = columns
            .into_iter()
            .filter(|c| seen.insert(c.clone()))
            .collect();
        Self {
            level,
            year,
            columns,
            units: Vec::new(),
        }
    }

    pub fn level(&self) -> GeographyLevel {
        self.level
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn units(&self) -> &[GeographyUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Project one API page onto this dataset's columns and append it.
    ///
    /// Columns the page lacks are filled with `None`; page columns the
    /// dataset does not carry are dropped. Returns the rows appended, which
    /// always equals the page's data row count. A page without its geography
    /// columns, or with a malformed geography, is rejected whole.
    pub fn append_page(&mut self, page: &RawTable) -> Result<usize, String> {
        if page.is_empty() {
            return Ok(0);
        }
        let geo_idx = self
            .level
            .geo_columns()
            .iter()
            .map(|name| {
                page.column_index(name)
                    .ok_or_else(|| format!("response has no {name:?} column"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let value_idx: Vec<Option<usize>> =
            self.columns.iter().map(|c| page.column_index(c)).collect();

        let mut parsed = Vec::with_capacity(page.rows.len());
        for (i, row) in page.rows.iter().enumerate() {
            let cells: Vec<Option<&str>> = geo_idx.iter().map(|&g| row[g].as_deref()).collect();
            let geo = GeoId::from_cells(self.level, &cells)
                .map_err(|e| format!("row {}: {e}", i + 1))?;
            let values = value_idx
                .iter()
                .map(|idx| idx.and_then(|j| row[j].clone()))
                .collect();
            parsed.push(GeographyUnit { geo, values });
        }

        let n = parsed.len();
        self.units.extend(parsed);
        Ok(n)
    }

    /// Replace column names; the count must match and names must be unique.
    pub fn rename_columns(&mut self, names: Vec<String>) -> Result<(), String> {
        if names.len() != self.columns.len() {
            return Err(format!(
                "{} names for {} columns",
                names.len(),
                self.columns.len()
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(format!("duplicate column {dup:?}"));
        }
        self.columns = names;
        Ok(())
    }
}
