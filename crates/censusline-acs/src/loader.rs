//! Upload to object storage, then ingest into the warehouse

use censusline_load::{ObjectStore, ObjectUri, TableLayout, TableRef, Warehouse};

use crate::dataset::Dataset;
use crate::output::encode_csv;

/// Upload and load failures are surfaced as-is, never retried.
#[derive(Debug)]
pub enum LoadError {
    Encode(anyhow::Error),
    Upload { key: String, source: anyhow::Error },
    Load {
        table: String,
        uri: String,
        source: anyhow::Error,
    },
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "CSV encoding failed: {e:#}"),
            Self::Upload { key, source } => write!(f, "upload of {key} failed: {source:#}"),
            Self::Load { table, uri, source } => {
                write!(f, "loading {uri} into {table} failed: {source:#}")
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(source) | Self::Upload { source, .. } | Self::Load { source, .. } => {
                Some(source.as_ref())
            }
        }
    }
}

/// `{prefix}/{schema}/{table}/{table}.csv`, skipping empty segments.
pub fn object_key(prefix: &str, schema: &str, table: &str) -> String {
    let file = format!("{table}.csv");
    [prefix, schema, table, file.as_str()]
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

pub struct Loader {
    store: Box<dyn ObjectStore>,
    warehouse: Box<dyn Warehouse>,
}

impl Loader {
    pub fn new(store: Box<dyn ObjectStore>, warehouse: Box<dyn Warehouse>) -> Self {
        Self { store, warehouse }
    }

    pub fn describe(&self) -> String {
        self.store.describe()
    }

    /// Serialise `dataset` as CSV and store it under `key`.
    pub fn upload(&self, dataset: &Dataset, key: &str) -> Result<ObjectUri, LoadError> {
        let body = encode_csv(dataset).map_err(LoadError::Encode)?;
        log::debug!("Uploading {} rows ({} bytes) to {key}", dataset.len(), body.len());
        self.store
            .put(key, body, "text/csv")
            .map_err(|source| LoadError::Upload {
                key: key.to_string(),
                source,
            })
    }

    /// Replace `table` with the contents of `uri`. Returns rows loaded.
    pub fn load(
        &self,
        uri: &ObjectUri,
        table: &TableRef,
        layout: &TableLayout,
    ) -> Result<u64, LoadError> {
        self.warehouse
            .load(uri, table, layout)
            .map_err(|source| LoadError::Load {
                table: table.to_string(),
                uri: uri.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_layout() {
        assert_eq!(
            object_key("Demographics", "acs", "dp02_tract_2023"),
            "Demographics/acs/dp02_tract_2023/dp02_tract_2023.csv"
        );
        assert_eq!(object_key("/Demographics/", "", "t"), "Demographics/t/t.csv");
    }

    #[test]
    fn load_error_names_table() {
        let e = LoadError::Load {
            table: "acs.dp02".into(),
            uri: "s3://b/k".into(),
            source: anyhow::anyhow!("no such bucket"),
        };
        assert_eq!(e.to_string(), "loading s3://b/k into acs.dp02 failed: no such bucket");
    }
}
