//! censusline-load: Object storage and warehouse ingestion
//!
//! Two thin seams: an [`ObjectStore`] that accepts a serialised file under a
//! deterministic key, and a [`Warehouse`] that (re)creates a table and
//! ingests that file into it.

mod object;
mod sql;
mod warehouse;

pub use object::{LocalObjectStore, ObjectStore, ObjectUri, S3ObjectStore};
pub use warehouse::{DuckDbWarehouse, TableLayout, TableRef, Warehouse};
