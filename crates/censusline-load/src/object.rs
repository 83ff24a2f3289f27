//! Object storage backends

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use censusline_core::SHARED_RUNTIME;

/// Location of a stored object, as the warehouse will read it.
///
/// Either an absolute local path or an `s3://bucket/key` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUri(String);

impl ObjectUri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_s3(&self) -> bool {
        self.0.starts_with("s3://")
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Destination for serialised datasets. `put` overwrites an existing key.
pub trait ObjectStore {
    fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<ObjectUri>;
    fn describe(&self) -> String;
}

/// Files under a root directory, written atomically.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        anyhow::ensure!(
            !key.is_empty() && rel.components().all(|c| matches!(c, Component::Normal(_))),
            "invalid object key {key:?}"
        );
        Ok(self.root.join(rel))
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<ObjectUri> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, &body).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to rename {} → {}", tmp.display(), path.display()))?;

        let abs = fs::canonicalize(&path).unwrap_or(path);
        log::debug!("Wrote {} bytes to {}", body.len(), abs.display());
        Ok(ObjectUri::new(abs.display().to_string()))
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}

/// S3 bucket, credentials from the default AWS provider chain.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(bucket: impl Into<String>, region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = SHARED_RUNTIME.block_on(loader.load());
        Self {
            client: Client::new(&config),
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ObjectStore for S3ObjectStore {
    fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<ObjectUri> {
        let size = body.len();
        SHARED_RUNTIME
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .content_type(content_type)
                    .body(ByteStream::from(body))
                    .send(),
            )
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| format!("put_object s3://{}/{key} failed", self.bucket))?;

        log::info!("Uploaded {size} bytes to s3://{}/{key}", self.bucket);
        Ok(ObjectUri::new(format!("s3://{}/{key}", self.bucket)))
    }

    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}
