//! Receipt images, kept outside the ledger and referenced by link.
use crate::store::StoreError;
use async_std::fs;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

#[allow(async_fn_in_trait)]
pub trait BlobStore {
    /// Stores `bytes` under `name` and returns a link to them.
    async fn upload(&self, bytes: &[u8], name: &str) -> Result<String, StoreError>;
}

/// `YYYY-MM-DD_<description>.jpg`, with characters that are unsafe in file
/// names replaced by `_`.
pub fn receipt_file_name(date: NaiveDate, description: &str) -> String {
    let description: String = description
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("{}_{}.jpg", date.format("%Y-%m-%d"), description)
}

/// Copies receipts into a local directory and links them with `file://` URLs.
#[derive(Debug, Clone)]
pub struct DirBlobStore {
    dir: PathBuf,
}

impl DirBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Picks `name`, or `name` with a numeric suffix if it is already taken.
    async fn free_path(&self, name: &str) -> PathBuf {
        let candidate = self.dir.join(name);
        if fs::metadata(&candidate).await.is_err() {
            return candidate;
        }
        let (stem, ext) = name.rsplit_once('.').unwrap_or((name, "jpg"));
        let mut n = 2;
        loop {
            let candidate = self.dir.join(format!("{stem}-{n}.{ext}"));
            if fs::metadata(&candidate).await.is_err() {
                return candidate;
            }
            n += 1;
        }
    }
}

impl BlobStore for DirBlobStore {
    async fn upload(&self, bytes: &[u8], name: &str) -> Result<String, StoreError> {
        let unavailable = |source| StoreError::Unavailable {
            path: self.dir.display().to_string(),
            source,
        };
        fs::create_dir_all(&self.dir).await.map_err(unavailable)?;
        let path = self.free_path(name).await;
        fs::write(&path, bytes).await.map_err(unavailable)?;
        let path = fs::canonicalize(&path).await.map_err(unavailable)?;
        tracing::info!("Stored receipt {}", path.display());
        Ok(format!("file://{}", path.display()))
    }
}
