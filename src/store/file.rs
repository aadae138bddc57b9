use super::{Fields, RowId, RowStore, StoreError, index_of};
use async_std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A `|` delimited text file with one header row.
///
/// Every call reads the whole file and every mutation rewrites it, so the
/// file can also be edited by hand between calls. Cells are trimmed on read,
/// so padded columns such as `2024-05-01 | Thu | 500000` are accepted.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    header: Fields,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, header: &[&str]) -> Self {
        Self {
            path: path.into(),
            header: header.iter().map(|h| h.to_string()).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn path_string(&self) -> String {
        self.path.display().to_string()
    }

    fn unavailable(&self, source: std::io::Error) -> StoreError {
        StoreError::Unavailable {
            path: self.path_string(),
            source,
        }
    }

    fn malformed(&self, reason: impl ToString) -> StoreError {
        StoreError::Malformed {
            path: self.path_string(),
            reason: reason.to_string(),
        }
    }

    /// A missing file is an empty store, but only if its directory exists.
    async fn load(&self) -> Result<Vec<Fields>, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) => self.decode(&bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let dir = match self.path.parent() {
                    Some(dir) if !dir.as_os_str().is_empty() => dir,
                    _ => Path::new("."),
                };
                fs::metadata(dir)
                    .await
                    .map_err(|source| self.unavailable(source))?;
                tracing::debug!("{} does not exist yet, reading as empty", self.path_string());
                Ok(Vec::new())
            }
            Err(err) => Err(self.unavailable(err)),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Fields>, StoreError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'|')
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);
        let rows = reader
            .records()
            .map(|record| {
                record
                    .map(|record| record.iter().map(ToOwned::to_owned).collect::<Fields>())
                    .map_err(|err| self.malformed(err))
            })
            .collect::<Result<Vec<Fields>, StoreError>>()?;
        Ok(rows)
    }

    fn encode(&self, rows: &[Fields]) -> Result<Vec<u8>, StoreError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'|')
            .flexible(true)
            .from_writer(Vec::new());
        writer
            .write_record(&self.header)
            .map_err(|err| self.malformed(err))?;
        for row in rows {
            writer.write_record(row).map_err(|err| self.malformed(err))?;
        }
        writer.into_inner().map_err(|err| self.malformed(err))
    }

    /// Writes to a sibling temp file and renames it over the original.
    async fn save(&self, rows: &[Fields]) -> Result<(), StoreError> {
        let bytes = self.encode(rows)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes)
            .await
            .map_err(|source| self.unavailable(source))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| self.unavailable(source))?;
        tracing::debug!("Wrote {} rows to {}", rows.len(), self.path_string());
        Ok(())
    }
}

impl RowStore for FileStore {
    async fn append_row(&mut self, fields: Fields) -> Result<RowId, StoreError> {
        let mut rows = self.load().await?;
        rows.push(fields);
        self.save(&rows).await?;
        Ok(rows.len())
    }

    async fn update_row(&mut self, id: RowId, fields: Fields) -> Result<(), StoreError> {
        let mut rows = self.load().await?;
        let i = index_of(id, rows.len())?;
        rows[i] = fields;
        self.save(&rows).await
    }

    async fn delete_row(&mut self, id: RowId) -> Result<(), StoreError> {
        let mut rows = self.load().await?;
        let i = index_of(id, rows.len())?;
        rows.remove(i);
        self.save(&rows).await
    }

    async fn read_all(&self) -> Result<Vec<Fields>, StoreError> {
        self.load().await
    }
}
