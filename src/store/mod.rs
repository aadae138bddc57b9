//! Row-oriented storage in the shape of a spreadsheet worksheet.
//!
//! Rows are plain string cells. Typing happens above this layer, at the
//! load boundary of each entity.
mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;

/// 1-based position of a data row. Deleting a row shifts every later id down.
pub type RowId = usize;

/// The cells of one row in column order.
pub type Fields = Vec<String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable at {path}: {source}")]
    Unavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Row {0} not found")]
    RowNotFound(RowId),
    #[error("Malformed store at {path}: {reason}")]
    Malformed { path: String, reason: String },
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

/// A worksheet-like store. An empty store reads as `Ok(vec![])`, never as an error.
#[allow(async_fn_in_trait)]
pub trait RowStore {
    async fn append_row(&mut self, fields: Fields) -> Result<RowId, StoreError>;
    async fn update_row(&mut self, id: RowId, fields: Fields) -> Result<(), StoreError>;
    async fn delete_row(&mut self, id: RowId) -> Result<(), StoreError>;
    async fn read_all(&self) -> Result<Vec<Fields>, StoreError>;
}

/// Maps a row id onto an index into `len` rows.
fn index_of(id: RowId, len: usize) -> Result<usize, StoreError> {
    if id == 0 || id > len {
        Err(StoreError::RowNotFound(id))
    } else {
        Ok(id - 1)
    }
}

#[cfg(test)]
mod store_tests {
    use super::*;

    #[test]
    fn row_ids_are_one_based() {
        assert!(matches!(index_of(0, 3), Err(StoreError::RowNotFound(0))));
        assert_eq!(index_of(1, 3).ok(), Some(0));
        assert_eq!(index_of(3, 3).ok(), Some(2));
        assert!(matches!(index_of(4, 3), Err(StoreError::RowNotFound(4))));
    }
}
