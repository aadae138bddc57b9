use super::{Fields, RowId, RowStore, StoreError, index_of};
use std::io::{Error, ErrorKind};

/// Keeps rows in memory. Can be switched into an outage state to exercise
/// callers' handling of [`StoreError::Unavailable`].
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    rows: Vec<Fields>,
    offline: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Fields>) -> Self {
        Self {
            rows,
            offline: false,
        }
    }

    /// A store that fails every call as unavailable.
    pub fn offline() -> Self {
        Self {
            rows: Vec::new(),
            offline: true,
        }
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable {
                path: "memory".to_string(),
                source: Error::new(ErrorKind::NotConnected, "store is offline"),
            });
        }
        Ok(())
    }
}

impl RowStore for MemoryStore {
    async fn append_row(&mut self, fields: Fields) -> Result<RowId, StoreError> {
        self.check_online()?;
        self.rows.push(fields);
        Ok(self.rows.len())
    }

    async fn update_row(&mut self, id: RowId, fields: Fields) -> Result<(), StoreError> {
        self.check_online()?;
        let i = index_of(id, self.rows.len())?;
        self.rows[i] = fields;
        Ok(())
    }

    async fn delete_row(&mut self, id: RowId) -> Result<(), StoreError> {
        self.check_online()?;
        let i = index_of(id, self.rows.len())?;
        self.rows.remove(i);
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Fields>, StoreError> {
        self.check_online()?;
        Ok(self.rows.clone())
    }
}
