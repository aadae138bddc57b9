pub mod config;
pub mod lines;
pub mod logging;
pub mod materials;
pub mod money;
pub mod receipt;
pub mod report;
pub mod session;
pub mod store;
pub mod transaction;

use anyhow::{Context, Result};
use futures::stream::{TryStream, TryStreamExt};
use itertools::Itertools;
use receipt::{BlobStore, receipt_file_name};
use report::{Balanced, Report, Window, build_settlement_report, compute_running_balance};
use std::cmp::Reverse;
use store::{RowId, RowStore};
use transaction::{NewTransaction, Transaction, raw};

/// The income and expense ledger on top of a row store.
pub struct Ledger<S> {
    store: S,
}

impl<S: RowStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Ledger { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Every readable row in storage order. Rows without a readable date or
    /// kind are logged and left out.
    pub async fn load(&self) -> Result<Vec<Transaction>> {
        let rows = self.store.read_all().await?;
        let total = rows.len();
        let transactions: Vec<Transaction> = rows
            .into_iter()
            .enumerate()
            .filter_map(|(i, fields)| match Transaction::from_fields(i + 1, fields) {
                Ok(tx) => Some(tx),
                Err(err) => {
                    tracing::warn!("Skipping {:#}", err);
                    None
                }
            })
            .collect();
        tracing::debug!("Loaded {} of {} rows", transactions.len(), total);
        Ok(transactions)
    }

    /// Transactions for the list view, newest first.
    pub async fn transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .sorted_by_key(|tx| Reverse((tx.date, tx.id)))
            .collect())
    }

    pub async fn running_balance(&self) -> Result<Vec<Balanced>> {
        Ok(compute_running_balance(&self.load().await?))
    }

    /// Income minus expense over the whole ledger.
    pub async fn balance(&self) -> Result<i64> {
        Ok(self.load().await?.iter().map(Transaction::signed_amount).sum())
    }

    pub async fn settlement(&self, window: Option<Window>) -> Result<Report> {
        Ok(build_settlement_report(&self.load().await?, window))
    }

    pub async fn add(&mut self, new: NewTransaction) -> Result<RowId> {
        let new = new.validated()?;
        let id = self.store.append_row(new.to_fields()).await?;
        tracing::info!("Added {} {} on {} as row {}", new.kind, new.amount, new.date, id);
        Ok(id)
    }

    /// Uploads the receipt first; nothing is saved if the upload fails.
    pub async fn add_with_receipt(
        &mut self,
        new: NewTransaction,
        receipt: &[u8],
        blobs: &impl BlobStore,
    ) -> Result<RowId> {
        let new = new.validated()?;
        let name = receipt_file_name(new.date, &new.description);
        let link = blobs
            .upload(receipt, &name)
            .await
            .context("Receipt upload failed, transaction not saved")?;
        self.add(new.with_receipt(&link)).await
    }

    /// Overwrites a row, keeping the receipt link it already has.
    pub async fn edit(&mut self, id: RowId, new: NewTransaction) -> Result<()> {
        let new = new.validated()?;
        let rows = self.store.read_all().await?;
        let current = rows
            .into_iter()
            .nth(id.wrapping_sub(1))
            .map(raw::Row::from)
            .ok_or(store::StoreError::RowNotFound(id))?;
        let new = new.with_receipt(&current.receipt_link);
        self.store.update_row(id, new.to_fields()).await?;
        tracing::info!("Edited row {}", id);
        Ok(())
    }

    /// Removes a row. Every later row id moves down by one.
    pub async fn delete(&mut self, id: RowId) -> Result<()> {
        self.store.delete_row(id).await?;
        tracing::info!("Deleted row {}", id);
        Ok(())
    }

    /// Appends every parsed line. All lines are checked before anything is
    /// written.
    pub async fn import<L>(&mut self, lines: L) -> Result<Vec<RowId>>
    where
        L: TryStream<Ok = String, Error = std::io::Error>,
    {
        let lines: Vec<String> = lines.into_stream().try_collect().await?;
        let entries = lines
            .iter()
            .map(|line| {
                line.parse::<NewTransaction>()
                    .and_then(NewTransaction::validated)
                    .with_context(|| format!("Failed to import '{}'", line))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            ids.push(self.store.append_row(entry.to_fields()).await?);
        }
        tracing::info!("Imported {} transactions", ids.len());
        Ok(ids)
    }
}
