//! Puits sans stockage pour `--dry-run`
//!
//! Les lots sont validés (taille, clés) puis comptés et oubliés: la mémoire
//! reste constante quelle que soit la taille du fichier importé.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{RecordStore, StoreError, StoreLifecycle, TableStatus};
use crate::config::MAX_BATCH_SIZE;
use crate::record::Item;

/// Table simulée: toujours ACTIVE, n'écrit rien
#[derive(Debug)]
pub struct DiscardStore {
    table_name: String,
    written: AtomicUsize,
    calls: AtomicUsize,
}

impl DiscardStore {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            written: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Nombre d'éléments acceptés puis jetés
    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    /// Nombre d'appels à `put_batch`
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RecordStore for DiscardStore {
    async fn put_batch(&self, items: &[Item]) -> Result<Vec<Item>, StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if items.len() > MAX_BATCH_SIZE {
            return Err(StoreError::InvalidRequest(format!(
                "batch of {} items exceeds limit of {}",
                items.len(),
                MAX_BATCH_SIZE
            )));
        }
        if items.iter().any(|item| item.key().is_none()) {
            return Err(StoreError::InvalidRequest(
                "item is missing its primary or sort key".into(),
            ));
        }

        self.written.fetch_add(items.len(), Ordering::Relaxed);
        Ok(Vec::new())
    }
}

#[async_trait]
impl StoreLifecycle for DiscardStore {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn table_status(&self) -> Result<TableStatus, StoreError> {
        Ok(TableStatus::Active)
    }

    async fn set_throughput(&self, read: i64, write: i64) -> Result<(), StoreError> {
        debug!(table = %self.table_name, read, write, "Dry run: capacity change skipped");
        Ok(())
    }

    async fn delete_all(&self, confirm: bool) -> Result<usize, StoreError> {
        if confirm {
            info!(table = %self.table_name, "Dry run: nothing to delete");
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ItemValue, PRIMARY_KEY, SORT_KEY};

    fn item(pk: &str) -> Item {
        let mut item = Item::new();
        item.insert(PRIMARY_KEY, ItemValue::string(pk));
        item.insert(SORT_KEY, ItemValue::string("MOKUPUNI#Maui#MOKU#Hana"));
        item
    }

    #[tokio::test]
    async fn test_counts_without_keeping_items() {
        let store = DiscardStore::new("t");
        let batch: Vec<Item> = (0..25).map(|i| item(&format!("AHUPUAA#{i}"))).collect();

        for _ in 0..4 {
            assert!(store.put_batch(&batch).await.unwrap().is_empty());
        }

        assert_eq!(store.written(), 100);
        assert_eq!(store.call_count(), 4);
        assert_eq!(store.delete_all(true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejects_invalid_batches() {
        let store = DiscardStore::new("t");

        let oversized: Vec<Item> = (0..26).map(|i| item(&format!("AHUPUAA#{i}"))).collect();
        let err = store.put_batch(&oversized).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));

        let mut keyless = Item::new();
        keyless.insert(PRIMARY_KEY, ItemValue::string("AHUPUAA#1"));
        let err = store.put_batch(&[keyless]).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));

        assert_eq!(store.written(), 0);
    }

    #[tokio::test]
    async fn test_lifecycle_is_simulated() {
        let store = DiscardStore::new("AhupuaaGIS_dev");
        assert_eq!(store.table_status().await.unwrap(), TableStatus::Active);
        assert!(store.set_throughput(5, 100).await.is_ok());
        assert_eq!(store.table_name(), "AhupuaaGIS_dev");
    }
}
