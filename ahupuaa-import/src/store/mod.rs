//! Accès au stockage clé-valeur
//!
//! Deux contrats séparés: [`RecordStore`] pour l'écriture par lots (utilisé
//! par le writer) et [`StoreLifecycle`] pour l'administration de la table
//! (disponibilité, capacité, purge). Les deux sont implémentés par
//! [`DynamoDbStore`], par [`MemoryStore`] (tests) et par [`DiscardStore`]
//! (`--dry-run`).

pub mod discard;
pub mod dynamodb;
pub mod memory;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::MAX_BATCH_SIZE;
use crate::record::Item;

pub use discard::DiscardStore;
pub use dynamodb::{DynamoDbConfig, DynamoDbStore};
pub use memory::MemoryStore;

/// Erreurs remontées par un backend de stockage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Capacité dépassée
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Table inexistante
    #[error("Table not found: {0}")]
    NotFound(String),

    /// Requête refusée par le service
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Erreur réseau ou interne du service
    #[error("Service error: {0}")]
    Service(String),
}

impl StoreError {
    /// Libellé court pour les logs
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Throttled(_) => "throttled",
            StoreError::NotFound(_) => "not_found",
            StoreError::InvalidRequest(_) => "invalid_request",
            StoreError::Service(_) => "service",
        }
    }
}

/// État de la table cible
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    Active,
    /// Existe mais pas encore utilisable (CREATING, UPDATING...)
    Pending(String),
    Missing,
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableStatus::Active => f.write_str("ACTIVE"),
            TableStatus::Pending(status) => f.write_str(status),
            TableStatus::Missing => f.write_str("MISSING"),
        }
    }
}

/// Écriture par lots
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Nombre maximal d'éléments par appel à [`RecordStore::put_batch`]
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    /// Écrit un lot d'éléments
    ///
    /// Retourne les éléments que le service n'a pas traités (réponse
    /// partielle). Une liste vide signifie que tout le lot est écrit.
    async fn put_batch(&self, items: &[Item]) -> Result<Vec<Item>, StoreError>;
}

/// Administration de la table
#[async_trait]
pub trait StoreLifecycle: Send + Sync {
    /// Nom de la table gérée
    fn table_name(&self) -> &str;

    async fn table_status(&self) -> Result<TableStatus, StoreError>;

    /// Attend que la table soit ACTIVE
    ///
    /// Interroge l'état toutes les `poll_interval` jusqu'à `timeout`.
    /// Retourne `false` si le délai expire ou si la table n'existe pas.
    async fn is_ready(&self, timeout: Duration, poll_interval: Duration) -> Result<bool, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.table_status().await? {
                TableStatus::Active => {
                    debug!(table = %self.table_name(), "Table is active");
                    return Ok(true);
                }
                TableStatus::Missing => {
                    warn!(table = %self.table_name(), "Table does not exist");
                    return Ok(false);
                }
                TableStatus::Pending(status) => {
                    if Instant::now() + poll_interval > deadline {
                        warn!(table = %self.table_name(), status = %status, "Table not ready before timeout");
                        return Ok(false);
                    }
                    info!(table = %self.table_name(), status = %status, "Waiting for table");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }

    /// Modifie la capacité provisionnée (lecture, écriture)
    async fn set_throughput(&self, read: i64, write: i64) -> Result<(), StoreError>;

    /// Supprime tous les enregistrements de la table
    ///
    /// `confirm` est la décision déjà résolue par l'appelant: à `false`,
    /// rien n'est supprimé. Retourne le nombre d'enregistrements supprimés.
    async fn delete_all(&self, confirm: bool) -> Result<usize, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_status_display() {
        assert_eq!(TableStatus::Active.to_string(), "ACTIVE");
        assert_eq!(TableStatus::Pending("UPDATING".into()).to_string(), "UPDATING");
        assert_eq!(TableStatus::Missing.to_string(), "MISSING");
    }

    #[tokio::test]
    async fn test_is_ready_active() {
        let store = MemoryStore::new("AhupuaaGIS");
        let ready = store
            .is_ready(Duration::from_secs(1), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(ready);
    }

    #[tokio::test]
    async fn test_is_ready_times_out_when_pending() {
        let store = MemoryStore::new("AhupuaaGIS");
        store.set_status(TableStatus::Pending("CREATING".into()));

        let ready = store
            .is_ready(Duration::from_millis(50), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(!ready);
        assert!(store.status_checks() >= 2);
    }

    #[tokio::test]
    async fn test_is_ready_missing_table() {
        let store = MemoryStore::new("AhupuaaGIS");
        store.set_status(TableStatus::Missing);

        let ready = store
            .is_ready(Duration::from_secs(5), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(!ready);
        assert_eq!(store.status_checks(), 1);
    }

    #[test]
    fn test_store_error_kind() {
        assert_eq!(StoreError::Throttled("x".into()).kind(), "throttled");
        assert_eq!(StoreError::Service("x".into()).kind(), "service");
    }
}
