//! Stockage en mémoire
//!
//! Sert aux tests. Les réponses peuvent être
//! scriptées par clé primaire: éléments renvoyés comme non traités pendant
//! N appels (ou toujours), ou erreur franche pendant N appels.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{RecordStore, StoreError, StoreLifecycle, TableStatus};
use crate::record::Item;

/// Comportement scripté pour une clé primaire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    /// Renvoyé comme non traité (`None` = indéfiniment)
    Unprocessed(Option<u32>),
    /// Tout appel contenant la clé échoue
    Fail(u32),
}

#[derive(Debug)]
struct MemoryState {
    items: BTreeMap<(String, String), Item>,
    status: TableStatus,
    throughput: Option<(i64, i64)>,
    scripts: HashMap<String, Script>,
    /// Clés primaires envoyées, par appel
    calls: Vec<Vec<String>>,
    status_checks: usize,
}

/// Table en mémoire implémentant [`RecordStore`] et [`StoreLifecycle`]
#[derive(Debug)]
pub struct MemoryStore {
    table_name: String,
    max_batch_size: usize,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            max_batch_size: crate::config::MAX_BATCH_SIZE,
            state: Mutex::new(MemoryState {
                items: BTreeMap::new(),
                status: TableStatus::Active,
                throughput: None,
                scripts: HashMap::new(),
                calls: Vec::new(),
                status_checks: 0,
            }),
        }
    }

    /// Limite la taille des lots acceptés
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: TableStatus) {
        self.state().status = status;
    }

    /// L'élément `primary_key` est renvoyé non traité pendant `times` appels
    pub fn reject_unprocessed(&self, primary_key: impl Into<String>, times: u32) {
        self.state()
            .scripts
            .insert(primary_key.into(), Script::Unprocessed(Some(times)));
    }

    /// L'élément `primary_key` n'est jamais écrit
    pub fn reject_always(&self, primary_key: impl Into<String>) {
        self.state()
            .scripts
            .insert(primary_key.into(), Script::Unprocessed(None));
    }

    /// Les `times` prochains appels contenant `primary_key` échouent
    pub fn fail_calls(&self, primary_key: impl Into<String>, times: u32) {
        self.state()
            .scripts
            .insert(primary_key.into(), Script::Fail(times));
    }

    /// Nombre total d'appels à `put_batch`
    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Taille de chaque appel à `put_batch`, dans l'ordre
    pub fn call_sizes(&self) -> Vec<usize> {
        self.state().calls.iter().map(Vec::len).collect()
    }

    /// Nombre d'appels ayant contenu `primary_key`
    pub fn attempts_for(&self, primary_key: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.iter().any(|pk| pk == primary_key))
            .count()
    }

    pub fn status_checks(&self) -> usize {
        self.state().status_checks
    }

    pub fn throughput(&self) -> Option<(i64, i64)> {
        self.state().throughput
    }

    /// Nombre d'enregistrements stockés
    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, primary_key: &str, sort_key: &str) -> Option<Item> {
        self.state()
            .items
            .get(&(primary_key.to_string(), sort_key.to_string()))
            .cloned()
    }

    /// Copie de tous les enregistrements, triés par clé
    pub fn items(&self) -> Vec<Item> {
        self.state().items.values().cloned().collect()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn put_batch(&self, items: &[Item]) -> Result<Vec<Item>, StoreError> {
        if items.len() > self.max_batch_size {
            return Err(StoreError::InvalidRequest(format!(
                "batch of {} items exceeds limit of {}",
                items.len(),
                self.max_batch_size
            )));
        }

        let mut state = self.state();
        let keys: Vec<String> = items
            .iter()
            .map(|item| item.primary_key().unwrap_or_default().to_string())
            .collect();
        state.calls.push(keys.clone());

        if state.status == TableStatus::Missing {
            return Err(StoreError::NotFound(self.table_name.clone()));
        }

        for pk in &keys {
            if let Some(Script::Fail(remaining)) = state.scripts.get_mut(pk) {
                if *remaining > 0 {
                    *remaining -= 1;
                    debug!(primary_key = %pk, "Scripted failure");
                    return Err(StoreError::Service(format!("scripted failure for {}", pk)));
                }
            }
        }

        let mut unprocessed = Vec::new();
        for item in items {
            let Some((pk, sk)) = item.key() else {
                return Err(StoreError::InvalidRequest(
                    "item is missing its primary or sort key".into(),
                ));
            };

            let rejected = match state.scripts.get_mut(&pk) {
                Some(Script::Unprocessed(None)) => true,
                Some(Script::Unprocessed(Some(remaining))) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };

            if rejected {
                unprocessed.push(item.clone());
            } else {
                state.items.insert((pk, sk), item.clone());
            }
        }

        Ok(unprocessed)
    }
}

#[async_trait]
impl StoreLifecycle for MemoryStore {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn table_status(&self) -> Result<TableStatus, StoreError> {
        let mut state = self.state();
        state.status_checks += 1;
        Ok(state.status.clone())
    }

    async fn set_throughput(&self, read: i64, write: i64) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.status == TableStatus::Missing {
            return Err(StoreError::NotFound(self.table_name.clone()));
        }
        state.throughput = Some((read, write));
        Ok(())
    }

    async fn delete_all(&self, confirm: bool) -> Result<usize, StoreError> {
        if !confirm {
            warn!(table = %self.table_name, "Deletion not confirmed, nothing deleted");
            return Ok(0);
        }
        let mut state = self.state();
        let deleted = state.items.len();
        state.items.clear();
        Ok(deleted)
    }
}
