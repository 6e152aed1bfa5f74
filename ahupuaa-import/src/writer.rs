//! Écriture par lots avec reprise
//!
//! Les éléments sont découpés en groupes de la taille maximale acceptée par
//! le stockage, puis écrits en parallèle (au plus `max_workers` groupes à la
//! fois). Chaque groupe suit sa propre machine à états de reprise: seuls les
//! éléments non traités sont renvoyés après un échec partiel, tout le reste
//! du groupe après une erreur franche. Un groupe épuisé n'interrompt pas ses
//! voisins.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::{ImportConfig, RetryPolicy};
use crate::error::ImportError;
use crate::record::Item;
use crate::store::{RecordStore, StoreError};

/// Étape suivante d'un groupe après une tentative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStep {
    /// Tout est écrit
    Done,
    /// Attendre puis renvoyer les éléments restants
    Retry { delay: Duration },
    /// Plus de tentative possible
    Exhausted,
}

/// Machine à états de reprise d'un groupe
#[derive(Debug)]
pub struct GroupRetry {
    policy: RetryPolicy,
    pending: Vec<Item>,
    total: usize,
    attempts: u32,
    errors: Vec<StoreError>,
}

impl GroupRetry {
    pub fn new(items: Vec<Item>, policy: RetryPolicy) -> Self {
        Self {
            policy,
            total: items.len(),
            pending: items,
            attempts: 0,
            errors: Vec::new(),
        }
    }

    /// Éléments à envoyer à la prochaine tentative
    pub fn pending(&self) -> &[Item] {
        &self.pending
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Enregistre une réponse du stockage (éventuellement partielle)
    pub fn after_write(&mut self, unprocessed: Vec<Item>) -> GroupStep {
        self.attempts += 1;
        self.pending = unprocessed;
        if self.pending.is_empty() {
            return GroupStep::Done;
        }
        self.next_step(self.policy.partial_backoff(self.attempts))
    }

    /// Enregistre une erreur franche: tout le reste sera renvoyé
    pub fn after_error(&mut self, err: StoreError) -> GroupStep {
        self.attempts += 1;
        self.errors.push(err);
        self.next_step(self.policy.error_backoff(self.attempts))
    }

    fn next_step(&self, delay: Duration) -> GroupStep {
        if self.attempts >= self.policy.max_retries {
            GroupStep::Exhausted
        } else {
            GroupStep::Retry { delay }
        }
    }

    pub fn into_outcome(self, index: usize) -> GroupOutcome {
        GroupOutcome {
            index,
            attempts: self.attempts,
            written: self.total - self.pending.len(),
            unprocessed: self.pending.len(),
            errors: self.errors.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Bilan d'un groupe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOutcome {
    /// Rang du groupe dans l'appel
    pub index: usize,
    pub attempts: u32,
    pub written: usize,
    /// Éléments restés non écrits
    pub unprocessed: usize,
    /// Erreurs franches rencontrées
    pub errors: Vec<String>,
}

impl GroupOutcome {
    pub fn success(&self) -> bool {
        self.unprocessed == 0
    }
}

/// Bilan d'un appel à [`BatchWriter::write_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    /// Un bilan par groupe, dans l'ordre de découpage
    pub groups: Vec<GroupOutcome>,
}

impl WriteReport {
    /// Vrai si tous les groupes ont tout écrit
    pub fn success(&self) -> bool {
        self.groups.iter().all(GroupOutcome::success)
    }

    pub fn written(&self) -> usize {
        self.groups.iter().map(|g| g.written).sum()
    }

    pub fn unprocessed(&self) -> usize {
        self.groups.iter().map(|g| g.unprocessed).sum()
    }

    /// Erreur décrivant l'échec, si au moins un groupe est épuisé
    pub fn exhausted_error(&self) -> Option<ImportError> {
        let failed: Vec<&GroupOutcome> = self.groups.iter().filter(|g| !g.success()).collect();
        if failed.is_empty() {
            return None;
        }
        Some(ImportError::BatchExhausted {
            attempts: failed.iter().map(|g| g.attempts).max().unwrap_or(0),
            unprocessed: failed.iter().map(|g| g.unprocessed).sum(),
        })
    }
}

/// Écrit des éléments par groupes avec reprise
pub struct BatchWriter<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    config: &'a ImportConfig,
}

impl<'a, S: RecordStore + ?Sized> BatchWriter<'a, S> {
    pub fn new(store: &'a S, config: &'a ImportConfig) -> Self {
        Self { store, config }
    }

    /// Taille des groupes envoyés au stockage
    pub fn group_size(&self) -> usize {
        self.store.max_batch_size().min(self.config.batch_size).max(1)
    }

    /// Écrit tous les éléments
    ///
    /// Retourne le bilan de chaque groupe; [`WriteReport::success`] est faux
    /// si un groupe garde des éléments non écrits après toutes ses tentatives.
    pub async fn write_all(&self, items: Vec<Item>) -> WriteReport {
        if items.is_empty() {
            return WriteReport::default();
        }

        let groups = split_groups(items, self.group_size());
        let workers = self.config.max_workers.min(groups.len()).max(1);
        debug!(groups = groups.len(), workers, "Writing groups");

        let mut outcomes: Vec<GroupOutcome> = stream::iter(groups.into_iter().enumerate())
            .map(|(index, group)| self.write_group(index, group))
            .buffer_unordered(workers)
            .collect()
            .await;
        outcomes.sort_by_key(|o| o.index);

        WriteReport { groups: outcomes }
    }

    async fn write_group(&self, index: usize, items: Vec<Item>) -> GroupOutcome {
        let mut retry = GroupRetry::new(items, self.config.retry);

        loop {
            let step = match self.store.put_batch(retry.pending()).await {
                Ok(unprocessed) => {
                    if !unprocessed.is_empty() {
                        debug!(
                            group = index,
                            attempt = retry.attempts() + 1,
                            unprocessed = unprocessed.len(),
                            "Partial write"
                        );
                    }
                    retry.after_write(unprocessed)
                }
                Err(err) => {
                    warn!(
                        group = index,
                        attempt = retry.attempts() + 1,
                        kind = err.kind(),
                        error = %err,
                        "Batch write failed"
                    );
                    retry.after_error(err)
                }
            };

            match step {
                GroupStep::Done => break,
                GroupStep::Retry { delay } => tokio::time::sleep(delay).await,
                GroupStep::Exhausted => {
                    error!(
                        group = index,
                        attempts = retry.attempts(),
                        unprocessed = retry.pending().len(),
                        "Group exhausted its retries"
                    );
                    break;
                }
            }
        }

        retry.into_outcome(index)
    }
}

fn split_groups(items: Vec<Item>, size: usize) -> Vec<Vec<Item>> {
    let mut groups = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        groups.push(iter.by_ref().take(size).collect());
    }
    groups
}
