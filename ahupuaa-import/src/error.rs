//! Types d'erreurs du pipeline d'import

use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

/// Erreurs du pipeline d'import
#[derive(Debug, Error)]
pub enum ImportError {
    /// Une feature ne peut pas être convertie en enregistrement (jamais fatal)
    #[error("Malformed feature {feature_id}: {field}: {reason}")]
    MalformedFeature {
        feature_id: String,
        field: String,
        reason: String,
    },

    /// Document source introuvable
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// La table n'est pas devenue active dans le délai imparti
    #[error("Store {table} not ready after {waited_secs}s")]
    StoreUnavailable { table: String, waited_secs: u64 },

    /// Un groupe garde des éléments non écrits après toutes les tentatives
    #[error("Batch exhausted after {attempts} attempts: {unprocessed} items left unwritten")]
    BatchExhausted { attempts: u32, unprocessed: usize },

    /// Document GeoJSON illisible
    #[error("Failed to decode input: {0}")]
    Decode(#[from] ahupuaa_geo::GeoError),

    /// Erreur d'entrée/sortie
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Erreur du stockage
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration invalide
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Tâche de décodage interrompue
    #[error("Decode task failed: {0}")]
    Task(String),
}

impl ImportError {
    /// Crée une erreur de feature mal formée
    pub fn malformed(
        feature_id: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedFeature {
            feature_id: feature_id.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Vrai si l'erreur ne concerne qu'une feature
    pub fn is_feature_level(&self) -> bool {
        matches!(self, Self::MalformedFeature { .. })
    }
}
