//! Types d'erreurs pour le crate ahupuaa-geo

use thiserror::Error;

/// Erreurs pouvant survenir lors de la lecture d'une FeatureCollection
#[derive(Debug, Error)]
pub enum GeoError {
    /// Erreur d'I/O lors de la lecture du document
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document JSON illisible (fatal pour le flux)
    #[error("Malformed GeoJSON document: {0}")]
    Decode(#[from] serde_json::Error),

    /// Feature individuelle impossible à interpréter
    #[error("Invalid feature #{index} ({id}): {field}: {reason}")]
    InvalidFeature {
        index: usize,
        id: String,
        field: String,
        reason: String,
    },

    /// Géométrie invalide
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

impl GeoError {
    /// Crée une erreur de feature invalide avec contexte
    pub fn invalid_feature(
        index: usize,
        id: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFeature {
            index,
            id: id.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Indique si l'erreur ne concerne qu'une feature (le flux peut continuer)
    pub fn is_feature_level(&self) -> bool {
        matches!(self, Self::InvalidFeature { .. } | Self::InvalidGeometry(_))
    }
}
