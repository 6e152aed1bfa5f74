//! # ahupuaa-import
//!
//! Import des découpages ahupuaʻa (GeoJSON) dans une table DynamoDB servant
//! les tuiles cartographiques.
//!
//! ## Features
//!
//! - Lecture en flux, un enregistrement par feature
//! - Trois niveaux de détail, geohash, emprise et priorité d'affichage
//! - Écriture par lots de 25 en parallèle avec reprise bornée
//! - Administration de la table (attente, capacité, purge)
//! - Stockage en mémoire pour les tests, puits sans stockage pour `--dry-run`
//!
//! ## Usage CLI
//!
//! ```bash
//! # Import de test (2 enregistrements)
//! ahupuaa-import --input data/ahupuaa.geojson --test
//!
//! # Import complet en production avec capacité temporaire
//! ahupuaa-import --input data/ahupuaa.geojson --env prod --boost-capacity 100 --yes
//!
//! # État de la table
//! ahupuaa-import status --env staging
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod importer;
pub mod record;
pub mod report;
pub mod store;
pub mod writer;

pub use config::{ImportConfig, RetryPolicy, RunConstants};
pub use error::ImportError;
pub use importer::Importer;
pub use report::{ImportPhase, ImportReport, ImportStatus};
pub use store::{DiscardStore, DynamoDbStore, MemoryStore, RecordStore, StoreLifecycle};
pub use writer::BatchWriter;
