//! Configuration de l'import
//!
//! Tout est résolu une fois au démarrage puis passé par référence aux
//! composants: aucune variable globale mutable.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use tracing::{debug, info};

use crate::error::ImportError;

/// Taille maximale d'un lot atomique (limite BatchWriteItem)
pub const MAX_BATCH_SIZE: usize = 25;

/// Nombre maximal de groupes écrits en parallèle
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Nombre maximal de tentatives par groupe
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Nom de table par défaut
pub const DEFAULT_TABLE_NAME: &str = "AhupuaaGIS";

/// Nombre d'enregistrements importés en mode test
pub const DEFAULT_TEST_LIMIT: usize = 2;

/// Environnement cible
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "staging" | "stage" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}. Use: dev, staging, prod", s)),
        }
    }
}

/// Politique de reprise d'un groupe
///
/// Délai après la n-ième tentative ratée: `min(2^n × base, plafond)`, avec
/// une base et un plafond distincts pour les échecs partiels et les erreurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub partial_base: Duration,
    pub partial_cap: Duration,
    pub error_base: Duration,
    pub error_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            partial_base: Duration::from_millis(100),
            partial_cap: Duration::from_secs(1),
            error_base: Duration::from_millis(500),
            error_cap: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Politique sans attente (tests, stockage en mémoire)
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            partial_base: Duration::ZERO,
            partial_cap: Duration::ZERO,
            error_base: Duration::ZERO,
            error_cap: Duration::ZERO,
        }
    }

    /// Délai après un échec partiel (éléments non traités)
    pub fn partial_backoff(&self, retries: u32) -> Duration {
        backoff(self.partial_base, self.partial_cap, retries)
    }

    /// Délai après une erreur franche
    pub fn error_backoff(&self, retries: u32) -> Duration {
        backoff(self.error_base, self.error_cap, retries)
    }
}

fn backoff(base: Duration, cap: Duration, retries: u32) -> Duration {
    let factor = 2f64.powi(retries.min(32) as i32);
    base.mul_f64(factor).min(cap)
}

/// Constantes partagées par tous les enregistrements d'une exécution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConstants {
    /// Horodatage Unix (secondes) de l'exécution
    pub data_version: i64,
    /// Horodatage ISO-8601 de l'exécution
    pub last_updated: String,
}

impl RunConstants {
    /// Constantes pour une exécution démarrant maintenant
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            data_version: now.timestamp(),
            last_updated: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Constantes fixées (ré-exécutions reproductibles)
    pub fn fixed(data_version: i64, last_updated: impl Into<String>) -> Self {
        Self {
            data_version,
            last_updated: last_updated.into(),
        }
    }
}

/// Configuration immuable d'une exécution d'import
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Table cible
    pub table_name: String,
    /// Taille des groupes et des lots accumulés par l'import
    pub batch_size: usize,
    /// Nombre maximal de groupes écrits en parallèle
    pub max_workers: usize,
    /// Politique de reprise
    pub retry: RetryPolicy,
    /// Délai maximal d'attente de la table
    pub ready_timeout: Duration,
    /// Intervalle entre deux vérifications d'état
    pub ready_poll_interval: Duration,
    /// Mode test: nombre maximal d'enregistrements construits
    pub limit: Option<usize>,
    /// Constantes de l'exécution
    pub run: RunConstants,
}

impl ImportConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            batch_size: MAX_BATCH_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            retry: RetryPolicy::default(),
            ready_timeout: Duration::from_secs(60),
            ready_poll_interval: Duration::from_secs(5),
            limit: None,
            run: RunConstants::now(),
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_run(mut self, run: RunConstants) -> Self {
        self.run = run;
        self
    }

    /// Vérifie la cohérence des paramètres
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.table_name.trim().is_empty() {
            return Err(ImportError::Config("table name is empty".into()));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ImportError::Config(format!(
                "batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if self.max_workers == 0 {
            return Err(ImportError::Config("max workers must be at least 1".into()));
        }
        if self.retry.max_retries == 0 {
            return Err(ImportError::Config("max retries must be at least 1".into()));
        }
        Ok(())
    }

    /// Libellé du mode d'import
    pub fn mode_label(&self) -> String {
        match self.limit {
            Some(limit) => format!("TEST (importing {} records only)", limit),
            None => "PRODUCTION (importing all records)".to_string(),
        }
    }
}

fn tfvars_table_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?m)^\s*table_name\s*=\s*["']?([^"'\s#]+)["']?"#)
            .expect("tfvars pattern is valid")
    })
}

/// Extrait `table_name = "..."` d'un fichier de variables Terraform
pub fn table_name_from_tfvars(content: &str) -> Option<String> {
    tfvars_table_pattern()
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Résout le nom de table pour un environnement
///
/// Lit `<terraform_dir>/<env>.tfvars` s'il existe, sinon `AhupuaaGIS_<env>`.
pub fn resolve_table_name(env: Environment, terraform_dir: Option<&Path>) -> Result<String> {
    if let Some(dir) = terraform_dir {
        let vars_file = dir.join(format!("{}.tfvars", env));
        if vars_file.exists() {
            let content = std::fs::read_to_string(&vars_file)
                .with_context(|| format!("Failed to read vars file: {}", vars_file.display()))?;
            if let Some(table) = table_name_from_tfvars(&content) {
                info!(vars_file = %vars_file.display(), table = %table, "Using table name from vars file");
                return Ok(table);
            }
            debug!(vars_file = %vars_file.display(), "No table_name in vars file");
        }
    }
    Ok(format!("{}_{}", DEFAULT_TABLE_NAME, env))
}
