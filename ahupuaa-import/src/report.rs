//! Rapport d'import
//!
//! Collecte les compteurs d'une exécution (features lues, enregistrements
//! construits et écrits, features ignorées) et les affiche ou les
//! sauvegarde en JSON.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::error::ImportError;

/// Phase du pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportPhase {
    /// Premier passage: comptage des features
    Counting,
    /// Construction et écriture des lots pleins
    Processing,
    /// Écriture du dernier lot partiel
    Draining,
    Done,
    Failed,
}

/// Statut global de l'import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportStatus {
    /// Tout est écrit, aucune feature ignorée
    Success,
    /// Tout est écrit, des features mal formées ont été ignorées
    PartialSuccess,
    Failed,
}

/// Feature ignorée car mal formée
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFeature {
    pub feature_id: String,
    pub field: String,
    pub reason: String,
}

/// Rapport complet d'import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    /// Table cible
    pub table: String,
    /// Libellé du mode (test ou production)
    pub mode: String,
    pub status: ImportStatus,
    /// Dernière phase atteinte
    pub phase: ImportPhase,
    /// Features comptées au premier passage
    pub total_features: usize,
    /// Enregistrements construits
    pub built: usize,
    /// Enregistrements écrits
    pub written: usize,
    /// Lots envoyés au writer
    pub batches: usize,
    /// Features ignorées
    pub skipped: Vec<SkippedFeature>,
    /// Erreur fatale éventuelle
    pub fatal_error: Option<String>,
    pub duration_secs: f64,
    /// Enregistrements écrits par seconde
    pub throughput: f64,
}

impl ImportReport {
    pub fn new(table: &str, mode: &str) -> Self {
        Self {
            table: table.to_string(),
            mode: mode.to_string(),
            status: ImportStatus::Success,
            phase: ImportPhase::Counting,
            total_features: 0,
            built: 0,
            written: 0,
            batches: 0,
            skipped: Vec::new(),
            fatal_error: None,
            duration_secs: 0.0,
            throughput: 0.0,
        }
    }

    /// Enregistre une feature ignorée
    pub fn record_skipped(&mut self, skipped: SkippedFeature) {
        self.skipped.push(skipped);
    }

    /// Enregistre un lot écrit
    pub fn record_batch(&mut self, written: usize) {
        self.batches += 1;
        self.written += written;
    }

    /// Marque l'exécution comme échouée
    pub fn fail(&mut self, error: &ImportError) {
        self.phase = ImportPhase::Failed;
        self.fatal_error = Some(error.to_string());
    }

    /// Features traitées: écrites ou écartées
    ///
    /// `skipped` vient du producteur: pendant l'import, les features
    /// écartées ne rejoignent le rapport qu'à la fin du flux.
    pub fn processed(&self, skipped: usize) -> usize {
        self.written + skipped.max(self.skipped.len())
    }

    /// Progression en pourcentage du nombre de features
    pub fn progress_percent(&self, skipped: usize) -> f64 {
        if self.total_features == 0 {
            return 100.0;
        }
        self.processed(skipped) as f64 / self.total_features as f64 * 100.0
    }

    /// Fixe la durée et le statut final
    pub fn finalize(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
        self.throughput = if self.duration_secs > 0.0 {
            self.written as f64 / self.duration_secs
        } else {
            0.0
        };

        if self.fatal_error.is_some() {
            self.phase = ImportPhase::Failed;
            self.status = ImportStatus::Failed;
            return;
        }

        self.phase = ImportPhase::Done;
        self.status = if self.skipped.is_empty() {
            ImportStatus::Success
        } else {
            ImportStatus::PartialSuccess
        };
    }

    pub fn is_success(&self) -> bool {
        self.status != ImportStatus::Failed
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("IMPORT REPORT - {}", self.table);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Mode: {}", self.mode);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Features: {} counted, {} built, {} skipped",
            self.total_features,
            self.built,
            self.skipped.len()
        );
        println!(
            "Records: {} written in {} batches ({:.2} records/sec)",
            self.written, self.batches, self.throughput
        );

        if !self.skipped.is_empty() {
            println!("\n--- SKIPPED ({}) ---", self.skipped.len());
            for s in self.skipped.iter().take(20) {
                println!("  [{}] {}: {}", s.feature_id, s.field, s.reason);
            }
            if self.skipped.len() > 20 {
                println!("  ... and {} more", self.skipped.len() - 20);
            }
        }

        if let Some(error) = &self.fatal_error {
            println!("\n--- FATAL ---");
            println!("  {:?}: {}", self.phase, error);
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} records written in {:.2}s ({:.2} records/sec), {} skipped",
            self.table,
            self.written,
            self.duration_secs,
            self.throughput,
            self.skipped.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skipped(id: &str) -> SkippedFeature {
        SkippedFeature {
            feature_id: id.to_string(),
            field: "geometry".to_string(),
            reason: "feature has no geometry".to_string(),
        }
    }

    #[test]
    fn test_new_report() {
        let report = ImportReport::new("AhupuaaGIS", "PRODUCTION (importing all records)");
        assert_eq!(report.status, ImportStatus::Success);
        assert_eq!(report.phase, ImportPhase::Counting);
        assert_eq!(report.written, 0);
    }

    #[test]
    fn test_record_batch() {
        let mut report = ImportReport::new("t", "m");
        report.record_batch(25);
        report.record_batch(3);
        assert_eq!(report.batches, 2);
        assert_eq!(report.written, 28);
    }

    #[test]
    fn test_finalize_success() {
        let mut report = ImportReport::new("t", "m");
        report.record_batch(10);
        report.finalize(Duration::from_secs(2));

        assert_eq!(report.status, ImportStatus::Success);
        assert_eq!(report.phase, ImportPhase::Done);
        assert!((report.throughput - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_finalize_partial_success() {
        let mut report = ImportReport::new("t", "m");
        report.record_batch(2);
        report.record_skipped(skipped("7"));
        report.finalize(Duration::from_secs(1));

        assert_eq!(report.status, ImportStatus::PartialSuccess);
        assert!(report.is_success());
    }

    #[test]
    fn test_finalize_failed() {
        let mut report = ImportReport::new("t", "m");
        report.fail(&ImportError::BatchExhausted {
            attempts: 10,
            unprocessed: 1,
        });
        report.finalize(Duration::from_secs(1));

        assert_eq!(report.status, ImportStatus::Failed);
        assert_eq!(report.phase, ImportPhase::Failed);
        assert!(report.fatal_error.as_deref().unwrap().contains("10 attempts"));
    }

    #[test]
    fn test_progress_percent() {
        let mut report = ImportReport::new("t", "m");
        report.total_features = 4;
        report.record_batch(1);
        // Écartées en cours de flux, pas encore dans le rapport
        assert!((report.progress_percent(2) - 75.0).abs() < 1e-9);
        assert_eq!(report.processed(2), 3);

        report.record_skipped(skipped("2"));
        assert!((report.progress_percent(0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_and_save() {
        let mut report = ImportReport::new("AhupuaaGIS", "m");
        report.record_batch(100);
        report.finalize(Duration::from_secs(4));

        let summary = report.summary();
        assert!(summary.contains("AhupuaaGIS"));
        assert!(summary.contains("100 records written"));

        let path = std::env::temp_dir().join("ahupuaa_report_test.json");
        report.save_to_file(&path).unwrap();
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["written"], 100);
        assert_eq!(saved["status"], "Success");
        std::fs::remove_file(path).ok();
    }
}
