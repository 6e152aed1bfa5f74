//! Import en flux d'une FeatureCollection
//!
//! Phases: `Counting → Processing → Draining → Done | Failed`.
//!
//! Le décodage et la construction des enregistrements tournent dans une
//! tâche bloquante qui envoie les lots pleins par un canal de capacité 1;
//! la tâche async les écrit un par un avec le [`BatchWriter`]. Le dernier
//! lot partiel est rendu par le producteur à la fin du flux puis écrit
//! pendant la phase `Draining`.

use std::mem;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ahupuaa_geo::{reader, GeoError, RawFeature, StreamSummary};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{ImportConfig, RunConstants};
use crate::error::ImportError;
use crate::record::{Item, RecordBuilder};
use crate::report::{ImportPhase, ImportReport, SkippedFeature};
use crate::store::RecordStore;
use crate::writer::BatchWriter;

/// Bilan du producteur
#[derive(Debug, Default)]
struct Production {
    built: usize,
    skipped: Vec<SkippedFeature>,
    /// Dernier lot, incomplet
    trailing: Vec<Item>,
    stream: StreamSummary,
}

/// Compteurs partagés pour les logs de progression
struct Progress<'p> {
    /// Features écartées par le producteur jusqu'ici
    skipped: &'p AtomicUsize,
    started: &'p Instant,
}

/// Importe un fichier GeoJSON dans un stockage
pub struct Importer<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    config: &'a ImportConfig,
}

impl<'a, S: RecordStore + ?Sized> Importer<'a, S> {
    pub fn new(store: &'a S, config: &'a ImportConfig) -> Self {
        Self { store, config }
    }

    /// Exécute l'import complet
    ///
    /// # Errors
    ///
    /// Retourne une erreur si le fichier est absent, si la configuration est
    /// invalide ou si le comptage échoue. Une fois les écritures commencées,
    /// un échec (lot épuisé, document illisible) est porté par le rapport
    /// avec le statut `Failed`: les lots déjà écrits y sont comptés.
    pub async fn run(&self, path: &Path) -> Result<ImportReport, ImportError> {
        self.config.validate()?;
        if !path.is_file() {
            return Err(ImportError::InputNotFound(path.to_path_buf()));
        }

        let started = Instant::now();
        let mut report = ImportReport::new(&self.config.table_name, &self.config.mode_label());

        let size_mb = std::fs::metadata(path)?.len() as f64 / (1024.0 * 1024.0);
        info!(input = %path.display(), "Reading input ({:.2} MB)", size_mb);

        // Counting
        report.phase = ImportPhase::Counting;
        let total = count(path.to_path_buf()).await?;
        report.total_features = match self.config.limit {
            Some(limit) => total.min(limit),
            None => total,
        };
        info!(features = total, "Features to process: {}", report.total_features);

        // Processing
        report.phase = ImportPhase::Processing;
        let (tx, mut rx) = mpsc::channel::<Vec<Item>>(1);
        let skipped_seen = Arc::new(AtomicUsize::new(0));
        let producer = tokio::task::spawn_blocking({
            let path = path.to_path_buf();
            let run = self.config.run.clone();
            let batch_size = self.config.batch_size;
            let limit = self.config.limit;
            let skipped_seen = Arc::clone(&skipped_seen);
            move || produce(&path, &run, batch_size, limit, &skipped_seen, tx)
        });

        let writer = BatchWriter::new(self.store, self.config);
        let progress = Progress {
            skipped: &skipped_seen,
            started: &started,
        };
        let mut failure = None;
        while let Some(batch) = rx.recv().await {
            if let Err(err) = self.write_batch(&writer, batch, &mut report, &progress).await {
                failure = Some(err);
                break;
            }
        }
        // Débloque le producteur s'il attend encore
        drop(rx);

        let production = match producer.await {
            Ok(Ok(production)) => Some(production),
            Ok(Err(err)) => {
                error!(error = %err, "Input stream failed");
                failure.get_or_insert(ImportError::Decode(err));
                None
            }
            Err(err) => {
                failure.get_or_insert(ImportError::Task(err.to_string()));
                None
            }
        };

        if let Some(production) = production {
            report.built = production.built;
            for skipped in production.skipped {
                report.record_skipped(skipped);
            }
            if production.stream.stopped_early {
                debug!(read = production.stream.features, "Input stream stopped early");
            }

            // Draining
            if failure.is_none() && !production.trailing.is_empty() {
                report.phase = ImportPhase::Draining;
                if let Err(err) = self
                    .write_batch(&writer, production.trailing, &mut report, &progress)
                    .await
                {
                    failure = Some(err);
                }
            }
        }

        if let Some(err) = &failure {
            error!(phase = ?report.phase, error = %err, "Import failed");
            report.fail(err);
        }
        report.finalize(started.elapsed());

        if report.is_success() {
            info!(
                written = report.written,
                skipped = report.skipped.len(),
                "Import complete in {:.2}s ({:.2} records/sec)",
                report.duration_secs,
                report.throughput
            );
        }
        Ok(report)
    }

    async fn write_batch(
        &self,
        writer: &BatchWriter<'_, S>,
        batch: Vec<Item>,
        report: &mut ImportReport,
        progress: &Progress<'_>,
    ) -> Result<(), ImportError> {
        let outcome = writer.write_all(batch).await;
        report.record_batch(outcome.written());

        if let Some(err) = outcome.exhausted_error() {
            return Err(err);
        }

        let elapsed = progress.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            report.written as f64 / elapsed
        } else {
            0.0
        };
        let skipped = progress.skipped.load(Ordering::Relaxed);
        info!(
            "Progress: {:.1}% ({}/{}) - {:.2} items/sec",
            report.progress_percent(skipped),
            report.processed(skipped),
            report.total_features,
            rate
        );
        Ok(())
    }
}

async fn count(path: PathBuf) -> Result<usize, ImportError> {
    let counted = tokio::task::spawn_blocking(move || {
        let reader = reader::open(&path)?;
        reader::count_features(reader)
    })
    .await
    .map_err(|e| ImportError::Task(e.to_string()))?;
    Ok(counted?)
}

/// Décode les features et envoie les lots pleins
///
/// S'arrête dès que `limit` enregistrements sont construits ou que le
/// consommateur a fermé le canal. `skipped_seen` est incrémenté avant
/// l'envoi du lot suivant.
fn produce(
    path: &Path,
    run: &RunConstants,
    batch_size: usize,
    limit: Option<usize>,
    skipped_seen: &AtomicUsize,
    tx: mpsc::Sender<Vec<Item>>,
) -> Result<Production, GeoError> {
    let builder = RecordBuilder::new(run);
    let mut production = Production::default();
    let mut batch = Vec::with_capacity(batch_size);

    let input = reader::open(path)?;
    let stream = reader::for_each_feature(input, |feature| {
        if limit.is_some_and(|limit| production.built >= limit) {
            return ControlFlow::Break(());
        }

        match feature.map_err(skipped_from_geo).and_then(|f| build(&builder, &f)) {
            Ok(item) => {
                batch.push(item);
                production.built += 1;
            }
            Err(skipped) => {
                warn!(
                    feature_id = %skipped.feature_id,
                    field = %skipped.field,
                    reason = %skipped.reason,
                    "Skipping malformed feature"
                );
                production.skipped.push(skipped);
                skipped_seen.fetch_add(1, Ordering::Relaxed);
            }
        }

        if batch.len() >= batch_size && tx.blocking_send(mem::take(&mut batch)).is_err() {
            debug!("Writer closed the channel, stopping input stream");
            return ControlFlow::Break(());
        }

        if limit.is_some_and(|limit| production.built >= limit) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;

    production.stream = stream;
    production.trailing = batch;
    Ok(production)
}

fn build(builder: &RecordBuilder<'_>, feature: &RawFeature) -> Result<Item, SkippedFeature> {
    builder
        .build(feature)
        .map(|record| record.to_item())
        .map_err(|err| match err {
            ImportError::MalformedFeature {
                feature_id,
                field,
                reason,
            } => SkippedFeature {
                feature_id,
                field,
                reason,
            },
            other => SkippedFeature {
                feature_id: feature.resolved_id(),
                field: String::new(),
                reason: other.to_string(),
            },
        })
}

fn skipped_from_geo(err: GeoError) -> SkippedFeature {
    match err {
        GeoError::InvalidFeature {
            id, field, reason, ..
        } => SkippedFeature {
            feature_id: id,
            field,
            reason,
        },
        other => SkippedFeature {
            feature_id: String::new(),
            field: String::new(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::report::ImportStatus;
    use crate::store::MemoryStore;

    fn write_fixture(name: &str, features: &[String]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("ahupuaa_importer_{}.geojson", name));
        let doc = format!(
            r#"{{"type":"FeatureCollection","features":[{}]}}"#,
            features.join(",")
        );
        std::fs::write(&path, doc).unwrap();
        path
    }

    fn point_feature(id: usize) -> String {
        format!(
            r#"{{"type":"Feature","id":"{id}","properties":{{"ahupuaa":"A{id}","mokupuni":"Oahu","moku":"Kona"}},"geometry":{{"type":"Point","coordinates":[-157.8,21.3]}}}}"#
        )
    }

    fn config() -> ImportConfig {
        ImportConfig::new("AhupuaaGIS")
            .with_retry(RetryPolicy::immediate(3))
            .with_run(RunConstants::fixed(1_700_000_000, "2023-11-14T22:13:20Z"))
    }

    #[tokio::test]
    async fn test_batches_and_trailing_drain() {
        let features: Vec<String> = (0..30).map(point_feature).collect();
        let path = write_fixture("drain", &features);
        let store = MemoryStore::new("AhupuaaGIS");
        let config = config();

        let report = Importer::new(&store, &config).run(&path).await.unwrap();

        assert_eq!(report.status, ImportStatus::Success);
        assert_eq!(report.phase, ImportPhase::Done);
        assert_eq!(report.total_features, 30);
        assert_eq!(report.written, 30);
        assert_eq!(report.batches, 2);
        assert_eq!(store.call_sizes(), vec![25, 5]);
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_limit_mode() {
        let features: Vec<String> = (0..10).map(point_feature).collect();
        let path = write_fixture("limit", &features);
        let store = MemoryStore::new("AhupuaaGIS");
        let config = config().with_limit(Some(2));

        let report = Importer::new(&store, &config).run(&path).await.unwrap();

        assert_eq!(report.built, 2);
        assert_eq!(report.written, 2);
        assert_eq!(report.total_features, 2);
        assert_eq!(store.len(), 2);
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_malformed_feature_is_skipped() {
        let features = vec![
            point_feature(1),
            r#"{"type":"Feature","id":"2","properties":{},"geometry":null}"#.to_string(),
            point_feature(3),
        ];
        let path = write_fixture("malformed", &features);
        let store = MemoryStore::new("AhupuaaGIS");
        let config = config();

        let report = Importer::new(&store, &config).run(&path).await.unwrap();

        assert_eq!(report.status, ImportStatus::PartialSuccess);
        assert_eq!(report.written, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].feature_id, "2");
        assert_eq!(report.skipped[0].field, "geometry");
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_exhausted_batch_fails_run() {
        let features: Vec<String> = (0..60).map(point_feature).collect();
        let path = write_fixture("exhausted", &features);
        let store = MemoryStore::new("AhupuaaGIS");
        store.reject_always("AHUPUAA#30");
        let config = config();

        let report = Importer::new(&store, &config).run(&path).await.unwrap();

        assert_eq!(report.status, ImportStatus::Failed);
        assert_eq!(report.phase, ImportPhase::Failed);
        // Le premier lot reste écrit
        assert_eq!(report.written, 49);
        assert!(store.get("AHUPUAA#0", "MOKUPUNI#Oahu#MOKU#Kona").is_some());
        assert!(report.fatal_error.unwrap().contains("Batch exhausted"));
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_skipped_features_are_counted_before_next_batch() {
        let malformed = r#"{"type":"Feature","id":"x","properties":{},"geometry":null}"#;
        let features = vec![malformed.to_string(), malformed.to_string(), point_feature(3)];
        let path = write_fixture("skipped_progress", &features);

        let skipped_seen = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel(1);
        let producer = tokio::task::spawn_blocking({
            let path = path.clone();
            let skipped_seen = Arc::clone(&skipped_seen);
            move || {
                let run = RunConstants::fixed(1, "2024-01-01T00:00:00Z");
                produce(&path, &run, 1, None, &skipped_seen, tx)
            }
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(skipped_seen.load(Ordering::Relaxed), 2);

        assert!(rx.recv().await.is_none());
        let production = producer.await.unwrap().unwrap();
        assert_eq!(production.skipped.len(), 2);
        assert!(production.trailing.is_empty());
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_missing_input() {
        let store = MemoryStore::new("AhupuaaGIS");
        let config = config();
        let err = Importer::new(&store, &config)
            .run(Path::new("/nonexistent/ahupuaa.geojson"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::InputNotFound(_)));
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_truncated_document_fails_run() {
        let path = std::env::temp_dir().join("ahupuaa_importer_truncated.geojson");
        std::fs::write(
            &path,
            format!(r#"{{"type":"FeatureCollection","features":[{},"#, point_feature(1)),
        )
        .unwrap();
        let store = MemoryStore::new("AhupuaaGIS");
        let config = config();

        let err = Importer::new(&store, &config).run(&path).await.unwrap_err();
        assert!(matches!(err, ImportError::Decode(_)));
        std::fs::remove_file(path).ok();
    }
}
