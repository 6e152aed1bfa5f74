//! Tests d'intégration: import complet d'un fichier GeoJSON vers le stockage
//! en mémoire

use std::path::{Path, PathBuf};

use ahupuaa_import::config::{ImportConfig, RetryPolicy, RunConstants};
use ahupuaa_import::record::{Item, ItemValue};
use ahupuaa_import::{ImportError, ImportStatus, Importer, MemoryStore};
use geojson::{Geometry, Value};

fn polygon_ring(n: usize) -> Vec<[f64; 2]> {
    let mut ring: Vec<[f64; 2]> = (0..n - 1)
        .map(|i| {
            let angle = i as f64 / (n - 1) as f64 * std::f64::consts::TAU;
            [-157.85 + angle.cos() * 0.02, 21.30 + angle.sin() * 0.02]
        })
        .collect();
    ring.push(ring[0]);
    ring
}

fn write_scenario(name: &str) -> PathBuf {
    let collection = serde_json::json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": "waikiki",
                "properties": {"ahupuaa": "Waikīkī", "moku": "Kona", "mokupuni": "Oʻahu", "gisacres": 45000.0},
                "geometry": {"type": "Polygon", "coordinates": [polygon_ring(150)]}
            },
            {
                "type": "Feature",
                "id": "marker",
                "properties": {"ahupuaa": "Marker", "moku": "Kona", "mokupuni": "Oʻahu"},
                "geometry": {"type": "Point", "coordinates": [-157.83, 21.28]}
            },
            {
                "type": "Feature",
                "id": "orphan",
                "properties": {"ahupuaa": "Orphan"},
                "geometry": {"type": "Polygon", "coordinates": [[[-157.9, 21.4], [-157.8, 21.4], [-157.8, 21.5], [-157.9, 21.4]]]}
            }
        ]
    });

    let path = std::env::temp_dir().join(name);
    std::fs::write(&path, serde_json::to_vec(&collection).unwrap()).unwrap();
    path
}

fn config() -> ImportConfig {
    ImportConfig::new("AhupuaaGIS_test")
        .with_retry(RetryPolicy::immediate(10))
        .with_run(RunConstants::fixed(1_718_000_000, "2024-06-10T06:13:20Z"))
}

fn text<'a>(item: &'a Item, name: &str) -> &'a str {
    item.get(name)
        .and_then(ItemValue::as_str)
        .unwrap_or_else(|| panic!("missing text attribute {name}"))
}

fn exterior(encoded: &str) -> Vec<Vec<f64>> {
    let geometry: Geometry = serde_json::from_str(encoded).unwrap();
    match geometry.value {
        Value::Polygon(mut rings) => rings.swap_remove(0),
        other => panic!("unexpected geometry: {other:?}"),
    }
}

fn content_hash(item: &Item) -> String {
    let metadata = item.get("Metadata").and_then(ItemValue::as_map).unwrap();
    metadata["ContentHash"].as_str().unwrap().to_string()
}

async fn import(path: &Path, config: &ImportConfig) -> MemoryStore {
    let store = MemoryStore::new(&config.table_name);
    let report = Importer::new(&store, config).run(path).await.unwrap();
    assert_eq!(report.status, ImportStatus::Success);
    store
}

#[tokio::test]
async fn test_three_feature_scenario() {
    let path = write_scenario("ahupuaa_pipeline_scenario.geojson");
    let config = config();
    let store = import(&path, &config).await;

    // Un seul appel de 3 éléments
    assert_eq!(store.call_sizes(), vec![3]);

    let orphan = store
        .get("AHUPUAA#orphan", "MOKUPUNI#Unknown#MOKU#Unknown")
        .expect("orphan record uses the default sort key");
    assert_eq!(text(&orphan, "IslandName"), "Unknown");
    assert_eq!(text(&orphan, "DistrictName"), "Unknown");

    let waikiki = store
        .get("AHUPUAA#waikiki", "MOKUPUNI#Oʻahu#MOKU#Kona")
        .unwrap();
    let original = polygon_ring(150);
    for tier in ["LowDetailBoundaries", "SimplifiedBoundaries", "HighDetailBoundaries"] {
        let ring = exterior(text(&waikiki, tier));
        assert!(ring.len() < 150, "{tier} was not reduced");
        assert!((ring[0][0] - original[0][0]).abs() < 1e-9);
        assert!((ring[0][1] - original[0][1]).abs() < 1e-9);
        let last = ring.last().unwrap();
        assert!((last[0] - original[149][0]).abs() < 1e-9);
        assert!((last[1] - original[149][1]).abs() < 1e-9);
    }

    let geohash = text(&waikiki, "Geohash");
    assert_eq!(geohash.len(), 7);
    assert_eq!(text(&waikiki, "GeohashPrefix"), &geohash[..3]);
    assert_eq!(waikiki.get("ZoomLevel"), Some(&ItemValue::N("10".into())));
    assert_eq!(waikiki.get("DisplayPriority"), Some(&ItemValue::N("4".into())));

    // La géométrie complète se relit à 10 décimales près
    let full = exterior(text(&waikiki, "FullGeometry"));
    assert_eq!(full.len(), 150);
    for (decoded, source) in full.iter().zip(&original) {
        assert!((decoded[0] - source[0]).abs() < 1e-9);
        assert!((decoded[1] - source[1]).abs() < 1e-9);
    }

    let marker = store.get("AHUPUAA#marker", "MOKUPUNI#Oʻahu#MOKU#Kona").unwrap();
    assert_eq!(text(&marker, "GeometryType"), "Point");

    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_content_hash_is_stable_across_runs() {
    let path = write_scenario("ahupuaa_pipeline_hash.geojson");
    let config = config();

    let first = import(&path, &config).await.items();
    let second = import(&path, &config).await.items();

    assert_eq!(first.len(), 3);
    let hashes: Vec<String> = first.iter().map(content_hash).collect();
    assert_eq!(hashes, second.iter().map(content_hash).collect::<Vec<_>>());
    assert_eq!(first, second);

    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_limit_mode_imports_first_records() {
    let path = write_scenario("ahupuaa_pipeline_limit.geojson");
    let config = config().with_limit(Some(2));
    let store = import(&path, &config).await;

    assert_eq!(store.len(), 2);
    assert!(store.get("AHUPUAA#orphan", "MOKUPUNI#Unknown#MOKU#Unknown").is_none());

    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_missing_input_is_fatal() {
    let config = config();
    let store = MemoryStore::new("AhupuaaGIS_test");
    let err = Importer::new(&store, &config)
        .run(Path::new("/nonexistent/ahupuaa.geojson"))
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::InputNotFound(_)));
}
