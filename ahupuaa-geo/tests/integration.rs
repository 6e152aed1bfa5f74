//! Tests d'intégration: lecture d'un fichier GeoJSON réel sur disque

use std::ops::ControlFlow;

use ahupuaa_geo::geometry::{decimate, encode_geohash, estimate_centroid, extract_bounds};
use ahupuaa_geo::{count_features, for_each_feature, reader};
use geojson::Value;

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

fn write_fixture(name: &str) -> std::path::PathBuf {
    let collection = serde_json::json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": "kona",
                "properties": {"ahupuaa": "Kona", "moku": "Kona", "mokupuni": "Oʻahu"},
                "geometry": {"type": "Polygon", "coordinates": [polygon_ring(150)]}
            },
            {
                "type": "Feature",
                "properties": {"name": "Point"},
                "geometry": {"type": "Point", "coordinates": [-157.83, 21.28]}
            }
        ]
    });

    let path = std::env::temp_dir().join(name);
    std::fs::write(&path, serde_json::to_vec(&collection).unwrap()).unwrap();
    path
}

#[test]
fn test_stream_file_from_disk() {
    let path = write_fixture("ahupuaa_geo_integration.geojson");

    let total = count_features(reader::open(&path).unwrap()).unwrap();
    assert_eq!(total, 2);

    let mut features = Vec::new();
    let summary = for_each_feature(reader::open(&path).unwrap(), |feature| {
        features.push(feature.expect("fixture features are valid"));
        ControlFlow::Continue(())
    })
    .unwrap();
    assert_eq!(summary.features, 2);

    let polygon = features[0].geometry.as_ref().unwrap();
    let centroid = estimate_centroid(polygon).unwrap();
    let bounds = extract_bounds(polygon).unwrap();
    assert!(bounds.southwest.lat <= centroid.lat && centroid.lat <= bounds.northeast.lat);
    assert!(bounds.southwest.lng <= centroid.lng && centroid.lng <= bounds.northeast.lng);

    let hash = encode_geohash(centroid, 7).unwrap();
    assert_eq!(hash.len(), 7);

    match (&polygon.value, decimate(&polygon.value, 0.03)) {
        (Value::Polygon(original), Value::Polygon(reduced)) => {
            assert!(reduced[0].len() < original[0].len());
            assert_eq!(reduced[0].first(), original[0].first());
            assert_eq!(reduced[0].last(), original[0].last());
        }
        other => panic!("unexpected geometry: {other:?}"),
    }

    assert_eq!(features[1].resolved_id(), "1");

    std::fs::remove_file(path).ok();
}

#[test]
fn test_missing_file() {
    let path = std::env::temp_dir().join("ahupuaa_geo_does_not_exist.geojson");
    assert!(reader::open(&path).is_err());
}
