//! Dérivations géométriques: centroïde, emprise, décimation, geohash
//!
//! Les coordonnées GeoJSON sont en ordre `[lng, lat]`.

pub mod decimate;
pub mod geocell;

pub use decimate::{decimate, decimate_ring, stride_for, DECIMATION_THRESHOLD};
pub use geocell::{encode_geohash, GEOHASH_PLACEHOLDER, GEOHASH_PRECISION};

use geo::{BoundingRect, Coord, LineString};
use geojson::{Geometry, Position, Value};

use crate::types::{Bounds, LatLng};

/// Estime le centroïde d'une géométrie
///
/// - Point: la coordonnée elle-même
/// - Polygon: moyenne arithmétique des sommets de l'anneau extérieur
///   (non pondérée par l'aire, le sommet de fermeture compte deux fois)
/// - autres types: `None`
pub fn estimate_centroid(geometry: &Geometry) -> Option<LatLng> {
    match &geometry.value {
        Value::Point(position) => to_coord(position).map(|c| LatLng::new(c.y, c.x)),
        Value::Polygon(rings) => {
            let coords = exterior_coords(rings.first()?)?;
            let sum = coords
                .iter()
                .fold(Coord { x: 0.0, y: 0.0 }, |acc, c| acc + *c);
            let mean = sum / coords.len() as f64;
            Some(LatLng::new(mean.y, mean.x))
        }
        _ => None,
    }
}

/// Extrait l'emprise de l'anneau extérieur d'un polygone
///
/// `None` pour tout autre type de géométrie.
pub fn extract_bounds(geometry: &Geometry) -> Option<Bounds> {
    match &geometry.value {
        Value::Polygon(rings) => {
            let coords = exterior_coords(rings.first()?)?;
            let rect = LineString::new(coords).bounding_rect()?;
            Some(Bounds {
                northeast: LatLng::new(rect.max().y, rect.max().x),
                southwest: LatLng::new(rect.min().y, rect.min().x),
            })
        }
        _ => None,
    }
}

/// Nom GeoJSON du type de géométrie
pub fn geometry_type(geometry: &Geometry) -> &'static str {
    match geometry.value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Convertit un anneau en coordonnées; `None` si vide ou si une position est incomplète
fn exterior_coords(ring: &[Position]) -> Option<Vec<Coord>> {
    if ring.is_empty() {
        return None;
    }
    ring.iter().map(|p| to_coord(p)).collect()
}

fn to_coord(position: &Position) -> Option<Coord> {
    match position.as_slice() {
        [x, y, ..] => Some(Coord { x: *x, y: *y }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Geometry {
        Geometry::new(Value::Polygon(vec![vec![
            vec![-158.0, 21.0],
            vec![-157.0, 21.0],
            vec![-157.0, 22.0],
            vec![-158.0, 22.0],
            vec![-158.0, 21.0],
        ]]))
    }

    #[test]
    fn test_centroid_point() {
        let point = Geometry::new(Value::Point(vec![-157.8, 21.3]));
        assert_eq!(estimate_centroid(&point), Some(LatLng::new(21.3, -157.8)));
    }

    #[test]
    fn test_centroid_polygon_is_vertex_mean() {
        // Le sommet de fermeture est compté: (21*3 + 22*2) / 5
        let centroid = estimate_centroid(&square()).unwrap();
        assert!((centroid.lat - 21.4).abs() < 1e-12);
        assert!((centroid.lng - (-157.6)).abs() < 1e-12);
    }

    #[test]
    fn test_centroid_other_types() {
        let line = Geometry::new(Value::LineString(vec![vec![0.0, 0.0], vec![1.0, 1.0]]));
        assert_eq!(estimate_centroid(&line), None);

        let empty = Geometry::new(Value::Polygon(vec![vec![]]));
        assert_eq!(estimate_centroid(&empty), None);

        let truncated = Geometry::new(Value::Polygon(vec![vec![vec![1.0]]]));
        assert_eq!(estimate_centroid(&truncated), None);
    }

    #[test]
    fn test_bounds_polygon() {
        let bounds = extract_bounds(&square()).unwrap();
        assert_eq!(bounds.northeast, LatLng::new(22.0, -157.0));
        assert_eq!(bounds.southwest, LatLng::new(21.0, -158.0));
        assert_eq!(bounds.span_degrees(), 1.0);
    }

    #[test]
    fn test_bounds_non_polygon() {
        let point = Geometry::new(Value::Point(vec![-157.8, 21.3]));
        assert!(extract_bounds(&point).is_none());
    }

    #[test]
    fn test_geometry_type() {
        assert_eq!(geometry_type(&square()), "Polygon");
        assert_eq!(
            geometry_type(&Geometry::new(Value::Point(vec![0.0, 0.0]))),
            "Point"
        );
    }
}
