//! Décimation de coordonnées par pas fixe
//!
//! Ce n'est pas une simplification géométrique (pas de Douglas-Peucker):
//! un anneau de plus de 100 points ne garde qu'un point intérieur sur
//! `round(1/factor)`, plus le premier et le dernier point (fermeture préservée).

use geojson::{Geometry, PolygonType, Position, Value};

/// Nombre de points en dessous duquel un anneau n'est jamais décimé
pub const DECIMATION_THRESHOLD: usize = 100;

/// Pas de décimation pour un facteur donné (au moins 1)
pub fn stride_for(factor: f64) -> usize {
    if !factor.is_finite() || factor <= 0.0 {
        return 1;
    }
    let stride = (1.0 / factor).round();
    if stride < 1.0 {
        1
    } else {
        stride as usize
    }
}

/// Décime un anneau (ou une liste de positions)
///
/// - ≤ 100 points: retourné tel quel
/// - sinon: `[premier] + ring[1..len-1] par pas de stride + [dernier]`
pub fn decimate_ring(ring: &[Position], factor: f64) -> Vec<Position> {
    if ring.len() <= DECIMATION_THRESHOLD {
        return ring.to_vec();
    }

    let stride = stride_for(factor);
    let last = ring.len() - 1;

    let mut out = Vec::with_capacity(2 + (last - 1) / stride + 1);
    out.push(ring[0].clone());
    out.extend(ring[1..last].iter().step_by(stride).cloned());
    out.push(ring[last].clone());
    out
}

/// Décime récursivement toutes les listes de positions d'une géométrie
pub fn decimate(value: &Value, factor: f64) -> Value {
    match value {
        Value::Point(p) => Value::Point(p.clone()),
        Value::MultiPoint(ps) => Value::MultiPoint(decimate_ring(ps, factor)),
        Value::LineString(ls) => Value::LineString(decimate_ring(ls, factor)),
        Value::MultiLineString(lines) => Value::MultiLineString(
            lines.iter().map(|ls| decimate_ring(ls, factor)).collect(),
        ),
        Value::Polygon(rings) => Value::Polygon(decimate_rings(rings, factor)),
        Value::MultiPolygon(polys) => Value::MultiPolygon(
            polys.iter().map(|rings| decimate_rings(rings, factor)).collect(),
        ),
        Value::GeometryCollection(geoms) => Value::GeometryCollection(
            geoms
                .iter()
                .map(|g| Geometry::new(decimate(&g.value, factor)))
                .collect(),
        ),
    }
}

fn decimate_rings(rings: &PolygonType, factor: f64) -> PolygonType {
    rings.iter().map(|ring| decimate_ring(ring, factor)).collect()
}
