//! Normalisation des flottants en décimal à précision fixe
//!
//! Toutes les valeurs flottantes sont arrondies à 10 décimales (zéros finaux
//! supprimés) avant l'encodage vers le stockage, pour éviter les artefacts
//! d'aller-retour binaire.

use geojson::{Geometry, JsonValue, PolygonType, Position, Value};

/// Nombre de décimales conservées
pub const DECIMAL_DIGITS: usize = 10;

/// Formate un flottant en décimal à 10 chiffres, zéros finaux supprimés
///
/// ```
/// use ahupuaa_geo::number::format_decimal;
/// assert_eq!(format_decimal(21.5), "21.5");
/// assert_eq!(format_decimal(-157.000000000049), "-157");
/// assert_eq!(format_decimal(0.0), "0");
/// ```
pub fn format_decimal(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return "0".to_string();
    }
    let fixed = format!("{:.*}", DECIMAL_DIGITS, value);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        s => s.to_string(),
    }
}

/// Arrondit un flottant à la précision fixe
pub fn round_decimal(value: f64) -> f64 {
    format_decimal(value).parse().unwrap_or(value)
}

/// Normalise récursivement les flottants d'une valeur JSON
///
/// Les entiers sont conservés tels quels.
pub fn normalize_json(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Number(n) if n.is_f64() => n
            .as_f64()
            .and_then(|f| serde_json::Number::from_f64(round_decimal(f)))
            .map(JsonValue::Number)
            .unwrap_or_else(|| value.clone()),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(normalize_json).collect()),
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize_json(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Normalise les coordonnées d'une géométrie
pub fn normalize_geometry(geometry: &Geometry) -> Geometry {
    Geometry {
        bbox: geometry
            .bbox
            .as_ref()
            .map(|b| b.iter().copied().map(round_decimal).collect()),
        value: normalize_value(&geometry.value),
        foreign_members: geometry.foreign_members.as_ref().map(|members| {
            members
                .iter()
                .map(|(k, v)| (k.clone(), normalize_json(v)))
                .collect()
        }),
    }
}

fn normalize_value(value: &Value) -> Value {
    match value {
        Value::Point(p) => Value::Point(normalize_position(p)),
        Value::MultiPoint(ps) => Value::MultiPoint(normalize_positions(ps)),
        Value::LineString(ls) => Value::LineString(normalize_positions(ls)),
        Value::MultiLineString(mls) => {
            Value::MultiLineString(mls.iter().map(|ls| normalize_positions(ls)).collect())
        }
        Value::Polygon(rings) => Value::Polygon(normalize_rings(rings)),
        Value::MultiPolygon(polys) => {
            Value::MultiPolygon(polys.iter().map(normalize_rings).collect())
        }
        Value::GeometryCollection(geoms) => {
            Value::GeometryCollection(geoms.iter().map(normalize_geometry).collect())
        }
    }
}

fn normalize_rings(rings: &PolygonType) -> PolygonType {
    rings.iter().map(|r| normalize_positions(r)).collect()
}

fn normalize_positions(positions: &[Position]) -> Vec<Position> {
    positions.iter().map(normalize_position).collect()
}

fn normalize_position(position: &Position) -> Position {
    position.iter().copied().map(round_decimal).collect()
}
