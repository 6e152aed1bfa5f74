//! Types de données pour le crate ahupuaa-geo

use geojson::{Geometry, JsonObject, JsonValue};
use serde::{Deserialize, Serialize};

use crate::GeoError;

/// Membre étranger portant un centroïde précalculé
pub const CENTROID_MEMBER: &str = "centroid_geopoint";

/// Membre étranger portant une emprise précalculée
pub const BOUNDS_MEMBER: &str = "bounds";

/// Membre étranger portant un geohash précalculé
pub const GEOHASH_MEMBER: &str = "geohash";

/// Propriété utilisée comme identifiant de repli
pub const OBJECTID_PROPERTY: &str = "objectid";

/// Coordonnée géographique (WGS84, degrés)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Vrai si la coordonnée est utilisable pour un geohash
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Emprise alignée sur les axes (coins nord-est et sud-ouest)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub northeast: LatLng,
    pub southwest: LatLng,
}

impl Bounds {
    /// Plus grande dimension de l'emprise, en degrés
    pub fn span_degrees(&self) -> f64 {
        let lat_span = self.northeast.lat - self.southwest.lat;
        let lng_span = self.northeast.lng - self.southwest.lng;
        lat_span.max(lng_span)
    }
}

/// Une feature brute, telle que lue dans la FeatureCollection
///
/// Lecture seule: les enregistrements de sortie en sont dérivés, jamais l'inverse.
#[derive(Debug, Clone)]
pub struct RawFeature {
    /// Position ordinale dans le tableau `features`
    pub index: usize,

    /// Identifiant fourni par la feature (`id`), s'il existe
    pub id: Option<String>,

    /// Propriétés de la feature (clé -> valeur JSON)
    pub properties: JsonObject,

    /// Géométrie, absente si `geometry` vaut `null`
    pub geometry: Option<Geometry>,

    /// Emprise précalculée (`bounds`)
    pub bounds: Option<Bounds>,

    /// Centroïde précalculé (`centroid_geopoint`)
    pub centroid: Option<LatLng>,

    /// Geohash précalculé (`geohash`)
    pub geohash: Option<String>,

    /// Objet JSON d'origine, conservé pour le hash de contenu
    source: JsonObject,
}

impl RawFeature {
    /// Construit une feature depuis son objet JSON
    ///
    /// # Errors
    ///
    /// Retourne `GeoError::InvalidFeature` si la géométrie ou les propriétés
    /// ne sont pas interprétables. Les membres précalculés mal formés sont
    /// ignorés (ils seront recalculés).
    pub fn from_json(index: usize, source: JsonObject) -> Result<Self, GeoError> {
        let id = source.get("id").and_then(scalar_to_string);
        let label = id.clone().unwrap_or_else(|| format!("#{}", index));

        let geometry = match source.get("geometry") {
            None | Some(JsonValue::Null) => None,
            Some(value) => Some(
                serde_json::from_value::<Geometry>(value.clone()).map_err(|e| {
                    GeoError::invalid_feature(index, label.clone(), "geometry", e.to_string())
                })?,
            ),
        };

        let properties = match source.get("properties") {
            None | Some(JsonValue::Null) => JsonObject::new(),
            Some(JsonValue::Object(map)) => map.clone(),
            Some(other) => {
                return Err(GeoError::invalid_feature(
                    index,
                    label,
                    "properties",
                    format!("expected an object, found {}", json_kind(other)),
                ))
            }
        };

        let bounds = source
            .get(BOUNDS_MEMBER)
            .and_then(|v| serde_json::from_value::<Bounds>(v.clone()).ok());
        let centroid = source
            .get(CENTROID_MEMBER)
            .filter(|v| v.is_object())
            .and_then(|v| serde_json::from_value::<LatLng>(v.clone()).ok());
        let geohash = source
            .get(GEOHASH_MEMBER)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            index,
            id,
            properties,
            geometry,
            bounds,
            centroid,
            geohash,
            source,
        })
    }

    /// Identifiant effectif: `id`, puis `properties.objectid`, puis la position
    pub fn resolved_id(&self) -> String {
        self.id
            .clone()
            .or_else(|| {
                self.properties
                    .get(OBJECTID_PROPERTY)
                    .and_then(scalar_to_string)
            })
            .unwrap_or_else(|| self.index.to_string())
    }

    /// Retourne la première propriété textuelle non vide parmi `keys`
    pub fn property_str(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|key| self.properties.get(*key))
            .filter_map(scalar_to_string)
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty())
    }

    /// Objet JSON d'origine
    pub fn source(&self) -> &JsonObject {
        &self.source
    }

    /// Sérialisation canonique (clés triées, sans espaces) de la feature d'origine
    pub fn canonical_json(&self) -> String {
        let mut out = String::new();
        write_canonical(&mut out, &JsonValue::Object(self.source.clone()));
        out
    }
}

/// Convertit un scalaire JSON en texte (`null`, tableaux et objets exclus)
fn scalar_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Écrit `value` avec les clés d'objets triées, indépendamment de l'ordre d'origine
fn write_canonical(out: &mut String, value: &JsonValue) {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<(&String, &JsonValue)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&JsonValue::String(key.clone()).to_string());
                out.push(':');
                write_canonical(out, val);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: JsonValue) -> JsonObject {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_resolved_id_fallbacks() {
        let with_id = RawFeature::from_json(
            3,
            object(json!({"type": "Feature", "id": "abc", "properties": {"objectid": 7}, "geometry": null})),
        )
        .unwrap();
        assert_eq!(with_id.resolved_id(), "abc");

        let numeric_id = RawFeature::from_json(
            3,
            object(json!({"type": "Feature", "id": 42, "properties": {}, "geometry": null})),
        )
        .unwrap();
        assert_eq!(numeric_id.resolved_id(), "42");

        let objectid = RawFeature::from_json(
            3,
            object(json!({"type": "Feature", "properties": {"objectid": 7}, "geometry": null})),
        )
        .unwrap();
        assert_eq!(objectid.resolved_id(), "7");

        let positional = RawFeature::from_json(
            3,
            object(json!({"type": "Feature", "properties": {}, "geometry": null})),
        )
        .unwrap();
        assert_eq!(positional.resolved_id(), "3");
    }

    #[test]
    fn test_precomputed_members() {
        let feature = RawFeature::from_json(
            0,
            object(json!({
                "type": "Feature",
                "properties": {},
                "geometry": {"type": "Point", "coordinates": [-157.8, 21.3]},
                "centroid_geopoint": {"lat": 21.0, "lng": -157.0},
                "bounds": {
                    "northeast": {"lat": 22.0, "lng": -156.0},
                    "southwest": {"lat": 20.0, "lng": -158.0}
                },
                "geohash": "87zzzzz"
            })),
        )
        .unwrap();

        assert_eq!(feature.centroid, Some(LatLng::new(21.0, -157.0)));
        assert_eq!(feature.bounds.unwrap().span_degrees(), 2.0);
        assert_eq!(feature.geohash.as_deref(), Some("87zzzzz"));
    }

    #[test]
    fn test_malformed_precomputed_members_are_ignored() {
        let feature = RawFeature::from_json(
            0,
            object(json!({
                "type": "Feature",
                "properties": {},
                "geometry": null,
                "centroid_geopoint": "21,-157",
                "bounds": [1, 2]
            })),
        )
        .unwrap();

        assert!(feature.centroid.is_none());
        assert!(feature.bounds.is_none());
    }

    #[test]
    fn test_invalid_geometry_is_feature_level() {
        let err = RawFeature::from_json(
            5,
            object(json!({
                "type": "Feature",
                "id": "bad",
                "properties": {},
                "geometry": {"type": "Polygon", "coordinates": "oops"}
            })),
        )
        .unwrap_err();

        assert!(err.is_feature_level());
        match err {
            GeoError::InvalidFeature { index, id, field, .. } => {
                assert_eq!(index, 5);
                assert_eq!(id, "bad");
                assert_eq!(field, "geometry");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_property_str_skips_blank_values() {
        let feature = RawFeature::from_json(
            0,
            object(json!({
                "type": "Feature",
                "properties": {"ahupuaa": "  ", "name": "Waikīkī"},
                "geometry": null
            })),
        )
        .unwrap();

        assert_eq!(
            feature.property_str(&["ahupuaa", "name"]).as_deref(),
            Some("Waikīkī")
        );
        assert_eq!(feature.property_str(&["moku"]), None);
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let a = RawFeature::from_json(
            0,
            object(json!({"type": "Feature", "properties": {"b": 1, "a": 2}, "geometry": null})),
        )
        .unwrap();
        assert_eq!(
            a.canonical_json(),
            r#"{"geometry":null,"properties":{"a":2,"b":1},"type":"Feature"}"#
        );
    }
}
