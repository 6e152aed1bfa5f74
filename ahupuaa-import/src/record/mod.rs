//! Construction des enregistrements dénormalisés
//!
//! Une feature brute donne exactement un `OutputRecord` (ou une
//! `ImportError::MalformedFeature`). Chaque étape a une valeur par défaut:
//! noms inconnus, geohash de substitution, priorité par défaut.

pub mod item;

pub use item::{Item, ItemValue, PRIMARY_KEY, SORT_KEY};

use std::collections::BTreeMap;

use ahupuaa_geo::geometry::{
    decimate, encode_geohash, estimate_centroid, extract_bounds, geometry_type,
    GEOHASH_PLACEHOLDER, GEOHASH_PRECISION,
};
use ahupuaa_geo::number::{normalize_geometry, round_decimal};
use ahupuaa_geo::{Bounds, LatLng, RawFeature};
use geojson::{Geometry, JsonValue, Value};
use serde_json::json;
use tracing::warn;

use crate::config::RunConstants;
use crate::error::ImportError;

/// Préfixe de la clé de partition
pub const PRIMARY_KEY_PREFIX: &str = "AHUPUAA#";

/// Valeur des niveaux hiérarchiques manquants
pub const UNKNOWN: &str = "Unknown";

/// Niveau de zoom par défaut
pub const DEFAULT_ZOOM_LEVEL: u8 = 10;

/// Zoom maximal de toutes les features
pub const MAX_ZOOM: u8 = 16;

/// Facteurs de décimation des trois niveaux de détail
pub const LOW_DETAIL_FACTOR: f64 = 0.005;
pub const MEDIUM_DETAIL_FACTOR: f64 = 0.01;
pub const HIGH_DETAIL_FACTOR: f64 = 0.03;

/// Priorité quand la surface n'est pas numérique
pub const DEFAULT_PRIORITY: u8 = 5;

const NAME_PROPERTIES: &[&str] = &["ahupuaa", "name"];
const ISLAND_PROPERTIES: &[&str] = &["mokupuni"];
const DISTRICT_PROPERTIES: &[&str] = &["moku"];
const AREA_PROPERTIES: &[&str] = &["gisacres", "st_areashape"];

const FILL_COLOR: &str = "#A3C1AD";
const BORDER_COLOR: &str = "#2A6041";
const BORDER_WIDTH: i64 = 2;
const SELECTED_FILL_COLOR: &str = "#C1E1AD";
const SELECTED_STROKE_COLOR: &str = "#205841";

/// Clé de tri hiérarchique `MOKUPUNI#<île>#MOKU#<district>`
pub fn sort_key(island: &str, district: &str) -> String {
    let island = non_blank_or_unknown(island);
    let district = non_blank_or_unknown(district);
    format!("MOKUPUNI#{}#MOKU#{}", island, district)
}

fn non_blank_or_unknown(value: &str) -> &str {
    match value.trim() {
        "" => UNKNOWN,
        trimmed => trimmed,
    }
}

/// Priorité d'affichage: `surface / 10000`, tronquée et bornée à [1, 10]
pub fn display_priority(area: f64) -> u8 {
    if !area.is_finite() {
        return if area > 0.0 { 10 } else { 1 };
    }
    (area / 10_000.0).trunc().clamp(1.0, 10.0) as u8
}

/// Zoom minimal selon la plus grande dimension de l'emprise (degrés)
pub fn min_zoom_for_span(span_degrees: f64) -> u8 {
    if span_degrees < 0.01 {
        12
    } else if span_degrees < 0.05 {
        10
    } else if span_degrees < 0.2 {
        8
    } else {
        5
    }
}

/// Métadonnées de cache client
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMetadata {
    pub data_version: i64,
    pub content_hash: String,
    pub last_updated: String,
}

/// Enregistrement dénormalisé, prêt à être persisté
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub primary_key: String,
    pub sort_key: String,
    pub name: String,
    pub island_name: String,
    pub district_name: String,
    pub geohash: String,
    pub geohash_prefix: String,
    pub zoom_level: u8,
    pub simplified_boundaries: String,
    pub centroid: Option<LatLng>,
    pub annotation_point: Option<String>,
    pub display_priority: u8,
    pub bounds: Option<Bounds>,
    pub mbr: Option<String>,
    /// (MinZoom, MaxZoom), présent avec l'emprise
    pub zoom_range: Option<(u8, u8)>,
    pub geometry_type: String,
    pub full_geometry: String,
    pub low_detail_boundaries: String,
    pub high_detail_boundaries: String,
    pub properties: BTreeMap<String, ItemValue>,
    pub metadata: RecordMetadata,
}

impl OutputRecord {
    /// Encode l'enregistrement avec les noms d'attributs du stockage
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();

        item.insert(PRIMARY_KEY, ItemValue::string(&self.primary_key));
        item.insert(SORT_KEY, ItemValue::string(&self.sort_key));
        item.insert("Name", ItemValue::string(&self.name));
        item.insert("IslandName", ItemValue::string(&self.island_name));
        item.insert("DistrictName", ItemValue::string(&self.district_name));
        item.insert("Geohash", ItemValue::string(&self.geohash));
        item.insert("GeohashPrefix", ItemValue::string(&self.geohash_prefix));
        item.insert("ZoomLevel", ItemValue::integer(self.zoom_level.into()));
        item.insert(
            "SimplifiedBoundaries",
            ItemValue::string(&self.simplified_boundaries),
        );

        if let Some(centroid) = self.centroid {
            item.insert("Centroid", lat_lng_value(centroid));
        }
        if let Some(annotation) = &self.annotation_point {
            item.insert("AnnotationPoint", ItemValue::string(annotation));
        }

        item.insert(
            "DisplayPriority",
            ItemValue::integer(self.display_priority.into()),
        );

        if let Some(bounds) = self.bounds {
            item.insert(
                "Bounds",
                ItemValue::map([
                    ("Northeast", lat_lng_value(bounds.northeast)),
                    ("Southwest", lat_lng_value(bounds.southwest)),
                ]),
            );
        }
        if let Some(mbr) = &self.mbr {
            item.insert("MBR", ItemValue::string(mbr));
        }
        if let Some((min_zoom, max_zoom)) = self.zoom_range {
            item.insert("MinZoom", ItemValue::integer(min_zoom.into()));
            item.insert("MaxZoom", ItemValue::integer(max_zoom.into()));
        }

        item.insert("GeometryType", ItemValue::string(&self.geometry_type));
        item.insert("FullGeometry", ItemValue::string(&self.full_geometry));
        item.insert(
            "StyleProperties",
            ItemValue::map([
                ("FillColor", ItemValue::string(FILL_COLOR)),
                ("BorderColor", ItemValue::string(BORDER_COLOR)),
                ("BorderWidth", ItemValue::integer(BORDER_WIDTH)),
            ]),
        );
        item.insert(
            "LowDetailBoundaries",
            ItemValue::string(&self.low_detail_boundaries),
        );
        item.insert(
            "HighDetailBoundaries",
            ItemValue::string(&self.high_detail_boundaries),
        );
        item.insert(
            "RenderingHints",
            ItemValue::map([
                ("StrokeWidth", ItemValue::integer(2)),
                ("FillOpacity", ItemValue::decimal(0.5)),
                ("StrokeOpacity", ItemValue::decimal(0.8)),
                ("ZIndex", ItemValue::integer(self.display_priority.into())),
                ("LineDashPattern", ItemValue::string("[0]")),
                ("SelectedFillColor", ItemValue::string(SELECTED_FILL_COLOR)),
                ("SelectedStrokeColor", ItemValue::string(SELECTED_STROKE_COLOR)),
            ]),
        );

        if !self.properties.is_empty() {
            item.insert("Properties", ItemValue::M(self.properties.clone()));
        }

        item.insert(
            "Metadata",
            ItemValue::map([
                ("DataVersion", ItemValue::integer(self.metadata.data_version)),
                ("ContentHash", ItemValue::string(&self.metadata.content_hash)),
                ("LastUpdated", ItemValue::string(&self.metadata.last_updated)),
            ]),
        );

        item
    }
}

fn lat_lng_value(point: LatLng) -> ItemValue {
    ItemValue::map([
        ("Lat", ItemValue::decimal(point.lat)),
        ("Lng", ItemValue::decimal(point.lng)),
    ])
}

/// Construit les enregistrements d'une exécution
#[derive(Debug, Clone, Copy)]
pub struct RecordBuilder<'a> {
    run: &'a RunConstants,
    zoom_level: u8,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(run: &'a RunConstants) -> Self {
        Self {
            run,
            zoom_level: DEFAULT_ZOOM_LEVEL,
        }
    }

    pub fn with_zoom_level(mut self, zoom_level: u8) -> Self {
        self.zoom_level = zoom_level;
        self
    }

    /// Construit l'enregistrement d'une feature
    ///
    /// # Errors
    ///
    /// `ImportError::MalformedFeature` si la feature n'a pas de géométrie ou
    /// si une géométrie ne peut pas être encodée.
    pub fn build(&self, feature: &RawFeature) -> Result<OutputRecord, ImportError> {
        // 1. Identifiants et hiérarchie
        let feature_id = feature.resolved_id();
        let name = feature
            .property_str(NAME_PROPERTIES)
            .unwrap_or_else(|| format!("Ahupuaa_{}", feature.index));
        let island = feature
            .property_str(ISLAND_PROPERTIES)
            .unwrap_or_else(|| UNKNOWN.to_string());
        let district = feature
            .property_str(DISTRICT_PROPERTIES)
            .unwrap_or_else(|| UNKNOWN.to_string());

        // 2. Géométrie normalisée à 10 décimales
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or_else(|| ImportError::malformed(&feature_id, "geometry", "feature has no geometry"))?;
        let geometry = normalize_geometry(geometry);

        // 3. Dérivations, en préférant les valeurs précalculées
        let bounds = feature.bounds.or_else(|| extract_bounds(&geometry));
        let centroid = feature.centroid.or_else(|| estimate_centroid(&geometry));
        let geohash = resolve_geohash(&feature_id, feature.geohash.as_deref(), centroid);
        let geohash_prefix: String = geohash.chars().take(3).collect();

        // 4. Trois niveaux de détail, chacun depuis les coordonnées d'origine
        let low = encode_tier(&feature_id, &geometry.value, LOW_DETAIL_FACTOR)?;
        let medium = encode_tier(&feature_id, &geometry.value, MEDIUM_DETAIL_FACTOR)?;
        let high = encode_tier(&feature_id, &geometry.value, HIGH_DETAIL_FACTOR)?;

        // 5. Priorité et plage de zoom
        let display_priority = priority_from_properties(feature);
        let zoom_range = bounds.map(|b| (min_zoom_for_span(b.span_degrees()), MAX_ZOOM));

        let annotation_point = centroid.map(|c| {
            json!({
                "coordinate": [round_decimal(c.lng), round_decimal(c.lat)],
                "title": name,
                "subtitle": format!("{}, {}", district, island),
            })
            .to_string()
        });
        let mbr = bounds.map(|b| {
            json!([
                [round_decimal(b.southwest.lng), round_decimal(b.southwest.lat)],
                [round_decimal(b.northeast.lng), round_decimal(b.northeast.lat)]
            ])
            .to_string()
        });

        // 6. Propriétés étiquetées
        let properties = feature
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), ItemValue::from_json(v)))
            .collect();

        // 7. Hash de contenu pour l'invalidation du cache client
        let content_hash = content_hash(feature);

        let full_geometry = serde_json::to_string(&geometry)
            .map_err(|e| ImportError::malformed(&feature_id, "geometry", e.to_string()))?;

        Ok(OutputRecord {
            primary_key: format!("{}{}", PRIMARY_KEY_PREFIX, feature_id),
            sort_key: sort_key(&island, &district),
            name,
            island_name: island,
            district_name: district,
            geohash,
            geohash_prefix,
            zoom_level: self.zoom_level,
            simplified_boundaries: medium,
            centroid,
            annotation_point,
            display_priority,
            bounds,
            mbr,
            zoom_range,
            geometry_type: geometry_type(&geometry).to_string(),
            full_geometry,
            low_detail_boundaries: low,
            high_detail_boundaries: high,
            properties,
            metadata: RecordMetadata {
                data_version: self.run.data_version,
                content_hash,
                last_updated: self.run.last_updated.clone(),
            },
        })
    }
}

/// Digest BLAKE3 (hex) de la sérialisation canonique de la feature d'origine
pub fn content_hash(feature: &RawFeature) -> String {
    let digest = blake3::hash(feature.canonical_json().as_bytes());
    hex::encode(digest.as_bytes())
}

fn resolve_geohash(feature_id: &str, precomputed: Option<&str>, centroid: Option<LatLng>) -> String {
    if let Some(hash) = precomputed {
        return hash.to_string();
    }
    match centroid {
        Some(c) => encode_geohash(c, GEOHASH_PRECISION).unwrap_or_else(|e| {
            warn!(feature = feature_id, error = %e, "Could not generate geohash");
            GEOHASH_PLACEHOLDER.to_string()
        }),
        None => GEOHASH_PLACEHOLDER.to_string(),
    }
}

fn encode_tier(feature_id: &str, value: &Value, factor: f64) -> Result<String, ImportError> {
    serde_json::to_string(&Geometry::new(decimate(value, factor)))
        .map_err(|e| ImportError::malformed(feature_id, "geometry", e.to_string()))
}

/// Priorité depuis `gisacres` puis `st_areashape` (surface absente: 0)
fn priority_from_properties(feature: &RawFeature) -> u8 {
    let area = AREA_PROPERTIES
        .iter()
        .find_map(|key| feature.properties.get(*key));

    match area {
        None => display_priority(0.0),
        Some(JsonValue::Number(n)) => n.as_f64().map(display_priority).unwrap_or(DEFAULT_PRIORITY),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(display_priority)
            .unwrap_or(DEFAULT_PRIORITY),
        Some(_) => DEFAULT_PRIORITY,
    }
}
