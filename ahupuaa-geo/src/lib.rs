//! # ahupuaa-geo
//!
//! Lecture en flux de FeatureCollections GeoJSON et dérivations géométriques
//! pour les découpages fonciers hawaïens (ahupuaʻa, moku, mokupuni).
//!
//! ## Features
//!
//! - Décodage feature par feature (`serde`), sans charger le document
//! - Centroïde (moyenne des sommets), emprise, geohash
//! - Décimation par pas fixe pour les niveaux de détail cartographiques
//! - Normalisation des flottants à 10 décimales
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ahupuaa_geo::{geometry, reader};
//! use std::ops::ControlFlow;
//! use std::path::Path;
//!
//! let total = reader::count_features(reader::open(Path::new("ahupuaa.geojson"))?)?;
//! reader::for_each_feature(reader::open(Path::new("ahupuaa.geojson"))?, |feature| {
//!     if let Ok(feature) = feature {
//!         let centroid = feature.geometry.as_ref().and_then(geometry::estimate_centroid);
//!         println!("{} -> {:?}", feature.resolved_id(), centroid);
//!     }
//!     ControlFlow::Continue(())
//! })?;
//! ```

pub mod error;
pub mod geometry;
pub mod number;
pub mod reader;
pub mod types;

pub use error::GeoError;
pub use reader::{count_features, for_each_feature, StreamSummary};
pub use types::{Bounds, LatLng, RawFeature};
