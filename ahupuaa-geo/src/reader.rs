//! Lecture en flux d'une FeatureCollection GeoJSON
//!
//! Le document n'est jamais chargé en entier: les éléments du tableau
//! `features` sont décodés un par un et passés à un callback. Une feature
//! mal formée est signalée au callback sans interrompre le flux; seul un
//! document JSON illisible est fatal.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::ControlFlow;
use std::path::Path;

use geojson::JsonValue;
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use tracing::{debug, warn};

use crate::types::RawFeature;
use crate::GeoError;

/// Callback appelé pour chaque feature, dans l'ordre du document
pub type FeatureCallback<'f> = dyn FnMut(Result<RawFeature, GeoError>) -> ControlFlow<()> + 'f;

/// Bilan d'un parcours du flux
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSummary {
    /// Nombre d'éléments lus dans `features`
    pub features: usize,
    /// Vrai si le callback a interrompu le parcours
    pub stopped_early: bool,
}

/// Ouvre un fichier GeoJSON avec un tampon de lecture
pub fn open(path: &Path) -> Result<BufReader<File>, GeoError> {
    let file = File::open(path)?;
    Ok(BufReader::with_capacity(256 * 1024, file))
}

/// Compte les features sans les décoder
pub fn count_features<R: Read>(reader: R) -> Result<usize, GeoError> {
    let summary = run(reader, None)?;
    Ok(summary.features)
}

/// Parcourt les features une à une
///
/// Le callback retourne `ControlFlow::Break(())` pour arrêter la lecture
/// (le reste du document n'est alors pas lu).
pub fn for_each_feature<R, F>(reader: R, mut on_feature: F) -> Result<StreamSummary, GeoError>
where
    R: Read,
    F: FnMut(Result<RawFeature, GeoError>) -> ControlFlow<()>,
{
    let callback: &mut FeatureCallback<'_> = &mut on_feature;
    run(reader, Some(callback))
}

fn run<R: Read>(
    reader: R,
    on_feature: Option<&mut FeatureCallback<'_>>,
) -> Result<StreamSummary, GeoError> {
    let mut de = serde_json::Deserializer::from_reader(reader);
    let mut state = StreamState {
        on_feature,
        seen: 0,
        stopped: false,
    };

    let found = match (CollectionSeed { state: &mut state }).deserialize(&mut de) {
        Ok(found) => found,
        Err(_) if state.stopped => {
            debug!(features = state.seen, "Feature stream stopped by consumer");
            return Ok(StreamSummary {
                features: state.seen,
                stopped_early: true,
            });
        }
        Err(e) => return Err(GeoError::Decode(e)),
    };
    de.end()?;

    if !found {
        warn!("Document has no `features` array");
    }

    Ok(StreamSummary {
        features: state.seen,
        stopped_early: false,
    })
}

struct StreamState<'a, 'f> {
    on_feature: Option<&'a mut FeatureCallback<'f>>,
    seen: usize,
    stopped: bool,
}

/// Objet racine: seul `features` est lu, le reste est ignoré
struct CollectionSeed<'s, 'a, 'f> {
    state: &'s mut StreamState<'a, 'f>,
}

impl<'de> DeserializeSeed<'de> for CollectionSeed<'_, '_, '_> {
    type Value = bool;

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for CollectionSeed<'_, '_, '_> {
    type Value = bool;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a GeoJSON FeatureCollection object")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let state = self.state;
        let mut found = false;
        while let Some(key) = map.next_key::<String>()? {
            if key == "features" && !found {
                map.next_value_seed(FeaturesSeed {
                    state: &mut *state,
                })?;
                found = true;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(found)
    }
}

/// Tableau `features`: un élément à la fois
struct FeaturesSeed<'s, 'a, 'f> {
    state: &'s mut StreamState<'a, 'f>,
}

impl<'de> DeserializeSeed<'de> for FeaturesSeed<'_, '_, '_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for FeaturesSeed<'_, '_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of GeoJSON features")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let state = self.state;

        let Some(on_feature) = state.on_feature.as_deref_mut() else {
            while seq.next_element::<IgnoredAny>()?.is_some() {
                state.seen += 1;
            }
            return Ok(());
        };

        while let Some(value) = seq.next_element::<JsonValue>()? {
            let index = state.seen;
            state.seen += 1;

            let feature = match value {
                JsonValue::Object(object) => RawFeature::from_json(index, object),
                _ => Err(GeoError::invalid_feature(
                    index,
                    format!("#{}", index),
                    "feature",
                    "expected a JSON object",
                )),
            };

            if on_feature(feature).is_break() {
                state.stopped = true;
                return Err(de::Error::custom("feature stream stopped by consumer"));
            }
        }
        Ok(())
    }
}
