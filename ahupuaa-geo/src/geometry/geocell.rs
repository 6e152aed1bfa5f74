//! Encodage geohash (base 32) du centroïde

use geo::Coord;

use crate::types::LatLng;
use crate::GeoError;

/// Précision par défaut (7 caractères, cellule d'environ 150 m)
pub const GEOHASH_PRECISION: usize = 7;

/// Valeur de substitution quand aucun geohash ne peut être calculé
pub const GEOHASH_PLACEHOLDER: &str = "0000000";

/// Encode un centroïde en geohash standard
///
/// # Errors
///
/// Retourne `GeoError::InvalidGeometry` si la coordonnée est hors domaine.
pub fn encode_geohash(centroid: LatLng, precision: usize) -> Result<String, GeoError> {
    if !centroid.is_valid() {
        return Err(GeoError::InvalidGeometry(format!(
            "centroid out of range: lat={}, lng={}",
            centroid.lat, centroid.lng
        )));
    }
    geohash::encode(
        Coord {
            x: centroid.lng,
            y: centroid.lat,
        },
        precision,
    )
    .map_err(|e| GeoError::InvalidGeometry(format!("geohash encoding failed: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_geohash() {
        let hash = encode_geohash(LatLng::new(57.64911, 10.40744), 7).unwrap();
        assert_eq!(hash, "u4pruyd");
    }

    #[test]
    fn test_honolulu_decodes_back() {
        let centroid = LatLng::new(21.3069, -157.8583);
        let hash = encode_geohash(centroid, GEOHASH_PRECISION).unwrap();
        assert_eq!(hash.len(), GEOHASH_PRECISION);

        let (coord, lng_err, lat_err) = geohash::decode(&hash).unwrap();
        assert!((coord.y - centroid.lat).abs() <= lat_err);
        assert!((coord.x - centroid.lng).abs() <= lng_err);
    }

    #[test]
    fn test_invalid_centroid() {
        assert!(encode_geohash(LatLng::new(95.0, 0.0), 7).is_err());
        assert!(encode_geohash(LatLng::new(f64::NAN, 0.0), 7).is_err());
    }
}
