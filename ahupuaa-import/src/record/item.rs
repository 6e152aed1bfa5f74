//! Valeurs typées du stockage clé-valeur
//!
//! Chaque attribut persisté est une valeur étiquetée (texte, nombre,
//! booléen, null ou map imbriquée), jamais une valeur JSON non typée.

use std::collections::BTreeMap;

use ahupuaa_geo::number::format_decimal;
use geojson::JsonValue;
use serde::Serialize;

/// Nom de l'attribut de clé de partition
pub const PRIMARY_KEY: &str = "PrimaryKey";

/// Nom de l'attribut de clé de tri
pub const SORT_KEY: &str = "SortKey";

/// Valeur d'attribut étiquetée
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ItemValue {
    /// Texte
    S(String),
    /// Nombre, en représentation décimale
    N(String),
    /// Booléen
    Bool(bool),
    /// Valeur nulle
    Null,
    /// Map imbriquée
    M(BTreeMap<String, ItemValue>),
}

impl ItemValue {
    pub fn string(value: impl Into<String>) -> Self {
        ItemValue::S(value.into())
    }

    /// Nombre flottant normalisé à 10 décimales
    pub fn decimal(value: f64) -> Self {
        ItemValue::N(format_decimal(value))
    }

    pub fn integer(value: i64) -> Self {
        ItemValue::N(value.to_string())
    }

    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ItemValue)>,
        K: Into<String>,
    {
        ItemValue::M(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Convertit une propriété GeoJSON
    ///
    /// Tableaux et objets sont encodés en texte JSON.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::String(s) => ItemValue::S(s.clone()),
            JsonValue::Number(n) => match n.as_f64() {
                Some(f) if n.is_f64() => ItemValue::decimal(f),
                _ => ItemValue::N(n.to_string()),
            },
            JsonValue::Bool(b) => ItemValue::Bool(*b),
            JsonValue::Null => ItemValue::Null,
            nested => ItemValue::S(ahupuaa_geo::number::normalize_json(nested).to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ItemValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&str> {
        match self {
            ItemValue::N(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ItemValue>> {
        match self {
            ItemValue::M(m) => Some(m),
            _ => None,
        }
    }
}

/// Un élément persisté: attributs nommés
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Item {
    attributes: BTreeMap<String, ItemValue>,
}

impl Item {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ItemValue) {
        self.attributes.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ItemValue> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, ItemValue> {
        &self.attributes
    }

    pub fn into_attributes(self) -> BTreeMap<String, ItemValue> {
        self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Clé de partition (`PrimaryKey`)
    pub fn primary_key(&self) -> Option<&str> {
        self.get(PRIMARY_KEY).and_then(ItemValue::as_str)
    }

    /// Clé de tri (`SortKey`)
    pub fn sort_key(&self) -> Option<&str> {
        self.get(SORT_KEY).and_then(ItemValue::as_str)
    }

    /// Couple (partition, tri) identifiant l'élément
    pub fn key(&self) -> Option<(String, String)> {
        Some((self.primary_key()?.to_string(), self.sort_key()?.to_string()))
    }
}

impl FromIterator<(String, ItemValue)> for Item {
    fn from_iter<T: IntoIterator<Item = (String, ItemValue)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(ItemValue::from_json(&json!("Kona")), ItemValue::string("Kona"));
        assert_eq!(ItemValue::from_json(&json!(12)), ItemValue::N("12".into()));
        assert_eq!(
            ItemValue::from_json(&json!(1234.5600000000001)),
            ItemValue::N("1234.56".into())
        );
        assert_eq!(ItemValue::from_json(&json!(true)), ItemValue::Bool(true));
        assert_eq!(ItemValue::from_json(&json!(null)), ItemValue::Null);
    }

    #[test]
    fn test_from_json_nested_falls_back_to_text() {
        let value = ItemValue::from_json(&json!({"a": [1, 2.5]}));
        assert_eq!(value, ItemValue::string(r#"{"a":[1,2.5]}"#));
    }

    #[test]
    fn test_item_keys() {
        let mut item = Item::new();
        item.insert(PRIMARY_KEY, ItemValue::string("AHUPUAA#1"));
        item.insert(SORT_KEY, ItemValue::string("MOKUPUNI#Oʻahu#MOKU#Kona"));

        assert_eq!(
            item.key(),
            Some(("AHUPUAA#1".to_string(), "MOKUPUNI#Oʻahu#MOKU#Kona".to_string()))
        );
        assert_eq!(item.len(), 2);
    }
}
