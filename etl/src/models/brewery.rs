use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Names of the typed fields, in storage column order.
pub const KNOWN_FIELDS: [&str; 17] = [
    "id",
    "name",
    "brewery_type",
    "address_1",
    "address_2",
    "address_3",
    "street",
    "city",
    "state_province",
    "state",
    "postal_code",
    "country",
    "longitude",
    "latitude",
    "phone",
    "website_url",
    "updated_at",
];

/// One brewery as returned by the upstream API.
///
/// Fields the API sends that are not modelled here end up in `extra`, so the
/// raw landing can pass them through while curation projects them away.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BreweryRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub brewery_type: Option<String>,
    #[serde(default)]
    pub address_1: Option<String>,
    #[serde(default)]
    pub address_2: Option<String>,
    #[serde(default)]
    pub address_3: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state_province: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BreweryRecord {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Value of a typed text field by column name. Coordinates are not text.
    pub fn text_field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "id" => &self.id,
            "name" => &self.name,
            "brewery_type" => &self.brewery_type,
            "address_1" => &self.address_1,
            "address_2" => &self.address_2,
            "address_3" => &self.address_3,
            "street" => &self.street,
            "city" => &self.city,
            "state_province" => &self.state_province,
            "state" => &self.state,
            "postal_code" => &self.postal_code,
            "country" => &self.country,
            "phone" => &self.phone,
            "website_url" => &self.website_url,
            "updated_at" => &self.updated_at,
            _ => return None,
        };
        value.as_deref()
    }

    pub fn set_text_field(&mut self, name: &str, value: Option<String>) -> bool {
        let slot = match name {
            "id" => &mut self.id,
            "name" => &mut self.name,
            "brewery_type" => &mut self.brewery_type,
            "address_1" => &mut self.address_1,
            "address_2" => &mut self.address_2,
            "address_3" => &mut self.address_3,
            "street" => &mut self.street,
            "city" => &mut self.city,
            "state_province" => &mut self.state_province,
            "state" => &mut self.state,
            "postal_code" => &mut self.postal_code,
            "country" => &mut self.country,
            "phone" => &mut self.phone,
            "website_url" => &mut self.website_url,
            "updated_at" => &mut self.updated_at,
            _ => return false,
        };
        *slot = value;
        true
    }
}

// Ids are strings upstream, but numeric ids are accepted rather than failing the page.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// Coordinates arrive as numbers or numeric strings depending on the API version.
fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_land_in_extra() {
        let record: BreweryRecord = serde_json::from_value(json!({
            "id": "b1",
            "name": "Brew 1",
            "country": "United States",
            "opening_hours": "9-5",
            "tags": ["ipa", "lager"]
        }))
        .unwrap();

        assert_eq!(record.id.as_deref(), Some("b1"));
        assert_eq!(record.country.as_deref(), Some("United States"));
        assert_eq!(record.extra.len(), 2);
        assert_eq!(record.extra["opening_hours"], json!("9-5"));
        assert_eq!(record.extra["tags"], json!(["ipa", "lager"]));
    }

    #[test]
    fn test_coordinates_accept_numbers_and_strings() {
        let record: BreweryRecord = serde_json::from_value(json!({
            "id": "b1",
            "longitude": "-122.5",
            "latitude": 45.25
        }))
        .unwrap();

        assert_eq!(record.longitude, Some(-122.5));
        assert_eq!(record.latitude, Some(45.25));

        let record: BreweryRecord =
            serde_json::from_value(json!({"id": "b2", "longitude": "n/a", "latitude": null}))
                .unwrap();
        assert_eq!(record.longitude, None);
        assert_eq!(record.latitude, None);
    }

    #[test]
    fn test_missing_and_null_id() {
        let record: BreweryRecord = serde_json::from_value(json!({"name": "No id"})).unwrap();
        assert_eq!(record.id, None);

        let record: BreweryRecord = serde_json::from_value(json!({"id": null})).unwrap();
        assert_eq!(record.id, None);

        let record: BreweryRecord = serde_json::from_value(json!({"id": 42})).unwrap();
        assert_eq!(record.id.as_deref(), Some("42"));
    }

    #[test]
    fn test_text_field_accessors() {
        let mut record = BreweryRecord::with_id("b1");
        assert!(record.set_text_field("state", Some("Oregon".into())));
        assert!(!record.set_text_field("longitude", None));

        assert_eq!(record.text_field("state"), Some("Oregon"));
        assert_eq!(record.text_field("id"), Some("b1"));
        assert_eq!(record.text_field("country"), None);
        for name in KNOWN_FIELDS {
            if name != "longitude" && name != "latitude" {
                assert!(record.set_text_field(name, None), "{} is settable", name);
            }
        }
    }
}
