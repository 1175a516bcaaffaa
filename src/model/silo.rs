//! Silo reference records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::quantity::Quantity;
use super::validation::{require_key, require_text, ValidationError, MAX_KEY_LEN};

const COLLECTION: &str = "silos";

/// A storage structure holding one material.
///
/// Silos carry no balance field; the balance is always folded from events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Silo {
    pub id: String,
    pub name: String,
    /// Structure category (trench, bag, tower, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub silo_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Silo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            silo_type: None,
            content_type: None,
            capacity: None,
            location: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_type(mut self, silo_type: impl Into<String>) -> Self {
        self.silo_type = Some(silo_type.into());
        self
    }

    pub fn with_content(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_capacity(mut self, capacity: Quantity) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_key(COLLECTION, "id", &self.id, MAX_KEY_LEN)?;
        require_text(COLLECTION, "name", &self.name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_validate() {
        let silo = Silo::new("silo-001", "Trincheira Principal")
            .with_type("Trincheira")
            .with_content("Milho")
            .with_capacity(Quantity::from_whole_kg(500_000))
            .with_location("Setor A - Lote 1");
        assert!(silo.validate().is_ok());
        assert_eq!(silo.capacity, Some(Quantity::from_whole_kg(500_000)));
    }

    #[test]
    fn test_name_required() {
        let silo = Silo::new("silo-001", " ");
        assert_eq!(
            silo.validate(),
            Err(ValidationError::MissingField {
                collection: "silos",
                field: "name"
            })
        );
    }

    #[test]
    fn test_type_field_renamed() {
        let silo = Silo::new("s", "n").with_type("Bolsa");
        let json = serde_json::to_value(&silo).unwrap();
        assert_eq!(json["type"], "Bolsa");
        assert!(json.get("capacity").is_none());
    }
}
