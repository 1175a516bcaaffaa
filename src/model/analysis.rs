//! Laboratory quality analyses of silo content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{
    require_key, require_range, require_text, ValidationError, MAX_ANALYSIS_KEY_LEN, MAX_KEY_LEN,
};

const COLLECTION: &str = "analyses";

/// Denormalized status tag. A hint only; "current" is derived from `created_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[default]
    Current,
    Historical,
}

/// Fixed set of quality metrics. Percentages are of dry mass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub dry_matter: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ph: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ndt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fdn: Option<f64>,
}

impl QualityMetrics {
    fn validate(&self) -> Result<(), ValidationError> {
        require_range(COLLECTION, "dry_matter", self.dry_matter, 0.0, 100.0)?;
        if let Some(ph) = self.ph {
            require_range(COLLECTION, "ph", ph, 0.0, 14.0)?;
        }
        let percentages = [
            ("starch", self.starch),
            ("protein", self.protein),
            ("ndt", self.ndt),
            ("fdn", self.fdn),
        ];
        for (field, value) in percentages {
            if let Some(value) = value {
                require_range(COLLECTION, field, value, 0.0, 100.0)?;
            }
        }
        Ok(())
    }
}

/// One lab analysis of a silo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: String,
    pub silo_id: String,
    /// Sampling date as reported by the lab.
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab: Option<String>,
    #[serde(flatten)]
    pub metrics: QualityMetrics,
    #[serde(default)]
    pub status: AnalysisStatus,
    pub created_at: DateTime<Utc>,
}

impl Analysis {
    pub fn new(silo_id: impl Into<String>, date: impl Into<String>, metrics: QualityMetrics) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            silo_id: silo_id.into(),
            date: date.into(),
            lab: None,
            metrics,
            status: AnalysisStatus::Current,
            created_at: Utc::now(),
        }
    }

    pub fn with_lab(mut self, lab: impl Into<String>) -> Self {
        self.lab = Some(lab.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_key(COLLECTION, "id", &self.id, MAX_ANALYSIS_KEY_LEN)?;
        require_key(COLLECTION, "silo_id", &self.silo_id, MAX_KEY_LEN)?;
        require_text(COLLECTION, "date", &self.date)?;
        self.metrics.validate()
    }
}
