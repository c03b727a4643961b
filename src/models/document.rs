use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One processing result as materialized by the extraction pipeline.
///
/// Upstream producers have renamed and dropped fields across versions, so
/// every field is optional and loosely typed; readers go through the
/// fallback-chain accessors below instead of touching fields directly. The
/// embedded entity graph stays raw JSON and is flattened by
/// [`crate::services::normalize`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingRecord {
    #[serde(rename = "DocumentId", skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Value>,
    #[serde(rename = "S3File", skip_serializing_if = "Option::is_none")]
    pub s3_file: Option<Value>,
    #[serde(rename = "PatientProfile", skip_serializing_if = "Option::is_none")]
    pub patient_profile: Option<Value>,
    #[serde(rename = "Patient", skip_serializing_if = "Option::is_none")]
    pub patient: Option<Value>,
    #[serde(rename = "PatientName", skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<Value>,
    #[serde(rename = "PatientAge", skip_serializing_if = "Option::is_none")]
    pub patient_age: Option<Value>,
    #[serde(rename = "PatientGender", skip_serializing_if = "Option::is_none")]
    pub patient_gender: Option<Value>,
    #[serde(rename = "ServiceDate", skip_serializing_if = "Option::is_none")]
    pub service_date: Option<Value>,
    #[serde(rename = "Date", skip_serializing_if = "Option::is_none")]
    pub date: Option<Value>,
    #[serde(rename = "timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(rename = "PrimaryDiagnosis", skip_serializing_if = "Option::is_none")]
    pub primary_diagnosis: Option<Value>,
    #[serde(rename = "Diagnosis", skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<Value>,
    #[serde(rename = "OrderedTests", skip_serializing_if = "Option::is_none")]
    pub ordered_tests: Option<Value>,
    #[serde(rename = "Tests", skip_serializing_if = "Option::is_none")]
    pub tests: Option<Value>,
    #[serde(rename = "AttendingPhysician", skip_serializing_if = "Option::is_none")]
    pub attending_physician: Option<Value>,
    #[serde(rename = "Physician", skip_serializing_if = "Option::is_none")]
    pub physician: Option<Value>,
    #[serde(rename = "Procedures", skip_serializing_if = "Option::is_none")]
    pub procedures: Option<Value>,
    #[serde(rename = "ClinicalSummary", skip_serializing_if = "Option::is_none")]
    pub clinical_summary: Option<Value>,
    #[serde(rename = "Confidence", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Value>,
    #[serde(
        rename = "ComprehendMedicalResult",
        skip_serializing_if = "Option::is_none"
    )]
    pub comprehend_medical_result: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Patient demographics assembled from whichever fields the producer filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatientSummary {
    pub name: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub service_date: Option<String>,
}

/// Clinical headline fields assembled from whichever fields the producer filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MedicalHighlights {
    pub primary_diagnosis: Option<String>,
    pub ordered_tests: Option<String>,
    pub attending_physician: Option<String>,
    pub procedures: Option<String>,
}

impl ProcessingRecord {
    /// Parse a raw record document. Anything that is not a JSON object
    /// collapses to an empty record rather than an error.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Demographics, preferring the `PatientProfile` block, then the legacy
    /// `Patient` block, then the flat `Patient*` fields.
    pub fn patient_summary(&self) -> PatientSummary {
        let profile = self
            .patient_profile
            .as_ref()
            .or(self.patient.as_ref())
            .and_then(Value::as_object);
        let profile_field = |name: &str| profile.and_then(|p| p.get(name)).and_then(text_value);

        PatientSummary {
            name: profile_field("Name").or_else(|| self.patient_name.as_ref().and_then(text_value)),
            age: profile_field("Age").or_else(|| self.patient_age.as_ref().and_then(text_value)),
            gender: profile_field("Gender")
                .or_else(|| self.patient_gender.as_ref().and_then(text_value)),
            service_date: self.service_date(),
        }
    }

    /// `ServiceDate`, falling back to the legacy `Date` and `timestamp` fields.
    pub fn service_date(&self) -> Option<String> {
        [&self.service_date, &self.date, &self.timestamp]
            .into_iter()
            .find_map(|field| field.as_ref().and_then(text_value))
    }

    /// Clinical headline fields, each with its legacy-name fallback
    /// (`PrimaryDiagnosis`/`Diagnosis`, `OrderedTests`/`Tests`,
    /// `AttendingPhysician`/`Physician`).
    pub fn medical_highlights(&self) -> MedicalHighlights {
        let first = |fields: [&Option<Value>; 2]| {
            fields
                .into_iter()
                .find_map(|field| field.as_ref().and_then(text_value))
        };

        MedicalHighlights {
            primary_diagnosis: first([&self.primary_diagnosis, &self.diagnosis]),
            ordered_tests: first([&self.ordered_tests, &self.tests]),
            attending_physician: first([&self.attending_physician, &self.physician]),
            procedures: self.procedures.as_ref().and_then(text_value),
        }
    }

    pub fn clinical_summary(&self) -> Option<String> {
        self.clinical_summary.as_ref().and_then(text_value)
    }

    /// Per-field extraction confidence from the record's `Confidence` map.
    pub fn confidence_for(&self, field: &str) -> Option<f64> {
        let value = self.confidence.as_ref()?.as_object()?.get(field)?;
        Some(score_value(value))
    }

    /// The embedded medical-entity payload, if the producer attached one.
    pub fn medical_result(&self) -> Option<&Value> {
        self.comprehend_medical_result.as_ref()
    }
}

/// Render a loosely typed field as display text. Strings pass through,
/// numbers are stringified, everything else (objects, arrays, null, empty
/// strings) counts as absent.
pub fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce a loosely typed score to a number. Finite numbers pass through,
/// numeric strings are parsed, everything else is 0.
pub fn score_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return 0.0;
            }
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0)
        }
        _ => 0.0,
    }
}
