//! Ledger documents for the herb supply chain.
//!
//! Every record is stored as a JSON object carrying a `type` discriminator
//! (see [`crate::schema::record_type`]); the discriminator is added on write
//! and checked on read by [`LedgerRecord`], so the structs themselves stay
//! free of it.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TraceError;
use crate::schema::{alert_type, record_type};

// ── Free-form values ────────────────────────────────────────────────────────

/// Scalar value of a free-form key/value payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Flag(bool),
    Number(f64),
    Text(String),
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Flag(b)
    }
}

/// Ordered string-keyed payload: processing parameters, certificate result
/// rows and domain event bodies.
pub type Payload = BTreeMap<String, ParamValue>;

// ── Ledger encoding ─────────────────────────────────────────────────────────

/// A document that lives under its own key in the ledger.
pub trait LedgerRecord: Serialize + DeserializeOwned {
    const TYPE: &'static str;

    fn key(&self) -> String;

    fn to_ledger_bytes(&self) -> Result<Vec<u8>, TraceError> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert(
                record_type::FIELD.to_string(),
                Value::String(Self::TYPE.to_string()),
            );
        }
        Ok(serde_json::to_vec(&value)?)
    }

    fn from_ledger_bytes(bytes: &[u8]) -> Result<Self, TraceError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| TraceError::Malformed(format!("{} document: {e}", Self::TYPE)))?;
        match value.get(record_type::FIELD).and_then(Value::as_str) {
            Some(t) if t == Self::TYPE => {}
            other => {
                return Err(TraceError::Malformed(format!(
                    "expected {} document, found type {:?}",
                    Self::TYPE,
                    other
                )))
            }
        }
        serde_json::from_value(value)
            .map_err(|e| TraceError::Malformed(format!("{} document: {e}", Self::TYPE)))
    }
}

/// Parse caller-supplied JSON into a record shape.
pub fn parse_input<T: DeserializeOwned>(json: &str) -> Result<T, TraceError> {
    serde_json::from_str(json).map_err(|e| TraceError::Malformed(e.to_string()))
}

fn require(field: &str, value: &str) -> Result<(), TraceError> {
    if value.trim().is_empty() {
        return Err(TraceError::Malformed(format!("{field} must not be empty")));
    }
    Ok(())
}

// ── Status enums ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityResult {
    #[default]
    Pass,
    Fail,
    Conditional,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    InProgress,
    #[default]
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Manufactured,
    Distributed,
    Sold,
}

// ── Collection event ────────────────────────────────────────────────────────

/// A harvest with its GPS fix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionEvent {
    pub id: String,
    pub farmer_id: String,
    pub farmer_name: String,
    pub species: String,
    pub common_name: String,
    pub scientific_name: String,
    pub quantity: f64,
    pub unit: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// GPS accuracy in meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub harvest_date: String,
    pub timestamp: String,
    pub harvest_method: String,
    pub part_collected: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather_conditions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil_type: Option<String>,
    pub images: Vec<String>,
    pub approved_zone: bool,
    pub zone_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conservation_status: Option<String>,
    pub certification_ids: Vec<String>,
    pub status: CollectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<String>,
}

impl CollectionEvent {
    /// Shape checks that run before any validation stage.
    pub fn ensure_well_formed(&self) -> Result<(), TraceError> {
        require("id", &self.id)?;
        require("species", &self.species)?;
        require("harvestDate", &self.harvest_date)?;
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(TraceError::Malformed(format!(
                "quantity must be a positive number, got {}",
                self.quantity
            )));
        }
        Ok(())
    }

    pub fn created_payload(&self) -> Payload {
        let mut p = Payload::new();
        p.insert("eventId".into(), self.id.clone().into());
        p.insert("farmerId".into(), self.farmer_id.clone().into());
        p.insert("species".into(), self.species.clone().into());
        p.insert("quantity".into(), self.quantity.into());
        p.insert("unit".into(), self.unit.clone().into());
        p.insert("zone".into(), self.zone_name.clone().into());
        p.insert("status".into(), status_label(&self.status).into());
        p.insert("timestamp".into(), self.timestamp.clone().into());
        p
    }
}

impl LedgerRecord for CollectionEvent {
    const TYPE: &'static str = record_type::COLLECTION_EVENT;

    fn key(&self) -> String {
        self.id.clone()
    }
}

// ── Quality test ────────────────────────────────────────────────────────────

/// Laboratory result for a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityTest {
    pub id: String,
    pub collection_event_id: String,
    pub batch_id: String,
    pub lab_id: String,
    pub lab_name: String,
    pub test_date: String,
    pub timestamp: String,
    pub test_types: Vec<String>,
    pub moisture_content: f64,
    /// Pesticide name to "pass"/"fail".
    pub pesticide_results: BTreeMap<String, String>,
    /// Metal name to ppm.
    pub heavy_metals: BTreeMap<String, f64>,
    pub dna_barcode_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dna_sequence: Option<String>,
    /// CFU/g
    #[serde(skip_serializing_if = "Option::is_none")]
    pub microbial_load: Option<f64>,
    /// ppb
    pub aflatoxins: f64,
    pub overall_result: QualityResult,
    pub certificate_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,
    pub tester_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tester_signature: Option<String>,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<String>,
}

impl QualityTest {
    pub fn ensure_well_formed(&self) -> Result<(), TraceError> {
        require("id", &self.id)
    }

    pub fn created_payload(&self) -> Payload {
        let mut p = Payload::new();
        p.insert("testId".into(), self.id.clone().into());
        p.insert("batchId".into(), self.batch_id.clone().into());
        p.insert("labId".into(), self.lab_id.clone().into());
        p.insert(
            "overallResult".into(),
            status_label(&self.overall_result).into(),
        );
        p.insert("status".into(), status_label(&self.status).into());
        p.insert("timestamp".into(), self.timestamp.clone().into());
        p
    }
}

impl LedgerRecord for QualityTest {
    const TYPE: &'static str = record_type::QUALITY_TEST;

    fn key(&self) -> String {
        self.id.clone()
    }
}

// ── Processing step ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingStep {
    pub id: String,
    /// CollectionEvent or QualityTest this step consumed.
    pub previous_step_id: String,
    pub batch_id: String,
    pub processor_id: String,
    pub processor_name: String,
    /// "drying", "grinding", "extraction", "formulation", ...
    pub process_type: String,
    pub process_date: String,
    pub timestamp: String,
    pub input_quantity: f64,
    pub output_quantity: f64,
    pub unit: String,
    /// Celsius
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Hours
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
    pub parameters: Payload,
    pub quality_checks: Vec<String>,
    pub operator_id: String,
    pub operator_name: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<String>,
}

impl ProcessingStep {
    pub fn ensure_well_formed(&self) -> Result<(), TraceError> {
        require("id", &self.id)
    }

    pub fn created_payload(&self) -> Payload {
        let mut p = Payload::new();
        p.insert("stepId".into(), self.id.clone().into());
        p.insert("batchId".into(), self.batch_id.clone().into());
        p.insert("processType".into(), self.process_type.clone().into());
        p.insert("processorId".into(), self.processor_id.clone().into());
        p.insert("status".into(), status_label(&self.status).into());
        p.insert("timestamp".into(), self.timestamp.clone().into());
        p
    }
}

impl LedgerRecord for ProcessingStep {
    const TYPE: &'static str = record_type::PROCESSING_STEP;

    fn key(&self) -> String {
        self.id.clone()
    }
}

// ── QC certificate ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QcCertificate {
    pub id: String,
    pub certificate_id: String,
    pub test_id: String,
    pub batch_id: String,
    pub batch_number: String,
    pub species_name: String,
    pub test_type: String,
    pub lab_id: String,
    pub lab_name: String,
    /// "PASS", "FAIL", "CONDITIONAL"
    pub overall_result: String,
    pub issued_date: String,
    pub tested_by: String,
    pub results: Vec<Payload>,
    pub timestamp: String,
}

impl QcCertificate {
    pub fn created_payload(&self) -> Payload {
        let mut p = Payload::new();
        p.insert("certificateId".into(), self.certificate_id.clone().into());
        p.insert("testId".into(), self.test_id.clone().into());
        p.insert("batchId".into(), self.batch_id.clone().into());
        p.insert("labId".into(), self.lab_id.clone().into());
        p.insert("overallResult".into(), self.overall_result.clone().into());
        p.insert("timestamp".into(), self.issued_date.clone().into());
        p
    }
}

impl LedgerRecord for QcCertificate {
    const TYPE: &'static str = record_type::QC_CERTIFICATE;

    fn key(&self) -> String {
        self.id.clone()
    }
}

/// Header fields of a certificate; result rows arrive separately as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewQcCertificate {
    pub certificate_id: String,
    pub test_id: String,
    pub batch_id: String,
    pub batch_number: String,
    pub species_name: String,
    pub test_type: String,
    pub lab_id: String,
    pub lab_name: String,
    pub overall_result: String,
    pub issued_date: String,
    pub tested_by: String,
}

impl NewQcCertificate {
    pub fn into_certificate(self, results: Vec<Payload>) -> QcCertificate {
        QcCertificate {
            id: self.certificate_id.clone(),
            timestamp: self.issued_date.clone(),
            certificate_id: self.certificate_id,
            test_id: self.test_id,
            batch_id: self.batch_id,
            batch_number: self.batch_number,
            species_name: self.species_name,
            test_type: self.test_type,
            lab_id: self.lab_id,
            lab_name: self.lab_name,
            overall_result: self.overall_result,
            issued_date: self.issued_date,
            tested_by: self.tested_by,
            results,
        }
    }
}

// ── Product ─────────────────────────────────────────────────────────────────

/// Finished good. The id lists are weak references: nothing checks that the
/// referenced records exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Product {
    pub id: String,
    pub product_name: String,
    /// "powder", "extract", "capsule", "oil"
    pub product_type: String,
    pub manufacturer_id: String,
    pub manufacturer_name: String,
    pub batch_id: String,
    pub manufacture_date: String,
    pub expiry_date: String,
    pub quantity: f64,
    pub unit: String,
    pub qr_code: String,
    pub ingredients: Vec<String>,
    pub collection_event_ids: Vec<String>,
    pub quality_test_ids: Vec<String>,
    pub processing_step_ids: Vec<String>,
    pub certifications: Vec<String>,
    pub packaging_date: String,
    pub status: ProductStatus,
    pub timestamp: String,
}

impl Product {
    pub fn ensure_well_formed(&self) -> Result<(), TraceError> {
        require("id", &self.id)?;
        require("qrCode", &self.qr_code)
    }

    pub fn created_payload(&self) -> Payload {
        let mut p = Payload::new();
        p.insert("productId".into(), self.id.clone().into());
        p.insert("batchId".into(), self.batch_id.clone().into());
        p.insert("qrCode".into(), self.qr_code.clone().into());
        p.insert("manufacturerId".into(), self.manufacturer_id.clone().into());
        p.insert("status".into(), status_label(&self.status).into());
        p.insert("timestamp".into(), self.manufacture_date.clone().into());
        p
    }
}

impl LedgerRecord for Product {
    const TYPE: &'static str = record_type::PRODUCT;

    fn key(&self) -> String {
        self.id.clone()
    }
}

// ── Alerts ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SeasonViolation,
    ZoneViolation,
    OverHarvest,
    Compliance,
    QualityFailure,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::SeasonViolation => alert_type::SEASON_VIOLATION,
            AlertKind::ZoneViolation => alert_type::ZONE_VIOLATION,
            AlertKind::OverHarvest => alert_type::OVER_HARVEST,
            AlertKind::Compliance => alert_type::COMPLIANCE,
            AlertKind::QualityFailure => alert_type::QUALITY_FAILURE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

/// Append-only notice raised by a failed or borderline check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub alert_type: AlertKind,
    pub severity: Severity,
    pub entity_id: String,
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    pub message: String,
    pub details: String,
    #[serde(default)]
    pub timestamp: String,
}

impl LedgerRecord for Alert {
    const TYPE: &'static str = record_type::ALERT;

    fn key(&self) -> String {
        self.id.clone()
    }
}

/// Serialized label of a unit-variant status enum ("pending", "in_progress").
pub fn status_label<T: Serialize>(status: &T) -> String {
    match serde_json::to_value(status) {
        Ok(Value::String(s)) => s,
        _ => String::new(),
    }
}
