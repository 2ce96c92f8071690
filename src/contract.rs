//! Ledger operations for the herb supply chain.
//!
//! [`HerbTrace`] wires the validation pipeline, quota ledger, quality gate,
//! batch tracker and provenance assembler onto one shared store. Creation
//! operations take the caller's JSON document; lookups return typed records.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::alerts::{emit, publish, AlertSink, EventPublisher, LedgerAlertSink, NullPublisher};
use crate::batch::{BatchStatus, BatchStatusTracker};
use crate::config::TraceConfig;
use crate::error::TraceError;
use crate::model::{
    parse_input, Alert, AlertKind, CollectionEvent, LedgerRecord, NewQcCertificate, Payload,
    Product, ProcessingStep, QcCertificate, QualityResult, QualityTest, Severity, TestStatus,
};
use crate::pipeline::{Submission, ValidationPipeline};
use crate::provenance::{product_by_qr, Provenance, ProvenanceAssembler};
use crate::quota::{HarvestQuotaLedger, HarvestQuotaRecord, QuotaKey};
use crate::quality::QualityGateEvaluator;
use crate::schema::{batch_label, event, field, record_type};
use crate::season::{Clock, SeasonWindow, SystemClock};
use crate::store::{get_record, put_record, query_records, LedgerStore, MemoryLedger, Selector};

/// One page of certificates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificatePage {
    pub certificates: Vec<QcCertificate>,
    pub fetched_count: usize,
    /// Pass back to fetch the next page; empty on the last one.
    pub bookmark: String,
}

/// A past revision of a certificate. `value` is `None` for deletions and for
/// revisions that no longer decode.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRevision {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
    pub value: Option<QcCertificate>,
}

pub struct HerbTrace {
    store: Arc<dyn LedgerStore>,
    quota: Arc<HarvestQuotaLedger>,
    pipeline: ValidationPipeline,
    quality: QualityGateEvaluator,
    batches: BatchStatusTracker,
    provenance: ProvenanceAssembler,
    alerts: Arc<dyn AlertSink>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl HerbTrace {
    pub fn new(
        config: &TraceConfig,
        store: Arc<dyn LedgerStore>,
        alerts: Arc<dyn AlertSink>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let quota = Arc::new(HarvestQuotaLedger::new(store.clone(), config.quota.clone()));
        let pipeline = ValidationPipeline::new(
            config,
            store.clone(),
            quota.clone(),
            alerts.clone(),
            events.clone(),
            clock.clone(),
        );
        Self {
            quality: QualityGateEvaluator::new(config.quality.clone()),
            batches: BatchStatusTracker::new(store.clone(), config.batch.policy, clock.clone()),
            provenance: ProvenanceAssembler::new(store.clone(), clock.clone()),
            store,
            quota,
            pipeline,
            alerts,
            events,
            clock,
        }
    }

    /// In-memory ledger that also stores its alerts; events are dropped.
    pub fn in_memory(config: &TraceConfig) -> Self {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
        let alerts = Arc::new(LedgerAlertSink::new(store.clone()));
        Self::new(config, store, alerts, Arc::new(NullPublisher), Arc::new(SystemClock))
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn quota(&self) -> &HarvestQuotaLedger {
        &self.quota
    }

    // ── Collection events ───────────────────────────────────────────────────

    /// Parse and submit a harvest. A failed check is returned as
    /// [`TraceError::Rejected`].
    pub fn create_collection_event(&self, json: &str) -> Result<CollectionEvent, TraceError> {
        let event: CollectionEvent = parse_input(json)?;
        Ok(self.submit_collection_event(event)?.into_result()?.event)
    }

    pub fn submit_collection_event(&self, event: CollectionEvent) -> Result<Submission, TraceError> {
        self.pipeline.submit(event)
    }

    pub fn get_collection_event(&self, id: &str) -> Result<CollectionEvent, TraceError> {
        get_record(self.store.as_ref(), id)
    }

    pub fn collections_by_farmer(&self, farmer_id: &str) -> Result<Vec<CollectionEvent>, TraceError> {
        self.collections_where(field::FARMER_ID, farmer_id)
    }

    pub fn collections_by_species(&self, species: &str) -> Result<Vec<CollectionEvent>, TraceError> {
        self.collections_where(field::SPECIES, species)
    }

    fn collections_where(&self, name: &str, value: &str) -> Result<Vec<CollectionEvent>, TraceError> {
        let selector = Selector::of_type(record_type::COLLECTION_EVENT).with_field(name, value);
        query_records(self.store.as_ref(), &selector)
    }

    // ── Quality tests ───────────────────────────────────────────────────────

    /// Grade and store a lab test. A failing test is stored too, with
    /// `overallResult = fail` and a quality alert.
    pub fn create_quality_test(&self, json: &str) -> Result<QualityTest, TraceError> {
        let mut test: QualityTest = parse_input(json)?;
        test.ensure_well_formed()?;

        let failures = self.quality.failures(&test);
        if failures.is_empty() {
            test.overall_result = QualityResult::Pass;
            test.status = TestStatus::Approved;
        } else {
            test.overall_result = QualityResult::Fail;
            test.status = TestStatus::Rejected;
            let alert = Alert {
                id: format!("alert_quality_{}", test.id),
                alert_type: AlertKind::QualityFailure,
                severity: Severity::High,
                entity_id: test.id.clone(),
                entity_type: QualityTest::TYPE.to_string(),
                species: None,
                zone: None,
                message: "Quality test failed".to_string(),
                details: format!(
                    "Batch {} failed quality testing at lab {}: {}",
                    test.batch_id,
                    test.lab_name,
                    failures.join("; ")
                ),
                timestamp: self.clock.now().to_rfc3339(),
            };
            emit(self.alerts.as_ref(), &alert);
            warn!(test_id = %test.id, batch_id = %test.batch_id, "quality test failed");
        }

        put_record(self.store.as_ref(), &test)?;
        self.batches.set_status(&test.batch_id, batch_label::TESTING);
        publish(self.events.as_ref(), event::QUALITY_TEST_CREATED, &test.created_payload());
        Ok(test)
    }

    pub fn get_quality_test(&self, id: &str) -> Result<QualityTest, TraceError> {
        get_record(self.store.as_ref(), id)
    }

    // ── Processing steps ────────────────────────────────────────────────────

    pub fn create_processing_step(&self, json: &str) -> Result<ProcessingStep, TraceError> {
        let step: ProcessingStep = parse_input(json)?;
        step.ensure_well_formed()?;

        put_record(self.store.as_ref(), &step)?;
        self.batches.set_status(&step.batch_id, batch_label::PROCESSING);
        publish(
            self.events.as_ref(),
            event::PROCESSING_STEP_CREATED,
            &step.created_payload(),
        );
        Ok(step)
    }

    pub fn get_processing_step(&self, id: &str) -> Result<ProcessingStep, TraceError> {
        get_record(self.store.as_ref(), id)
    }

    // ── QC certificates ─────────────────────────────────────────────────────

    /// Store a certificate. Result rows that fail to parse are logged and
    /// recorded as an empty list.
    pub fn record_qc_certificate(
        &self,
        header: NewQcCertificate,
        results_json: &str,
    ) -> Result<QcCertificate, TraceError> {
        if header.certificate_id.trim().is_empty() {
            return Err(TraceError::Malformed("certificateId must not be empty".into()));
        }
        let results: Vec<Payload> = if results_json.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(results_json).unwrap_or_else(|err| {
                warn!(certificate_id = %header.certificate_id, error = %err, "failed to parse certificate results");
                Vec::new()
            })
        };
        let certificate = header.into_certificate(results);

        put_record(self.store.as_ref(), &certificate)?;
        self.batches
            .set_status(&certificate.batch_id, batch_label::QUALITY_TESTED);
        publish(
            self.events.as_ref(),
            event::QC_CERTIFICATE_RECORDED,
            &certificate.created_payload(),
        );
        info!(
            certificate_id = %certificate.certificate_id,
            batch_id = %certificate.batch_id,
            result = %certificate.overall_result,
            "QC certificate recorded"
        );
        Ok(certificate)
    }

    pub fn query_qc_certificate(&self, certificate_id: &str) -> Result<QcCertificate, TraceError> {
        get_record(self.store.as_ref(), certificate_id)
    }

    pub fn certificates_by_batch(&self, batch_id: &str) -> Result<Vec<QcCertificate>, TraceError> {
        let selector =
            Selector::of_type(record_type::QC_CERTIFICATE).with_field(field::BATCH_ID, batch_id);
        query_records(self.store.as_ref(), &selector)
    }

    /// Every write to a certificate key, oldest first.
    pub fn certificate_history(
        &self,
        certificate_id: &str,
    ) -> Result<Vec<CertificateRevision>, TraceError> {
        Ok(self
            .store
            .history(certificate_id)?
            .into_iter()
            .map(|entry| CertificateRevision {
                value: if entry.is_delete {
                    None
                } else {
                    QcCertificate::from_ledger_bytes(&entry.value).ok()
                },
                tx_id: entry.tx_id,
                timestamp: entry.timestamp,
                is_delete: entry.is_delete,
            })
            .collect())
    }

    pub fn all_certificates(
        &self,
        page_size: usize,
        bookmark: &str,
    ) -> Result<CertificatePage, TraceError> {
        let page = self.store.query_paged(
            &Selector::of_type(record_type::QC_CERTIFICATE),
            page_size,
            bookmark,
        )?;
        let certificates = page
            .records
            .iter()
            .map(|r| QcCertificate::from_ledger_bytes(&r.value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CertificatePage {
            certificates,
            fetched_count: page.fetched_count,
            bookmark: page.bookmark,
        })
    }

    // ── Products and provenance ─────────────────────────────────────────────

    pub fn create_product(&self, json: &str) -> Result<Product, TraceError> {
        let product: Product = parse_input(json)?;
        product.ensure_well_formed()?;

        put_record(self.store.as_ref(), &product)?;
        self.batches
            .set_status(&product.batch_id, batch_label::MANUFACTURED);
        publish(
            self.events.as_ref(),
            event::PRODUCT_CREATED,
            &product.created_payload(),
        );
        info!(product_id = %product.id, qr_code = %product.qr_code, "product created");
        Ok(product)
    }

    pub fn get_product(&self, id: &str) -> Result<Product, TraceError> {
        get_record(self.store.as_ref(), id)
    }

    pub fn product_by_qr_code(&self, qr_code: &str) -> Result<Product, TraceError> {
        product_by_qr(self.store.as_ref(), qr_code)
    }

    pub fn generate_provenance(&self, product_id: &str) -> Result<Provenance, TraceError> {
        self.provenance.assemble(product_id)
    }

    pub fn provenance_by_qr_code(&self, qr_code: &str) -> Result<Provenance, TraceError> {
        self.provenance.assemble_by_qr(qr_code)
    }

    // ── Quota and season administration ─────────────────────────────────────

    pub fn harvest_statistics(
        &self,
        species: &str,
        zone: &str,
        season: &str,
    ) -> Result<HarvestQuotaRecord, TraceError> {
        self.quota.statistics(&QuotaKey::new(species, zone, season))
    }

    pub fn configure_harvest_limit(
        &self,
        species: &str,
        zone: &str,
        season: &str,
        max_quantity: f64,
        unit: Option<&str>,
    ) -> Result<HarvestQuotaRecord, TraceError> {
        let record = self.quota.configure_limit(
            &QuotaKey::new(species, zone, season),
            max_quantity,
            unit,
        )?;
        info!(species, zone, season, max_quantity, "harvest limit configured");
        Ok(record)
    }

    /// Register (or replace, by id) a season window on the ledger.
    pub fn create_season_window(&self, json: &str) -> Result<SeasonWindow, TraceError> {
        let window: SeasonWindow = parse_input(json)?;
        window.ensure_well_formed()?;
        put_record(self.store.as_ref(), &window)?;
        info!(window_id = %window.id, species = %window.species, "season window registered");
        Ok(window)
    }

    pub fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, TraceError> {
        self.batches.status(batch_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{MemoryAlertSink, MemoryEventBus};
    use crate::model::{ParamValue, StepStatus};
    use crate::season::FixedClock;

    struct Fixture {
        trace: HerbTrace,
        alerts: Arc<MemoryAlertSink>,
        events: Arc<MemoryEventBus>,
    }

    fn fixture() -> Fixture {
        let alerts = Arc::new(MemoryAlertSink::new());
        let events = Arc::new(MemoryEventBus::new());
        let trace = HerbTrace::new(
            &TraceConfig::default(),
            Arc::new(MemoryLedger::new()),
            alerts.clone(),
            events.clone(),
            Arc::new(FixedClock::on(2026, 10, 16)),
        );
        Fixture {
            trace,
            alerts,
            events,
        }
    }

    const PASSING_TEST: &str = r#"{
        "id": "QT-1",
        "batchId": "B-1",
        "labId": "LAB-1",
        "labName": "Dehradun Labs",
        "moistureContent": 12.0,
        "pesticideResults": {"chlorpyrifos": "pass"},
        "heavyMetals": {"lead": 10.0, "arsenic": 3.0},
        "aflatoxins": 20.0,
        "overallResult": "fail"
    }"#;

    #[test]
    fn test_quality_test_pass_sets_approved() {
        let f = fixture();
        let test = f.trace.create_quality_test(PASSING_TEST).unwrap();
        assert_eq!(test.overall_result, QualityResult::Pass);
        assert_eq!(test.status, TestStatus::Approved);
        assert!(f.alerts.alerts().is_empty());
        assert_eq!(f.trace.batch_status("B-1").unwrap().status, "testing");
        assert_eq!(f.events.events()[0].name, "QualityTestCreated");
    }

    #[test]
    fn test_failed_quality_test_is_stored_with_alert() {
        let f = fixture();
        let json = PASSING_TEST.replace("12.0", "12.01");
        let test = f.trace.create_quality_test(&json).unwrap();
        assert_eq!(test.overall_result, QualityResult::Fail);
        assert_eq!(test.status, TestStatus::Rejected);

        let stored = f.trace.get_quality_test("QT-1").unwrap();
        assert_eq!(stored.overall_result, QualityResult::Fail);

        let alerts = f.alerts.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, "alert_quality_QT-1");
        assert_eq!(alerts[0].alert_type, AlertKind::QualityFailure);
        assert_eq!(alerts[0].severity, Severity::High);
    }

    #[test]
    fn test_processing_step_defaults_to_completed() {
        let f = fixture();
        let step = f
            .trace
            .create_processing_step(
                r#"{"id": "PS-1", "batchId": "B-1", "processType": "drying",
                    "parameters": {"temperature": 45.5, "shaded": true, "rack": "A"}}"#,
            )
            .unwrap();
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.parameters["shaded"], ParamValue::Flag(true));
        assert_eq!(step.parameters["temperature"], ParamValue::Number(45.5));
        assert_eq!(f.trace.batch_status("B-1").unwrap().status, "processing");
        assert_eq!(f.trace.get_processing_step("PS-1").unwrap(), step);
    }

    #[test]
    fn test_malformed_json_is_rejected_early() {
        let f = fixture();
        assert!(matches!(
            f.trace.create_processing_step("{not json"),
            Err(TraceError::Malformed(_))
        ));
        assert!(matches!(
            f.trace.create_product(r#"{"id": "PRD-1"}"#),
            Err(TraceError::Malformed(_))
        ));
        assert!(f.events.events().is_empty());
    }

    fn header(id: &str, batch: &str) -> NewQcCertificate {
        NewQcCertificate {
            certificate_id: id.into(),
            batch_id: batch.into(),
            overall_result: "PASS".into(),
            issued_date: "2026-10-16".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_certificate_results_fall_back_to_empty() {
        let f = fixture();
        let cert = f
            .trace
            .record_qc_certificate(header("QC-1", "B-1"), "[{broken")
            .unwrap();
        assert!(cert.results.is_empty());
        assert_eq!(cert.timestamp, "2026-10-16");

        let cert = f
            .trace
            .record_qc_certificate(header("QC-2", "B-1"), r#"[{"parameter": "moisture", "value": 9.5}]"#)
            .unwrap();
        assert_eq!(cert.results[0]["value"], ParamValue::Number(9.5));
        assert_eq!(f.trace.batch_status("B-1").unwrap().status, "quality_tested");
    }

    #[test]
    fn test_certificate_rows_with_null_fields_survive() {
        let f = fixture();
        let cert = f
            .trace
            .record_qc_certificate(
                header("QC-1", "B-1"),
                r#"[{"parameter": "moisture", "value": 9.5},
                    {"parameter": "ash", "value": 4.1, "remarks": null}]"#,
            )
            .unwrap();
        assert_eq!(cert.results.len(), 2);
        assert_eq!(cert.results[1]["remarks"], ParamValue::Null);
        let stored = f.trace.query_qc_certificate("QC-1").unwrap();
        assert_eq!(stored.results, cert.results);
    }

    #[test]
    fn test_certificate_queries() {
        let f = fixture();
        for (id, batch) in [("QC-1", "B-1"), ("QC-2", "B-2"), ("QC-3", "B-1")] {
            f.trace.record_qc_certificate(header(id, batch), "").unwrap();
        }
        let mut revised = header("QC-1", "B-1");
        revised.overall_result = "FAIL".into();
        f.trace.record_qc_certificate(revised, "").unwrap();

        assert_eq!(f.trace.query_qc_certificate("QC-1").unwrap().overall_result, "FAIL");
        assert_eq!(f.trace.certificates_by_batch("B-1").unwrap().len(), 2);

        let history = f.trace.certificate_history("QC-1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].value.as_ref().unwrap().overall_result, "PASS");

        let first = f.trace.all_certificates(2, "").unwrap();
        assert_eq!(first.fetched_count, 2);
        assert!(!first.bookmark.is_empty());
        let rest = f.trace.all_certificates(2, &first.bookmark).unwrap();
        assert_eq!(rest.fetched_count, 1);
        assert!(rest.bookmark.is_empty());
        assert!(f.trace.query_qc_certificate("QC-404").unwrap_err().is_not_found());
    }

    #[test]
    fn test_product_lookup_by_qr() {
        let f = fixture();
        f.trace
            .create_product(r#"{"id": "PRD-1", "qrCode": "QR-1", "batchId": "B-1"}"#)
            .unwrap();
        assert_eq!(f.trace.product_by_qr_code("QR-1").unwrap().id, "PRD-1");
        assert!(f.trace.product_by_qr_code("QR-2").unwrap_err().is_not_found());
        assert_eq!(f.trace.batch_status("B-1").unwrap().status, "manufactured");
    }

    #[test]
    fn test_season_window_round_trips_through_ledger() {
        let f = fixture();
        let window = f
            .trace
            .create_season_window(
                r#"{"id": "sw-tulsi", "species": "Tulsi", "startMonth": 3, "endMonth": 5}"#,
            )
            .unwrap();
        assert!(window.active);
        assert!(f
            .trace
            .create_season_window(r#"{"id": "sw-bad", "species": "Tulsi", "startMonth": 13, "endMonth": 5}"#)
            .is_err());
    }

    #[test]
    fn test_in_memory_stores_alerts_on_ledger() {
        let trace = HerbTrace::in_memory(&TraceConfig::default());
        let json = PASSING_TEST.replace("\"pass\"", "\"detected\"");
        trace.create_quality_test(&json).unwrap();
        let alert: Alert = get_record(trace.store().as_ref(), "alert_quality_QT-1").unwrap();
        assert_eq!(alert.entity_type, "QualityTest");
    }
}
