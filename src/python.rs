use std::path::Path;
use std::sync::Arc;

use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::alerts::{LedgerAlertSink, NullPublisher};
use crate::config::TraceConfig;
use crate::contract::HerbTrace;
use crate::error::TraceError;
use crate::frame;
use crate::model::NewQcCertificate;
use crate::schema;
use crate::season::SystemClock;
use crate::store::{LedgerStore, MemoryLedger};

fn to_json<T: Serialize>(value: &T) -> PyResult<String> {
    Ok(serde_json::to_string(value).map_err(TraceError::from)?)
}

/// In-process herb ledger. Documents go in and come out as JSON strings.
#[pyclass]
pub struct TraceLedger {
    inner: HerbTrace,
}

impl TraceLedger {
    fn with_config(config: TraceConfig) -> Self {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
        let alerts = Arc::new(LedgerAlertSink::new(store.clone()));
        Self {
            inner: HerbTrace::new(
                &config,
                store,
                alerts,
                Arc::new(NullPublisher),
                Arc::new(SystemClock),
            ),
        }
    }
}

#[pymethods]
impl TraceLedger {
    /// Stock policy, or the TOML file at `config_path`.
    #[new]
    #[pyo3(signature = (config_path=None))]
    fn new(config_path: Option<&str>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => TraceConfig::load(Path::new(path))?,
            None => TraceConfig::default(),
        };
        Ok(Self::with_config(config))
    }

    #[staticmethod]
    fn from_toml(text: &str) -> PyResult<Self> {
        Ok(Self::with_config(TraceConfig::from_toml_str(text)?))
    }

    // ── Collection events ───────────────────────────────────────────────────

    /// Raises ValueError with the rejection reason when a check fails.
    fn create_collection_event(&self, event_json: &str) -> PyResult<String> {
        to_json(&self.inner.create_collection_event(event_json)?)
    }

    fn get_collection_event(&self, id: &str) -> PyResult<String> {
        to_json(&self.inner.get_collection_event(id)?)
    }

    fn query_collections_by_farmer(&self, farmer_id: &str) -> PyResult<String> {
        to_json(&self.inner.collections_by_farmer(farmer_id)?)
    }

    fn query_collections_by_species(&self, species: &str) -> PyResult<String> {
        to_json(&self.inner.collections_by_species(species)?)
    }

    // ── Lab and processing ──────────────────────────────────────────────────

    fn create_quality_test(&self, test_json: &str) -> PyResult<String> {
        to_json(&self.inner.create_quality_test(test_json)?)
    }

    fn get_quality_test(&self, id: &str) -> PyResult<String> {
        to_json(&self.inner.get_quality_test(id)?)
    }

    fn create_processing_step(&self, step_json: &str) -> PyResult<String> {
        to_json(&self.inner.create_processing_step(step_json)?)
    }

    fn get_processing_step(&self, id: &str) -> PyResult<String> {
        to_json(&self.inner.get_processing_step(id)?)
    }

    #[allow(clippy::too_many_arguments)]
    #[pyo3(signature = (
        certificate_id, test_id, batch_id, batch_number, species_name, test_type,
        lab_id, lab_name, overall_result, issued_date, tested_by, results_json=""
    ))]
    fn record_qc_certificate(
        &self,
        certificate_id: String,
        test_id: String,
        batch_id: String,
        batch_number: String,
        species_name: String,
        test_type: String,
        lab_id: String,
        lab_name: String,
        overall_result: String,
        issued_date: String,
        tested_by: String,
        results_json: &str,
    ) -> PyResult<String> {
        let header = NewQcCertificate {
            certificate_id,
            test_id,
            batch_id,
            batch_number,
            species_name,
            test_type,
            lab_id,
            lab_name,
            overall_result,
            issued_date,
            tested_by,
        };
        to_json(&self.inner.record_qc_certificate(header, results_json)?)
    }

    fn query_qc_certificate(&self, certificate_id: &str) -> PyResult<String> {
        to_json(&self.inner.query_qc_certificate(certificate_id)?)
    }

    fn query_certificates_by_batch(&self, batch_id: &str) -> PyResult<String> {
        to_json(&self.inner.certificates_by_batch(batch_id)?)
    }

    fn get_certificate_history(&self, certificate_id: &str) -> PyResult<String> {
        to_json(&self.inner.certificate_history(certificate_id)?)
    }

    #[pyo3(signature = (page_size, bookmark=""))]
    fn get_all_certificates(&self, page_size: usize, bookmark: &str) -> PyResult<String> {
        to_json(&self.inner.all_certificates(page_size, bookmark)?)
    }

    // ── Products and provenance ─────────────────────────────────────────────

    fn create_product(&self, product_json: &str) -> PyResult<String> {
        to_json(&self.inner.create_product(product_json)?)
    }

    fn get_product(&self, id: &str) -> PyResult<String> {
        to_json(&self.inner.get_product(id)?)
    }

    fn get_product_by_qr_code(&self, qr_code: &str) -> PyResult<String> {
        to_json(&self.inner.product_by_qr_code(qr_code)?)
    }

    fn generate_provenance(&self, product_id: &str) -> PyResult<String> {
        to_json(&self.inner.generate_provenance(product_id)?)
    }

    fn get_provenance_by_qr_code(&self, qr_code: &str) -> PyResult<String> {
        to_json(&self.inner.provenance_by_qr_code(qr_code)?)
    }

    /// One row per record in the product's provenance bundle.
    fn provenance_frame(&self, product_id: &str) -> PyResult<PyDataFrame> {
        let bundle = self.inner.generate_provenance(product_id)?;
        Ok(PyDataFrame(frame::provenance_frame(&bundle)?))
    }

    // ── Quota, seasons, batches ─────────────────────────────────────────────

    fn get_harvest_statistics(&self, species: &str, zone: &str, season: &str) -> PyResult<String> {
        to_json(&self.inner.harvest_statistics(species, zone, season)?)
    }

    #[pyo3(signature = (species, zone, season, max_quantity, unit=None))]
    fn set_harvest_limit(
        &self,
        species: &str,
        zone: &str,
        season: &str,
        max_quantity: f64,
        unit: Option<&str>,
    ) -> PyResult<String> {
        to_json(
            &self
                .inner
                .configure_harvest_limit(species, zone, season, max_quantity, unit)?,
        )
    }

    /// Usage of every quota key written so far.
    fn quota_frame(&self) -> PyResult<PyDataFrame> {
        let records = self.inner.quota().records()?;
        Ok(PyDataFrame(frame::quota_frame(&records)?))
    }

    fn create_season_window(&self, window_json: &str) -> PyResult<String> {
        to_json(&self.inner.create_season_window(window_json)?)
    }

    fn get_batch_status(&self, batch_id: &str) -> PyResult<String> {
        to_json(&self.inner.batch_status(batch_id)?)
    }
}

/// Install a fmt subscriber for the crate's tracing output.
/// Returns False if a subscriber was already installed.
#[pyfunction]
#[pyo3(signature = (filter="herb_tracekit=info"))]
pub fn init_logging(filter: &str) -> PyResult<bool> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|e| PyRuntimeError::new_err(format!("invalid log filter: {e}")))?;
    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok())
}

/// Export schema constants as Python submodules
pub fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Record types
    let record_type = PyModule::new(m.py(), "record_type")?;
    record_type.add("FIELD", schema::record_type::FIELD)?;
    record_type.add("COLLECTION_EVENT", schema::record_type::COLLECTION_EVENT)?;
    record_type.add("QUALITY_TEST", schema::record_type::QUALITY_TEST)?;
    record_type.add("PROCESSING_STEP", schema::record_type::PROCESSING_STEP)?;
    record_type.add("QC_CERTIFICATE", schema::record_type::QC_CERTIFICATE)?;
    record_type.add("PRODUCT", schema::record_type::PRODUCT)?;
    record_type.add("ALERT", schema::record_type::ALERT)?;
    record_type.add("HARVEST_QUOTA", schema::record_type::HARVEST_QUOTA)?;
    record_type.add("SEASON_WINDOW", schema::record_type::SEASON_WINDOW)?;
    record_type.add("BATCH_STATUS", schema::record_type::BATCH_STATUS)?;
    m.add_submodule(&record_type)?;

    // Alert types
    let alert_type = PyModule::new(m.py(), "alert_type")?;
    alert_type.add("SEASON_VIOLATION", schema::alert_type::SEASON_VIOLATION)?;
    alert_type.add("ZONE_VIOLATION", schema::alert_type::ZONE_VIOLATION)?;
    alert_type.add("OVER_HARVEST", schema::alert_type::OVER_HARVEST)?;
    alert_type.add("COMPLIANCE", schema::alert_type::COMPLIANCE)?;
    alert_type.add("QUALITY_FAILURE", schema::alert_type::QUALITY_FAILURE)?;
    m.add_submodule(&alert_type)?;

    // Events
    let event = PyModule::new(m.py(), "event")?;
    event.add(
        "COLLECTION_EVENT_CREATED",
        schema::event::COLLECTION_EVENT_CREATED,
    )?;
    event.add("QUALITY_TEST_CREATED", schema::event::QUALITY_TEST_CREATED)?;
    event.add(
        "PROCESSING_STEP_CREATED",
        schema::event::PROCESSING_STEP_CREATED,
    )?;
    event.add(
        "QC_CERTIFICATE_RECORDED",
        schema::event::QC_CERTIFICATE_RECORDED,
    )?;
    event.add("PRODUCT_CREATED", schema::event::PRODUCT_CREATED)?;
    m.add_submodule(&event)?;

    // Batch labels
    let batch_label = PyModule::new(m.py(), "batch_label")?;
    batch_label.add("TESTING", schema::batch_label::TESTING)?;
    batch_label.add("QUALITY_TESTED", schema::batch_label::QUALITY_TESTED)?;
    batch_label.add("PROCESSING", schema::batch_label::PROCESSING)?;
    batch_label.add("MANUFACTURED", schema::batch_label::MANUFACTURED)?;
    m.add_submodule(&batch_label)?;

    // Provenance frame
    let provenance = PyModule::new(m.py(), "provenance")?;
    provenance.add("PRODUCT_ID", schema::provenance::PRODUCT_ID)?;
    provenance.add("RECORD_ID", schema::provenance::RECORD_ID)?;
    provenance.add("RECORD_TYPE", schema::provenance::RECORD_TYPE)?;
    provenance.add("BATCH_ID", schema::provenance::BATCH_ID)?;
    provenance.add("STATUS", schema::provenance::STATUS)?;
    provenance.add("APPROVED_ZONE", schema::provenance::APPROVED_ZONE)?;
    provenance.add("OVERALL_RESULT", schema::provenance::OVERALL_RESULT)?;
    provenance.add("UPSTREAM_ID", schema::provenance::UPSTREAM_ID)?;
    m.add_submodule(&provenance)?;

    // Quota frame
    let quota = PyModule::new(m.py(), "quota")?;
    quota.add("SPECIES", schema::quota::SPECIES)?;
    quota.add("ZONE", schema::quota::ZONE)?;
    quota.add("SEASON", schema::quota::SEASON)?;
    quota.add("CURRENT_QUANTITY", schema::quota::CURRENT_QUANTITY)?;
    quota.add("MAX_QUANTITY", schema::quota::MAX_QUANTITY)?;
    quota.add("UNIT", schema::quota::UNIT)?;
    quota.add("STATUS", schema::quota::STATUS)?;
    m.add_submodule(&quota)?;

    Ok(())
}
