/// Field-name and label constants for herb-tracekit ledger documents.
/// Single source of truth - exported to Python via PyO3.

// ── Record type discriminators ──────────────────────────────────────────────
pub mod record_type {
    pub const FIELD: &str = "type";

    pub const COLLECTION_EVENT: &str = "CollectionEvent";
    pub const QUALITY_TEST: &str = "QualityTest";
    pub const PROCESSING_STEP: &str = "ProcessingStep";
    pub const QC_CERTIFICATE: &str = "QCCertificate";
    pub const PRODUCT: &str = "Product";
    pub const ALERT: &str = "Alert";
    pub const HARVEST_QUOTA: &str = "HarvestQuota";
    pub const SEASON_WINDOW: &str = "SeasonWindow";
    pub const BATCH_STATUS: &str = "BatchStatus";
}

// ── Queryable fields ────────────────────────────────────────────────────────
pub mod field {
    pub const FARMER_ID: &str = "farmerId";
    pub const SPECIES: &str = "species";
    pub const BATCH_ID: &str = "batchId";
    pub const QR_CODE: &str = "qrCode";
}

// ── Ledger key prefixes for internal records ────────────────────────────────
pub mod key {
    pub const HARVEST_QUOTA: &str = "HARVEST_QUOTA";
    pub const BATCH_STATUS: &str = "BATCH_STATUS";
    pub const PROVENANCE: &str = "PROV";
}

// ── Alert types ─────────────────────────────────────────────────────────────
pub mod alert_type {
    pub const SEASON_VIOLATION: &str = "season_violation";
    pub const ZONE_VIOLATION: &str = "zone_violation";
    pub const OVER_HARVEST: &str = "over_harvest";
    pub const COMPLIANCE: &str = "compliance";
    pub const QUALITY_FAILURE: &str = "quality_failure";
}

// ── Domain event names ──────────────────────────────────────────────────────
pub mod event {
    pub const COLLECTION_EVENT_CREATED: &str = "CollectionEventCreated";
    pub const QUALITY_TEST_CREATED: &str = "QualityTestCreated";
    pub const PROCESSING_STEP_CREATED: &str = "ProcessingStepCreated";
    pub const QC_CERTIFICATE_RECORDED: &str = "QCCertificateRecorded";
    pub const PRODUCT_CREATED: &str = "ProductCreated";
}

// ── Batch lifecycle labels ──────────────────────────────────────────────────
pub mod batch_label {
    pub const TESTING: &str = "testing";
    pub const QUALITY_TESTED: &str = "quality_tested";
    pub const PROCESSING: &str = "processing";
    pub const MANUFACTURED: &str = "manufactured";

    /// Forward order used by the optional transition table.
    pub const ORDER: [&str; 4] = [TESTING, QUALITY_TESTED, PROCESSING, MANUFACTURED];
}

// ── Provenance frame columns ────────────────────────────────────────────────
pub mod provenance {
    pub const PRODUCT_ID: &str = "product_id";
    pub const RECORD_ID: &str = "record_id";
    pub const RECORD_TYPE: &str = "record_type";
    pub const BATCH_ID: &str = "batch_id";
    pub const STATUS: &str = "status";
    pub const APPROVED_ZONE: &str = "approved_zone";
    pub const OVERALL_RESULT: &str = "overall_result";
    pub const UPSTREAM_ID: &str = "upstream_id";
}

// ── Quota frame columns ─────────────────────────────────────────────────────
pub mod quota {
    pub const SPECIES: &str = "species";
    pub const ZONE: &str = "zone";
    pub const SEASON: &str = "season";
    pub const CURRENT_QUANTITY: &str = "current_quantity";
    pub const MAX_QUANTITY: &str = "max_quantity";
    pub const UNIT: &str = "unit";
    pub const STATUS: &str = "status";
}
