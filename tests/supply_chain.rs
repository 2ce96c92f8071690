use std::sync::Arc;

use herb_tracekit::alerts::{MemoryAlertSink, MemoryEventBus};
use herb_tracekit::config::{QuotaLimit, TraceConfig};
use herb_tracekit::frame::provenance_frame;
use herb_tracekit::model::{AlertKind, CollectionStatus, Severity};
use herb_tracekit::season::FixedClock;
use herb_tracekit::{HerbTrace, MemoryLedger, QuotaStatus, Stage, Submission, TraceError};

struct Ledger {
    trace: HerbTrace,
    alerts: Arc<MemoryAlertSink>,
    events: Arc<MemoryEventBus>,
}

/// Neem capped at 50 kg in Dehradun; the clock sits in autumn 2026.
fn ledger() -> Ledger {
    let mut config = TraceConfig::default();
    config.quota.limits.push(QuotaLimit {
        species: "Neem".into(),
        zone: Some("Dehradun".into()),
        max_quantity: 50.0,
        unit: None,
    });
    let alerts = Arc::new(MemoryAlertSink::new());
    let events = Arc::new(MemoryEventBus::new());
    let trace = HerbTrace::new(
        &config,
        Arc::new(MemoryLedger::new()),
        alerts.clone(),
        events.clone(),
        Arc::new(FixedClock::on(2026, 10, 16)),
    );
    Ledger {
        trace,
        alerts,
        events,
    }
}

fn neem_json(id: &str, quantity: f64) -> String {
    format!(
        r#"{{
            "id": "{id}",
            "farmerId": "F-7",
            "farmerName": "Asha",
            "species": "Neem",
            "quantity": {quantity},
            "unit": "kg",
            "latitude": 30.27,
            "longitude": 77.99,
            "harvestDate": "2026-10-14",
            "harvestMethod": "manual",
            "partCollected": "leaf",
            "zoneName": "Dehradun"
        }}"#
    )
}

#[test]
fn test_harvest_accepted_then_over_cap_rejected() {
    let l = ledger();

    let event = l.trace.create_collection_event(&neem_json("COL-1", 30.0)).unwrap();
    assert!(event.approved_zone);
    assert_eq!(event.status, CollectionStatus::Pending);
    let stats = l.trace.harvest_statistics("Neem", "Dehradun", "2026-autumn").unwrap();
    assert_eq!(stats.current_quantity, 30.0);
    assert_eq!(stats.status, QuotaStatus::Ok);

    let Submission::Rejected(rejection) = l
        .trace
        .submit_collection_event(serde_json::from_str(&neem_json("COL-2", 25.0)).unwrap())
        .unwrap()
    else {
        panic!("second harvest should exceed the cap");
    };
    assert_eq!(rejection.stage, Stage::Quota);
    assert_eq!(rejection.alert.alert_type, AlertKind::OverHarvest);
    assert_eq!(rejection.alert.severity, Severity::Critical);

    let stats = l.trace.harvest_statistics("Neem", "Dehradun", "2026-autumn").unwrap();
    assert_eq!(stats.current_quantity, 30.0);
    assert!(l.trace.get_collection_event("COL-2").unwrap_err().is_not_found());
    assert_eq!(l.trace.collections_by_farmer("F-7").unwrap().len(), 1);
    assert_eq!(l.events.events().len(), 1);
}

#[test]
fn test_rejection_surfaces_as_error_from_json_entry_point() {
    let l = ledger();
    let mut json = neem_json("COL-1", 5.0);
    json = json.replace("30.27", "35.0");
    match l.trace.create_collection_event(&json) {
        Err(TraceError::Rejected(rejection)) => {
            assert_eq!(rejection.stage, Stage::GeoFence);
            assert!(rejection.reason.contains("outside approved zone"));
        }
        other => panic!("expected geo-fence rejection, got {other:?}"),
    }
    assert_eq!(l.alerts.alerts()[0].alert_type, AlertKind::ZoneViolation);
}

#[test]
fn test_configured_limit_applies_to_next_submission() {
    let l = ledger();
    l.trace
        .configure_harvest_limit("Neem", "Dehradun", "2026-autumn", 200.0, None)
        .unwrap();
    let accepted = l
        .trace
        .submit_collection_event(serde_json::from_str(&neem_json("COL-1", 170.0)).unwrap())
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(accepted.quota.status, QuotaStatus::Warning);
    assert!(accepted.warning.is_some());
}

#[test]
fn test_provenance_end_to_end() {
    let l = ledger();
    l.trace.create_collection_event(&neem_json("COL-1", 10.0)).unwrap();
    l.trace.create_collection_event(&neem_json("COL-2", 10.0)).unwrap();
    l.trace
        .create_quality_test(
            r#"{"id": "QT-1", "collectionEventId": "COL-1", "batchId": "B-1",
                "moistureContent": 14.0, "aflatoxins": 4.0}"#,
        )
        .unwrap();
    l.trace
        .create_processing_step(r#"{"id": "PS-1", "previousStepId": "QT-1", "batchId": "B-1"}"#)
        .unwrap();
    l.trace
        .create_product(
            r#"{"id": "PRD-1", "qrCode": "QR-NEEM-1", "batchId": "B-1",
                "collectionEventIds": ["COL-1", "COL-2", "COL-9"],
                "qualityTestIds": ["QT-1"],
                "processingStepIds": ["PS-1"],
                "certifications": ["Organic", "AYUSH Certified"]}"#,
        )
        .unwrap();

    let bundle = l.trace.provenance_by_qr_code("QR-NEEM-1").unwrap();
    assert_eq!(bundle.collection_events.len(), 2);
    assert_eq!(bundle.quality_tests.len(), 1);
    // One failed test, two certifications.
    assert_eq!(bundle.sustainability_score, 95.0);

    let graph = bundle.graph();
    let mut upstream = graph.upstream_of("PS-1");
    upstream.sort();
    assert_eq!(upstream, vec!["COL-1", "QT-1"]);

    let df = provenance_frame(&bundle).unwrap();
    assert_eq!(df.height(), 5);

    assert_eq!(l.trace.batch_status("B-1").unwrap().status, "manufactured");
    assert!(l.trace.generate_provenance("PRD-404").unwrap_err().is_not_found());
}
