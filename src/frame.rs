use std::collections::HashMap;

use polars::prelude::*;

use crate::error::TraceError;
use crate::model::{
    status_label, CollectionEvent, LedgerRecord, Product, ProcessingStep, QualityTest,
};
use crate::provenance::{Link, Provenance};
use crate::quota::HarvestQuotaRecord;
use crate::schema::{provenance, quota};

#[derive(Default)]
struct ProvenanceRows {
    product_ids: Vec<String>,
    record_ids: Vec<String>,
    record_types: Vec<String>,
    batch_ids: Vec<String>,
    statuses: Vec<String>,
    approved_zones: Vec<Option<bool>>,
    overall_results: Vec<Option<String>>,
    upstream_ids: Vec<Option<String>>,
}

impl ProvenanceRows {
    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        product_id: &str,
        record_id: &str,
        record_type: &str,
        batch_id: &str,
        status: String,
        approved_zone: Option<bool>,
        overall_result: Option<String>,
        upstream_id: Option<String>,
    ) {
        self.product_ids.push(product_id.to_string());
        self.record_ids.push(record_id.to_string());
        self.record_types.push(record_type.to_string());
        self.batch_ids.push(batch_id.to_string());
        self.statuses.push(status);
        self.approved_zones.push(approved_zone);
        self.overall_results.push(overall_result);
        self.upstream_ids.push(upstream_id);
    }
}

/// Flatten a provenance bundle into one row per record.
///
/// The product comes first, followed by its collection events, quality tests
/// and processing steps in bundle order. `upstream_id` is the record this
/// one was sampled from or continues (test -> collection event, step ->
/// previous step), when that record is part of the bundle.
pub fn provenance_frame(bundle: &Provenance) -> Result<DataFrame, TraceError> {
    let upstream: HashMap<String, String> = bundle
        .graph()
        .edges()
        .into_iter()
        .filter(|(_, _, link)| *link != Link::Ingredient)
        .map(|(from, to, _)| (to, from))
        .collect();
    let product_id = bundle.product_id.as_str();
    let mut rows = ProvenanceRows::default();

    let product = &bundle.product;
    rows.push(
        product_id,
        &product.id,
        Product::TYPE,
        &product.batch_id,
        status_label(&product.status),
        None,
        None,
        None,
    );
    for event in &bundle.collection_events {
        rows.push(
            product_id,
            &event.id,
            CollectionEvent::TYPE,
            "",
            status_label(&event.status),
            Some(event.approved_zone),
            None,
            upstream.get(&event.id).cloned(),
        );
    }
    for test in &bundle.quality_tests {
        rows.push(
            product_id,
            &test.id,
            QualityTest::TYPE,
            &test.batch_id,
            status_label(&test.status),
            None,
            Some(status_label(&test.overall_result)),
            upstream.get(&test.id).cloned(),
        );
    }
    for step in &bundle.processing_steps {
        rows.push(
            product_id,
            &step.id,
            ProcessingStep::TYPE,
            &step.batch_id,
            status_label(&step.status),
            None,
            None,
            upstream.get(&step.id).cloned(),
        );
    }

    let df = DataFrame::new(vec![
        Column::new(provenance::PRODUCT_ID.into(), &rows.product_ids),
        Column::new(provenance::RECORD_ID.into(), &rows.record_ids),
        Column::new(provenance::RECORD_TYPE.into(), &rows.record_types),
        Column::new(provenance::BATCH_ID.into(), &rows.batch_ids),
        Column::new(provenance::STATUS.into(), &rows.statuses),
        Column::new(provenance::APPROVED_ZONE.into(), &rows.approved_zones),
        Column::new(provenance::OVERALL_RESULT.into(), &rows.overall_results),
        Column::new(provenance::UPSTREAM_ID.into(), &rows.upstream_ids),
    ])?;

    Ok(df)
}

/// Quota usage table sorted by species, zone and season.
pub fn quota_frame(records: &[HarvestQuotaRecord]) -> Result<DataFrame, TraceError> {
    let species: Vec<&str> = records.iter().map(|r| r.species.as_str()).collect();
    let zones: Vec<&str> = records.iter().map(|r| r.zone.as_str()).collect();
    let seasons: Vec<&str> = records.iter().map(|r| r.season.as_str()).collect();
    let current: Vec<f64> = records.iter().map(|r| r.current_quantity).collect();
    let max: Vec<f64> = records.iter().map(|r| r.max_quantity).collect();
    let units: Vec<&str> = records.iter().map(|r| r.unit.as_str()).collect();
    let statuses: Vec<String> = records.iter().map(|r| status_label(&r.status)).collect();

    let df = DataFrame::new(vec![
        Column::new(quota::SPECIES.into(), &species),
        Column::new(quota::ZONE.into(), &zones),
        Column::new(quota::SEASON.into(), &seasons),
        Column::new(quota::CURRENT_QUANTITY.into(), &current),
        Column::new(quota::MAX_QUANTITY.into(), &max),
        Column::new(quota::UNIT.into(), &units),
        Column::new(quota::STATUS.into(), &statuses),
    ])?;

    let sorted = df
        .lazy()
        .sort_by_exprs(
            vec![col(quota::SPECIES), col(quota::ZONE), col(quota::SEASON)],
            SortMultipleOptions::default(),
        )
        .collect()?;

    Ok(sorted)
}
