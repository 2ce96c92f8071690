//! Provenance bundles for finished products.
//!
//! A bundle is rebuilt on every request: the product is fetched, then each
//! weakly referenced upstream record is fetched on its own. A reference that
//! cannot be resolved (missing, malformed, wrong record type, store hiccup)
//! is dropped from the bundle rather than failing the request.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TraceError;
use crate::model::{
    CollectionEvent, LedgerRecord, Product, ProcessingStep, QualityResult, QualityTest,
};
use crate::schema::{field, key, record_type};
use crate::season::Clock;
use crate::store::{get_record, query_records, LedgerStore, Selector};

const BASE_SCORE: f64 = 100.0;
const UNAPPROVED_ZONE_PENALTY: f64 = 10.0;
const FAILED_TEST_PENALTY: f64 = 15.0;
const CERTIFICATION_BONUS: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub id: String,
    pub product_id: String,
    pub qr_code: String,
    pub generated_date: String,
    pub collection_events: Vec<CollectionEvent>,
    pub quality_tests: Vec<QualityTest>,
    pub processing_steps: Vec<ProcessingStep>,
    pub product: Product,
    /// 0-100
    pub sustainability_score: f64,
}

impl Provenance {
    pub fn graph(&self) -> ProvenanceGraph {
        ProvenanceGraph::from_bundle(self)
    }
}

/// 100, minus 10 per collection outside an approved zone, minus 15 per
/// failed quality test, plus 5 per distinct product certification, clamped
/// to [0, 100].
pub fn sustainability_score(
    collection_events: &[CollectionEvent],
    quality_tests: &[QualityTest],
    certifications: &[String],
) -> f64 {
    let unapproved = collection_events.iter().filter(|e| !e.approved_zone).count();
    let failed = quality_tests
        .iter()
        .filter(|t| t.overall_result == QualityResult::Fail)
        .count();
    let distinct: HashSet<&str> = certifications.iter().map(String::as_str).collect();

    let score = BASE_SCORE - unapproved as f64 * UNAPPROVED_ZONE_PENALTY
        - failed as f64 * FAILED_TEST_PENALTY
        + distinct.len() as f64 * CERTIFICATION_BONUS;
    score.clamp(0.0, BASE_SCORE)
}

pub struct ProvenanceAssembler {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl ProvenanceAssembler {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Only a missing or unreadable product fails the call.
    pub fn assemble(&self, product_id: &str) -> Result<Provenance, TraceError> {
        let product: Product = get_record(self.store.as_ref(), product_id)?;
        Ok(self.assemble_for(product))
    }

    pub fn assemble_by_qr(&self, qr_code: &str) -> Result<Provenance, TraceError> {
        let product = product_by_qr(self.store.as_ref(), qr_code)?;
        Ok(self.assemble_for(product))
    }

    fn assemble_for(&self, product: Product) -> Provenance {
        let collection_events: Vec<CollectionEvent> =
            self.fetch_all(&product.id, &product.collection_event_ids);
        let quality_tests: Vec<QualityTest> = self.fetch_all(&product.id, &product.quality_test_ids);
        let processing_steps: Vec<ProcessingStep> =
            self.fetch_all(&product.id, &product.processing_step_ids);

        let sustainability_score =
            sustainability_score(&collection_events, &quality_tests, &product.certifications);

        Provenance {
            id: format!("{}-{}", key::PROVENANCE, product.id),
            product_id: product.id.clone(),
            qr_code: product.qr_code.clone(),
            generated_date: self.clock.now().to_rfc3339(),
            collection_events,
            quality_tests,
            processing_steps,
            product,
            sustainability_score,
        }
    }

    fn fetch_all<T: LedgerRecord>(&self, product_id: &str, ids: &[String]) -> Vec<T> {
        ids.iter()
            .filter_map(|id| match get_record::<T>(self.store.as_ref(), id) {
                Ok(record) => Some(record),
                Err(err) => {
                    debug!(product_id, record_id = %id, kind = T::TYPE, error = %err, "skipping unresolved reference");
                    None
                }
            })
            .collect()
    }
}

/// First product carrying `qr_code`.
pub fn product_by_qr(store: &dyn LedgerStore, qr_code: &str) -> Result<Product, TraceError> {
    let selector = Selector::of_type(record_type::PRODUCT).with_field(field::QR_CODE, qr_code);
    query_records::<Product>(store, &selector)?
        .into_iter()
        .next()
        .ok_or_else(|| TraceError::NotFound(format!("product with QR code {qr_code}")))
}

// ── Upstream graph ──────────────────────────────────────────────────────────

/// Why one record sits upstream of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Referenced directly by the product.
    Ingredient,
    /// Processing step's `previousStepId`.
    PreviousStep,
    /// Quality test's `collectionEventId`.
    Sampled,
}

/// Directed graph over the records of one bundle, edges pointing
/// downstream (collection -> test -> step -> product). Only records present
/// in the bundle become nodes.
pub struct ProvenanceGraph {
    graph: DiGraph<String, Link>,
    /// Node of each record id.
    node_map: HashMap<String, NodeIndex>,
}

impl ProvenanceGraph {
    pub fn from_bundle(bundle: &Provenance) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map: HashMap<String, NodeIndex> = HashMap::new();

        let mut node = |g: &mut DiGraph<String, Link>, id: &str| -> NodeIndex {
            *node_map
                .entry(id.to_string())
                .or_insert_with(|| g.add_node(id.to_string()))
        };

        let product = node(&mut graph, &bundle.product.id);
        let upstream_ids = bundle
            .collection_events
            .iter()
            .map(|e| e.id.as_str())
            .chain(bundle.quality_tests.iter().map(|t| t.id.as_str()))
            .chain(bundle.processing_steps.iter().map(|s| s.id.as_str()));
        for id in upstream_ids {
            let idx = node(&mut graph, id);
            graph.update_edge(idx, product, Link::Ingredient);
        }

        let mut self_ = Self { graph, node_map };
        for test in &bundle.quality_tests {
            self_.link(&test.collection_event_id, &test.id, Link::Sampled);
        }
        for step in &bundle.processing_steps {
            self_.link(&step.previous_step_id, &step.id, Link::PreviousStep);
        }
        self_
    }

    fn link(&mut self, from: &str, to: &str, link: Link) {
        if let (Some(&a), Some(&b)) = (self.node_map.get(from), self.node_map.get(to)) {
            if a != b {
                self.graph.update_edge(a, b, link);
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Every record the given one was derived from, nearest first.
    pub fn upstream_of(&self, id: &str) -> Vec<String> {
        self.walk(id, Direction::Incoming)
    }

    pub fn downstream_of(&self, id: &str) -> Vec<String> {
        self.walk(id, Direction::Outgoing)
    }

    /// `(from, to, link)` for every edge.
    pub fn edges(&self) -> Vec<(String, String, Link)> {
        self.graph
            .edge_indices()
            .filter_map(|e| {
                let (a, b) = self.graph.edge_endpoints(e)?;
                Some((self.graph[a].clone(), self.graph[b].clone(), self.graph[e]))
            })
            .collect()
    }

    fn walk(&self, id: &str, direction: Direction) -> Vec<String> {
        let Some(&start) = self.node_map.get(id) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        let mut visited = HashSet::from([start]);
        let mut frontier: Vec<NodeIndex> = self.graph.neighbors_directed(start, direction).collect();

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for node in frontier {
                if !visited.insert(node) {
                    continue;
                }
                result.push(self.graph[node].clone());
                next.extend(
                    self.graph
                        .neighbors_directed(node, direction)
                        .filter(|n| !visited.contains(n)),
                );
            }
            frontier = next;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::season::FixedClock;
    use crate::store::{put_record, MemoryLedger};

    fn event(id: &str, approved: bool) -> CollectionEvent {
        CollectionEvent {
            id: id.into(),
            species: "Neem".into(),
            approved_zone: approved,
            ..Default::default()
        }
    }

    fn lab_test(id: &str, result: QualityResult) -> QualityTest {
        QualityTest {
            id: id.into(),
            overall_result: result,
            ..Default::default()
        }
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_score_penalties_and_bonus() {
        let events = vec![event("a", false), event("b", false), event("c", false)];
        let tests = vec![lab_test("x", QualityResult::Fail), lab_test("y", QualityResult::Fail)];
        assert_eq!(sustainability_score(&events, &tests, &strings(&["Organic"])), 45.0);
    }

    #[test]
    fn test_score_clamped_high_and_low() {
        let events = vec![event("a", true)];
        let tests = vec![lab_test("x", QualityResult::Pass)];
        let four = strings(&["Organic", "Fair Trade", "AYUSH Certified", "GMP"]);
        assert_eq!(sustainability_score(&events, &tests, &four), 100.0);

        let bad: Vec<CollectionEvent> = (0..12).map(|i| event(&i.to_string(), false)).collect();
        assert_eq!(sustainability_score(&bad, &[], &[]), 0.0);
    }

    #[test]
    fn test_duplicate_certifications_count_once() {
        let events = vec![event("a", false), event("b", false)];
        let dup = strings(&["Organic", "Organic"]);
        assert_eq!(sustainability_score(&events, &[], &dup), 85.0);
    }

    #[test]
    fn test_conditional_result_is_not_penalised() {
        let tests = vec![lab_test("x", QualityResult::Conditional)];
        assert_eq!(sustainability_score(&[], &tests, &[]), 100.0);
    }

    fn seeded() -> (Arc<MemoryLedger>, ProvenanceAssembler) {
        let store = Arc::new(MemoryLedger::new());
        put_record(store.as_ref(), &event("COL-1", true)).unwrap();
        put_record(store.as_ref(), &event("COL-3", false)).unwrap();
        let mut qt = lab_test("QT-1", QualityResult::Pass);
        qt.collection_event_id = "COL-1".into();
        put_record(store.as_ref(), &qt).unwrap();
        put_record(
            store.as_ref(),
            &ProcessingStep {
                id: "PS-1".into(),
                previous_step_id: "QT-1".into(),
                ..Default::default()
            },
        )
        .unwrap();
        put_record(
            store.as_ref(),
            &Product {
                id: "PRD-1".into(),
                qr_code: "QR-1".into(),
                collection_event_ids: strings(&["COL-1", "COL-2", "COL-3"]),
                quality_test_ids: strings(&["QT-1", "PS-1"]),
                processing_step_ids: strings(&["PS-1"]),
                certifications: strings(&["Organic"]),
                ..Default::default()
            },
        )
        .unwrap();
        let assembler =
            ProvenanceAssembler::new(store.clone(), Arc::new(FixedClock::on(2026, 10, 16)));
        (store, assembler)
    }

    #[test]
    fn test_missing_and_mistyped_references_are_skipped() {
        let (_store, assembler) = seeded();
        let bundle = assembler.assemble("PRD-1").unwrap();

        assert_eq!(bundle.id, "PROV-PRD-1");
        assert_eq!(bundle.collection_events.len(), 2);
        // PS-1 is a processing step, not a quality test.
        assert_eq!(bundle.quality_tests.len(), 1);
        assert_eq!(bundle.processing_steps.len(), 1);
        assert_eq!(bundle.sustainability_score, 95.0);
    }

    #[test]
    fn test_missing_product_is_not_found() {
        let (_store, assembler) = seeded();
        assert!(assembler.assemble("PRD-404").unwrap_err().is_not_found());
        assert!(assembler.assemble_by_qr("QR-404").unwrap_err().is_not_found());
    }

    #[test]
    fn test_qr_lookup_matches_id_lookup() {
        let (_store, assembler) = seeded();
        let by_qr = assembler.assemble_by_qr("QR-1").unwrap();
        let by_id = assembler.assemble("PRD-1").unwrap();
        assert_eq!(by_qr, by_id);
    }

    #[test]
    fn test_graph_walks_upstream() {
        let (_store, assembler) = seeded();
        let graph = assembler.assemble("PRD-1").unwrap().graph();

        assert_eq!(graph.node_count(), 5);
        let mut upstream = graph.upstream_of("PS-1");
        upstream.sort();
        assert_eq!(upstream, vec!["COL-1", "QT-1"]);
        assert_eq!(graph.downstream_of("COL-3"), vec!["PRD-1"]);
        assert_eq!(graph.upstream_of("PRD-1").len(), 4);
        assert!(graph.upstream_of("nope").is_empty());
    }
}
