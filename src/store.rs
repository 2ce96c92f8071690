//! Ledger key-value boundary.
//!
//! [`LedgerStore`] is the surface the hosting ledger provides: point reads
//! and writes, equality-selector queries over the `type` discriminator plus
//! one field, bookmark pagination and per-key history. [`MemoryLedger`] is
//! an in-process implementation used by tests and the Python bindings.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::TraceError;
use crate::model::LedgerRecord;
use crate::schema::record_type;

/// Equality selector: `type = record_type` and optionally `field = value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub record_type: String,
    pub field: Option<(String, String)>,
}

impl Selector {
    pub fn of_type(record_type: &str) -> Self {
        Self {
            record_type: record_type.to_string(),
            field: None,
        }
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.field = Some((name.to_string(), value.to_string()));
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        if doc.get(record_type::FIELD).and_then(Value::as_str) != Some(self.record_type.as_str())
        {
            return false;
        }
        match &self.field {
            None => true,
            Some((name, value)) => doc.get(name).and_then(Value::as_str) == Some(value.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub value: Vec<u8>,
}

/// One page of a paginated query.
#[derive(Debug, Clone)]
pub struct Page {
    pub records: Vec<StoredRecord>,
    /// Key to resume after; empty once the result set is exhausted.
    pub bookmark: String,
    pub fetched_count: usize,
}

/// A single write (or delete) in a key's history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
    #[serde(skip)]
    pub value: Vec<u8>,
}

pub trait LedgerStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TraceError>;

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), TraceError>;

    fn delete(&self, key: &str) -> Result<(), TraceError>;

    fn query(&self, selector: &Selector) -> Result<Vec<StoredRecord>, TraceError>;

    fn query_paged(
        &self,
        selector: &Selector,
        page_size: usize,
        bookmark: &str,
    ) -> Result<Page, TraceError>;

    /// Oldest write first.
    fn history(&self, key: &str) -> Result<Vec<HistoryEntry>, TraceError>;
}

// ── Typed helpers ───────────────────────────────────────────────────────────

pub fn get_record<T: LedgerRecord>(store: &dyn LedgerStore, key: &str) -> Result<T, TraceError> {
    let bytes = store
        .get(key)?
        .ok_or_else(|| TraceError::NotFound(format!("{} {key}", T::TYPE)))?;
    T::from_ledger_bytes(&bytes)
}

pub fn put_record<T: LedgerRecord>(store: &dyn LedgerStore, record: &T) -> Result<(), TraceError> {
    store.put(&record.key(), record.to_ledger_bytes()?)
}

pub fn query_records<T: LedgerRecord>(
    store: &dyn LedgerStore,
    selector: &Selector,
) -> Result<Vec<T>, TraceError> {
    store
        .query(selector)?
        .iter()
        .map(|r| T::from_ledger_bytes(&r.value))
        .collect()
}

// ── In-memory ledger ────────────────────────────────────────────────────────

#[derive(Default)]
struct LedgerState {
    world: BTreeMap<String, Vec<u8>>,
    history: HashMap<String, Vec<HistoryEntry>>,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> TraceError {
        TraceError::Store("ledger lock poisoned".into())
    }

    fn record_write(state: &mut LedgerState, key: &str, value: Vec<u8>, is_delete: bool) {
        state
            .history
            .entry(key.to_string())
            .or_default()
            .push(HistoryEntry {
                tx_id: Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                is_delete,
                value,
            });
    }

    fn matching<'a>(
        state: &'a LedgerState,
        selector: &'a Selector,
    ) -> impl Iterator<Item = (&'a String, &'a Vec<u8>)> + 'a {
        state.world.iter().filter(move |(_, bytes)| {
            serde_json::from_slice::<Value>(bytes)
                .map(|doc| selector.matches(&doc))
                .unwrap_or(false)
        })
    }
}

impl LedgerStore for MemoryLedger {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TraceError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.world.get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), TraceError> {
        if key.is_empty() {
            return Err(TraceError::Malformed("empty ledger key".into()));
        }
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state.world.insert(key.to_string(), value.clone());
        Self::record_write(&mut state, key, value, false);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), TraceError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        if state.world.remove(key).is_some() {
            Self::record_write(&mut state, key, Vec::new(), true);
        }
        Ok(())
    }

    fn query(&self, selector: &Selector) -> Result<Vec<StoredRecord>, TraceError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(Self::matching(&state, selector)
            .map(|(key, value)| StoredRecord {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    fn query_paged(
        &self,
        selector: &Selector,
        page_size: usize,
        bookmark: &str,
    ) -> Result<Page, TraceError> {
        if page_size == 0 {
            return Err(TraceError::Malformed("page size must be positive".into()));
        }
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        let mut remaining = Self::matching(&state, selector)
            .filter(|(key, _)| bookmark.is_empty() || key.as_str() > bookmark);

        let records: Vec<StoredRecord> = remaining
            .by_ref()
            .take(page_size)
            .map(|(key, value)| StoredRecord {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();

        let bookmark = match (remaining.next(), records.last()) {
            (Some(_), Some(last)) => last.key.clone(),
            _ => String::new(),
        };

        Ok(Page {
            fetched_count: records.len(),
            records,
            bookmark,
        })
    }

    fn history(&self, key: &str) -> Result<Vec<HistoryEntry>, TraceError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.history.get(key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Product, QcCertificate};

    fn cert(id: &str, batch: &str) -> QcCertificate {
        QcCertificate {
            id: id.into(),
            certificate_id: id.into(),
            batch_id: batch.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_missing_is_none() {
        let ledger = MemoryLedger::new();
        assert!(ledger.get("nope").unwrap().is_none());
        let err = get_record::<Product>(&ledger, "nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_query_filters_on_type_and_field() {
        let ledger = MemoryLedger::new();
        put_record(&ledger, &cert("C-1", "B-1")).unwrap();
        put_record(&ledger, &cert("C-2", "B-2")).unwrap();
        put_record(
            &ledger,
            &Product {
                id: "P-1".into(),
                batch_id: "B-1".into(),
                ..Default::default()
            },
        )
        .unwrap();

        let selector = Selector::of_type(record_type::QC_CERTIFICATE).with_field("batchId", "B-1");
        let found: Vec<QcCertificate> = query_records(&ledger, &selector).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "C-1");
    }

    #[test]
    fn test_paged_query_walks_all_records() {
        let ledger = MemoryLedger::new();
        for i in 0..5 {
            put_record(&ledger, &cert(&format!("C-{i}"), "B")).unwrap();
        }
        let selector = Selector::of_type(record_type::QC_CERTIFICATE);

        let first = ledger.query_paged(&selector, 2, "").unwrap();
        assert_eq!(first.fetched_count, 2);
        assert_eq!(first.bookmark, "C-1");

        let second = ledger.query_paged(&selector, 2, &first.bookmark).unwrap();
        assert_eq!(second.records[0].key, "C-2");

        let last = ledger.query_paged(&selector, 2, &second.bookmark).unwrap();
        assert_eq!(last.fetched_count, 1);
        assert!(last.bookmark.is_empty());
    }

    #[test]
    fn test_history_records_overwrites_and_deletes() {
        let ledger = MemoryLedger::new();
        put_record(&ledger, &cert("C-1", "B-1")).unwrap();
        put_record(&ledger, &cert("C-1", "B-9")).unwrap();
        ledger.delete("C-1").unwrap();

        let history = ledger.history("C-1").unwrap();
        assert_eq!(history.len(), 3);
        assert!(!history[0].is_delete);
        assert!(history[2].is_delete);
        assert_ne!(history[0].tx_id, history[1].tx_id);
        let second = QcCertificate::from_ledger_bytes(&history[1].value).unwrap();
        assert_eq!(second.batch_id, "B-9");
    }
}
