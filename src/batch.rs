//! Latest lifecycle label per batch.
//!
//! Updates are a side channel of record creation: a failed or refused update
//! is logged and swallowed, never returned to the caller that triggered it.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BatchPolicy;
use crate::error::TraceError;
use crate::model::LedgerRecord;
use crate::schema::{batch_label, key, record_type};
use crate::season::Clock;
use crate::store::{get_record, put_record, LedgerStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatus {
    pub batch_id: String,
    pub status: String,
    pub updated_at: String,
}

impl LedgerRecord for BatchStatus {
    const TYPE: &'static str = record_type::BATCH_STATUS;

    fn key(&self) -> String {
        batch_key(&self.batch_id)
    }
}

fn batch_key(batch_id: &str) -> String {
    format!("{}_{}", key::BATCH_STATUS, batch_id)
}

fn rank(label: &str) -> Option<usize> {
    batch_label::ORDER.iter().position(|l| *l == label)
}

pub struct BatchStatusTracker {
    store: Arc<dyn LedgerStore>,
    policy: BatchPolicy,
    clock: Arc<dyn Clock>,
    /// Per-batch mutex, so a forward-only read and its write cannot
    /// interleave with another update of the same batch.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl BatchStatusTracker {
    pub fn new(store: Arc<dyn LedgerStore>, policy: BatchPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
            locks: DashMap::new(),
        }
    }

    /// Best-effort overwrite of the batch label.
    pub fn set_status(&self, batch_id: &str, label: &str) {
        if batch_id.is_empty() {
            return;
        }
        match self.try_set_status(batch_id, label) {
            Ok(true) => debug!(batch_id, label, "batch status updated"),
            Ok(false) => warn!(batch_id, label, "batch status transition refused"),
            Err(err) => warn!(batch_id, label, error = %err, "failed to update batch status"),
        }
    }

    /// `Ok(false)` when the transition table refuses the move.
    pub fn try_set_status(&self, batch_id: &str, label: &str) -> Result<bool, TraceError> {
        let lock = self.locks.entry(batch_id.to_string()).or_default().clone();
        let _held = lock
            .lock()
            .map_err(|_| TraceError::Store(format!("batch lock poisoned: {batch_id}")))?;

        if self.policy == BatchPolicy::ForwardOnly && !self.is_forward(batch_id, label)? {
            return Ok(false);
        }
        let status = BatchStatus {
            batch_id: batch_id.to_string(),
            status: label.to_string(),
            updated_at: self.clock.now().to_rfc3339(),
        };
        put_record(self.store.as_ref(), &status)?;
        Ok(true)
    }

    pub fn status(&self, batch_id: &str) -> Result<BatchStatus, TraceError> {
        get_record(self.store.as_ref(), &batch_key(batch_id))
    }

    fn is_forward(&self, batch_id: &str, label: &str) -> Result<bool, TraceError> {
        let Some(next) = rank(label) else {
            return Ok(false);
        };
        match self.status(batch_id) {
            Ok(current) => Ok(rank(&current.status).map_or(true, |cur| next >= cur)),
            Err(err) if err.is_not_found() => Ok(true),
            Err(err) => Err(err),
        }
    }
}
