//! Per (species, zone, season) harvest quota accounting.
//!
//! Quota records live in the ledger like any other document, but every
//! read-modify-write of one key runs under that key's mutex, so a check
//! followed by an increment can never interleave with another submission
//! for the same key.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::QuotaConfig;
use crate::error::TraceError;
use crate::model::LedgerRecord;
use crate::schema::{key, record_type};
use crate::store::{get_record, put_record, query_records, LedgerStore, Selector};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaStatus {
    #[default]
    Ok,
    Warning,
    Exceeded,
}

const KEY_SEPARATOR: &str = "\u{0}";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotaKey {
    pub species: String,
    pub zone: String,
    pub season: String,
}

impl QuotaKey {
    pub fn new(species: &str, zone: &str, season: &str) -> Self {
        Self {
            species: species.to_string(),
            zone: zone.to_string(),
            season: season.to_string(),
        }
    }

    /// Composite key with `\u{0}` between parts, so `("Neem", "Zone_A")`
    /// and `("Neem_Zone", "A")` stay distinct.
    pub fn ledger_key(&self) -> String {
        [
            key::HARVEST_QUOTA,
            self.species.as_str(),
            self.zone.as_str(),
            self.season.as_str(),
        ]
        .join(KEY_SEPARATOR)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestQuotaRecord {
    pub species: String,
    pub zone: String,
    pub season: String,
    pub current_quantity: f64,
    pub max_quantity: f64,
    pub unit: String,
    pub status: QuotaStatus,
}

impl HarvestQuotaRecord {
    pub fn quota_key(&self) -> QuotaKey {
        QuotaKey::new(&self.species, &self.zone, &self.season)
    }

    /// Fraction of the cap already used, 0.0 for a zero cap with no usage.
    pub fn usage_ratio(&self) -> f64 {
        if self.max_quantity > 0.0 {
            self.current_quantity / self.max_quantity
        } else if self.current_quantity > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

impl LedgerRecord for HarvestQuotaRecord {
    const TYPE: &'static str = record_type::HARVEST_QUOTA;

    fn key(&self) -> String {
        self.quota_key().ledger_key()
    }
}

fn status_of(current: f64, max: f64, warning_fraction: f64) -> QuotaStatus {
    if current >= max {
        QuotaStatus::Exceeded
    } else if current >= max * warning_fraction {
        QuotaStatus::Warning
    } else {
        QuotaStatus::Ok
    }
}

/// The locked view of one quota key handed to [`HarvestQuotaLedger::with_key`].
pub struct QuotaSlot<'a> {
    store: &'a dyn LedgerStore,
    warning_fraction: f64,
    record: HarvestQuotaRecord,
}

impl QuotaSlot<'_> {
    pub fn record(&self) -> &HarvestQuotaRecord {
        &self.record
    }

    /// `current + quantity <= max`
    pub fn has_room(&self, quantity: f64) -> bool {
        self.record.current_quantity + quantity <= self.record.max_quantity
    }

    /// Add `quantity` and persist. Does not check the cap.
    pub fn commit(&mut self, quantity: f64) -> Result<HarvestQuotaRecord, TraceError> {
        self.record.current_quantity += quantity;
        self.record.status = status_of(
            self.record.current_quantity,
            self.record.max_quantity,
            self.warning_fraction,
        );
        put_record(self.store, &self.record)?;
        Ok(self.record.clone())
    }
}

pub struct HarvestQuotaLedger {
    store: Arc<dyn LedgerStore>,
    config: QuotaConfig,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl HarvestQuotaLedger {
    pub fn new(store: Arc<dyn LedgerStore>, config: QuotaConfig) -> Self {
        Self {
            store,
            config,
            locks: DashMap::new(),
        }
    }

    pub fn warning_fraction(&self) -> f64 {
        self.config.warning_fraction
    }

    /// Run `f` with exclusive access to one key's quota record.
    ///
    /// A key seen for the first time starts at zero with its configured cap;
    /// it is only written to the ledger when `f` commits.
    pub fn with_key<R>(
        &self,
        key: &QuotaKey,
        f: impl FnOnce(&mut QuotaSlot<'_>) -> Result<R, TraceError>,
    ) -> Result<R, TraceError> {
        let lock = self.locks.entry(key.ledger_key()).or_default().clone();
        let _held = lock
            .lock()
            .map_err(|_| TraceError::Store(format!("quota lock poisoned: {key:?}")))?;

        let mut slot = QuotaSlot {
            store: self.store.as_ref(),
            warning_fraction: self.config.warning_fraction,
            record: self.load(key)?,
        };
        f(&mut slot)
    }

    pub fn check_limit(&self, key: &QuotaKey, quantity: f64) -> Result<bool, TraceError> {
        self.with_key(key, |slot| Ok(slot.has_room(quantity)))
    }

    pub fn increment(&self, key: &QuotaKey, quantity: f64) -> Result<HarvestQuotaRecord, TraceError> {
        self.with_key(key, |slot| slot.commit(quantity))
    }

    /// Check and increment in one critical section. `None` when the
    /// addition would exceed the cap; nothing is written in that case.
    pub fn try_consume(
        &self,
        key: &QuotaKey,
        quantity: f64,
    ) -> Result<Option<HarvestQuotaRecord>, TraceError> {
        self.with_key(key, |slot| {
            if slot.has_room(quantity) {
                slot.commit(quantity).map(Some)
            } else {
                Ok(None)
            }
        })
    }

    /// Current usage with a freshly derived status. Unknown keys report zero
    /// usage against the configured cap.
    pub fn statistics(&self, key: &QuotaKey) -> Result<HarvestQuotaRecord, TraceError> {
        let mut record = self.load(key)?;
        record.status = status_of(
            record.current_quantity,
            record.max_quantity,
            self.config.warning_fraction,
        );
        Ok(record)
    }

    /// Override the cap (and unit) of a key, keeping its usage.
    pub fn configure_limit(
        &self,
        key: &QuotaKey,
        max_quantity: f64,
        unit: Option<&str>,
    ) -> Result<HarvestQuotaRecord, TraceError> {
        if !max_quantity.is_finite() || max_quantity < 0.0 {
            return Err(TraceError::Malformed(format!(
                "quota cap must be a non-negative number, got {max_quantity}"
            )));
        }
        self.with_key(key, |slot| {
            slot.record.max_quantity = max_quantity;
            if let Some(unit) = unit {
                slot.record.unit = unit.to_string();
            }
            slot.commit(0.0)
        })
    }

    /// Every quota record written so far.
    pub fn records(&self) -> Result<Vec<HarvestQuotaRecord>, TraceError> {
        query_records(
            self.store.as_ref(),
            &Selector::of_type(record_type::HARVEST_QUOTA),
        )
    }

    fn load(&self, key: &QuotaKey) -> Result<HarvestQuotaRecord, TraceError> {
        match get_record::<HarvestQuotaRecord>(self.store.as_ref(), &key.ledger_key()) {
            Ok(record) => Ok(record),
            Err(err) if err.is_not_found() => {
                let (max_quantity, unit) = self.config.limit_for(&key.species, &key.zone);
                Ok(HarvestQuotaRecord {
                    species: key.species.clone(),
                    zone: key.zone.clone(),
                    season: key.season.clone(),
                    current_quantity: 0.0,
                    max_quantity,
                    unit,
                    status: QuotaStatus::Ok,
                })
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuotaLimit;
    use crate::store::MemoryLedger;

    fn ledger(max: f64) -> HarvestQuotaLedger {
        let config = QuotaConfig {
            limits: vec![QuotaLimit {
                species: "Neem".into(),
                zone: Some("Dehradun".into()),
                max_quantity: max,
                unit: None,
            }],
            ..Default::default()
        };
        HarvestQuotaLedger::new(Arc::new(MemoryLedger::new()), config)
    }

    fn key() -> QuotaKey {
        QuotaKey::new("Neem", "Dehradun", "2026-autumn")
    }

    #[test]
    fn test_first_use_gets_configured_cap() {
        let q = ledger(100.0);
        let stats = q.statistics(&key()).unwrap();
        assert_eq!(stats.current_quantity, 0.0);
        assert_eq!(stats.max_quantity, 100.0);
        assert_eq!(stats.unit, "kg");
        assert_eq!(stats.status, QuotaStatus::Ok);
        // Reading does not create the record.
        assert!(q.records().unwrap().is_empty());
    }

    #[test]
    fn test_check_limit_is_inclusive() {
        let q = ledger(100.0);
        q.increment(&key(), 60.0).unwrap();
        assert!(q.check_limit(&key(), 40.0).unwrap());
        assert!(!q.check_limit(&key(), 40.5).unwrap());
    }

    #[test]
    fn test_status_thresholds() {
        let q = ledger(100.0);
        assert_eq!(q.increment(&key(), 79.0).unwrap().status, QuotaStatus::Ok);
        assert_eq!(q.increment(&key(), 1.0).unwrap().status, QuotaStatus::Warning);
        assert_eq!(q.increment(&key(), 20.0).unwrap().status, QuotaStatus::Exceeded);
    }

    #[test]
    fn test_running_sum_never_overshoots() {
        let q = ledger(100.0);
        let mut admitted = Vec::new();
        for quantity in [30.0, 30.0, 30.0, 30.0, 10.0] {
            admitted.push(q.try_consume(&key(), quantity).unwrap().is_some());
        }
        assert_eq!(admitted, vec![true, true, true, false, true]);
        assert_eq!(q.statistics(&key()).unwrap().current_quantity, 100.0);
    }

    #[test]
    fn test_concurrent_consumers_respect_cap() {
        let q = ledger(100.0);
        let admitted = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    if q.try_consume(&key(), 15.0).unwrap().is_some() {
                        admitted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(admitted.into_inner(), 6);
        assert_eq!(q.statistics(&key()).unwrap().current_quantity, 90.0);
    }

    #[test]
    fn test_configure_limit_keeps_usage() {
        let q = ledger(100.0);
        q.increment(&key(), 50.0).unwrap();
        let record = q.configure_limit(&key(), 60.0, Some("bundles")).unwrap();
        assert_eq!(record.current_quantity, 50.0);
        assert_eq!(record.unit, "bundles");
        assert_eq!(record.status, QuotaStatus::Warning);
        assert!(q.configure_limit(&key(), -1.0, None).is_err());
    }

    #[test]
    fn test_underscores_in_names_do_not_share_a_counter() {
        let q = ledger(1000.0);
        let zoned = QuotaKey::new("Neem", "Zone_A", "2026-autumn");
        let other = QuotaKey::new("Neem_Zone", "A", "2026-autumn");
        assert_ne!(zoned.ledger_key(), other.ledger_key());

        q.increment(&zoned, 900.0).unwrap();
        let stats = q.statistics(&other).unwrap();
        assert_eq!(stats.current_quantity, 0.0);
        assert_eq!(stats.species, "Neem_Zone");
        assert_eq!(stats.zone, "A");
        assert_eq!(q.records().unwrap().len(), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let q = ledger(100.0);
        q.increment(&key(), 100.0).unwrap();
        let other = QuotaKey::new("Neem", "Dehradun", "2026-winter");
        assert!(q.check_limit(&other, 100.0).unwrap());
    }
}
