//! Harvest submission gate.
//!
//! Stages run in a fixed order and stop at the first failure:
//! season window, geo-fence, harvest quota, conservation status. Each
//! failure raises exactly one alert and marks the event `rejected`; nothing
//! is persisted for a rejected event. Where the quota increment lands
//! relative to the conservation check is governed by [`QuotaCommit`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::alerts::{emit, publish, AlertSink, EventPublisher};
use crate::config::{QuotaCommit, TraceConfig};
use crate::conservation::ConservationGuard;
use crate::error::TraceError;
use crate::geofence::GeoFenceChecker;
use crate::model::{Alert, AlertKind, CollectionEvent, CollectionStatus, LedgerRecord, Severity};
use crate::quota::{HarvestQuotaLedger, HarvestQuotaRecord, QuotaKey, QuotaStatus};
use crate::schema::{self, field, record_type};
use crate::season::{is_in_season, parse_harvest_date, season_for, Clock, SeasonWindow};
use crate::store::{put_record, query_records, LedgerStore, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Season,
    GeoFence,
    Quota,
    Conservation,
}

/// A stored, validated collection event.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub event: CollectionEvent,
    /// Quota usage after this event was counted.
    pub quota: HarvestQuotaRecord,
    /// Medium-severity usage alert, when the key crossed its warning level.
    pub warning: Option<Alert>,
}

/// Why a submission was turned away. `event` carries `status = rejected`.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub stage: Stage,
    pub reason: String,
    pub alert: Alert,
    pub event: CollectionEvent,
}

#[derive(Debug, Clone)]
pub enum Submission {
    Accepted(Box<Accepted>),
    Rejected(Box<Rejection>),
}

impl Submission {
    pub fn into_result(self) -> Result<Accepted, TraceError> {
        match self {
            Submission::Accepted(accepted) => Ok(*accepted),
            Submission::Rejected(rejection) => Err(TraceError::Rejected(rejection)),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted(_))
    }
}

/// Result of the locked quota section.
enum QuotaGate {
    Passed(HarvestQuotaRecord),
    OverQuota(HarvestQuotaRecord),
    /// Endangered species; carries the usage if it was committed anyway.
    Endangered(Option<HarvestQuotaRecord>),
}

pub struct ValidationPipeline {
    store: Arc<dyn LedgerStore>,
    quota: Arc<HarvestQuotaLedger>,
    geo: GeoFenceChecker,
    conservation: ConservationGuard,
    windows: Vec<SeasonWindow>,
    alerts: Arc<dyn AlertSink>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    quota_commit: QuotaCommit,
}

impl ValidationPipeline {
    pub fn new(
        config: &TraceConfig,
        store: Arc<dyn LedgerStore>,
        quota: Arc<HarvestQuotaLedger>,
        alerts: Arc<dyn AlertSink>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            quota,
            geo: GeoFenceChecker::new(config.geo.zones.clone()),
            conservation: ConservationGuard::new(config.conservation.endangered.clone()),
            windows: config.season.windows.clone(),
            alerts,
            events,
            clock,
            quota_commit: config.pipeline.quota_commit,
        }
    }

    /// Validate, count and store a harvest.
    ///
    /// `Err` is reserved for malformed input and store failures; a failed
    /// check comes back as `Ok(Submission::Rejected(..))`.
    pub fn submit(&self, mut event: CollectionEvent) -> Result<Submission, TraceError> {
        event.ensure_well_formed()?;
        let harvest_date = parse_harvest_date(&event.harvest_date)?;
        if event.timestamp.is_empty() {
            event.timestamp = self.clock.now().to_rfc3339();
        }

        // 1. Season window
        let windows = self.season_windows(&event.species)?;
        if !is_in_season(&windows, &event.species, &event.zone_name, harvest_date) {
            let alert = self.alert(
                &event,
                format!("alert_season_{}", event.id),
                AlertKind::SeasonViolation,
                Severity::High,
                "Harvest outside allowed season window",
                format!(
                    "Species {} harvested on {} in {} is outside the permitted season window",
                    event.species, event.harvest_date, event.zone_name
                ),
            );
            let reason = format!(
                "harvest outside allowed season window for species: {}",
                event.species
            );
            return Ok(self.reject(event, Stage::Season, reason, alert));
        }

        // 2. Geo-fence
        if !self
            .geo
            .is_within_zone(event.latitude, event.longitude, &event.species)
        {
            let alert = self.alert(
                &event,
                format!("alert_zone_{}", event.id),
                AlertKind::ZoneViolation,
                Severity::High,
                "Collection location outside approved zone",
                format!(
                    "Harvest at coordinates ({:.6}, {:.6}) is outside approved zone for species {}",
                    event.latitude, event.longitude, event.species
                ),
            );
            let reason = format!(
                "collection location outside approved zone for species: {}",
                event.species
            );
            return Ok(self.reject(event, Stage::GeoFence, reason, alert));
        }
        event.approved_zone = true;
        if event.status == CollectionStatus::Rejected {
            event.status = CollectionStatus::Pending;
        }

        // 3-5. Quota check, increment and conservation, under the key lock
        let season = season_for(self.clock.today());
        let key = QuotaKey::new(&event.species, &event.zone_name, &season);
        let gate = self.quota.with_key(&key, |slot| {
            if !slot.has_room(event.quantity) {
                return Ok(QuotaGate::OverQuota(slot.record().clone()));
            }
            let unrestricted = self.conservation.is_unrestricted(&event.species);
            match self.quota_commit {
                QuotaCommit::AfterAllChecks if !unrestricted => Ok(QuotaGate::Endangered(None)),
                QuotaCommit::AfterAllChecks => slot.commit(event.quantity).map(QuotaGate::Passed),
                QuotaCommit::BeforeConservation => {
                    let usage = slot.commit(event.quantity)?;
                    if unrestricted {
                        Ok(QuotaGate::Passed(usage))
                    } else {
                        Ok(QuotaGate::Endangered(Some(usage)))
                    }
                }
            }
        })?;

        let usage = match gate {
            QuotaGate::Passed(usage) => usage,
            QuotaGate::OverQuota(usage) => {
                let alert = self.alert(
                    &event,
                    format!("alert_harvest_{}", event.id),
                    AlertKind::OverHarvest,
                    Severity::Critical,
                    "Harvest limit exceeded",
                    format!(
                        "Attempting to harvest {:.2} {} of {} in {} for season {} would exceed the limit ({:.2} / {:.2} {} used)",
                        event.quantity,
                        event.unit,
                        event.species,
                        event.zone_name,
                        season,
                        usage.current_quantity,
                        usage.max_quantity,
                        usage.unit
                    ),
                );
                let reason = format!(
                    "harvest limit exceeded for species: {} in zone: {}",
                    event.species, event.zone_name
                );
                return Ok(self.reject(event, Stage::Quota, reason, alert));
            }
            QuotaGate::Endangered(committed) => {
                if let Some(usage) = committed {
                    self.warn_on_usage(&event, &usage);
                }
                let alert = self.alert(
                    &event,
                    format!("alert_conservation_{}", event.id),
                    AlertKind::Compliance,
                    Severity::High,
                    "Conservation limit violation",
                    format!("Conservation limits exceeded for species: {}", event.species),
                );
                let reason = format!(
                    "species {} is endangered and requires special permit",
                    event.species
                );
                return Ok(self.reject(event, Stage::Conservation, reason, alert));
            }
        };
        let warning = self.warn_on_usage(&event, &usage);

        // 6. Persist and announce
        put_record(self.store.as_ref(), &event)?;
        info!(
            event_id = %event.id,
            species = %event.species,
            zone = %event.zone_name,
            quantity = event.quantity,
            season = %season,
            "collection event accepted"
        );
        publish(
            self.events.as_ref(),
            schema::event::COLLECTION_EVENT_CREATED,
            &event.created_payload(),
        );

        Ok(Submission::Accepted(Box::new(Accepted {
            event,
            quota: usage,
            warning,
        })))
    }

    /// Configured windows for a species, overlaid with windows registered on
    /// the ledger (same id replaces).
    fn season_windows(&self, species: &str) -> Result<Vec<SeasonWindow>, TraceError> {
        let mut by_id: BTreeMap<String, SeasonWindow> = self
            .windows
            .iter()
            .filter(|w| w.species == species)
            .map(|w| (w.id.clone(), w.clone()))
            .collect();
        let selector = Selector::of_type(record_type::SEASON_WINDOW).with_field(field::SPECIES, species);
        for window in query_records::<SeasonWindow>(self.store.as_ref(), &selector)? {
            by_id.insert(window.id.clone(), window);
        }
        Ok(by_id.into_values().collect())
    }

    fn warn_on_usage(&self, event: &CollectionEvent, usage: &HarvestQuotaRecord) -> Option<Alert> {
        if usage.status != QuotaStatus::Warning {
            return None;
        }
        let alert = self.alert(
            event,
            format!(
                "alert_warning_{}_{}_{}_{}",
                usage.species, usage.zone, usage.season, event.id
            ),
            AlertKind::OverHarvest,
            Severity::Medium,
            "Harvest limit warning",
            format!(
                "{:.1}% of harvest limit reached for {} in {} for season {} ({:.2} / {:.2} {})",
                usage.usage_ratio() * 100.0,
                usage.species,
                usage.zone,
                usage.season,
                usage.current_quantity,
                usage.max_quantity,
                usage.unit
            ),
        );
        emit(self.alerts.as_ref(), &alert);
        Some(alert)
    }

    fn reject(
        &self,
        mut event: CollectionEvent,
        stage: Stage,
        reason: String,
        alert: Alert,
    ) -> Submission {
        if matches!(stage, Stage::Season | Stage::GeoFence) {
            event.approved_zone = false;
        }
        event.status = CollectionStatus::Rejected;
        emit(self.alerts.as_ref(), &alert);
        warn!(event_id = %event.id, stage = ?stage, %reason, "collection event rejected");
        Submission::Rejected(Box::new(Rejection {
            stage,
            reason,
            alert,
            event,
        }))
    }

    fn alert(
        &self,
        event: &CollectionEvent,
        id: String,
        kind: AlertKind,
        severity: Severity,
        message: &str,
        details: String,
    ) -> Alert {
        Alert {
            id,
            alert_type: kind,
            severity,
            entity_id: event.id.clone(),
            entity_type: CollectionEvent::TYPE.to_string(),
            species: Some(event.species.clone()),
            zone: Some(event.zone_name.clone()),
            message: message.to_string(),
            details,
            timestamp: self.clock.now().to_rfc3339(),
        }
    }
}
