//! Calendar rules: quota season buckets and harvest season windows.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TraceError;
use crate::model::LedgerRecord;
use crate::schema::record_type;

// ── Clock ───────────────────────────────────────────────────────────────────

/// Source of "now". Quota seasons are derived from it, never from the event.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Midnight UTC of the given day.
    pub fn on(year: i32, month: u32, day: u32) -> Self {
        let date = NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default();
        Self(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ── Quota seasons ───────────────────────────────────────────────────────────

/// Quota bucket for a date, e.g. `2026-autumn`.
///
/// Dec-Feb winter, Mar-May spring, Jun-Aug summer, Sep-Nov autumn. A winter
/// belongs to the year it starts in: Dec 2026 through Feb 2027 is
/// `2026-winter`.
pub fn season_for(date: NaiveDate) -> String {
    let (year, name) = match date.month() {
        1 | 2 => (date.year() - 1, "winter"),
        3..=5 => (date.year(), "spring"),
        6..=8 => (date.year(), "summer"),
        9..=11 => (date.year(), "autumn"),
        _ => (date.year(), "winter"),
    };
    format!("{year}-{name}")
}

/// Accepts `YYYY-MM-DD`, RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_harvest_date(raw: &str) -> Result<NaiveDate, TraceError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.date_naive());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(ts.date());
    }
    Err(TraceError::Malformed(format!("unrecognised harvest date: {raw}")))
}

// ── Season windows ──────────────────────────────────────────────────────────

/// Months in which a species may be harvested in a region. Both ends are
/// inclusive; `start_month > end_month` wraps over the year end (Oct-Mar).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonWindow {
    pub id: String,
    pub species: String,
    /// Empty means every region.
    #[serde(default)]
    pub region: String,
    pub start_month: u32,
    pub end_month: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl SeasonWindow {
    pub fn new(id: &str, species: &str, region: &str, start_month: u32, end_month: u32) -> Self {
        Self {
            id: id.to_string(),
            species: species.to_string(),
            region: region.to_string(),
            start_month,
            end_month,
            active: true,
        }
    }

    pub fn ensure_well_formed(&self) -> Result<(), TraceError> {
        if self.id.trim().is_empty() || self.species.trim().is_empty() {
            return Err(TraceError::Malformed(
                "season window needs an id and a species".into(),
            ));
        }
        for month in [self.start_month, self.end_month] {
            if !(1..=12).contains(&month) {
                return Err(TraceError::Malformed(format!("month out of range: {month}")));
            }
        }
        Ok(())
    }

    pub fn contains_month(&self, month: u32) -> bool {
        if self.start_month <= self.end_month {
            (self.start_month..=self.end_month).contains(&month)
        } else {
            month >= self.start_month || month <= self.end_month
        }
    }

    fn covers_region(&self, zone: &str) -> bool {
        self.region.is_empty() || self.region.eq_ignore_ascii_case(zone)
    }
}

impl LedgerRecord for SeasonWindow {
    const TYPE: &'static str = record_type::SEASON_WINDOW;

    fn key(&self) -> String {
        self.id.clone()
    }
}

/// Is `date` inside a permitted window for `species` harvested in `zone`?
///
/// Windows for the zone (or region-less ones) take precedence; if none cover
/// the zone, the species' windows for other regions apply. A species with no
/// active window at all is harvestable year-round.
pub fn is_in_season(windows: &[SeasonWindow], species: &str, zone: &str, date: NaiveDate) -> bool {
    let for_species: Vec<&SeasonWindow> = windows
        .iter()
        .filter(|w| w.active && w.species == species)
        .collect();
    if for_species.is_empty() {
        return true;
    }

    let local: Vec<&SeasonWindow> = for_species
        .iter()
        .copied()
        .filter(|w| w.covers_region(zone))
        .collect();
    let applicable = if local.is_empty() { for_species } else { local };

    applicable.iter().any(|w| w.contains_month(date.month()))
}
