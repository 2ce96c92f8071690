//! Configuration for herb-tracekit
//!
//! Every field has a default, so an empty TOML document yields the stock
//! policy: the Neem geo-fence, the Dehradun season windows, the endangered
//! species list and the lab-test thresholds.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TraceError;
use crate::season::SeasonWindow;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub quota: QuotaConfig,
    pub geo: GeoConfig,
    pub season: SeasonConfig,
    pub conservation: ConservationConfig,
    pub quality: QualityLimits,
    pub pipeline: PipelineConfig,
    pub batch: BatchConfig,
}

impl TraceConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, TraceError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

// ── Quota ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Cap for any (species, zone) without an explicit limit.
    pub default_max: f64,
    pub unit: String,
    /// Fraction of the cap at which usage is reported as `warning`.
    pub warning_fraction: f64,
    pub limits: Vec<QuotaLimit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaLimit {
    pub species: String,
    /// Absent means every zone.
    #[serde(default)]
    pub zone: Option<String>,
    pub max_quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_max: default_quota_max(),
            unit: "kg".to_string(),
            warning_fraction: 0.8,
            limits: Vec::new(),
        }
    }
}

fn default_quota_max() -> f64 {
    1000.0
}

impl QuotaConfig {
    /// Cap and unit for a key: exact zone match first, then a species-wide
    /// limit, then the default.
    pub fn limit_for(&self, species: &str, zone: &str) -> (f64, String) {
        let exact = self
            .limits
            .iter()
            .find(|l| l.species == species && l.zone.as_deref() == Some(zone));
        let species_wide = || {
            self.limits
                .iter()
                .find(|l| l.species == species && l.zone.is_none())
        };
        match exact.or_else(species_wide) {
            Some(limit) => (
                limit.max_quantity,
                limit.unit.clone().unwrap_or_else(|| self.unit.clone()),
            ),
            None => (self.default_max, self.unit.clone()),
        }
    }
}

// ── Geo-fence ───────────────────────────────────────────────────────────────

/// Circular approval zone in plain degrees (not great-circle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoZone {
    pub species: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_deg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub zones: Vec<GeoZone>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            // Dehradun valley, 0.5 degree radius
            zones: vec![GeoZone {
                species: "Neem".to_string(),
                center_lat: 30.268804,
                center_lon: 77.993259,
                radius_deg: 0.5,
            }],
        }
    }
}

// ── Season windows ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonConfig {
    pub windows: Vec<SeasonWindow>,
}

impl Default for SeasonConfig {
    fn default() -> Self {
        let region = "Dehradun, Uttarakhand";
        Self {
            windows: vec![
                SeasonWindow::new("sw-neem-dehradun", "Neem", region, 1, 12),
                SeasonWindow::new("sw-ashwagandha-dehradun", "Ashwagandha", region, 10, 3),
                SeasonWindow::new("sw-tulsi-dehradun", "Tulsi", region, 1, 12),
                SeasonWindow::new("sw-brahmi-dehradun", "Brahmi", region, 1, 12),
            ],
        }
    }
}

// ── Conservation ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConservationConfig {
    pub endangered: Vec<String>,
}

impl Default for ConservationConfig {
    fn default() -> Self {
        Self {
            endangered: vec![
                "Aconitum heterophyllum".to_string(),
                "Nardostachys jatamansi".to_string(),
                "Picrorhiza kurroa".to_string(),
            ],
        }
    }
}

// ── Quality gate ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityLimits {
    /// Percent
    pub max_moisture: f64,
    /// ppb
    pub max_aflatoxins: f64,
    /// Metal name to ppm. Metals missing here are not checked.
    pub heavy_metals: BTreeMap<String, f64>,
}

impl Default for QualityLimits {
    fn default() -> Self {
        let heavy_metals = [
            ("lead", 10.0),
            ("arsenic", 3.0),
            ("mercury", 1.0),
            ("cadmium", 0.3),
        ]
        .into_iter()
        .map(|(metal, ppm)| (metal.to_string(), ppm))
        .collect();
        Self {
            max_moisture: 12.0,
            max_aflatoxins: 20.0,
            heavy_metals,
        }
    }
}

// ── Pipeline / batch policy ─────────────────────────────────────────────────

/// When the quota increment is committed relative to the conservation check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaCommit {
    /// Commit only once every gate has passed.
    #[default]
    AfterAllChecks,
    /// Commit before the conservation check; a conservation rejection keeps
    /// the consumed quota, as legacy ledgers do.
    BeforeConservation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub quota_commit: QuotaCommit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    #[default]
    LatestWins,
    ForwardOnly,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub policy: BatchPolicy,
}
