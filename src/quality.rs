//! Lab-test quality gate.

use crate::config::QualityLimits;
use crate::model::QualityTest;

const PESTICIDE_PASS: &str = "pass";

/// Pure verdict over a lab test. Every condition must hold; a value exactly
/// at its limit passes.
#[derive(Debug, Clone, Default)]
pub struct QualityGateEvaluator {
    limits: QualityLimits,
}

impl QualityGateEvaluator {
    pub fn new(limits: QualityLimits) -> Self {
        Self { limits }
    }

    pub fn evaluate(&self, test: &QualityTest) -> bool {
        self.failures(test).is_empty()
    }

    /// Human-readable reasons the test fails the gate; empty when it passes.
    pub fn failures(&self, test: &QualityTest) -> Vec<String> {
        let mut reasons = Vec::new();

        if test.moisture_content > self.limits.max_moisture {
            reasons.push(format!(
                "moisture {} exceeds {}",
                test.moisture_content, self.limits.max_moisture
            ));
        }

        for (pesticide, result) in &test.pesticide_results {
            if result != PESTICIDE_PASS {
                reasons.push(format!("pesticide {pesticide}: {result}"));
            }
        }

        for (metal, ppm) in &test.heavy_metals {
            if let Some(limit) = self.limits.heavy_metals.get(metal) {
                if ppm > limit {
                    reasons.push(format!("{metal} {ppm} ppm exceeds {limit}"));
                }
            }
        }

        if test.aflatoxins > self.limits.max_aflatoxins {
            reasons.push(format!(
                "aflatoxins {} ppb exceeds {}",
                test.aflatoxins, self.limits.max_aflatoxins
            ));
        }

        reasons
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_limits() -> QualityTest {
        let mut test = QualityTest {
            id: "QT-1".into(),
            moisture_content: 12.0,
            aflatoxins: 20.0,
            ..Default::default()
        };
        test.pesticide_results
            .insert("chlorpyrifos".into(), "pass".into());
        test.pesticide_results.insert("dichlorvos".into(), "pass".into());
        for (metal, ppm) in [("lead", 10.0), ("arsenic", 3.0), ("mercury", 1.0), ("cadmium", 0.3)] {
            test.heavy_metals.insert(metal.into(), ppm);
        }
        test
    }

    #[test]
    fn test_boundary_values_pass() {
        let gate = QualityGateEvaluator::default();
        assert!(gate.evaluate(&at_limits()));
    }

    #[test]
    fn test_moisture_just_over_fails() {
        let gate = QualityGateEvaluator::default();
        let mut test = at_limits();
        test.moisture_content = 12.01;
        assert!(!gate.evaluate(&test));
        assert_eq!(gate.failures(&test).len(), 1);
    }

    #[test]
    fn test_pesticide_must_be_exact_pass() {
        let gate = QualityGateEvaluator::default();
        let mut test = at_limits();
        test.pesticide_results.insert("malathion".into(), "PASS".into());
        assert!(!gate.evaluate(&test));
    }

    #[test]
    fn test_unlisted_metal_ignored() {
        let gate = QualityGateEvaluator::default();
        let mut test = at_limits();
        test.heavy_metals.insert("chromium".into(), 500.0);
        assert!(gate.evaluate(&test));
        test.heavy_metals.insert("cadmium".into(), 0.31);
        assert!(!gate.evaluate(&test));
    }

    #[test]
    fn test_aflatoxins_over_fails() {
        let gate = QualityGateEvaluator::default();
        let mut test = at_limits();
        test.aflatoxins = 20.5;
        assert!(!gate.evaluate(&test));
    }
}
