//! The six fixed analysis criteria and the score vector carried for each event/window.

use serde::{Deserialize, Serialize};

/// One of the six fixed analysis axes. Ids are stable and the set is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    ItSecurity,
    PerformanceDegradation,
    FailurePrediction,
    Anomaly,
    ComplianceAudit,
    OperationalRisk,
}

impl Criterion {
    /// Stable integer id, matching the `criteria` table's primary key.
    pub fn id(self) -> i32 {
        match self {
            Criterion::ItSecurity => 1,
            Criterion::PerformanceDegradation => 2,
            Criterion::FailurePrediction => 3,
            Criterion::Anomaly => 4,
            Criterion::ComplianceAudit => 5,
            Criterion::OperationalRisk => 6,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Some(match id {
            1 => Criterion::ItSecurity,
            2 => Criterion::PerformanceDegradation,
            3 => Criterion::FailurePrediction,
            4 => Criterion::Anomaly,
            5 => Criterion::ComplianceAudit,
            6 => Criterion::OperationalRisk,
            _ => return None,
        })
    }

    pub fn slug(self) -> &'static str {
        match self {
            Criterion::ItSecurity => "it_security",
            Criterion::PerformanceDegradation => "performance_degradation",
            Criterion::FailurePrediction => "failure_prediction",
            Criterion::Anomaly => "anomaly",
            Criterion::ComplianceAudit => "compliance_audit",
            Criterion::OperationalRisk => "operational_risk",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Some(match slug {
            "it_security" => Criterion::ItSecurity,
            "performance_degradation" => Criterion::PerformanceDegradation,
            "failure_prediction" => Criterion::FailurePrediction,
            "anomaly" => Criterion::Anomaly,
            "compliance_audit" => Criterion::ComplianceAudit,
            "operational_risk" => Criterion::OperationalRisk,
            _ => return None,
        })
    }

    /// All six criteria, in a stable order matching the scoring vector.
    pub const ALL: [Criterion; 6] = [
        Criterion::ItSecurity,
        Criterion::PerformanceDegradation,
        Criterion::FailurePrediction,
        Criterion::Anomaly,
        Criterion::ComplianceAudit,
        Criterion::OperationalRisk,
    ];
}

/// A six-element score vector, one float per criterion, always clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreVector {
    pub it_security: f64,
    pub performance_degradation: f64,
    pub failure_prediction: f64,
    pub anomaly: f64,
    pub compliance_audit: f64,
    pub operational_risk: f64,
}

impl ScoreVector {
    pub const ZERO: ScoreVector = ScoreVector {
        it_security: 0.0,
        performance_degradation: 0.0,
        failure_prediction: 0.0,
        anomaly: 0.0,
        compliance_audit: 0.0,
        operational_risk: 0.0,
    };

    /// Construct from a raw vector, clamping every value into [0, 1] and defaulting
    /// any missing trailing values to 0, per the scoring LLM output contract (spec §4.4, §6.3).
    pub fn from_raw(values: &[f64]) -> Self {
        let get = |i: usize| values.get(i).copied().unwrap_or(0.0).clamp(0.0, 1.0);
        ScoreVector {
            it_security: get(0),
            performance_degradation: get(1),
            failure_prediction: get(2),
            anomaly: get(3),
            compliance_audit: get(4),
            operational_risk: get(5),
        }
    }

    pub fn get(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::ItSecurity => self.it_security,
            Criterion::PerformanceDegradation => self.performance_degradation,
            Criterion::FailurePrediction => self.failure_prediction,
            Criterion::Anomaly => self.anomaly,
            Criterion::ComplianceAudit => self.compliance_audit,
            Criterion::OperationalRisk => self.operational_risk,
        }
    }

    pub fn set(&mut self, criterion: Criterion, value: f64) {
        let clamped = value.clamp(0.0, 1.0);
        match criterion {
            Criterion::ItSecurity => self.it_security = clamped,
            Criterion::PerformanceDegradation => self.performance_degradation = clamped,
            Criterion::FailurePrediction => self.failure_prediction = clamped,
            Criterion::Anomaly => self.anomaly = clamped,
            Criterion::ComplianceAudit => self.compliance_audit = clamped,
            Criterion::OperationalRisk => self.operational_risk = clamped,
        }
    }

    /// The maximum value across all six criteria, used for low-score auto-skip
    /// and template cache averaging.
    pub fn max(&self) -> f64 {
        Criterion::ALL
            .iter()
            .map(|c| self.get(*c))
            .fold(0.0_f64, f64::max)
    }

    pub fn is_all_zero(&self) -> bool {
        Criterion::ALL.iter().all(|c| self.get(*c) == 0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Criterion, f64)> + '_ {
        Criterion::ALL.iter().map(move |c| (*c, self.get(*c)))
    }

    /// The six values in `Criterion::ALL` order, suitable for JSON storage.
    pub fn to_vec(&self) -> Vec<f64> {
        Criterion::ALL.iter().map(|c| self.get(*c)).collect()
    }
}

impl Default for ScoreVector {
    fn default() -> Self {
        Self::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_pads_missing_with_zero() {
        let v = ScoreVector::from_raw(&[0.5, 0.2]);
        assert_eq!(v.it_security, 0.5);
        assert_eq!(v.performance_degradation, 0.2);
        assert_eq!(v.failure_prediction, 0.0);
        assert_eq!(v.operational_risk, 0.0);
    }

    #[test]
    fn from_raw_truncates_extras() {
        let v = ScoreVector::from_raw(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]);
        assert_eq!(v.operational_risk, 0.6);
    }

    #[test]
    fn from_raw_clamps_out_of_range() {
        let v = ScoreVector::from_raw(&[-1.0, 2.0, 0.5, 0.5, 0.5, 0.5]);
        assert_eq!(v.it_security, 0.0);
        assert_eq!(v.performance_degradation, 1.0);
    }

    #[test]
    fn id_roundtrips_through_slug() {
        for c in Criterion::ALL {
            assert_eq!(Criterion::from_slug(c.slug()), Some(c));
            assert_eq!(Criterion::from_id(c.id()), Some(c));
        }
    }

    #[test]
    fn max_picks_highest_criterion() {
        let mut v = ScoreVector::ZERO;
        v.set(Criterion::Anomaly, 0.7);
        v.set(Criterion::ItSecurity, 0.3);
        assert_eq!(v.max(), 0.7);
    }
}
