pub(crate) mod telemetry;

use serde::Serialize;

/// One hour of grid telemetry feeding the scorer.
///
/// Every field has a usable fallback so missing upstream data degrades to a
/// plausible score instead of an error: system load defaults to 20 GW, the
/// generation fields to zero, and available capacity (when `None`) to
/// `system_load * 1.2` inside the reserve scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyTelemetry {
    pub hour: u32,
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: u32,
    pub system_load: f64,
    pub pv_generation: f64,
    pub wind_generation: f64,
    pub baseload_generation: f64,
    pub available_capacity: Option<f64>,
    /// MW change of PV output versus the previous interval.
    pub pv_gradient: f64,
    /// MW change of wind output versus the previous interval.
    pub wind_gradient: f64,
}

impl Default for HourlyTelemetry {
    fn default() -> Self {
        Self {
            hour: 0,
            day_of_week: 0,
            system_load: 20_000.0,
            pv_generation: 0.0,
            wind_generation: 0.0,
            baseload_generation: 0.0,
            available_capacity: None,
            pv_gradient: 0.0,
            wind_gradient: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Per-factor scores, each 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskComponents {
    pub power_reserve: u8,
    pub renewable_share: u8,
    pub baseload_generation: u8,
    pub generation_gradient: u8,
    pub peak_hours: u8,
    pub historical_pattern: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub total_score: u8,
    pub components: RiskComponents,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
}

/// Factor weights in percent; they sum to 100.
const WEIGHT_POWER_RESERVE: u32 = 25;
const WEIGHT_RENEWABLE_SHARE: u32 = 20;
const WEIGHT_BASELOAD: u32 = 15;
const WEIGHT_GRADIENT: u32 = 20;
const WEIGHT_PEAK_HOURS: u32 = 10;
const WEIGHT_HISTORICAL: u32 = 10;

/// Weighted-factor model mapping hourly telemetry to a redispatch risk
/// score. Pure: no I/O, no clock, identical input gives identical output.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskScorer;

impl RiskScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, telemetry: &HourlyTelemetry) -> RiskAssessment {
        let components = RiskComponents {
            power_reserve: power_reserve_score(telemetry),
            renewable_share: renewable_share_score(telemetry),
            baseload_generation: baseload_score(telemetry),
            generation_gradient: gradient_score(telemetry),
            peak_hours: peak_hours_score(telemetry),
            historical_pattern: historical_score(telemetry),
        };

        let weighted = components.power_reserve as f64 * WEIGHT_POWER_RESERVE as f64
            + components.renewable_share as f64 * WEIGHT_RENEWABLE_SHARE as f64
            + components.baseload_generation as f64 * WEIGHT_BASELOAD as f64
            + components.generation_gradient as f64 * WEIGHT_GRADIENT as f64
            + components.peak_hours as f64 * WEIGHT_PEAK_HOURS as f64
            + components.historical_pattern as f64 * WEIGHT_HISTORICAL as f64;

        let total_score = (weighted / 100.0).round().clamp(0.0, 100.0) as u8;

        RiskAssessment {
            total_score,
            components,
            risk_level: level_for_score(total_score),
            recommendations: recommendations(&components),
        }
    }
}

/// Fixed thresholds: 0-25 low, 26-50 medium, 51-75 high, 76-100 critical.
pub fn level_for_score(score: u8) -> RiskLevel {
    if score <= 25 {
        RiskLevel::Low
    } else if score <= 50 {
        RiskLevel::Medium
    } else if score <= 75 {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    }
}

/// Reserve margin versus the 18% requirement; shrinking reserve scores worse.
fn power_reserve_score(t: &HourlyTelemetry) -> u8 {
    let required_reserve = t.system_load * 0.18;
    let available = t.available_capacity.unwrap_or(t.system_load * 1.2);
    let actual_reserve = available - t.system_load;
    if required_reserve <= 0.0 {
        return 0;
    }
    let ratio = actual_reserve / required_reserve;

    if ratio >= 1.2 {
        0
    } else if ratio >= 1.0 {
        20
    } else if ratio >= 0.8 {
        50
    } else if ratio >= 0.6 {
        75
    } else {
        100
    }
}

fn renewable_share_score(t: &HourlyTelemetry) -> u8 {
    if t.system_load <= 0.0 {
        return 0;
    }
    let share = (t.pv_generation + t.wind_generation) / t.system_load * 100.0;

    if share < 30.0 {
        0
    } else if share < 50.0 {
        25
    } else if share < 60.0 {
        50
    } else if share < 70.0 {
        75
    } else {
        100
    }
}

/// Inverted: less baseload on the bars means higher risk.
fn baseload_score(t: &HourlyTelemetry) -> u8 {
    if t.system_load <= 0.0 {
        return 100;
    }
    let share = t.baseload_generation / t.system_load * 100.0;

    if share > 50.0 {
        0
    } else if share > 40.0 {
        25
    } else if share > 30.0 {
        50
    } else if share > 20.0 {
        75
    } else {
        100
    }
}

/// Falling renewables score up to 100, fast ramps up to 50, flat is 0.
fn gradient_score(t: &HourlyTelemetry) -> u8 {
    let total = t.pv_gradient + t.wind_gradient;

    if total < 0.0 {
        (total.abs() / 10.0).min(100.0).round() as u8
    } else if total > 500.0 {
        ((total - 500.0) / 20.0).min(50.0).round() as u8
    } else {
        0
    }
}

/// Weekday morning ramp and evening peak; 19:00-20:00 are the sharpest hours.
fn peak_hours_score(t: &HourlyTelemetry) -> u8 {
    let is_weekday = (1..=5).contains(&t.day_of_week);
    if !is_weekday {
        return 0;
    }

    match t.hour {
        6..=9 => 50,
        19 | 20 => 100,
        17..=21 => 75,
        _ => 0,
    }
}

/// Reserved extension point for historical-pattern analysis. Always zero for
/// now, but the factor stays in the breakdown so its weight and position are
/// stable for consumers.
fn historical_score(_t: &HourlyTelemetry) -> u8 {
    0
}

fn recommendations(components: &RiskComponents) -> Vec<String> {
    let mut out = Vec::new();

    if components.power_reserve > 50 {
        out.push("Low power reserve - consider reducing scheduled sales".to_string());
    }
    if components.renewable_share > 70 {
        out.push("Very high renewable share - elevated curtailment risk".to_string());
    }
    if components.generation_gradient > 50 {
        out.push("Rapid change in renewable generation".to_string());
    }
    if components.peak_hours > 50 {
        out.push("Peak hours - typical window for redispatch calls".to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry(f: impl FnOnce(&mut HourlyTelemetry)) -> HourlyTelemetry {
        let mut t = HourlyTelemetry::default();
        f(&mut t);
        t
    }

    #[test]
    fn total_score_stays_in_bounds() {
        let scorer = RiskScorer::new();

        let calm = telemetry(|t| {
            t.available_capacity = Some(30_000.0);
            t.baseload_generation = 15_000.0;
        });
        let stressed = telemetry(|t| {
            t.hour = 19;
            t.day_of_week = 3;
            t.system_load = 20_000.0;
            t.pv_generation = 10_000.0;
            t.wind_generation = 6_000.0;
            t.available_capacity = Some(20_500.0);
            t.pv_gradient = -2_000.0;
        });

        for t in [calm, stressed] {
            let assessment = scorer.score(&t);
            assert!(assessment.total_score <= 100);
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = RiskScorer::new();
        let t = telemetry(|t| {
            t.hour = 8;
            t.day_of_week = 2;
            t.pv_generation = 4_000.0;
            t.wind_generation = 3_000.0;
        });
        assert_eq!(scorer.score(&t), scorer.score(&t));
    }

    #[test]
    fn risk_level_boundaries() {
        assert_eq!(level_for_score(0), RiskLevel::Low);
        assert_eq!(level_for_score(25), RiskLevel::Low);
        assert_eq!(level_for_score(26), RiskLevel::Medium);
        assert_eq!(level_for_score(50), RiskLevel::Medium);
        assert_eq!(level_for_score(51), RiskLevel::High);
        assert_eq!(level_for_score(75), RiskLevel::High);
        assert_eq!(level_for_score(76), RiskLevel::Critical);
        assert_eq!(level_for_score(100), RiskLevel::Critical);
    }

    #[test]
    fn power_reserve_ratio_thresholds() {
        // ratio exactly 1.0: reserve equals the 18% requirement.
        let exact = telemetry(|t| {
            t.system_load = 20_000.0;
            t.available_capacity = Some(20_000.0 + 20_000.0 * 0.18);
        });
        assert_eq!(power_reserve_score(&exact), 20);

        // ratio 0.5: half the required reserve.
        let half = telemetry(|t| {
            t.system_load = 20_000.0;
            t.available_capacity = Some(20_000.0 + 20_000.0 * 0.09);
        });
        assert_eq!(power_reserve_score(&half), 100);

        // Unset capacity defaults to load * 1.2: ratio 0.2/0.18 = 1.11.
        let defaulted = telemetry(|t| t.available_capacity = None);
        assert_eq!(power_reserve_score(&defaulted), 20);
    }

    #[test]
    fn baseload_thresholds_are_strictly_greater_than() {
        let exactly_20 = telemetry(|t| t.baseload_generation = 4_000.0);
        assert_eq!(baseload_score(&exactly_20), 100);

        let just_above = telemetry(|t| t.baseload_generation = 4_010.0);
        assert_eq!(baseload_score(&just_above), 75);

        let comfortable = telemetry(|t| t.baseload_generation = 10_200.0);
        assert_eq!(baseload_score(&comfortable), 0);
    }

    #[test]
    fn gradient_scoring_branches() {
        let falling = telemetry(|t| t.pv_gradient = -570.0);
        assert_eq!(gradient_score(&falling), 57);

        let crashing = telemetry(|t| {
            t.pv_gradient = -800.0;
            t.wind_gradient = -400.0;
        });
        assert_eq!(gradient_score(&crashing), 100);

        let ramping = telemetry(|t| t.wind_gradient = 700.0);
        assert_eq!(gradient_score(&ramping), 10);

        let flat = telemetry(|t| t.pv_gradient = 300.0);
        assert_eq!(gradient_score(&flat), 0);
    }

    #[test]
    fn peak_hours_only_apply_on_weekdays() {
        let saturday_evening = telemetry(|t| {
            t.hour = 19;
            t.day_of_week = 6;
        });
        assert_eq!(peak_hours_score(&saturday_evening), 0);

        let weekday_morning = telemetry(|t| {
            t.hour = 7;
            t.day_of_week = 1;
        });
        assert_eq!(peak_hours_score(&weekday_morning), 50);

        let weekday_evening = telemetry(|t| {
            t.hour = 18;
            t.day_of_week = 5;
        });
        assert_eq!(peak_hours_score(&weekday_evening), 75);

        let sharpest = telemetry(|t| {
            t.hour = 20;
            t.day_of_week = 5;
        });
        assert_eq!(peak_hours_score(&sharpest), 100);
    }

    #[test]
    fn historical_pattern_is_a_zero_stub_with_weight() {
        let scorer = RiskScorer::new();
        let assessment = scorer.score(&HourlyTelemetry::default());
        assert_eq!(assessment.components.historical_pattern, 0);
    }

    #[test]
    fn evening_peak_scenario_scores_high() {
        // Weekday 19:00, 65% renewable share, 20% baseload share, thin
        // reserve (ratio 1000/3600 = 0.28). The baseload share computes to
        // exactly 20.0 in f64, so the strict > 20 branch does NOT fire and
        // the component lands on 100.
        let scorer = RiskScorer::new();
        let t = HourlyTelemetry {
            hour: 19,
            day_of_week: 3,
            system_load: 20_000.0,
            pv_generation: 9_000.0,
            wind_generation: 4_000.0,
            baseload_generation: 4_000.0,
            available_capacity: Some(21_000.0),
            pv_gradient: 0.0,
            wind_gradient: 0.0,
        };

        let assessment = scorer.score(&t);
        assert_eq!(assessment.components.power_reserve, 100);
        assert_eq!(assessment.components.renewable_share, 75);
        assert_eq!(assessment.components.baseload_generation, 100);
        assert_eq!(assessment.components.generation_gradient, 0);
        assert_eq!(assessment.components.peak_hours, 100);
        // (100*25 + 75*20 + 100*15 + 0 + 100*10 + 0) / 100 = 65
        assert_eq!(assessment.total_score, 65);
        assert_eq!(assessment.risk_level, RiskLevel::High);
    }

    #[test]
    fn recommendations_follow_component_order() {
        let components = RiskComponents {
            power_reserve: 75,
            renewable_share: 100,
            baseload_generation: 0,
            generation_gradient: 60,
            peak_hours: 75,
            historical_pattern: 0,
        };

        let recs = recommendations(&components);
        assert_eq!(recs.len(), 4);
        assert!(recs[0].contains("power reserve"));
        assert!(recs[1].contains("renewable share"));
        assert!(recs[2].contains("generation"));
        assert!(recs[3].contains("Peak hours"));
    }

    #[test]
    fn quiet_hour_produces_no_recommendations() {
        let scorer = RiskScorer::new();
        let t = telemetry(|t| {
            t.hour = 3;
            t.day_of_week = 0;
            t.baseload_generation = 12_000.0;
            t.available_capacity = Some(26_000.0);
        });
        let assessment = scorer.score(&t);
        assert!(assessment.recommendations.is_empty());
        assert_eq!(assessment.risk_level, RiskLevel::Low);
    }
}
