use std::collections::HashMap;

use chrono::{Datelike, Duration, Local, NaiveDate};

use crate::pse::{GenerationPoint, LoadPoint, ReserveMargin};
use crate::risk::{HourlyTelemetry, RiskAssessment, RiskScorer};

/// Assemble 24 telemetry snapshots for one day from whatever normalized
/// records are available. Live load and PV generation win; the reserve
/// forecast fills the gaps; anything still missing falls back to the
/// telemetry defaults. Baseload is derived as the demand not covered by
/// PV and wind, floored at zero.
pub fn build_day_telemetry(
    date: NaiveDate,
    load: &[LoadPoint],
    pv_generation: &[GenerationPoint],
    reserves: &[ReserveMargin],
) -> Vec<HourlyTelemetry> {
    let load_by_hour: HashMap<u32, f64> = load.iter().map(|p| (p.hour, p.load)).collect();
    let pv_by_hour: HashMap<u32, f64> = pv_generation
        .iter()
        .map(|p| (p.hour, p.total_power))
        .collect();
    let reserve_by_hour: HashMap<u32, &ReserveMargin> = reserves
        .iter()
        .filter(|m| m.plan_time.date() == date)
        .map(|m| (m.hour, m))
        .collect();

    let day_of_week = date.weekday().num_days_from_sunday();
    let defaults = HourlyTelemetry::default();

    let mut series: Vec<HourlyTelemetry> = (0..24)
        .map(|hour| {
            let forecast = reserve_by_hour.get(&hour);

            let system_load = load_by_hour
                .get(&hour)
                .copied()
                .filter(|l| *l > 0.0)
                .or_else(|| forecast.map(|f| f.demand_forecast).filter(|d| *d > 0.0))
                .unwrap_or(defaults.system_load);

            let pv_generation = pv_by_hour
                .get(&hour)
                .copied()
                .or_else(|| forecast.map(|f| f.pv_forecast))
                .unwrap_or(0.0);

            let wind_generation = forecast.map(|f| f.wind_forecast).unwrap_or(0.0);
            let baseload_generation = (system_load - pv_generation - wind_generation).max(0.0);
            let available_capacity = forecast.map(|f| system_load + f.surplus_capacity);

            HourlyTelemetry {
                hour,
                day_of_week,
                system_load,
                pv_generation,
                wind_generation,
                baseload_generation,
                available_capacity,
                pv_gradient: 0.0,
                wind_gradient: 0.0,
            }
        })
        .collect();

    // Hour-over-hour deltas; hour 0 has no predecessor and stays flat.
    for hour in 1..24 {
        series[hour].pv_gradient = series[hour].pv_generation - series[hour - 1].pv_generation;
        series[hour].wind_gradient =
            series[hour].wind_generation - series[hour - 1].wind_generation;
    }

    series
}

/// One scored hour of the risk matrix.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HourlyRisk {
    pub date: String,
    pub hour: u32,
    pub assessment: RiskAssessment,
}

/// Score a full day of telemetry.
pub fn score_day(
    scorer: &RiskScorer,
    date: NaiveDate,
    telemetry: &[HourlyTelemetry],
) -> Vec<HourlyRisk> {
    telemetry
        .iter()
        .map(|t| HourlyRisk {
            date: date.format("%Y-%m-%d").to_string(),
            hour: t.hour,
            assessment: scorer.score(t),
        })
        .collect()
}

/// Rolling 7-day risk matrix: day 0 is today, day 6 is six days out.
/// Forecast data covers the leading days; later days degrade to defaults.
pub fn rolling_week_dates() -> Vec<NaiveDate> {
    let today = Local::now().date_naive();
    (0..7).map(|offset| today + Duration::days(offset)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pse::records::{mock_reserve_margins, mock_system_load};

    fn wednesday() -> NaiveDate {
        // 2024-05-01 was a Wednesday.
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn empty_inputs_degrade_to_defaults() {
        let series = build_day_telemetry(wednesday(), &[], &[], &[]);

        assert_eq!(series.len(), 24);
        for (hour, t) in series.iter().enumerate() {
            assert_eq!(t.hour, hour as u32);
            assert_eq!(t.day_of_week, 3);
            assert_eq!(t.system_load, 20_000.0);
            assert_eq!(t.available_capacity, None);
        }
    }

    #[test]
    fn live_load_wins_over_forecast() {
        let load = vec![LoadPoint { hour: 12, load: 22_500.0 }];
        let reserves = mock_reserve_margins(wednesday());

        let series = build_day_telemetry(wednesday(), &load, &[], &reserves);
        assert_eq!(series[12].system_load, 22_500.0);
        // Hours without live load take the forecast demand.
        assert_eq!(series[3].system_load, reserves[3].demand_forecast);
    }

    #[test]
    fn baseload_is_residual_demand_floored_at_zero() {
        let load = vec![LoadPoint { hour: 10, load: 10_000.0 }];
        let pv = vec![GenerationPoint { hour: 10, total_power: 8_000.0, unit_count: 5 }];
        let reserves = mock_reserve_margins(wednesday());

        let series = build_day_telemetry(wednesday(), &load, &pv, &reserves);
        let t = &series[10];
        assert_eq!(t.pv_generation, 8_000.0);
        assert_eq!(
            t.baseload_generation,
            (10_000.0 - 8_000.0 - t.wind_generation).max(0.0)
        );

        // Oversupplied hour: residual cannot go negative.
        let pv_heavy = vec![GenerationPoint { hour: 10, total_power: 50_000.0, unit_count: 5 }];
        let series = build_day_telemetry(wednesday(), &load, &pv_heavy, &reserves);
        assert_eq!(series[10].baseload_generation, 0.0);
    }

    #[test]
    fn gradients_are_hour_over_hour_deltas() {
        let reserves = mock_reserve_margins(wednesday());
        let series = build_day_telemetry(wednesday(), &mock_system_load(), &[], &reserves);

        for hour in 1..24 {
            assert_eq!(
                series[hour].pv_gradient,
                series[hour].pv_generation - series[hour - 1].pv_generation
            );
        }
        assert_eq!(series[0].pv_gradient, 0.0);
    }

    #[test]
    fn score_day_covers_all_hours() {
        let scorer = RiskScorer::new();
        let telemetry = build_day_telemetry(wednesday(), &[], &[], &[]);
        let risks = score_day(&scorer, wednesday(), &telemetry);

        assert_eq!(risks.len(), 24);
        assert_eq!(risks[19].hour, 19);
        assert_eq!(risks[0].date, "2024-05-01");
    }

    #[test]
    fn rolling_week_starts_today() {
        let dates = rolling_week_dates();
        assert_eq!(dates.len(), 7);
        assert_eq!(dates[0], Local::now().date_naive());
        assert_eq!(dates[6] - dates[0], Duration::days(6));
    }
}
