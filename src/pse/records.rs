use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response envelope shared by all PSE OData endpoints.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ODataEnvelope {
    #[serde(default)]
    pub value: Vec<Value>,
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
}

impl ODataEnvelope {
    pub fn from_value(raw: &Value) -> Self {
        serde_json::from_value(raw.clone()).unwrap_or_default()
    }
}

/// Where a dataset came from, for observability when the live path degrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOrigin {
    Live,
    Cached,
    Stale,
    Mock,
}

/// Dataset plus its origin flag. Accessors never fail; they annotate instead.
#[derive(Debug, Clone, Serialize)]
pub struct Sourced<T> {
    pub data: T,
    pub origin: DataOrigin,
}

impl<T> Sourced<T> {
    pub fn new(data: T, origin: DataOrigin) -> Self {
        Self { data, origin }
    }
}

/// Hourly PV generation aggregated across contributing units.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationPoint {
    pub hour: u32,
    pub total_power: f64,
    pub unit_count: u32,
}

/// Hourly system (KSE) load.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoadPoint {
    pub hour: u32,
    pub load: f64,
}

/// Hourly price forecast.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PricePoint {
    pub hour: u32,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Fixed thresholds on the curtailed power band.
    pub fn from_power_reduction(power_reduction: f64) -> Self {
        if power_reduction > 10.0 {
            Severity::Critical
        } else if power_reduction > 5.0 {
            Severity::High
        } else if power_reduction > 1.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// A redispatch / operational-limitation directive against a unit.
#[derive(Debug, Clone, Serialize)]
pub struct RedispatchEvent {
    pub resource_name: String,
    pub direction: String,
    pub limiting_element: String,
    pub from_time: NaiveDateTime,
    pub to_time: NaiveDateTime,
    pub min_power: f64,
    pub max_power: f64,
    pub power_reduction: f64,
    pub duration_min: i64,
    pub severity: Severity,
}

/// One row of the reserve-margin forecast (pk5l-wp), keyed by plan time.
#[derive(Debug, Clone, Serialize)]
pub struct ReserveMargin {
    pub plan_time: NaiveDateTime,
    pub hour: u32,
    pub demand_forecast: f64,
    pub pv_forecast: f64,
    pub wind_forecast: f64,
    pub required_reserve: f64,
    pub surplus_capacity: f64,
}

// --- field coercion -------------------------------------------------------
//
// The upstream API is loose about numeric types (numbers arrive as strings
// on some endpoints). Malformed values coerce to 0 instead of failing the
// whole dataset.

fn f64_field(row: &Value, key: &str) -> f64 {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn u32_field(row: &Value, key: &str) -> u32 {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as u32,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn str_field(row: &Value, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Parse the datetime formats seen on PSE endpoints. Unparseable values fall
/// back to the epoch so a single bad row cannot sink the dataset.
fn dtime_field(row: &Value, key: &str) -> NaiveDateTime {
    let raw = str_field(row, key);
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&raw, format) {
            return dt;
        }
    }
    NaiveDateTime::default()
}

// --- normalization --------------------------------------------------------

/// True when the resource name matches the PV allow-list
/// (case-insensitive substring match).
pub fn is_pv_resource(resource_name: &str, filters: &[String]) -> bool {
    if resource_name.is_empty() {
        return false;
    }
    let upper = resource_name.to_uppercase();
    filters.iter().any(|f| upper.contains(&f.to_uppercase()))
}

/// Filter generation rows to PV units, then aggregate per hour: sum of
/// power, count of contributing units. Ascending by hour.
pub fn normalize_pv_generation(rows: &[Value], pv_filters: &[String]) -> Vec<GenerationPoint> {
    let mut hourly: std::collections::HashMap<u32, GenerationPoint> = std::collections::HashMap::new();

    for row in rows {
        if !is_pv_resource(&str_field(row, "resource_name"), pv_filters) {
            continue;
        }

        let hour = u32_field(row, "hour");
        let power = f64_field(row, "power");

        let entry = hourly.entry(hour).or_insert(GenerationPoint {
            hour,
            total_power: 0.0,
            unit_count: 0,
        });
        entry.total_power += power;
        entry.unit_count += 1;
    }

    let mut points: Vec<GenerationPoint> = hourly.into_values().collect();
    points.sort_by_key(|p| p.hour);
    points
}

/// Per-hour load values, ascending by hour.
pub fn normalize_system_load(rows: &[Value]) -> Vec<LoadPoint> {
    let mut points: Vec<LoadPoint> = rows
        .iter()
        .map(|row| LoadPoint {
            hour: u32_field(row, "hour"),
            load: f64_field(row, "load"),
        })
        .collect();
    points.sort_by_key(|p| p.hour);
    points
}

/// Per-hour price forecasts, ascending by hour.
pub fn normalize_price_forecasts(rows: &[Value]) -> Vec<PricePoint> {
    let mut points: Vec<PricePoint> = rows
        .iter()
        .map(|row| PricePoint {
            hour: u32_field(row, "hour"),
            price: f64_field(row, "price"),
        })
        .collect();
    points.sort_by_key(|p| p.hour);
    points
}

/// Redispatch events with derived curtailment band, duration and severity.
/// Descending by start time (most recent first).
pub fn normalize_redispatch(rows: &[Value]) -> Vec<RedispatchEvent> {
    let mut events: Vec<RedispatchEvent> = rows
        .iter()
        .map(|row| {
            let min_power = f64_field(row, "pol_min_power_of_unit");
            let max_power = f64_field(row, "pol_max_power_of_unit");
            let power_reduction = max_power - min_power;
            let from_time = dtime_field(row, "from_dtime");
            let to_time = dtime_field(row, "to_dtime");
            let duration_min =
                ((to_time - from_time).num_seconds() as f64 / 60.0).round() as i64;

            RedispatchEvent {
                resource_name: str_field(row, "resource_name"),
                direction: str_field(row, "direction"),
                limiting_element: str_field(row, "limiting_element"),
                from_time,
                to_time,
                min_power,
                max_power,
                power_reduction,
                duration_min,
                severity: Severity::from_power_reduction(power_reduction),
            }
        })
        .collect();

    events.sort_by(|a, b| b.from_time.cmp(&a.from_time));
    events
}

/// Reserve-margin forecast rows, ascending by plan time.
pub fn normalize_reserve_margins(rows: &[Value]) -> Vec<ReserveMargin> {
    let mut margins: Vec<ReserveMargin> = rows
        .iter()
        .map(|row| {
            let plan_time = dtime_field(row, "plan_dtime");
            ReserveMargin {
                plan_time,
                hour: plan_time.hour(),
                demand_forecast: f64_field(row, "grid_demand_fcst"),
                pv_forecast: f64_field(row, "fcst_pv_tot_gen"),
                wind_forecast: f64_field(row, "fcst_wi_tot_gen"),
                required_reserve: f64_field(row, "req_pow_res"),
                surplus_capacity: f64_field(row, "surplus_cap_avail_tso"),
            }
        })
        .collect();

    margins.sort_by_key(|m| m.plan_time);
    margins
}

// --- deterministic fallback datasets --------------------------------------
//
// Used as the last degradation tier when both the live fetch and the cache
// come up empty. Shapes mirror the real endpoints; values follow simple
// daily profiles so the dashboard stays plausible offline.

const MOCK_BASE_LOAD_MW: f64 = 20_000.0;

fn sun_factor(hour: u32) -> f64 {
    ((hour as f64 - 6.0) * std::f64::consts::PI / 12.0).sin().max(0.0)
}

pub fn mock_pv_generation() -> Vec<GenerationPoint> {
    (0..24)
        .map(|hour| GenerationPoint {
            hour,
            total_power: sun_factor(hour) * 0.7 * 12_000.0,
            unit_count: 1_000,
        })
        .collect()
}

pub fn mock_system_load() -> Vec<LoadPoint> {
    (0..24)
        .map(|hour| {
            let peak = if (7..=21).contains(&hour) { 1.2 } else { 0.9 };
            LoadPoint {
                hour,
                load: MOCK_BASE_LOAD_MW * peak,
            }
        })
        .collect()
}

pub fn mock_price_forecasts() -> Vec<PricePoint> {
    (0..24)
        .map(|hour| {
            let peak = if (17..=20).contains(&hour) { 1.5 } else { 1.0 };
            let night = if hour >= 23 || hour <= 5 { 0.7 } else { 1.0 };
            PricePoint {
                hour,
                price: 400.0 * peak * night,
            }
        })
        .collect()
}

pub fn mock_reserve_margins(date: NaiveDate) -> Vec<ReserveMargin> {
    (0..24)
        .map(|hour| {
            let peak = if (7..=21).contains(&hour) { 1.2 } else { 0.9 };
            let demand = MOCK_BASE_LOAD_MW * peak;
            let pv = sun_factor(hour) * 0.7 * 12_000.0;
            let wind = 3_000.0 + ((hour as f64) * std::f64::consts::PI / 12.0).sin() * 1_000.0;

            ReserveMargin {
                plan_time: date.and_hms_opt(hour, 0, 0).expect("valid mock hour"),
                hour,
                demand_forecast: demand,
                pv_forecast: pv,
                wind_forecast: wind,
                required_reserve: demand * 0.18,
                surplus_capacity: (pv + wind) * 0.1,
            }
        })
        .collect()
}
