use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Configuration records
// ---------------------------------------------------------------------------

/// A monitored garden: a user-owned location with known coordinates.
///
/// Loaded once at startup from `gardens.config.json` and never mutated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Garden {
    pub garden_id: String,
    pub user_id: i64,
    pub name: String,
    /// Degrees, must lie in [-90, 90].
    pub latitude: f64,
    /// Degrees, must lie in [-180, 180].
    pub longitude: f64,
}

/// Climatic tolerance thresholds for one plant type.
///
/// Invariant (enforced at load time): `min_temperature < max_temperature`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityProfile {
    pub plant_type: String,
    /// °C
    pub max_temperature: f64,
    /// °C
    pub min_temperature: f64,
    /// mm/h
    pub max_precipitation: f64,
    /// km/h
    pub max_wind_speed: f64,
}

// ---------------------------------------------------------------------------
// Backend records
// ---------------------------------------------------------------------------

/// A plant as returned by the plants backend. Only `user_id`, `type` and
/// `name` are consumed here; any other fields are ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plant {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// Key into the sensitivity registry.
    #[serde(rename = "type")]
    pub plant_type: String,
}

/// A user as returned by the plants backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub phone_number: Option<String>,
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

/// Normalized current conditions for one coordinate.
///
/// Fields missing from the upstream response are 0.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    /// °C
    pub temperature: f64,
    /// °C, daily maximum
    pub temperature_max: f64,
    /// °C, daily minimum
    pub temperature_min: f64,
    /// mm/h
    pub precipitation: f64,
    /// km/h
    pub wind_speed: f64,
    /// Stamped at fetch time.
    pub observed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// The weather metric a threshold rule compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum AlertMetric {
    Temperature,
    Precipitation,
    WindSpeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    HighTemperature,
    LowTemperature,
    HeavyRain,
    StrongWind,
}

impl AlertType {
    pub const ALL: [AlertType; 4] = [
        AlertType::HighTemperature,
        AlertType::LowTemperature,
        AlertType::HeavyRain,
        AlertType::StrongWind,
    ];

    /// Wire name, e.g. `"HIGH_TEMPERATURE"`. Matches the serde rename.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::HighTemperature => "HIGH_TEMPERATURE",
            AlertType::LowTemperature => "LOW_TEMPERATURE",
            AlertType::HeavyRain => "HEAVY_RAIN",
            AlertType::StrongWind => "STRONG_WIND",
        }
    }

    /// Human-readable label used in SMS messages.
    pub fn label(&self) -> &'static str {
        match self {
            AlertType::HighTemperature => "High temperature",
            AlertType::LowTemperature => "Low temperature",
            AlertType::HeavyRain => "Heavy rain",
            AlertType::StrongWind => "Strong wind",
        }
    }

    pub fn metric(&self) -> AlertMetric {
        match self {
            AlertType::HighTemperature | AlertType::LowTemperature => AlertMetric::Temperature,
            AlertType::HeavyRain => AlertMetric::Precipitation,
            AlertType::StrongWind => AlertMetric::WindSpeed,
        }
    }

    /// Unit of the metric this rule compares against.
    pub fn unit(&self) -> &'static str {
        match self.metric() {
            AlertMetric::Temperature => "°C",
            AlertMetric::Precipitation => "mm/h",
            AlertMetric::WindSpeed => "km/h",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single threshold breach for one garden, created by the alert engine and
/// fanned out to the SMS, broadcast and history sinks. Never mutated after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Locally unique: unix millis plus a random suffix.
    pub alert_id: String,
    pub garden_id: String,
    pub user_id: i64,
    pub garden_name: String,
    pub timestamp: DateTime<Utc>,
    pub alert_type: AlertType,
    pub metric: AlertMetric,
    pub current_value: f64,
    /// The most restrictive threshold among the affected profiles.
    pub threshold: f64,
    /// Plant type keys whose profile was breached. Never empty.
    pub affected_plant_types: Vec<String>,
    /// Display names of the user's plants of those types. May be empty.
    pub affected_plant_names: Vec<String>,
}

/// Build an alert id from `timestamp` plus a random suffix.
pub fn new_alert_id(timestamp: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", timestamp.timestamp_millis(), &suffix[..8])
}
