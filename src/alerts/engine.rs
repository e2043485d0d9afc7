use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::models::{new_alert_id, Alert, AlertMetric, AlertType, Garden, Plant, SensitivityProfile, WeatherSnapshot};
use crate::openmeteo::WeatherClient;
use crate::plant_cache::PlantCache;
use crate::sensitivity::SensitivityRegistry;

/// Evaluates one garden against current weather and emits zero or more
/// alerts, one per breached rule.
pub struct AlertEngine {
    weather: WeatherClient,
    cache: PlantCache,
    registry: Arc<SensitivityRegistry>,
}

impl AlertEngine {
    pub fn new(weather: WeatherClient, cache: PlantCache, registry: Arc<SensitivityRegistry>) -> Self {
        Self {
            weather,
            cache,
            registry,
        }
    }

    /// Evaluate a single garden. Never fails outward: a weather fetch
    /// failure or a plant-cache miss yields no alerts for this round.
    pub async fn evaluate_garden(&self, garden: &Garden) -> Vec<Alert> {
        let Some(weather) = self.weather.fetch_weather(garden.latitude, garden.longitude).await
        else {
            info!(garden_id = %garden.garden_id, "No weather data, skipping evaluation");
            return Vec::new();
        };

        // Only fresh cache entries feed evaluations; a miss means no alerts.
        let Some(plants) = self.cache.get(garden.user_id).await else {
            debug!(garden_id = %garden.garden_id, user_id = garden.user_id, "No cached plants, skipping evaluation");
            return Vec::new();
        };
        if plants.is_empty() {
            return Vec::new();
        }

        let alerts = evaluate(garden, &weather, &plants, &self.registry);
        if !alerts.is_empty() {
            info!(
                garden_id = %garden.garden_id,
                alerts = alerts.len(),
                temperature = weather.temperature,
                precipitation = weather.precipitation,
                wind_speed = weather.wind_speed,
                "Thresholds breached"
            );
        }
        alerts
    }
}

/// Apply the four threshold rules to one garden's weather and plants.
///
/// Comparisons are strict: a value exactly at a threshold does not alert.
/// When several profiles breach the same rule, the emitted threshold is the
/// most restrictive one among them.
pub(crate) fn evaluate(
    garden: &Garden,
    weather: &WeatherSnapshot,
    plants: &[Plant],
    registry: &SensitivityRegistry,
) -> Vec<Alert> {
    let mut types: Vec<&str> = Vec::new();
    for plant in plants {
        if !types.contains(&plant.plant_type.as_str()) {
            types.push(&plant.plant_type);
        }
    }
    // Keep each queried type key paired with its profile: resolving an
    // unregistered type yields the shared default profile, whose own
    // plant_type field is "default", not the key the plants carry.
    let profiles: Vec<(&str, &SensitivityProfile)> =
        types.iter().map(|&t| (t, registry.resolve(t))).collect();

    let now = Utc::now();
    let mut alerts = Vec::new();

    for alert_type in AlertType::ALL {
        let hit: Vec<(&str, &SensitivityProfile)> = profiles
            .iter()
            .copied()
            .filter(|(_, p)| breaches(alert_type, weather, p))
            .collect();
        if hit.is_empty() {
            continue;
        }

        let threshold = match alert_type {
            AlertType::HighTemperature => fold_min(hit.iter().map(|(_, p)| p.max_temperature)),
            AlertType::LowTemperature => fold_max(hit.iter().map(|(_, p)| p.min_temperature)),
            AlertType::HeavyRain => fold_min(hit.iter().map(|(_, p)| p.max_precipitation)),
            AlertType::StrongWind => fold_min(hit.iter().map(|(_, p)| p.max_wind_speed)),
        };

        let affected_plant_types: Vec<String> =
            hit.iter().map(|(t, _)| (*t).to_owned()).collect();
        let mut affected_plant_names: Vec<String> = Vec::new();
        for plant in plants {
            if affected_plant_types.iter().any(|t| t == &plant.plant_type)
                && !affected_plant_names.contains(&plant.name)
            {
                affected_plant_names.push(plant.name.clone());
            }
        }

        let current_value = match alert_type.metric() {
            AlertMetric::Temperature => weather.temperature,
            AlertMetric::Precipitation => weather.precipitation,
            AlertMetric::WindSpeed => weather.wind_speed,
        };

        alerts.push(Alert {
            alert_id: new_alert_id(now),
            garden_id: garden.garden_id.clone(),
            user_id: garden.user_id,
            garden_name: garden.name.clone(),
            timestamp: now,
            alert_type,
            metric: alert_type.metric(),
            current_value,
            threshold,
            affected_plant_types,
            affected_plant_names,
        });
    }

    alerts
}

fn breaches(alert_type: AlertType, weather: &WeatherSnapshot, profile: &SensitivityProfile) -> bool {
    match alert_type {
        AlertType::HighTemperature => weather.temperature > profile.max_temperature,
        AlertType::LowTemperature => weather.temperature < profile.min_temperature,
        AlertType::HeavyRain => weather.precipitation > profile.max_precipitation,
        AlertType::StrongWind => weather.wind_speed > profile.max_wind_speed,
    }
}

fn fold_min(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::INFINITY, f64::min)
}

fn fold_max(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::NEG_INFINITY, f64::max)
}
