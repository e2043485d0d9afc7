use serde::Deserialize;

// ---------------------------------------------------------------------------
// Wire types for GET /v1/forecast
//
// Requested as:
//   current=temperature_2m,precipitation,wind_speed_10m
//   daily=temperature_2m_max,temperature_2m_min
//   timezone=auto
//
// Open-Meteo omits blocks that were not requested and may omit individual
// values; every field is therefore optional and normalized to 0 downstream.
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub current: Option<CurrentBlock>,
    #[serde(default)]
    pub daily: Option<DailyBlock>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CurrentBlock {
    pub temperature_2m: Option<f64>,
    pub precipitation: Option<f64>,
    pub wind_speed_10m: Option<f64>,
}

/// Daily values arrive as arrays, one entry per forecast day; index 0 is
/// today.
#[derive(Debug, Default, Deserialize)]
pub struct DailyBlock {
    #[serde(default)]
    pub temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    pub temperature_2m_min: Vec<Option<f64>>,
}

impl DailyBlock {
    pub fn today_max(&self) -> Option<f64> {
        self.temperature_2m_max.first().copied().flatten()
    }

    pub fn today_min(&self) -> Option<f64> {
        self.temperature_2m_min.first().copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_response_deserializes() {
        let raw = r#"{
            "latitude": 40.4, "longitude": -3.7, "timezone": "Europe/Madrid",
            "current": {"time": "2026-08-02T10:00", "temperature_2m": 36.2,
                        "precipitation": 0.0, "wind_speed_10m": 12.4},
            "daily": {"time": ["2026-08-02"], "temperature_2m_max": [38.1],
                      "temperature_2m_min": [21.5]}
        }"#;
        let resp: ForecastResponse = serde_json::from_str(raw).unwrap();
        let current = resp.current.unwrap();
        assert_eq!(current.temperature_2m, Some(36.2));
        assert_eq!(current.wind_speed_10m, Some(12.4));
        let daily = resp.daily.unwrap();
        assert_eq!(daily.today_max(), Some(38.1));
        assert_eq!(daily.today_min(), Some(21.5));
    }

    #[test]
    fn missing_blocks_deserialize_to_none() {
        let resp: ForecastResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.current.is_none());
        assert!(resp.daily.is_none());
    }

    #[test]
    fn missing_current_values_deserialize_to_none() {
        let raw = r#"{"current": {"time": "2026-08-02T10:00"}}"#;
        let resp: ForecastResponse = serde_json::from_str(raw).unwrap();
        let current = resp.current.unwrap();
        assert_eq!(current.temperature_2m, None);
        assert_eq!(current.precipitation, None);
    }

    #[test]
    fn empty_daily_arrays_yield_none() {
        let raw = r#"{"daily": {"temperature_2m_max": [], "temperature_2m_min": []}}"#;
        let resp: ForecastResponse = serde_json::from_str(raw).unwrap();
        let daily = resp.daily.unwrap();
        assert_eq!(daily.today_max(), None);
        assert_eq!(daily.today_min(), None);
    }
}
