use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::models::{Garden, SensitivityProfile};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Twilio credentials. SMS is enabled only when the full triad is present.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Base URL of the plants/users backend.
    pub backend_url: String,
    /// MongoDB connection string; absent means the history store is disabled.
    pub mongo_url: Option<String>,
    /// Present only when the full Twilio triad is configured.
    pub twilio: Option<TwilioConfig>,
    pub twilio_base_url: String,
    pub open_meteo_base_url: String,
    pub gardens_path: String,
    pub profiles_path: String,
    /// Evaluation round interval in seconds.
    pub poll_interval_secs: u64,
    /// Plant cache refresh interval in seconds.
    pub cache_refresh_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server_port: optional("PORT", "3000")
                .parse()
                .context("PORT must be a valid port number")?,
            backend_url: required("BACKEND_URL")?,
            mongo_url: std::env::var("MONGO_URL").ok().filter(|s| !s.is_empty()),
            twilio: twilio_from_env(),
            twilio_base_url: optional("TWILIO_BASE_URL", "https://api.twilio.com"),
            open_meteo_base_url: optional("OPEN_METEO_BASE_URL", "https://api.open-meteo.com"),
            gardens_path: optional("GARDENS_CONFIG", "gardens.config.json"),
            profiles_path: optional("PROFILES_CONFIG", "plant-sensitivity-profiles.json"),
            poll_interval_secs: optional("POLL_INTERVAL_SECS", "300")
                .parse()
                .context("POLL_INTERVAL_SECS must be a positive integer")?,
            cache_refresh_interval_secs: optional("CACHE_REFRESH_INTERVAL_SECS", "86400")
                .parse()
                .context("CACHE_REFRESH_INTERVAL_SECS must be a positive integer")?,
        })
    }
}

/// Missing or empty values in the triad disable SMS rather than failing.
fn twilio_from_env() -> Option<TwilioConfig> {
    let get = |key: &str| std::env::var(key).ok().filter(|s| !s.is_empty());
    Some(TwilioConfig {
        account_sid: get("TWILIO_ACCOUNT_SID")?,
        auth_token: get("TWILIO_AUTH_TOKEN")?,
        from_number: get("TWILIO_PHONE_NUMBER")?,
    })
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

// ---------------------------------------------------------------------------
// Gardens file
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GardensFile {
    gardens: Vec<Garden>,
}

pub fn load_gardens(path: &str) -> Result<Vec<Garden>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read gardens config: {path}"))?;
    parse_gardens(&raw).with_context(|| format!("invalid gardens config: {path}"))
}

/// Parse and validate the gardens file. Missing fields or out-of-range
/// coordinates are fatal.
fn parse_gardens(raw: &str) -> Result<Vec<Garden>> {
    let file: GardensFile = serde_json::from_str(raw)?;
    for g in &file.gardens {
        if !(-90.0..=90.0).contains(&g.latitude) {
            bail!("garden {:?}: latitude {} out of range [-90, 90]", g.garden_id, g.latitude);
        }
        if !(-180.0..=180.0).contains(&g.longitude) {
            bail!("garden {:?}: longitude {} out of range [-180, 180]", g.garden_id, g.longitude);
        }
        if g.garden_id.is_empty() {
            bail!("garden with empty gardenId");
        }
    }
    Ok(file.gardens)
}

// ---------------------------------------------------------------------------
// Sensitivity profiles file
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProfilesFile {
    profiles: HashMap<String, SensitivityProfile>,
}

pub fn load_profiles(path: &str) -> Result<HashMap<String, SensitivityProfile>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read sensitivity profiles: {path}"))?;
    parse_profiles(&raw).with_context(|| format!("invalid sensitivity profiles: {path}"))
}

/// Parse and validate the profiles file. A profile whose temperature window
/// is empty or inverted is fatal. Presence of the `"default"` entry is
/// checked when the registry is built.
fn parse_profiles(raw: &str) -> Result<HashMap<String, SensitivityProfile>> {
    let file: ProfilesFile = serde_json::from_str(raw)?;
    for (key, p) in &file.profiles {
        if p.min_temperature >= p.max_temperature {
            bail!(
                "profile {:?}: minTemperature ({}) must be below maxTemperature ({})",
                key,
                p.min_temperature,
                p.max_temperature
            );
        }
    }
    Ok(file.profiles)
}
