use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::models::SensitivityProfile;

/// Registry key whose profile applies to any plant type without its own
/// entry. Its absence is a fatal configuration error.
pub const DEFAULT_PROFILE: &str = "default";

/// Immutable plant-type → sensitivity-profile lookup, built once at startup.
#[derive(Debug)]
pub struct SensitivityRegistry {
    profiles: HashMap<String, SensitivityProfile>,
    default_profile: SensitivityProfile,
}

impl SensitivityRegistry {
    pub fn new(profiles: HashMap<String, SensitivityProfile>) -> Result<Self> {
        let default_profile = profiles
            .get(DEFAULT_PROFILE)
            .cloned()
            .with_context(|| format!("sensitivity profiles must contain a {DEFAULT_PROFILE:?} entry"))?;
        Ok(Self {
            profiles,
            default_profile,
        })
    }

    /// Profile for `plant_type`, falling back to the default entry.
    pub fn resolve(&self, plant_type: &str) -> &SensitivityProfile {
        self.profiles.get(plant_type).unwrap_or(&self.default_profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(plant_type: &str, max_temp: f64) -> SensitivityProfile {
        SensitivityProfile {
            plant_type: plant_type.to_owned(),
            max_temperature: max_temp,
            min_temperature: 0.0,
            max_precipitation: 20.0,
            max_wind_speed: 50.0,
        }
    }

    #[test]
    fn resolve_returns_specific_profile() {
        let mut profiles = HashMap::new();
        profiles.insert("tomato".to_owned(), profile("tomato", 35.0));
        profiles.insert(DEFAULT_PROFILE.to_owned(), profile(DEFAULT_PROFILE, 38.0));
        let registry = SensitivityRegistry::new(profiles).unwrap();

        assert_eq!(registry.resolve("tomato").max_temperature, 35.0);
    }

    #[test]
    fn resolve_unknown_type_falls_back_to_default() {
        let mut profiles = HashMap::new();
        profiles.insert(DEFAULT_PROFILE.to_owned(), profile(DEFAULT_PROFILE, 38.0));
        let registry = SensitivityRegistry::new(profiles.clone()).unwrap();

        assert_eq!(registry.resolve("orchid"), &profiles[DEFAULT_PROFILE]);
    }

    #[test]
    fn missing_default_is_a_construction_error() {
        let mut profiles = HashMap::new();
        profiles.insert("tomato".to_owned(), profile("tomato", 35.0));
        let err = SensitivityRegistry::new(profiles).unwrap_err();
        assert!(err.to_string().contains("default"));
    }
}
