//! Species-relative vital sign ranges.

use serde::{Deserialize, Serialize};

/// Normal temperature (°C) and heart rate (bpm) range for a species.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeciesProfile {
    pub temp_low: f64,
    pub temp_high: f64,
    pub hr_low: f64,
    pub hr_high: f64,
}

/// Range used for species without a profile.
pub const GENERIC_PROFILE: SpeciesProfile = SpeciesProfile {
    temp_low: 38.0,
    temp_high: 39.5,
    hr_low: 60.0,
    hr_high: 120.0,
};

const PROFILES: &[(&str, SpeciesProfile)] = &[
    ("dog", SpeciesProfile { temp_low: 38.0, temp_high: 39.2, hr_low: 60.0, hr_high: 160.0 }),
    ("cat", SpeciesProfile { temp_low: 38.1, temp_high: 39.2, hr_low: 140.0, hr_high: 220.0 }),
    ("horse", SpeciesProfile { temp_low: 37.2, temp_high: 38.6, hr_low: 28.0, hr_high: 44.0 }),
    ("cow", SpeciesProfile { temp_low: 38.0, temp_high: 39.3, hr_low: 48.0, hr_high: 84.0 }),
    ("cattle", SpeciesProfile { temp_low: 38.0, temp_high: 39.3, hr_low: 48.0, hr_high: 84.0 }),
    ("sheep", SpeciesProfile { temp_low: 38.3, temp_high: 39.9, hr_low: 60.0, hr_high: 120.0 }),
    ("goat", SpeciesProfile { temp_low: 38.5, temp_high: 40.0, hr_low: 70.0, hr_high: 135.0 }),
    ("pig", SpeciesProfile { temp_low: 38.7, temp_high: 39.8, hr_low: 58.0, hr_high: 100.0 }),
    ("rabbit", SpeciesProfile { temp_low: 38.5, temp_high: 40.0, hr_low: 120.0, hr_high: 250.0 }),
];

/// Canonical species key shared by training, artifact directories and lookup.
///
/// Trimmed and lower-cased; characters outside `[a-z0-9_-]` become `_`, so
/// "Guinea Pig", "guinea_pig" and " GUINEA PIG " are one species.
pub fn species_key(species: &str) -> String {
    species
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

impl SpeciesProfile {
    /// Look up a species (case-insensitive), falling back to [`GENERIC_PROFILE`].
    pub fn for_species(species: &str) -> Self {
        Self::known(species).unwrap_or(GENERIC_PROFILE)
    }

    /// Profile for a species with a dedicated entry, if any.
    pub fn known(species: &str) -> Option<Self> {
        let lower = species.trim().to_lowercase();
        PROFILES
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, profile)| *profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_species_key() {
        assert_eq!(species_key("Dog"), "dog");
        assert_eq!(species_key(" Guinea Pig "), "guinea_pig");
        assert_eq!(species_key("guinea_pig"), "guinea_pig");
        assert_eq!(species_key("../etc"), "___etc");
    }

    #[test]
    fn test_known_species_lookup() {
        let dog = SpeciesProfile::for_species("Dog");
        assert_eq!(dog.temp_high, 39.2);
        assert_eq!(dog.hr_high, 160.0);
        assert_eq!(SpeciesProfile::for_species("CAT").hr_low, 140.0);
    }

    #[test]
    fn test_unknown_species_uses_generic() {
        assert!(SpeciesProfile::known("Llama").is_none());
        assert_eq!(SpeciesProfile::for_species("Llama"), GENERIC_PROFILE);
    }
}
