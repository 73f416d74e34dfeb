//! Heuristic noise analysis.
//!
//! A statistics pass over the file yields overall RMS and peak levels; the
//! dynamic range between them classifies the dominant noise and recommends a
//! treatment level. Analysis is advisory: any failure degrades to a default
//! profile instead of propagating.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::audio::processor::{AudioStats, AudioTransform};
use crate::config::{NoiseCategory, TreatmentLevel};

/// Transient description of the noise in one recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseProfile {
    pub category: NoiseCategory,
    /// Severity score, 0-100.
    pub severity: u8,
    pub recommended: TreatmentLevel,
}

impl NoiseProfile {
    /// Fallback profile when the measurement pass fails.
    pub fn default_profile() -> Self {
        Self {
            category: NoiseCategory::Mixed,
            severity: 50,
            recommended: TreatmentLevel::Medium,
        }
    }
}

/// Classifies noise from overall levels. Pure function of (RMS, peak).
///
/// A small dynamic range means the noise floor sits close to the signal;
/// a very quiet signal (RMS below -40 dB) implies a high relative noise
/// floor even when the range looks healthy, so severity and treatment are
/// raised in that case.
pub fn classify(rms_db: f64, peak_db: f64) -> NoiseProfile {
    let dynamic_range = peak_db - rms_db;
    let mut profile = if dynamic_range < 10.0 {
        NoiseProfile {
            category: NoiseCategory::WhiteNoise,
            severity: 70,
            recommended: TreatmentLevel::Strong,
        }
    } else if dynamic_range < 20.0 {
        NoiseProfile {
            category: NoiseCategory::RoomTone,
            severity: 40,
            recommended: TreatmentLevel::Medium,
        }
    } else if dynamic_range < 30.0 {
        NoiseProfile {
            category: NoiseCategory::Hum,
            severity: 15,
            recommended: TreatmentLevel::Light,
        }
    } else {
        NoiseProfile {
            category: NoiseCategory::Mixed,
            severity: 0,
            recommended: TreatmentLevel::None,
        }
    };

    if rms_db < -40.0 {
        profile.severity = profile.severity.max(50);
        if matches!(
            profile.recommended,
            TreatmentLevel::None | TreatmentLevel::Light
        ) {
            profile.recommended = TreatmentLevel::Medium;
        }
    }
    profile
}

/// Measures `src` and classifies the result. Never fails: a broken file or
/// missing tool yields the default profile.
pub async fn analyze(transform: &dyn AudioTransform, src: &Path) -> NoiseProfile {
    match transform.measure_stats(src).await {
        Ok(AudioStats { rms_db, peak_db }) => {
            let profile = classify(rms_db, peak_db);
            debug!(
                "noise analysis of {}: rms {:.1} dB, peak {:.1} dB -> {:?}",
                src.display(),
                rms_db,
                peak_db,
                profile
            );
            profile
        }
        Err(e) => {
            warn!(
                "noise analysis failed for {}: {}; using default profile",
                src.display(),
                e
            );
            NoiseProfile::default_profile()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_range_is_white_noise() {
        // 5 dB dynamic range.
        let profile = classify(-15.0, -10.0);
        assert_eq!(profile.category, NoiseCategory::WhiteNoise);
        assert_eq!(profile.severity, 70);
        assert_eq!(profile.recommended, TreatmentLevel::Strong);
    }

    #[test]
    fn test_mid_range_is_room_tone() {
        // 15 dB dynamic range.
        let profile = classify(-20.0, -5.0);
        assert_eq!(profile.category, NoiseCategory::RoomTone);
        assert_eq!(profile.severity, 40);
        assert_eq!(profile.recommended, TreatmentLevel::Medium);
    }

    #[test]
    fn test_wide_range_is_hum() {
        // 25 dB dynamic range.
        let profile = classify(-30.0, -5.0);
        assert_eq!(profile.category, NoiseCategory::Hum);
        assert_eq!(profile.severity, 15);
        assert_eq!(profile.recommended, TreatmentLevel::Light);
    }

    #[test]
    fn test_very_wide_range_needs_nothing() {
        let profile = classify(-35.0, -2.0);
        assert_eq!(profile.severity, 0);
        assert_eq!(profile.recommended, TreatmentLevel::None);
    }

    #[test]
    fn test_quiet_signal_override() {
        // 35 dB range would mean no treatment, but the signal is very quiet.
        let profile = classify(-45.0, -10.0);
        assert!(profile.severity >= 50);
        assert_eq!(profile.recommended, TreatmentLevel::Medium);
    }

    #[test]
    fn test_quiet_override_never_lowers_strong() {
        // 5 dB range and very quiet: severity stays at 70, level at Strong.
        let profile = classify(-45.0, -40.0);
        assert_eq!(profile.severity, 70);
        assert_eq!(profile.recommended, TreatmentLevel::Strong);
    }
}
