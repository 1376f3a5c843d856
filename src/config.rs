use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default snapshot location, relative to the working directory
pub const DEFAULT_DATA_FILE: &str = "web/static/data/aircraft.json";

/// Longest age or threshold accepted, in seconds (one year). Larger ages are
/// clamped here so `now - age` can never overflow.
pub const MAX_AGE_SECS: f64 = 365.0 * 24.0 * 3600.0;

/// Tunable limits shared by the live-state gate, the path accumulator and the archiver.
///
/// `stale_after` is the single staleness clock: the live-state freshness gate,
/// live-state expiry and path archival all read it from here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Reports older than this never touch live state; rows older than this expire
    pub stale_after: TimeDelta,
    /// A position is only appended to a track when `seen_pos` is within this bound
    pub position_fresh: TimeDelta,
    /// Minimum track duration (last_seen - start_time) for promotion
    pub min_duration: TimeDelta,
    /// Minimum number of points for promotion
    pub min_points: usize,
    /// Minimum polyline length in kilometers for promotion
    pub min_distance_km: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            stale_after: TimeDelta::seconds(60),
            position_fresh: TimeDelta::seconds(15),
            min_duration: TimeDelta::seconds(20),
            min_points: 4,
            min_distance_km: 0.3,
        }
    }
}

impl Thresholds {
    /// Anything whose last_seen is strictly before this instant is stale
    pub fn stale_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.stale_after)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn validate(&self) -> Result<()> {
        let max_age = seconds_to_delta(MAX_AGE_SECS);
        for (name, value) in [
            ("stale_after", self.stale_after),
            ("position_fresh", self.position_fresh),
            ("min_duration", self.min_duration),
        ] {
            if value > max_age {
                anyhow::bail!("{} must be at most {}s, got {}", name, MAX_AGE_SECS, value);
            }
        }
        if self.stale_after <= TimeDelta::zero() {
            anyhow::bail!("stale_after must be positive, got {}", self.stale_after);
        }
        if self.position_fresh <= TimeDelta::zero() {
            anyhow::bail!(
                "position_fresh must be positive, got {}",
                self.position_fresh
            );
        }
        if self.min_duration < TimeDelta::zero() {
            anyhow::bail!("min_duration cannot be negative");
        }
        if !self.min_distance_km.is_finite() || self.min_distance_km < 0.0 {
            anyhow::bail!(
                "min_distance_km must be a non-negative number, got {}",
                self.min_distance_km
            );
        }
        Ok(())
    }
}

/// Convert a receiver age in (possibly fractional) seconds to a TimeDelta.
/// Negative ages are clamped to zero, ages beyond [`MAX_AGE_SECS`] to that ceiling.
pub fn seconds_to_delta(secs: f64) -> TimeDelta {
    if !secs.is_finite() || secs <= 0.0 {
        return TimeDelta::zero();
    }
    TimeDelta::milliseconds((secs.min(MAX_AGE_SECS) * 1000.0).round() as i64)
}

/// Ingest configuration file layout (TOML, snake_case, all keys optional)
///
/// ```toml
/// data_file = "/run/dump1090/aircraft.json"
/// poll_interval_secs = 2
/// stale_after_secs = 60
/// position_fresh_secs = 15
/// min_duration_secs = 20
/// min_points = 4
/// min_distance_km = 0.3
/// metrics_port = 9091
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfigFile {
    pub data_file: Option<PathBuf>,
    pub poll_interval_secs: Option<f64>,
    pub stale_after_secs: Option<f64>,
    pub position_fresh_secs: Option<f64>,
    pub min_duration_secs: Option<f64>,
    pub min_points: Option<usize>,
    pub min_distance_km: Option<f64>,
    pub metrics_port: Option<u16>,
}

impl IngestConfigFile {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse {:?}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Layer `overrides` on top of this file; any value set in `overrides` wins
    pub fn merged_with(self, overrides: IngestConfigFile) -> IngestConfigFile {
        IngestConfigFile {
            data_file: overrides.data_file.or(self.data_file),
            poll_interval_secs: overrides.poll_interval_secs.or(self.poll_interval_secs),
            stale_after_secs: overrides.stale_after_secs.or(self.stale_after_secs),
            position_fresh_secs: overrides.position_fresh_secs.or(self.position_fresh_secs),
            min_duration_secs: overrides.min_duration_secs.or(self.min_duration_secs),
            min_points: overrides.min_points.or(self.min_points),
            min_distance_km: overrides.min_distance_km.or(self.min_distance_km),
            metrics_port: overrides.metrics_port.or(self.metrics_port),
        }
    }
}

/// Fully resolved settings for the ingest worker
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub data_file: PathBuf,
    pub poll_interval: Duration,
    pub thresholds: Thresholds,
    pub metrics_port: Option<u16>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            poll_interval: Duration::from_secs(2),
            thresholds: Thresholds::default(),
            metrics_port: None,
        }
    }
}

impl TryFrom<IngestConfigFile> for IngestSettings {
    type Error = anyhow::Error;

    fn try_from(file: IngestConfigFile) -> Result<Self> {
        let defaults = IngestSettings::default();
        let delta_or = |value: Option<f64>, fallback: TimeDelta| value.map_or(fallback, seconds_to_delta);

        let poll_interval = match file.poll_interval_secs {
            Some(secs) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(secs),
            Some(secs) => anyhow::bail!("poll_interval_secs must be positive, got {}", secs),
            None => defaults.poll_interval,
        };

        let thresholds = Thresholds {
            stale_after: delta_or(file.stale_after_secs, defaults.thresholds.stale_after),
            position_fresh: delta_or(file.position_fresh_secs, defaults.thresholds.position_fresh),
            min_duration: delta_or(file.min_duration_secs, defaults.thresholds.min_duration),
            min_points: file.min_points.unwrap_or(defaults.thresholds.min_points),
            min_distance_km: file
                .min_distance_km
                .unwrap_or(defaults.thresholds.min_distance_km),
        };
        thresholds.validate()?;

        Ok(Self {
            data_file: file.data_file.unwrap_or(defaults.data_file),
            poll_interval,
            thresholds,
            metrics_port: file.metrics_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_thresholds() {
        let t = Thresholds::default();
        assert_eq!(t.min_duration, TimeDelta::seconds(20));
        assert_eq!(t.min_points, 4);
        assert_eq!(t.min_distance_km, 0.3);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_seconds_to_delta() {
        assert_eq!(seconds_to_delta(5.0), TimeDelta::seconds(5));
        assert_eq!(seconds_to_delta(0.25), TimeDelta::milliseconds(250));
        assert_eq!(seconds_to_delta(-3.0), TimeDelta::zero());
        assert_eq!(seconds_to_delta(f64::NAN), TimeDelta::zero());
        assert_eq!(seconds_to_delta(1e13), TimeDelta::days(365));
        assert_eq!(seconds_to_delta(f64::MAX), TimeDelta::days(365));
    }

    #[test]
    fn test_stale_cutoff_saturates() {
        let t = Thresholds {
            stale_after: TimeDelta::MAX,
            ..Thresholds::default()
        };
        assert_eq!(t.stale_cutoff(Utc::now()), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_stale_cutoff() {
        let now = DateTime::parse_from_rfc3339("2025-01-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let t = Thresholds {
            stale_after: TimeDelta::seconds(30),
            ..Thresholds::default()
        };
        assert_eq!(t.stale_cutoff(now), now - TimeDelta::seconds(30));
    }

    #[test]
    fn test_parse_file_and_override() {
        let file = IngestConfigFile::parse(
            r#"
            data_file = "/tmp/aircraft.json"
            stale_after_secs = 30
            min_points = 6
            "#,
        )
        .unwrap();

        let overrides = IngestConfigFile {
            min_points: Some(5),
            ..Default::default()
        };
        let settings = IngestSettings::try_from(file.merged_with(overrides)).unwrap();

        assert_eq!(settings.data_file, PathBuf::from("/tmp/aircraft.json"));
        assert_eq!(settings.thresholds.stale_after, TimeDelta::seconds(30));
        assert_eq!(settings.thresholds.min_points, 5);
        assert_eq!(settings.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(IngestConfigFile::parse("stale_after = 30").is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = IngestConfigFile {
            stale_after_secs: Some(0.0),
            ..Default::default()
        };
        assert!(IngestSettings::try_from(file).is_err());

        let file = IngestConfigFile {
            poll_interval_secs: Some(-1.0),
            ..Default::default()
        };
        assert!(IngestSettings::try_from(file).is_err());

        let thresholds = Thresholds {
            stale_after: TimeDelta::days(366),
            ..Thresholds::default()
        };
        assert!(thresholds.validate().is_err());

        let file = IngestConfigFile {
            min_distance_km: Some(-0.1),
            ..Default::default()
        };
        assert!(IngestSettings::try_from(file).is_err());
    }
}
