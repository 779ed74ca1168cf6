//! Timer configuration.
//!
//! Both periods are integers counted in *units* (one second unless
//! overridden). Values are clamped when the effective durations are
//! computed, so every source (environment, TOML, code) obeys the same
//! limits:
//!
//! | setting | default | minimum |
//! |---|---|---|
//! | `flush_delay` | 60 | 5 |
//! | `sync_interval` | disabled (`-1`) | 5 when enabled, `<= 0` disables |
//!
//! Every effective period is also capped at [`MAX_EFFECTIVE_PERIOD`].
//! Unparseable values fall back to the default without failing.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// Environment variable holding the flush delay in units.
pub const FLUSH_DELAY_ENV: &str = "PREFSYNC_FLUSH_DELAY";
/// Environment variable holding the periodic sync interval in units.
pub const SYNC_INTERVAL_ENV: &str = "PREFSYNC_SYNC_INTERVAL";

pub const DEFAULT_FLUSH_DELAY: i64 = 60;
pub const DEFAULT_SYNC_INTERVAL: i64 = -1;
/// Smallest flush delay or enabled sync interval, in units.
pub const MIN_PERIOD: i64 = 5;
pub const DEFAULT_UNIT_MS: u64 = 1000;
/// Upper bound on any effective period, whatever the unit and count.
pub const MAX_EFFECTIVE_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

static PROCESS_CONFIG: OnceLock<SyncConfig> = OnceLock::new();

/// Flush and sync timing for a [`Synchronizer`](crate::Synchronizer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Units between the first dirty mutation and the automatic flush.
    pub flush_delay: i64,
    /// Units between automatic full syncs; `<= 0` disables them.
    pub sync_interval: i64,
    /// Length of one unit in milliseconds.
    pub unit_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flush_delay: DEFAULT_FLUSH_DELAY,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            unit_ms: DEFAULT_UNIT_MS,
        }
    }
}

impl SyncConfig {
    /// The process-wide configuration, read from the environment on first
    /// use and cached for the life of the process.
    pub fn process() -> &'static SyncConfig {
        PROCESS_CONFIG.get_or_init(Self::from_env)
    }

    /// Read [`FLUSH_DELAY_ENV`] and [`SYNC_INTERVAL_ENV`].
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from a name-to-string lookup. Names are the
    /// environment variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            flush_delay: parse_or(FLUSH_DELAY_ENV, lookup(FLUSH_DELAY_ENV), DEFAULT_FLUSH_DELAY),
            sync_interval: parse_or(
                SYNC_INTERVAL_ENV,
                lookup(SYNC_INTERVAL_ENV),
                DEFAULT_SYNC_INTERVAL,
            ),
            unit_ms: DEFAULT_UNIT_MS,
        }
    }

    /// Parse a TOML document with optional `flush_delay`, `sync_interval`
    /// and `unit_ms` keys. Values may be integers or numeric strings; a
    /// malformed document or value yields the default for that setting.
    pub fn from_toml_str(text: &str) -> Self {
        let table = match text.parse::<toml::Table>() {
            Ok(table) => table,
            Err(e) => {
                debug!(error = %e, "unparseable sync configuration; using defaults");
                return Self::default();
            }
        };
        let raw = |key: &str| -> Option<String> {
            match table.get(key)? {
                toml::Value::Integer(i) => Some(i.to_string()),
                toml::Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            }
        };
        Self {
            flush_delay: parse_or("flush_delay", raw("flush_delay"), DEFAULT_FLUSH_DELAY),
            sync_interval: parse_or("sync_interval", raw("sync_interval"), DEFAULT_SYNC_INTERVAL),
            unit_ms: parse_or("unit_ms", raw("unit_ms"), DEFAULT_UNIT_MS),
        }
    }

    /// Load a TOML configuration file. Only failing to read the file is an
    /// error; its contents are interpreted as in [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SyncError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_toml_str(&text))
    }

    pub fn with_flush_delay(mut self, units: i64) -> Self {
        self.flush_delay = units;
        self
    }

    pub fn with_sync_interval(mut self, units: i64) -> Self {
        self.sync_interval = units;
        self
    }

    /// Change the unit length, e.g. to milliseconds in tests.
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit_ms = unit.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn unit(&self) -> Duration {
        Duration::from_millis(self.unit_ms.max(1))
    }

    /// Effective flush delay after clamping.
    pub fn flush_delay(&self) -> Duration {
        scaled(self.unit(), self.flush_delay)
    }

    /// Effective sync interval after clamping, or `None` when disabled.
    pub fn sync_interval(&self) -> Option<Duration> {
        if self.sync_interval <= 0 {
            None
        } else {
            Some(scaled(self.unit(), self.sync_interval))
        }
    }
}

/// `units` of `unit`, with at least [`MIN_PERIOD`] units and at most
/// [`MAX_EFFECTIVE_PERIOD`] in total.
fn scaled(unit: Duration, units: i64) -> Duration {
    let units = units.clamp(MIN_PERIOD, i64::from(u32::MAX)) as u32;
    unit.checked_mul(units)
        .map_or(MAX_EFFECTIVE_PERIOD, |period| period.min(MAX_EFFECTIVE_PERIOD))
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            debug!(setting = name, value = %raw, default = %default, "ignoring malformed value");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let c = SyncConfig::default();
        assert_eq!(c.flush_delay(), Duration::from_secs(60));
        assert_eq!(c.sync_interval(), None);
    }

    #[test]
    fn env_values_are_read() {
        let c = SyncConfig::from_lookup(lookup(&[
            (FLUSH_DELAY_ENV, "30"),
            (SYNC_INTERVAL_ENV, " 120 "),
        ]));
        assert_eq!(c.flush_delay(), Duration::from_secs(30));
        assert_eq!(c.sync_interval(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn short_periods_are_clamped() {
        let c = SyncConfig::default().with_flush_delay(1).with_sync_interval(2);
        assert_eq!(c.flush_delay(), Duration::from_secs(5));
        assert_eq!(c.sync_interval(), Some(Duration::from_secs(5)));

        let c = SyncConfig::default().with_flush_delay(-10);
        assert_eq!(c.flush_delay(), Duration::from_secs(5));
    }

    #[test]
    fn non_positive_interval_disables_sync() {
        for units in [0, -1, i64::MIN] {
            let c = SyncConfig::default().with_sync_interval(units);
            assert_eq!(c.sync_interval(), None);
        }
    }

    #[test]
    fn malformed_values_fall_back() {
        let c = SyncConfig::from_lookup(lookup(&[
            (FLUSH_DELAY_ENV, "soon"),
            (SYNC_INTERVAL_ENV, "1.5"),
        ]));
        assert_eq!(c.flush_delay, DEFAULT_FLUSH_DELAY);
        assert_eq!(c.sync_interval, DEFAULT_SYNC_INTERVAL);
    }

    #[test]
    fn unit_scales_periods() {
        let c = SyncConfig::default()
            .with_unit(Duration::from_millis(10))
            .with_flush_delay(7);
        assert_eq!(c.flush_delay(), Duration::from_millis(70));
    }

    #[test]
    fn huge_periods_saturate() {
        let c = SyncConfig::from_toml_str(
            "unit_ms = \"18446744073709551615\"\nflush_delay = 4294967295\nsync_interval = 4294967295",
        );
        assert_eq!(c.unit_ms, u64::MAX);
        assert_eq!(c.flush_delay(), MAX_EFFECTIVE_PERIOD);
        assert_eq!(c.sync_interval(), Some(MAX_EFFECTIVE_PERIOD));

        let c = SyncConfig::default()
            .with_unit(Duration::MAX)
            .with_flush_delay(i64::MAX);
        assert_eq!(c.flush_delay(), MAX_EFFECTIVE_PERIOD);
    }

    #[test]
    fn toml_values() {
        let c = SyncConfig::from_toml_str(
            r#"
            flush_delay = 10
            sync_interval = "20"
            unit_ms = 100
            "#,
        );
        assert_eq!(c.flush_delay(), Duration::from_secs(1));
        assert_eq!(c.sync_interval(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn toml_malformed_falls_back() {
        assert_eq!(SyncConfig::from_toml_str("flush_delay = ["), SyncConfig::default());

        let c = SyncConfig::from_toml_str("flush_delay = true\nsync_interval = 9");
        assert_eq!(c.flush_delay, DEFAULT_FLUSH_DELAY);
        assert_eq!(c.sync_interval, 9);
    }

    #[test]
    fn load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SyncConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, SyncError::ConfigRead { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefsync.toml");
        std::fs::write(&path, "flush_delay = 15\n").unwrap();
        let c = SyncConfig::load(&path).unwrap();
        assert_eq!(c.flush_delay(), Duration::from_secs(15));
    }

    #[test]
    fn serde_round_trip_with_defaults() {
        let c: SyncConfig = serde_json::from_str(r#"{"flush_delay": 12}"#).unwrap();
        assert_eq!(c.flush_delay, 12);
        assert_eq!(c.sync_interval, DEFAULT_SYNC_INTERVAL);
        assert_eq!(c.unit_ms, DEFAULT_UNIT_MS);
    }
}
