//! TOML configuration and the client-datetime boundary.
//!
//! All storage is UTC. Client-facing datetime strings are ISO-8601; a
//! timezone-less string is interpreted in the configured zone and converted
//! to an absolute UTC instant on the way in. Display conversion back happens
//! here too, never inside the core logic.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::matching::ScoringPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// IANA zone used to interpret timezone-less client datetimes and to
    /// render output.
    pub timezone: String,
    pub scoring: ScoringPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timezone: "UTC".to_string(),
            scoring: ScoringPolicy::default(),
        }
    }
}

impl Config {
    /// Loads config from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::misconfigured(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&raw)
            .map_err(|e| Error::misconfigured(format!("invalid config {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| Error::misconfigured(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path, raw)
            .map_err(|e| Error::misconfigured(format!("cannot write {}: {}", path.display(), e)))
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|_| Error::misconfigured(format!("unknown timezone '{}'", self.timezone)))
    }
}

/// Parses a client-supplied ISO-8601 datetime. Offset-carrying strings are
/// taken at face value; naive ones are interpreted in `tz`. Bad input is a
/// validation error, never fatal.
pub fn parse_client_datetime(s: &str, tz: Tz) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .map_err(|_| Error::validation(format!("invalid datetime format '{}'", s)))?;

    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            Error::validation(format!("datetime '{}' does not exist in zone {}", s, tz))
        })
}

/// Renders a stored UTC instant in the configured display zone.
pub fn format_local(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string()
}
