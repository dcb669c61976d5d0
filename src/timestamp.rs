//! Second-precision zoned timestamps for file modification times.
//!
//! The textual form is `YYYY-MM-DD HH:MM:SS ±HHMM`. The offset is kept for
//! human readers of the sidecar; equality and ordering compare the absolute
//! instant, so the same moment recorded in two zones is one timestamp.

use chrono::{DateTime, Duration, FixedOffset, Local, LocalResult, TimeZone};
use filetime::FileTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// A calendar instant at second precision with a UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ZonedTimestamp(DateTime<FixedOffset>);

impl ZonedTimestamp {
    /// The current local time, truncated to whole seconds.
    pub fn now() -> Self {
        Self::truncate(Local::now().fixed_offset())
    }

    /// Read a file's modification time, truncated to whole seconds and
    /// expressed in the local zone.
    pub fn from_mtime(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let secs = FileTime::from_last_modification_time(&metadata).unix_seconds();
        match Local.timestamp_opt(secs, 0) {
            LocalResult::Single(dt) => Ok(Self(dt.fixed_offset())),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("mtime out of range for {}: {secs}", path.display()),
            )),
        }
    }

    /// Set a file's access and modification times to this instant.
    pub fn restore(&self, path: &Path) -> io::Result<()> {
        let t = FileTime::from_unix_time(self.0.timestamp(), 0);
        filetime::set_file_times(path, t, t)
    }

    /// Seconds since the Unix epoch.
    pub fn unix_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    fn truncate(dt: DateTime<FixedOffset>) -> Self {
        let subsec = i64::from(dt.timestamp_subsec_nanos());
        Self(dt - Duration::nanoseconds(subsec))
    }
}

impl fmt::Display for ZonedTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

/// Error returned when a timestamp string does not match the recorded form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid timestamp: {0}")]
pub struct ParseTimestampError(#[from] chrono::ParseError);

impl FromStr for ZonedTimestamp {
    type Err = ParseTimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(DateTime::parse_from_str(s, TIMESTAMP_FORMAT)?))
    }
}

impl Serialize for ZonedTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ZonedTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
