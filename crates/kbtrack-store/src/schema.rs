//! On-disk schema versioning for safe upgrades.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema version stamped into persisted live-session files.
///
/// Uses major.minor:
/// - Major version bump: breaking changes, incompatible
/// - Minor version bump: additive fields, backward compatible
///
/// Files without a version predate versioning and go through the legacy
/// decoder instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    pub major: u16,
    pub minor: u16,
}

impl SchemaVersion {
    /// Current schema version.
    pub const CURRENT: SchemaVersion = SchemaVersion { major: 2, minor: 0 };

    /// Creates a new SchemaVersion.
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Parses a version string like "2.0".
    pub fn parse(s: &str) -> Result<Self, String> {
        let invalid = || format!("Invalid schema version: {s}");
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        let major = major.parse::<u16>().map_err(|_| invalid())?;
        let minor = minor.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self { major, minor })
    }

    /// Returns true if this version can be read by a `other` reader.
    pub fn is_compatible_with(&self, other: &SchemaVersion) -> bool {
        self.major == other.major
    }

    /// Returns true if this version is newer than another.
    pub fn is_newer_than(&self, other: &SchemaVersion) -> bool {
        (self.major, self.minor) > (other.major, other.minor)
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SchemaVersion> for String {
    fn from(version: SchemaVersion) -> Self {
        version.to_string()
    }
}
