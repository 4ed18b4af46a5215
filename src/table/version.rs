//! ABI version and byte-order markers carried in every table header.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Version of a published capability table.
///
/// `major` is the ABI epoch: it only changes when the binary layout of an
/// already-published capability breaks, and a client accepts a table only
/// when the epochs match exactly. `minor` is the feature level: it grows
/// every time slots are appended, and a client accepts any table whose
/// feature level is at least the one it was compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbiVersion {
    /// ABI epoch.
    pub major: u32,
    /// Feature level within the epoch.
    pub minor: u32,
}

impl AbiVersion {
    /// Create a new version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Whether a table published at `self` can serve a client compiled
    /// against `required`.
    pub fn satisfies(&self, required: &AbiVersion) -> bool {
        self.major == required.major && self.minor >= required.minor
    }
}

impl PartialOrd for AbiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AbiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
    }
}

impl fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Byte order of the host that published a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the running process.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::native()
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Little => f.write_str("little-endian"),
            ByteOrder::Big => f.write_str("big-endian"),
        }
    }
}
