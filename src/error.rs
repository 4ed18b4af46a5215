//! Resolution errors.
//!
//! Every variant is fatal to the client module that hits it. They are all
//! raised while the module is being loaded, never deferred to the first call
//! of a capability.

use std::fmt;

use thiserror::Error;

use crate::table::{AbiVersion, ByteOrder, Ordinal, SlotKind};

/// Which compatibility boundary a table failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incompatibility {
    /// The ABI epochs differ.
    AbiEpoch,
    /// The table's feature level is older than the client's.
    FeatureLevel,
    /// The table has fewer slots than the client's contract declares or uses.
    Length,
    /// The table was published for a different byte order.
    ByteOrder,
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Incompatibility::AbiEpoch => "ABI epoch mismatch",
            Incompatibility::FeatureLevel => "feature level too old",
            Incompatibility::Length => "table too short",
            Incompatibility::ByteOrder => "byte order mismatch",
        };
        f.write_str(s)
    }
}

/// Version, length and byte order on one side of a compatibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bound {
    pub version: AbiVersion,
    pub length: usize,
    pub byte_order: ByteOrder,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version {}, {} slots, {}",
            self.version, self.length, self.byte_order
        )
    }
}

/// Errors raised while locating, gating or reading a capability table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// The host table is older, shorter, or otherwise incompatible with
    /// the contract the client was built against.
    #[error("`{symbol}`: {reason}: client requires {required}, host provides {available}")]
    IncompatibleVersion {
        symbol: String,
        reason: Incompatibility,
        required: Bound,
        available: Bound,
    },

    /// The slot exists but holds no capability.
    #[error("capability `{name}` (ordinal {ordinal}, {expected}) is not provided by table version {version}")]
    HoleAccessed {
        ordinal: Ordinal,
        name: String,
        expected: SlotKind,
        version: AbiVersion,
    },

    /// The ordinal lies past the end of the table.
    #[error("capability `{name}` (ordinal {ordinal}) is beyond the table length {length}")]
    OutOfRange {
        ordinal: Ordinal,
        name: String,
        length: usize,
    },

    /// No table has been published under the symbol.
    #[error("no capability table is published under `{symbol}`")]
    NotPublished { symbol: String },

    /// The client's own contract is malformed: entries past its declared
    /// length, colliding ordinals or names, or a dependency on a reserved slot.
    #[error("contract for `{symbol}` is invalid: {reason}")]
    InvalidContract { symbol: String, reason: String },

    /// The payload at an ordinal is not the shape the client expects.
    #[error("capability `{name}` (ordinal {ordinal}) does not hold a `{expected}`")]
    LayoutMismatch {
        ordinal: Ordinal,
        name: String,
        expected: &'static str,
    },
}

impl TableError {
    /// Relabel a slot error with the client's name for the capability.
    pub(crate) fn for_capability(self, capability: &str) -> Self {
        match self {
            TableError::HoleAccessed {
                ordinal,
                expected,
                version,
                ..
            } => TableError::HoleAccessed {
                ordinal,
                name: capability.to_string(),
                expected,
                version,
            },
            TableError::OutOfRange {
                ordinal, length, ..
            } => TableError::OutOfRange {
                ordinal,
                name: capability.to_string(),
                length,
            },
            other => other,
        }
    }
}
