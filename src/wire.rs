//! Raw export layout.
//!
//! The word-level image of a table, for hosts that hand it across a
//! boundary as a plain blob:
//!
//! ```text
//! [version][length][byte order][slot 0][slot 1] ... [slot length-1]
//! ```
//!
//! `version` packs `major << 32 | minor`. Each slot word is the payload's
//! address, or 0 for a hole.

use std::num::NonZeroU64;

use thiserror::Error;

use crate::client::resolver::incompatibility;
use crate::error::{Bound, TableError};
use crate::table::{AbiVersion, ByteOrder, CapabilityTable, Ordinal, SlotKind};

/// Words before the first slot.
pub const HEADER_WORDS: usize = 3;

/// Byte-order marker for little-endian hosts.
pub const LITTLE_ENDIAN_MARKER: u64 = 1;
/// Byte-order marker for big-endian hosts.
pub const BIG_ENDIAN_MARKER: u64 = 2;

/// Hole sentinel.
pub const NULL_SLOT: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("export image has {words} words, shorter than the 3-word header")]
    Truncated { words: usize },

    #[error("export header declares {declared} slots but {found} follow it")]
    LengthMismatch { declared: u64, found: usize },

    #[error("unknown byte-order marker {0:#x}")]
    UnknownByteOrder(u64),
}

fn pack_version(version: AbiVersion) -> u64 {
    (u64::from(version.major) << 32) | u64::from(version.minor)
}

fn unpack_version(word: u64) -> AbiVersion {
    AbiVersion::new((word >> 32) as u32, word as u32)
}

fn byte_order_marker(order: ByteOrder) -> u64 {
    match order {
        ByteOrder::Little => LITTLE_ENDIAN_MARKER,
        ByteOrder::Big => BIG_ENDIAN_MARKER,
    }
}

/// Encode `table` as its raw export image.
pub fn encode(table: &CapabilityTable) -> Vec<u64> {
    let mut words = Vec::with_capacity(HEADER_WORDS + table.len());
    words.push(pack_version(table.version()));
    words.push(table.len() as u64);
    words.push(byte_order_marker(table.byte_order()));
    words.extend(
        table
            .slots()
            .iter()
            .map(|slot| slot.payload().map_or(NULL_SLOT, |p| p.address() as u64)),
    );
    words
}

/// Read-only view over a raw export image.
#[derive(Debug, Clone, Copy)]
pub struct RawTable<'a> {
    version: AbiVersion,
    byte_order: ByteOrder,
    slots: &'a [u64],
}

impl<'a> RawTable<'a> {
    /// Validate the header and slot count of `words`.
    pub fn parse(words: &'a [u64]) -> Result<Self, WireError> {
        if words.len() < HEADER_WORDS {
            return Err(WireError::Truncated { words: words.len() });
        }

        let version = unpack_version(words[0]);
        let declared = words[1];
        let byte_order = match words[2] {
            LITTLE_ENDIAN_MARKER => ByteOrder::Little,
            BIG_ENDIAN_MARKER => ByteOrder::Big,
            other => return Err(WireError::UnknownByteOrder(other)),
        };

        let slots = &words[HEADER_WORDS..];
        if declared != slots.len() as u64 {
            return Err(WireError::LengthMismatch {
                declared,
                found: slots.len(),
            });
        }

        Ok(Self {
            version,
            byte_order,
            slots,
        })
    }

    pub fn version(&self) -> AbiVersion {
        self.version
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Apply the same version gate as [`resolve`](crate::client::resolve).
    pub fn check(&self, symbol: &str, required: Bound) -> Result<(), TableError> {
        let available = Bound {
            version: self.version,
            length: self.len(),
            byte_order: self.byte_order,
        };
        match incompatibility(&required, &available) {
            Some(reason) => Err(TableError::IncompatibleVersion {
                symbol: symbol.to_string(),
                reason,
                required,
                available,
            }),
            None => Ok(()),
        }
    }

    /// Address stored at `ordinal`.
    pub fn slot(&self, ordinal: Ordinal, expected_kind: SlotKind) -> Result<NonZeroU64, TableError> {
        let word = self
            .slots
            .get(ordinal)
            .copied()
            .ok_or_else(|| TableError::OutOfRange {
                ordinal,
                name: format!("#{}", ordinal),
                length: self.slots.len(),
            })?;

        NonZeroU64::new(word).ok_or_else(|| TableError::HoleAccessed {
            ordinal,
            name: format!("#{}", ordinal),
            expected: expected_kind,
            version: self.version,
        })
    }
}
