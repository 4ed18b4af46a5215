//! # Capability tables
//!
//! A capability table is a flat, ordinal-indexed sequence of slots that a
//! host library publishes once, at initialization, for every client module
//! to read.
//!
//! ## Lifecycle
//!
//! 1. The host loads its [`ReleaseManifest`] (the append-only ordering
//!    record for the current release) and fills a [`HostRegistry`].
//! 2. [`builder::build`] pairs the two into a [`CapabilityTable`].
//! 3. An [`ExportPoint`](crate::export::ExportPoint) publishes the table
//!    exactly once; from then on it is immutable and shared by reference.
//!
//! Ordinal stability is the whole point: slot *i* means the same capability
//! in every release of an ABI epoch, holes are never refilled, and the table
//! only grows at the end.

pub mod builder;
pub mod manifest;
pub mod registry;
pub mod slot;
pub mod version;

pub use builder::{build, build_for, BuildError};
pub use manifest::{ManifestError, ManifestSlot, ReleaseHistory, ReleaseManifest};
pub use registry::HostRegistry;
pub use slot::{Ordinal, Payload, Slot, SlotKind, SlotState};
pub use version::{AbiVersion, ByteOrder};

use crate::error::TableError;

/// Immutable table of capabilities for one release.
#[derive(Debug)]
pub struct CapabilityTable {
    version: AbiVersion,
    byte_order: ByteOrder,
    slots: Vec<Slot>,
}

impl CapabilityTable {
    /// Assemble a table from slots already ordered by ordinal.
    pub(crate) fn from_slots(version: AbiVersion, byte_order: ByteOrder, slots: Vec<Slot>) -> Self {
        debug_assert!(slots.iter().enumerate().all(|(i, s)| s.ordinal == i));
        Self {
            version,
            byte_order,
            slots,
        }
    }

    pub fn version(&self) -> AbiVersion {
        self.version
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Number of slots, holes included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All slots, in ordinal order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// The slot at `ordinal`, hole or not.
    pub fn slot(&self, ordinal: Ordinal) -> Option<&Slot> {
        self.slots.get(ordinal)
    }

    /// Number of permanently empty slots.
    pub fn hole_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_hole()).count()
    }

    /// Read the payload at `ordinal`.
    ///
    /// `expected_kind` is only reported back in errors: whether the ordinal
    /// really holds that kind is the client's compile-time contract, not
    /// something the table checks.
    pub fn get(&self, ordinal: Ordinal, expected_kind: SlotKind) -> Result<&Payload, TableError> {
        let slot = self.slots.get(ordinal).ok_or_else(|| TableError::OutOfRange {
            ordinal,
            name: format!("#{}", ordinal),
            length: self.slots.len(),
        })?;

        slot.payload().ok_or_else(|| TableError::HoleAccessed {
            ordinal,
            name: slot.label().to_string(),
            expected: expected_kind,
            version: self.version,
        })
    }

    /// Look a slot up by its host-side name.
    pub fn find(&self, name: &str) -> Option<&Slot> {
        self.slots
            .iter()
            .find(|s| s.name.as_deref() == Some(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fn_a() -> i32 {
        1
    }

    fn table() -> CapabilityTable {
        CapabilityTable::from_slots(
            AbiVersion::new(1, 3),
            ByteOrder::native(),
            vec![
                Slot {
                    ordinal: 0,
                    name: Some("fn_a".into()),
                    kind: SlotKind::Function,
                    state: SlotState::Present(Payload::new(fn_a as fn() -> i32)),
                },
                Slot {
                    ordinal: 1,
                    name: None,
                    kind: SlotKind::Reserved,
                    state: SlotState::Retracted,
                },
            ],
        )
    }

    #[test]
    fn test_get_present_slot() {
        let table = table();
        let payload = table.get(0, SlotKind::Function).unwrap();
        let f = payload.downcast_ref::<fn() -> i32>().unwrap();
        assert_eq!(f(), 1);
    }

    #[test]
    fn test_get_hole_and_out_of_range() {
        let table = table();
        assert!(matches!(
            table.get(1, SlotKind::Function),
            Err(TableError::HoleAccessed { ordinal: 1, .. })
        ));
        assert!(matches!(
            table.get(2, SlotKind::Function),
            Err(TableError::OutOfRange {
                ordinal: 2,
                length: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_get_does_not_check_kind() {
        let table = table();
        assert!(table.get(0, SlotKind::TypeObject).is_ok());
    }

    #[test]
    fn test_find_and_counts() {
        let table = table();
        assert_eq!(table.len(), 2);
        assert_eq!(table.hole_count(), 1);
        assert_eq!(table.find("fn_a").map(|s| s.ordinal), Some(0));
        assert!(table.find("missing").is_none());
    }
}
