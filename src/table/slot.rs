//! Slots: the unit of export.
//!
//! A slot is identified only by its ordinal. Its kind is fixed the first
//! time it is published; its payload may be a different value in a later
//! release (after relinking), or it may be retracted, but the ordinal is
//! never handed to a different capability.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Fixed position of a slot in a capability table.
pub type Ordinal = usize;

/// What a slot exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    /// A callable entry point.
    Function,
    /// A type descriptor.
    TypeObject,
    /// A static datum (counter, singleton value, lookup table).
    StaticData,
    /// A position that was never stabilized.
    Reserved,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotKind::Function => "function",
            SlotKind::TypeObject => "type object",
            SlotKind::StaticData => "static data",
            SlotKind::Reserved => "reserved",
        };
        f.write_str(s)
    }
}

/// Opaque capability value held by a slot.
///
/// The table never looks inside a payload. Clients know, out of band, what
/// shape the value at a given ordinal has and recover it with
/// [`Payload::downcast_ref`].
#[derive(Clone)]
pub struct Payload(Arc<dyn Any + Send + Sync>);

impl Payload {
    /// Wrap a capability value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Stable address of the wrapped value.
    ///
    /// Every clone of a payload reports the same address, which is what the
    /// raw export words carry. Never zero.
    pub fn address(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Recover the value as `T`, if that is its concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether two payloads wrap the same allocation.
    pub fn ptr_eq(&self, other: &Payload) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({:#x})", self.address())
    }
}

/// Occupancy of a slot.
#[derive(Debug, Clone)]
pub enum SlotState {
    Present(Payload),
    /// Permanent hole: never stabilized, or withdrawn in some release.
    Retracted,
}

/// One entry of a capability table.
#[derive(Debug, Clone)]
pub struct Slot {
    pub ordinal: Ordinal,
    /// Host-side name; `None` for positions that were never stabilized.
    pub name: Option<String>,
    pub kind: SlotKind,
    pub state: SlotState,
}

impl Slot {
    /// The payload, or `None` for a hole.
    pub fn payload(&self) -> Option<&Payload> {
        match &self.state {
            SlotState::Present(payload) => Some(payload),
            SlotState::Retracted => None,
        }
    }

    pub fn is_hole(&self) -> bool {
        matches!(self.state, SlotState::Retracted)
    }

    /// Name used in diagnostics.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<reserved>")
    }
}
