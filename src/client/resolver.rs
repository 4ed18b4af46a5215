//! Resolver: locates a host table and gates it against a client contract.
//!
//! Resolution happens once, while a client module loads:
//! 1. Locate the table through a [`TableSource`]
//! 2. Gate byte order, ABI epoch, feature level and length, where the length
//!    covers the declared size and the highest ordinal the client uses
//! 3. Check the client's contract is well formed
//! 4. Read every ordinal the client depends on
//!
//! Any failure aborts the client's load. Nothing is checked lazily at call
//! time: once resolution succeeds the client holds its payloads directly.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Bound, Incompatibility, TableError};
use crate::export::TableSource;
use crate::table::{AbiVersion, ByteOrder, CapabilityTable, Ordinal, Payload, SlotKind};

use super::contract::Contract;

/// Locate the table behind `source` and check that it can serve a client
/// compiled against `expected_version` with `expected_length` slots, for the
/// native byte order.
///
/// The length gate is on the declared contract size: a table shorter than
/// `expected_length` is refused even if every ordinal the client touches
/// would be present. Trailing holes still count towards the host's length.
pub fn resolve(
    source: &dyn TableSource,
    expected_version: AbiVersion,
    expected_length: usize,
) -> Result<Arc<CapabilityTable>, TableError> {
    resolve_bound(
        source,
        Bound {
            version: expected_version,
            length: expected_length,
            byte_order: ByteOrder::native(),
        },
    )
}

/// [`resolve`] with an explicit byte order requirement.
pub fn resolve_bound(
    source: &dyn TableSource,
    required: Bound,
) -> Result<Arc<CapabilityTable>, TableError> {
    let table = source.lookup()?;
    let available = Bound {
        version: table.version(),
        length: table.len(),
        byte_order: table.byte_order(),
    };

    if let Some(reason) = incompatibility(&required, &available) {
        log::warn!(
            "Refusing `{}`: {} (requires {}, found {})",
            source.symbol(),
            reason,
            required,
            available
        );
        return Err(TableError::IncompatibleVersion {
            symbol: source.symbol().to_string(),
            reason,
            required,
            available,
        });
    }

    log::info!(
        "Resolved `{}` at version {} ({} slots) for a client requiring {}",
        source.symbol(),
        available.version,
        available.length,
        required.version
    );
    Ok(table)
}

/// First boundary `available` fails, if any.
pub(crate) fn incompatibility(required: &Bound, available: &Bound) -> Option<Incompatibility> {
    if required.byte_order != available.byte_order {
        return Some(Incompatibility::ByteOrder);
    }
    if required.version.major != available.version.major {
        return Some(Incompatibility::AbiEpoch);
    }
    if available.version.minor < required.version.minor {
        return Some(Incompatibility::FeatureLevel);
    }
    if available.length < required.length {
        return Some(Incompatibility::Length);
    }
    None
}

/// Read the payload at `ordinal`.
///
/// Fails with [`TableError::OutOfRange`] past the end of the table and with
/// [`TableError::HoleAccessed`] on a hole. Whether the slot really holds an
/// `expected_kind` is not checked here.
pub fn get(
    table: &CapabilityTable,
    ordinal: Ordinal,
    expected_kind: SlotKind,
) -> Result<&Payload, TableError> {
    table.get(ordinal, expected_kind)
}

/// A contract resolved up front: every entry's payload, keyed by the
/// client's name for it.
#[derive(Debug, Clone)]
pub struct ResolvedContract {
    table: Arc<CapabilityTable>,
    payloads: HashMap<String, Payload>,
}

impl ResolvedContract {
    /// The table the contract was resolved against.
    pub fn table(&self) -> &Arc<CapabilityTable> {
        &self.table
    }

    /// Payload for the entry called `name`.
    pub fn get(&self, name: &str) -> Option<&Payload> {
        self.payloads.get(name)
    }

    /// Payload for `name` as a `T`.
    pub fn get_as<T: 'static>(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(Payload::downcast_ref::<T>)
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

/// Gate the table behind `source` against `contract` and check the contract
/// itself before any slot is read.
///
/// An entry past the host's length is refused as
/// [`Incompatibility::Length`], even when the contract's declared length
/// would have let it through.
pub(crate) fn gate_contract(
    source: &dyn TableSource,
    contract: &Contract,
) -> Result<Arc<CapabilityTable>, TableError> {
    let table = resolve(source, contract.version, contract.required_length())?;
    contract.validate().map_err(|e| {
        log::warn!("Refusing `{}`: invalid client contract: {}", source.symbol(), e);
        TableError::InvalidContract {
            symbol: source.symbol().to_string(),
            reason: e.to_string(),
        }
    })?;
    Ok(table)
}

/// Resolve `contract` against `source` and read every entry.
pub fn resolve_contract(
    source: &dyn TableSource,
    contract: &Contract,
) -> Result<ResolvedContract, TableError> {
    let table = gate_contract(source, contract)?;

    let mut payloads = HashMap::with_capacity(contract.entries.len());
    for entry in &contract.entries {
        let payload = get(&table, entry.ordinal, entry.kind)
            .map_err(|e| e.for_capability(&entry.name))?;
        payloads.insert(entry.name.clone(), payload.clone());
    }

    Ok(ResolvedContract { table, payloads })
}
