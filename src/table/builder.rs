//! Table builder: places registered capabilities at their manifest ordinals.

use thiserror::Error;

use super::manifest::{ManifestError, ReleaseManifest};
use super::registry::HostRegistry;
use super::slot::{Ordinal, Slot, SlotKind, SlotState};
use super::version::ByteOrder;
use super::CapabilityTable;

/// Host-initialization failures. A table that fails to build is never
/// published.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid release manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("capability `{name}` (ordinal {ordinal}) is not registered by the host")]
    Unregistered { ordinal: Ordinal, name: String },

    #[error("capability `{name}` (ordinal {ordinal}) is registered as {registered}, manifest says {declared}")]
    KindMismatch {
        ordinal: Ordinal,
        name: String,
        declared: SlotKind,
        registered: SlotKind,
    },
}

/// Build the table for `manifest` using the host's native byte order.
pub fn build(
    manifest: &ReleaseManifest,
    registry: &HostRegistry,
) -> Result<CapabilityTable, BuildError> {
    build_for(manifest, registry, ByteOrder::native())
}

/// Build the table for `manifest`, stamping `byte_order` into the header.
pub fn build_for(
    manifest: &ReleaseManifest,
    registry: &HostRegistry,
    byte_order: ByteOrder,
) -> Result<CapabilityTable, BuildError> {
    manifest.validate()?;

    let mut slots = Vec::with_capacity(manifest.len());
    for entry in &manifest.slots {
        let state = match (&entry.name, entry.is_hole()) {
            (Some(name), false) => {
                let registered =
                    registry
                        .get(name)
                        .ok_or_else(|| BuildError::Unregistered {
                            ordinal: entry.ordinal,
                            name: name.clone(),
                        })?;
                if registered.kind != entry.kind {
                    return Err(BuildError::KindMismatch {
                        ordinal: entry.ordinal,
                        name: name.clone(),
                        declared: entry.kind,
                        registered: registered.kind,
                    });
                }
                SlotState::Present(registered.payload.clone())
            }
            _ => SlotState::Retracted,
        };

        slots.push(Slot {
            ordinal: entry.ordinal,
            name: entry.name.clone(),
            kind: entry.kind,
            state,
        });
    }

    let table = CapabilityTable::from_slots(manifest.version, byte_order, slots);
    log::debug!(
        "Built capability table v{}: {} slots, {} holes",
        table.version(),
        table.len(),
        table.hole_count()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::AbiVersion;

    fn fn_a() -> &'static str {
        "a"
    }

    fn manifest() -> ReleaseManifest {
        let mut m = ReleaseManifest::new(AbiVersion::new(1, 3));
        m.push("fn_a", SlotKind::Function);
        m.push_reserved();
        m.push("data_b", SlotKind::StaticData);
        m
    }

    fn registry() -> HostRegistry {
        let mut r = HostRegistry::new();
        r.register_function("fn_a", fn_a as fn() -> &'static str);
        r.register_static("data_b", 42i64);
        r
    }

    #[test]
    fn test_build_places_payloads_by_ordinal() {
        let table = build(&manifest(), &registry()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.version(), AbiVersion::new(1, 3));
        assert_eq!(table.byte_order(), ByteOrder::native());
        assert!(table.slot(1).unwrap().is_hole());

        let data = table.get(2, SlotKind::StaticData).unwrap();
        assert_eq!(data.downcast_ref::<i64>(), Some(&42));
    }

    #[test]
    fn test_build_shares_registry_payloads() {
        let registry = registry();
        let table = build(&manifest(), &registry).unwrap();
        let registered = &registry.get("fn_a").unwrap().payload;
        assert!(table.get(0, SlotKind::Function).unwrap().ptr_eq(registered));
    }

    #[test]
    fn test_retracted_slot_is_hole_even_if_registered() {
        let mut m = manifest();
        m.retract("data_b");
        let table = build(&m, &registry()).unwrap();
        assert!(matches!(
            table.get(2, SlotKind::StaticData),
            Err(crate::TableError::HoleAccessed { ordinal: 2, .. })
        ));
        assert_eq!(table.slot(2).unwrap().kind, SlotKind::StaticData);
    }

    #[test]
    fn test_unregistered_capability_fails() {
        let mut m = manifest();
        m.push("fn_missing", SlotKind::Function);
        assert!(matches!(
            build(&m, &registry()),
            Err(BuildError::Unregistered { ordinal: 3, .. })
        ));
    }

    #[test]
    fn test_kind_mismatch_fails() {
        let mut r = registry();
        r.register_type_object("data_b", 0u8);
        assert!(matches!(
            build(&manifest(), &r),
            Err(BuildError::KindMismatch {
                ordinal: 2,
                declared: SlotKind::StaticData,
                registered: SlotKind::TypeObject,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_manifest_fails() {
        let mut m = manifest();
        m.slots[0].ordinal = 4;
        assert!(matches!(build(&m, &registry()), Err(BuildError::Manifest(_))));
    }

    #[test]
    fn test_build_for_records_byte_order() {
        let table = build_for(&manifest(), &registry(), ByteOrder::Big).unwrap();
        assert_eq!(table.byte_order(), ByteOrder::Big);
    }
}
