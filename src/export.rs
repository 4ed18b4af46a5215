//! Export points: where a host publishes its table and clients find it.
//!
//! An [`ExportPoint`] is a write-once cell for one well-known symbol. The
//! host publishes into it during initialization; the builder runs at most
//! once no matter how many modules trigger it. An [`ExportRegistry`] maps
//! symbols to export points and stands in for whatever inter-module lookup
//! the platform provides.
//!
//! Registries are plain values so tests can build isolated ones;
//! [`ExportRegistry::global`] is the process-wide instance.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;

use crate::error::TableError;
use crate::table::CapabilityTable;

/// Anything a client can locate a published table through.
pub trait TableSource {
    /// Well-known symbol the table is exported under.
    fn symbol(&self) -> &str;

    /// The published table, or [`TableError::NotPublished`].
    fn lookup(&self) -> Result<Arc<CapabilityTable>, TableError>;
}

/// Write-once export cell for one symbol.
#[derive(Debug)]
pub struct ExportPoint {
    symbol: String,
    table: OnceCell<Arc<CapabilityTable>>,
}

impl ExportPoint {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            table: OnceCell::new(),
        }
    }

    /// Publish the table produced by `build`, unless one is already
    /// published, and return the published table.
    ///
    /// `build` runs at most once per export point. If it fails nothing is
    /// published and a later call may try again.
    pub fn publish_with<E, F>(&self, build: F) -> Result<Arc<CapabilityTable>, E>
    where
        F: FnOnce() -> Result<CapabilityTable, E>,
    {
        self.table
            .get_or_try_init(|| {
                let table = build()?;
                log::debug!(
                    "Publishing `{}`: version {}, {} slots",
                    self.symbol,
                    table.version(),
                    table.len()
                );
                Ok(Arc::new(table))
            })
            .map(Arc::clone)
    }

    /// Publish an already built table. Returns the table that ends up
    /// published, which is the earlier one if the point was already set.
    pub fn publish(&self, table: CapabilityTable) -> Arc<CapabilityTable> {
        let published = self.table.get_or_init(|| {
            log::debug!(
                "Publishing `{}`: version {}, {} slots",
                self.symbol,
                table.version(),
                table.len()
            );
            Arc::new(table)
        });
        Arc::clone(published)
    }

    pub fn is_published(&self) -> bool {
        self.table.get().is_some()
    }

    pub fn get(&self) -> Option<&Arc<CapabilityTable>> {
        self.table.get()
    }
}

impl TableSource for ExportPoint {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn lookup(&self) -> Result<Arc<CapabilityTable>, TableError> {
        self.table
            .get()
            .cloned()
            .ok_or_else(|| TableError::NotPublished {
                symbol: self.symbol.clone(),
            })
    }
}

/// Symbol → export point map.
#[derive(Debug, Default)]
pub struct ExportRegistry {
    points: RwLock<HashMap<String, Arc<ExportPoint>>>,
}

static GLOBAL: Lazy<ExportRegistry> = Lazy::new(ExportRegistry::new);

impl ExportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static ExportRegistry {
        &GLOBAL
    }

    /// Get the export point for `symbol`, creating an empty one on first use.
    pub fn point(&self, symbol: &str) -> Arc<ExportPoint> {
        if let Some(point) = self.points.read().get(symbol) {
            return Arc::clone(point);
        }
        let mut points = self.points.write();
        Arc::clone(
            points
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(ExportPoint::new(symbol))),
        )
    }

    /// Locate the published table for `symbol`.
    pub fn locate(&self, symbol: &str) -> Result<Arc<CapabilityTable>, TableError> {
        match self.points.read().get(symbol) {
            Some(point) => point.lookup(),
            None => Err(TableError::NotPublished {
                symbol: symbol.to_string(),
            }),
        }
    }

    /// Symbols with a published table, sorted.
    pub fn published_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .points
            .read()
            .values()
            .filter(|p| p.is_published())
            .map(|p| p.symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    /// A [`TableSource`] that looks `symbol` up in this registry.
    pub fn source<'a>(&'a self, symbol: &'a str) -> RegistrySource<'a> {
        RegistrySource {
            registry: self,
            symbol,
        }
    }
}

/// A symbol bound to the registry it should be located in.
#[derive(Debug, Clone, Copy)]
pub struct RegistrySource<'a> {
    registry: &'a ExportRegistry,
    symbol: &'a str,
}

impl TableSource for RegistrySource<'_> {
    fn symbol(&self) -> &str {
        self.symbol
    }

    fn lookup(&self) -> Result<Arc<CapabilityTable>, TableError> {
        self.registry.locate(self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::table::{AbiVersion, ByteOrder};

    fn empty_table(minor: u32) -> CapabilityTable {
        CapabilityTable::from_slots(AbiVersion::new(1, minor), ByteOrder::native(), Vec::new())
    }

    #[test]
    fn test_publish_with_runs_builder_once() {
        let point = ExportPoint::new("_TEST_API");
        let calls = AtomicUsize::new(0);
        let build = || -> Result<CapabilityTable, ()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(empty_table(3))
        };

        let first = point.publish_with(build).unwrap();
        let second = point.publish_with(build).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_build_publishes_nothing() {
        let point = ExportPoint::new("_TEST_API");
        let result = point.publish_with(|| Err::<CapabilityTable, _>("host init failed"));
        assert_eq!(result.unwrap_err(), "host init failed");
        assert!(!point.is_published());
        assert!(matches!(
            point.lookup(),
            Err(TableError::NotPublished { .. })
        ));
    }

    #[test]
    fn test_publish_keeps_first_table() {
        let point = ExportPoint::new("_TEST_API");
        let first = point.publish(empty_table(3));
        let second = point.publish(empty_table(4));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.version(), AbiVersion::new(1, 3));
    }

    #[test]
    fn test_registry_locate() {
        let registry = ExportRegistry::new();
        assert!(matches!(
            registry.locate("_ARRAY_API"),
            Err(TableError::NotPublished { .. })
        ));

        let point = registry.point("_ARRAY_API");
        assert!(registry.locate("_ARRAY_API").is_err());
        assert!(registry.published_symbols().is_empty());

        point.publish(empty_table(3));
        assert_eq!(registry.locate("_ARRAY_API").unwrap().version(), AbiVersion::new(1, 3));
        assert_eq!(registry.published_symbols(), vec!["_ARRAY_API".to_string()]);

        // The same point is handed out again.
        assert!(Arc::ptr_eq(&point, &registry.point("_ARRAY_API")));
    }

    #[test]
    fn test_registry_source() {
        let registry = ExportRegistry::new();
        registry.point("_UFUNC_API").publish(empty_table(1));
        let source = registry.source("_UFUNC_API");
        assert_eq!(source.symbol(), "_UFUNC_API");
        assert!(source.lookup().is_ok());
        assert!(registry.source("_OTHER").lookup().is_err());
    }

    #[test]
    fn test_global_registry_is_shared() {
        let a = ExportRegistry::global().point("_GLOBAL_TEST_API");
        let b = ExportRegistry::global().point("_GLOBAL_TEST_API");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
