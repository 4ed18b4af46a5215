//! # captable
//!
//! Versioned, ordinal-indexed capability export tables.
//!
//! A host library exposes its functions, type descriptors and static data
//! to independently compiled extension modules through one flat table of
//! positional slots. Each slot is bound to one capability by position,
//! never by name, for the life of the ABI: the host may relink, rename
//! internally, or retract capabilities between releases without breaking
//! clients that were compiled against an older table.
//!
//! - [`table`]: slots, release manifests, the host registry and the builder
//! - [`export`]: write-once export points and the symbol lookup
//! - [`client`]: version gate, contracts and typed accessors
//! - [`wire`]: the raw word-level export image
//!
//! ```rust
//! use captable::capability_api;
//! use captable::client::CapabilityApi;
//! use captable::export::ExportRegistry;
//! use captable::table::{build, AbiVersion, HostRegistry, ReleaseManifest, SlotKind};
//!
//! fn array_size(dims: &[usize]) -> usize {
//!     dims.iter().product()
//! }
//!
//! // Host side, during initialization.
//! let mut registry = HostRegistry::new();
//! registry.register_function("array_size", array_size as fn(&[usize]) -> usize);
//!
//! let mut manifest = ReleaseManifest::new(AbiVersion::new(1, 0));
//! manifest.push_reserved();
//! manifest.push("array_size", SlotKind::Function);
//!
//! let exports = ExportRegistry::new();
//! exports
//!     .point("_ARRAY_API")
//!     .publish_with(|| build(&manifest, &registry))
//!     .unwrap();
//!
//! // Client side, at module load.
//! capability_api! {
//!     struct ArrayApi(version = AbiVersion::new(1, 0), length = 2) {
//!         1 => array_size: Function(fn(&[usize]) -> usize),
//!     }
//! }
//!
//! let api = ArrayApi::import(&exports.source("_ARRAY_API")).unwrap();
//! assert_eq!((api.array_size)(&[2, 3, 4]), 24);
//! ```

pub mod client;
pub mod error;
pub mod export;
pub mod table;
pub mod wire;

pub use client::{CapabilityApi, ClientModule, Contract};
pub use error::{Incompatibility, TableError};
pub use export::{ExportPoint, ExportRegistry, TableSource};
pub use table::{AbiVersion, CapabilityTable, SlotKind};
