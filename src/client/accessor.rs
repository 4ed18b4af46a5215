//! Typed accessors: the one place an opaque payload becomes a typed value.
//!
//! A client declares the capabilities it uses with [`capability_api!`]:
//!
//! ```rust
//! use captable::capability_api;
//! use captable::table::AbiVersion;
//!
//! #[derive(Debug)]
//! pub struct Descr {
//!     pub itemsize: usize,
//! }
//!
//! capability_api! {
//!     /// The part of the array API this module calls.
//!     pub struct ArrayApi(version = AbiVersion::new(1, 3), length = 5) {
//!         0 => abi_version: Function(fn() -> u32),
//!         3 => float64: TypeObject(&'static Descr),
//!     }
//! }
//! ```
//!
//! The macro generates the struct, its [`Contract`], and a [`from_table`]
//! that fetches every field through an [`Accessor`]. After
//! [`CapabilityApi::import`] (or a [`ClientModule`]) has run, the fields are
//! plain function pointers and references: calls go straight to the host.
//!
//! [`from_table`]: CapabilityApi::from_table

use std::any::{type_name, Any};
use std::marker::PhantomData;

use once_cell::sync::OnceCell;

use crate::error::TableError;
use crate::export::TableSource;
use crate::table::{AbiVersion, CapabilityTable, Ordinal, SlotKind};

use super::contract::{Contract, ContractEntry};
use super::resolver::gate_contract;

/// Typed handle for one ordinal.
pub struct Accessor<T> {
    ordinal: Ordinal,
    name: &'static str,
    kind: SlotKind,
    _ty: PhantomData<fn() -> T>,
}

impl<T> Accessor<T> {
    pub const fn new(ordinal: Ordinal, name: &'static str, kind: SlotKind) -> Self {
        Self {
            ordinal,
            name,
            kind,
            _ty: PhantomData,
        }
    }

    pub fn ordinal(&self) -> Ordinal {
        self.ordinal
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Contract entry describing this accessor.
    pub fn entry(&self) -> ContractEntry {
        ContractEntry::new(self.ordinal, self.name, self.kind, type_name::<T>())
    }
}

impl<T: Any + Clone> Accessor<T> {
    /// Read the ordinal from `table` and recover it as a `T`.
    pub fn fetch(&self, table: &CapabilityTable) -> Result<T, TableError> {
        let payload = table
            .get(self.ordinal, self.kind)
            .map_err(|e| e.for_capability(self.name))?;

        payload
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| TableError::LayoutMismatch {
                ordinal: self.ordinal,
                name: self.name.to_string(),
                expected: type_name::<T>(),
            })
    }
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Accessor<T> {}

impl<T> std::fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accessor")
            .field("ordinal", &self.ordinal)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("type", &type_name::<T>())
            .finish()
    }
}

/// A set of typed capabilities a client module resolves as a unit.
///
/// Usually implemented through [`capability_api!`].
pub trait CapabilityApi: Sized {
    /// Oldest table version the client accepts.
    const VERSION: AbiVersion;
    /// Declared table length the client was built against.
    const LENGTH: usize;

    /// Contract the client was built against.
    fn contract() -> Contract;

    /// Fetch every capability from an already gated table.
    fn from_table(table: &CapabilityTable) -> Result<Self, TableError>;

    /// Gate the table behind `source` against [`contract`](Self::contract)
    /// and fetch every capability.
    fn import(source: &dyn TableSource) -> Result<Self, TableError> {
        let table = gate_contract(source, &Self::contract())?;
        Self::from_table(&table).map_err(|e| {
            log::warn!("Failed to import from `{}`: {}", source.symbol(), e);
            e
        })
    }
}

/// Per-client cache of a resolved [`CapabilityApi`].
///
/// Meant to live in a `static`: the first successful [`import`] is kept for
/// the life of the process and every later call returns it.
///
/// [`import`]: ClientModule::import
pub struct ClientModule<A> {
    api: OnceCell<A>,
}

impl<A> ClientModule<A> {
    pub const fn new() -> Self {
        Self {
            api: OnceCell::new(),
        }
    }

    /// The cached API, if resolution already succeeded.
    pub fn get(&self) -> Option<&A> {
        self.api.get()
    }

    pub fn is_imported(&self) -> bool {
        self.api.get().is_some()
    }
}

impl<A: CapabilityApi> ClientModule<A> {
    /// Resolve on first use, then return the cached API.
    ///
    /// A failed resolution caches nothing.
    pub fn import(&self, source: &dyn TableSource) -> Result<&A, TableError> {
        self.api.get_or_try_init(|| A::import(source))
    }
}

impl<A> Default for ClientModule<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Declare a client's typed view of a capability table.
///
/// Each line is `ordinal => field: Kind(Type)` where `Kind` is one of
/// `Function`, `TypeObject` or `StaticData` and `Type` is the exact type
/// the host registered at that ordinal. See the [module docs](self).
#[macro_export]
macro_rules! capability_api {
    (
        $(#[$meta:meta])*
        $vis:vis struct $api:ident (version = $version:expr, length = $length:expr $(,)?) {
            $(
                $(#[$field_meta:meta])*
                $ordinal:literal => $field:ident : $kind:ident ( $ty:ty )
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $api {
            $(
                $(#[$field_meta])*
                pub $field: $ty,
            )*
        }

        impl $crate::client::CapabilityApi for $api {
            const VERSION: $crate::table::AbiVersion = $version;
            const LENGTH: usize = $length;

            fn contract() -> $crate::client::Contract {
                $crate::client::Contract::new(
                    <Self as $crate::client::CapabilityApi>::VERSION,
                    <Self as $crate::client::CapabilityApi>::LENGTH,
                    vec![
                        $(
                            $crate::client::Accessor::<$ty>::new(
                                $ordinal,
                                stringify!($field),
                                $crate::table::SlotKind::$kind,
                            )
                            .entry(),
                        )*
                    ],
                )
            }

            fn from_table(
                table: &$crate::table::CapabilityTable,
            ) -> ::std::result::Result<Self, $crate::TableError> {
                ::std::result::Result::Ok(Self {
                    $(
                        $field: $crate::client::Accessor::<$ty>::new(
                            $ordinal,
                            stringify!($field),
                            $crate::table::SlotKind::$kind,
                        )
                        .fetch(table)?,
                    )*
                })
            }
        }
    };
}
