//! # Client side
//!
//! What an extension module does at load time to use a host's table:
//!
//! ```text
//! Contract (compiled in)
//!   ↓  resolve() / resolve_contract()     locate + version gate
//! Arc<CapabilityTable>
//!   ↓  Accessor::fetch() per ordinal      the one typed cast
//! CapabilityApi struct, cached in a ClientModule
//! ```
//!
//! Every failure surfaces before the module finishes loading.

pub mod accessor;
pub mod contract;
pub mod resolver;

pub use accessor::{Accessor, CapabilityApi, ClientModule};
pub use contract::{Contract, ContractEntry, ContractError};
pub use resolver::{get, resolve, resolve_bound, resolve_contract, ResolvedContract};
