//! Client contracts: the `(ordinal, name, kind, signature)` list a client
//! module is built against.
//!
//! A contract is produced from a release manifest (see
//! [`ReleaseManifest::contract`](crate::table::ReleaseManifest::contract)) or
//! declared through [`capability_api!`](crate::capability_api). It never
//! travels with the table: it is what the client trusts the table to honor.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::table::{AbiVersion, Ordinal, SlotKind};

/// Errors raised while loading or checking a contract.
#[derive(Debug, Error)]
pub enum ContractError {
    /// YAML parsing or serialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{name}` uses ordinal {ordinal}, outside the declared length {length}")]
    BeyondLength {
        name: String,
        ordinal: Ordinal,
        length: usize,
    },

    #[error("ordinal {ordinal} is bound to both `{first}` and `{second}`")]
    DuplicateOrdinal {
        ordinal: Ordinal,
        first: String,
        second: String,
    },

    #[error("`{name}` is bound to ordinals {first} and {second}")]
    DuplicateName {
        name: String,
        first: Ordinal,
        second: Ordinal,
    },

    #[error("`{name}` (ordinal {ordinal}) depends on a reserved slot")]
    ReservedEntry { name: String, ordinal: Ordinal },
}

/// One capability a client depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEntry {
    pub ordinal: Ordinal,
    /// Client-side name, used in diagnostics.
    pub name: String,
    pub kind: SlotKind,
    /// Signature or layout the client expects, as text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
}

impl ContractEntry {
    pub fn new(ordinal: Ordinal, name: &str, kind: SlotKind, signature: &str) -> Self {
        Self {
            ordinal,
            name: name.to_string(),
            kind,
            signature: signature.to_string(),
        }
    }
}

/// The table shape a client was compiled against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Oldest table version the client accepts.
    pub version: AbiVersion,
    /// Declared table length. Gated on as a whole, even if the client only
    /// touches lower ordinals.
    pub length: usize,
    #[serde(default)]
    pub entries: Vec<ContractEntry>,
}

impl Contract {
    pub fn new(version: AbiVersion, length: usize, entries: Vec<ContractEntry>) -> Self {
        Self {
            version,
            length,
            entries,
        }
    }

    /// Parse a contract from YAML. Does not validate.
    pub fn from_yaml(yaml: &str) -> Result<Self, ContractError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse and validate a contract from a YAML file on disk.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ContractError> {
        let content = std::fs::read_to_string(path)?;
        let contract = Self::from_yaml(&content)?;
        contract.validate()?;
        Ok(contract)
    }

    pub fn to_yaml(&self) -> Result<String, ContractError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check that entries fit the declared length and do not collide.
    pub fn validate(&self) -> Result<(), ContractError> {
        let mut by_ordinal: HashMap<Ordinal, &str> = HashMap::new();
        let mut by_name: HashMap<&str, Ordinal> = HashMap::new();

        for entry in &self.entries {
            if entry.ordinal >= self.length {
                return Err(ContractError::BeyondLength {
                    name: entry.name.clone(),
                    ordinal: entry.ordinal,
                    length: self.length,
                });
            }
            if entry.kind == SlotKind::Reserved {
                return Err(ContractError::ReservedEntry {
                    name: entry.name.clone(),
                    ordinal: entry.ordinal,
                });
            }
            if let Some(first) = by_ordinal.insert(entry.ordinal, entry.name.as_str()) {
                return Err(ContractError::DuplicateOrdinal {
                    ordinal: entry.ordinal,
                    first: first.to_string(),
                    second: entry.name.clone(),
                });
            }
            if let Some(first) = by_name.insert(entry.name.as_str(), entry.ordinal) {
                return Err(ContractError::DuplicateName {
                    name: entry.name.clone(),
                    first,
                    second: entry.ordinal,
                });
            }
        }

        Ok(())
    }

    /// Highest ordinal the client actually uses.
    pub fn highest_ordinal(&self) -> Option<Ordinal> {
        self.entries.iter().map(|e| e.ordinal).max()
    }

    /// Slots a table needs to serve this contract: the declared length, or
    /// one past the highest ordinal used if that is larger.
    pub fn required_length(&self) -> usize {
        self.highest_ordinal()
            .map_or(self.length, |highest| self.length.max(highest + 1))
    }

    pub fn entry(&self, name: &str) -> Option<&ContractEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}
