//! Release manifests: the append-only ordering record behind a table.
//!
//! A manifest lists every ordinal of one release in order, with the name
//! and kind it was first published with. The builder trusts it for
//! positions; [`ReleaseManifest::check_successor`] is what keeps successive
//! releases honest about ordinal stability.
//!
//! Example YAML:
//! ```yaml
//! version: { major: 1, minor: 4 }
//! slots:
//!   - ordinal: 0
//!     name: get_abi_version
//!     kind: function
//!     since: { major: 1, minor: 0 }
//!   - ordinal: 1
//!     kind: reserved
//!   - ordinal: 2
//!     name: array_type
//!     kind: type_object
//!   - ordinal: 3
//!     name: set_string_function
//!     kind: function
//!     retracted: true
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::contract::{Contract, ContractEntry};

use super::slot::{Ordinal, SlotKind};
use super::version::AbiVersion;

/// Errors raised while loading or checking manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// YAML parsing or serialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("slot at position {position} declares ordinal {ordinal}; ordinals must be contiguous from 0")]
    NonContiguous { position: usize, ordinal: Ordinal },

    #[error("ordinal {ordinal} is a {kind} slot without a name")]
    UnnamedSlot { ordinal: Ordinal, kind: SlotKind },

    #[error("reserved ordinal {ordinal} must not carry a name (found `{name}`)")]
    NamedReservedSlot { ordinal: Ordinal, name: String },

    #[error("name `{name}` is used by ordinals {first} and {second}")]
    DuplicateName {
        name: String,
        first: Ordinal,
        second: Ordinal,
    },

    #[error("ordinal {ordinal} claims to be stable since {since}, after release {version}")]
    FutureSince {
        ordinal: Ordinal,
        since: AbiVersion,
        version: AbiVersion,
    },

    #[error("release {next} does not follow release {previous}")]
    VersionNotIncreasing {
        previous: AbiVersion,
        next: AbiVersion,
    },

    #[error("release {next_version} has {next} slots, fewer than the {previous} already published")]
    Shrunk {
        previous: usize,
        next: usize,
        next_version: AbiVersion,
    },

    #[error("ordinal {ordinal} was `{previous}` and is now `{next}`")]
    Renamed {
        ordinal: Ordinal,
        previous: String,
        next: String,
    },

    #[error("ordinal {ordinal} changed kind from {previous} to {next}")]
    KindChanged {
        ordinal: Ordinal,
        previous: SlotKind,
        next: SlotKind,
    },

    #[error("ordinal {ordinal} was stable since {previous:?} and is now marked {next:?}")]
    Redated {
        ordinal: Ordinal,
        previous: Option<AbiVersion>,
        next: Option<AbiVersion>,
    },

    #[error("ordinal {ordinal} is a hole and cannot be filled again")]
    HoleRefilled { ordinal: Ordinal },

    #[error("appended ordinal {ordinal} is marked stable since {since}, not after release {previous}")]
    StaleSince {
        ordinal: Ordinal,
        since: AbiVersion,
        previous: AbiVersion,
    },
}

/// One ordinal of a release manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSlot {
    pub ordinal: Ordinal,

    /// Capability name in the host registry. Absent for reserved slots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub kind: SlotKind,

    /// Release in which the capability was stabilized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<AbiVersion>,

    /// Withdrawn: the slot stays in place as a permanent hole.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retracted: bool,
}

impl ManifestSlot {
    /// Whether the slot publishes no payload.
    pub fn is_hole(&self) -> bool {
        self.retracted || self.kind == SlotKind::Reserved
    }

    fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<reserved>".to_string())
    }
}

/// Ordered slot list of one release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    pub version: AbiVersion,
    #[serde(default)]
    pub slots: Vec<ManifestSlot>,
}

impl ReleaseManifest {
    /// Start an empty manifest for `version`.
    pub fn new(version: AbiVersion) -> Self {
        Self {
            version,
            slots: Vec::new(),
        }
    }

    /// Parse a manifest from YAML. Does not validate.
    pub fn from_yaml(yaml: &str) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse and validate a manifest from a YAML file on disk.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        let manifest = Self::from_yaml(&content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Append a named capability at the next ordinal.
    pub fn push(&mut self, name: &str, kind: SlotKind) -> Ordinal {
        let ordinal = self.slots.len();
        self.slots.push(ManifestSlot {
            ordinal,
            name: Some(name.to_string()),
            kind,
            since: Some(self.version),
            retracted: false,
        });
        ordinal
    }

    /// Append a never-stabilized position.
    pub fn push_reserved(&mut self) -> Ordinal {
        let ordinal = self.slots.len();
        self.slots.push(ManifestSlot {
            ordinal,
            name: None,
            kind: SlotKind::Reserved,
            since: None,
            retracted: false,
        });
        ordinal
    }

    /// Derive the next release: same slots, new version, nothing appended yet.
    pub fn successor(&self, version: AbiVersion) -> Self {
        Self {
            version,
            slots: self.slots.clone(),
        }
    }

    /// Withdraw the capability called `name`, leaving a hole behind.
    /// Returns its ordinal, or `None` if no slot has that name.
    pub fn retract(&mut self, name: &str) -> Option<Ordinal> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.name.as_deref() == Some(name))?;
        slot.retracted = true;
        Some(slot.ordinal)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Check the invariants of a single release.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut names: HashMap<&str, Ordinal> = HashMap::new();

        for (position, slot) in self.slots.iter().enumerate() {
            if slot.ordinal != position {
                return Err(ManifestError::NonContiguous {
                    position,
                    ordinal: slot.ordinal,
                });
            }

            match (&slot.name, slot.kind) {
                (Some(name), SlotKind::Reserved) => {
                    return Err(ManifestError::NamedReservedSlot {
                        ordinal: slot.ordinal,
                        name: name.clone(),
                    });
                }
                (None, kind) if kind != SlotKind::Reserved => {
                    return Err(ManifestError::UnnamedSlot {
                        ordinal: slot.ordinal,
                        kind,
                    });
                }
                (Some(name), _) => {
                    if let Some(&first) = names.get(name.as_str()) {
                        return Err(ManifestError::DuplicateName {
                            name: name.clone(),
                            first,
                            second: slot.ordinal,
                        });
                    }
                    names.insert(name.as_str(), slot.ordinal);
                }
                (None, _) => {}
            }

            if let Some(since) = slot.since {
                if since > self.version {
                    return Err(ManifestError::FutureSince {
                        ordinal: slot.ordinal,
                        since,
                        version: self.version,
                    });
                }
            }
        }

        Ok(())
    }

    /// Check that `next` is a legal release after `self`.
    ///
    /// Both manifests must already be valid on their own.
    pub fn check_successor(&self, next: &ReleaseManifest) -> Result<(), ManifestError> {
        if next.version <= self.version {
            return Err(ManifestError::VersionNotIncreasing {
                previous: self.version,
                next: next.version,
            });
        }
        if next.len() < self.len() {
            return Err(ManifestError::Shrunk {
                previous: self.len(),
                next: next.len(),
                next_version: next.version,
            });
        }

        for (old, new) in self.slots.iter().zip(&next.slots) {
            if old.kind != new.kind {
                return Err(ManifestError::KindChanged {
                    ordinal: old.ordinal,
                    previous: old.kind,
                    next: new.kind,
                });
            }
            if old.name != new.name {
                return Err(ManifestError::Renamed {
                    ordinal: old.ordinal,
                    previous: old.label(),
                    next: new.label(),
                });
            }
            if old.since != new.since {
                return Err(ManifestError::Redated {
                    ordinal: old.ordinal,
                    previous: old.since,
                    next: new.since,
                });
            }
            if old.is_hole() && !new.is_hole() {
                return Err(ManifestError::HoleRefilled {
                    ordinal: old.ordinal,
                });
            }
        }

        for appended in &next.slots[self.len()..] {
            if appended.kind == SlotKind::Reserved {
                continue;
            }
            if let Some(since) = appended.since {
                if since <= self.version {
                    return Err(ManifestError::StaleSince {
                        ordinal: appended.ordinal,
                        since,
                        previous: self.version,
                    });
                }
            }
        }

        Ok(())
    }

    /// Client contract covering every capability this release provides.
    pub fn contract(&self) -> Contract {
        let entries = self
            .slots
            .iter()
            .filter(|s| !s.is_hole())
            .filter_map(|s| {
                s.name
                    .as_ref()
                    .map(|name| ContractEntry::new(s.ordinal, name, s.kind, ""))
            })
            .collect();
        Contract::new(self.version, self.len(), entries)
    }
}

/// Every release of one table, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ReleaseHistory {
    releases: Vec<ReleaseManifest>,
}

impl ReleaseHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a release after checking it against the latest one.
    pub fn push(&mut self, manifest: ReleaseManifest) -> Result<(), ManifestError> {
        manifest.validate()?;
        if let Some(latest) = self.releases.last() {
            latest.check_successor(&manifest)?;
        }
        self.releases.push(manifest);
        Ok(())
    }

    /// Load every manifest in `dir` and verify them as one chain.
    ///
    /// Files that cannot be read or parsed are logged and skipped. A parsed
    /// manifest that fails validation, or a chain violation between
    /// releases, is an error.
    pub fn load_directory(dir: &Path) -> Result<Self, ManifestError> {
        let mut manifests = Vec::new();
        if !dir.exists() {
            return Ok(Self::new());
        }

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "yaml" || ext == "yml") {
                match ReleaseManifest::from_yaml_file(&path) {
                    Ok(manifest) => manifests.push(manifest),
                    Err(e @ (ManifestError::Yaml(_) | ManifestError::Io(_))) => {
                        log::warn!("Skipping manifest {}: {}", path.display(), e);
                    }
                    Err(e) => {
                        log::error!("Invalid manifest {}: {}", path.display(), e);
                        return Err(e);
                    }
                }
            }
        }

        manifests.sort_by_key(|m| m.version);

        let mut history = Self::new();
        for manifest in manifests {
            history.push(manifest)?;
        }
        Ok(history)
    }

    pub fn latest(&self) -> Option<&ReleaseManifest> {
        self.releases.last()
    }

    /// The release published as exactly `version`.
    pub fn get(&self, version: AbiVersion) -> Option<&ReleaseManifest> {
        self.releases.iter().find(|m| m.version == version)
    }

    pub fn releases(&self) -> &[ReleaseManifest] {
        &self.releases
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v3() -> ReleaseManifest {
        let mut m = ReleaseManifest::new(AbiVersion::new(1, 3));
        m.push("fn_a", SlotKind::Function);
        m.push_reserved();
        m.push("fn_c", SlotKind::Function);
        m.push("type_d", SlotKind::TypeObject);
        m.push("fn_e", SlotKind::Function);
        m
    }

    #[test]
    fn test_builder_helpers_assign_ordinals() {
        let m = v3();
        assert_eq!(m.len(), 5);
        assert!(m.validate().is_ok());
        assert!(m.slots[1].is_hole());
        assert_eq!(m.slots[3].ordinal, 3);
    }

    #[test]
    fn test_yaml_parse() {
        let yaml = r#"
version: { major: 1, minor: 4 }
slots:
  - ordinal: 0
    name: get_abi_version
    kind: function
    since: { major: 1, minor: 0 }
  - ordinal: 1
    kind: reserved
  - ordinal: 2
    name: array_type
    kind: type_object
  - ordinal: 3
    name: set_string_function
    kind: function
    retracted: true
"#;
        let m = ReleaseManifest::from_yaml(yaml).unwrap();
        assert!(m.validate().is_ok());
        assert_eq!(m.version, AbiVersion::new(1, 4));
        assert_eq!(m.slots[2].kind, SlotKind::TypeObject);
        assert!(m.slots[3].retracted);
        assert!(m.slots[3].is_hole());
        assert_eq!(m.slots[0].since, Some(AbiVersion::new(1, 0)));
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v1.3.yaml");
        std::fs::write(&path, v3().to_yaml().unwrap()).unwrap();
        let loaded = ReleaseManifest::from_yaml_file(&path).unwrap();
        assert_eq!(loaded, v3());
    }

    #[test]
    fn test_validate_rejects_gaps_and_duplicates() {
        let mut m = v3();
        m.slots[2].ordinal = 7;
        assert!(matches!(
            m.validate(),
            Err(ManifestError::NonContiguous {
                position: 2,
                ordinal: 7
            })
        ));

        let mut m = v3();
        m.slots[4].name = Some("fn_a".into());
        assert!(matches!(
            m.validate(),
            Err(ManifestError::DuplicateName {
                first: 0,
                second: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_reserved_naming() {
        let mut m = v3();
        m.slots[1].name = Some("oops".into());
        assert!(matches!(
            m.validate(),
            Err(ManifestError::NamedReservedSlot { ordinal: 1, .. })
        ));

        let mut m = v3();
        m.slots[0].name = None;
        assert!(matches!(
            m.validate(),
            Err(ManifestError::UnnamedSlot { ordinal: 0, .. })
        ));
    }

    #[test]
    fn test_validate_future_since() {
        let mut m = v3();
        m.slots[0].since = Some(AbiVersion::new(1, 9));
        assert!(matches!(
            m.validate(),
            Err(ManifestError::FutureSince { ordinal: 0, .. })
        ));
    }

    #[test]
    fn test_append_only_successor() {
        let old = v3();
        let mut next = old.successor(AbiVersion::new(1, 4));
        next.push("fn_f", SlotKind::Function);
        next.push("data_g", SlotKind::StaticData);
        assert!(old.check_successor(&next).is_ok());
    }

    #[test]
    fn test_retraction_is_a_legal_successor() {
        let old = v3();
        let mut next = old.successor(AbiVersion::new(1, 4));
        assert_eq!(next.retract("fn_c"), Some(2));
        assert!(old.check_successor(&next).is_ok());
        assert!(next.retract("nope").is_none());
    }

    #[test]
    fn test_successor_violations() {
        let old = v3();

        let same = old.successor(AbiVersion::new(1, 3));
        assert!(matches!(
            old.check_successor(&same),
            Err(ManifestError::VersionNotIncreasing { .. })
        ));

        let mut shrunk = old.successor(AbiVersion::new(1, 4));
        shrunk.slots.pop();
        assert!(matches!(
            old.check_successor(&shrunk),
            Err(ManifestError::Shrunk {
                previous: 5,
                next: 4,
                ..
            })
        ));

        let mut rekinded = old.successor(AbiVersion::new(1, 4));
        rekinded.slots[3].kind = SlotKind::Function;
        assert!(matches!(
            old.check_successor(&rekinded),
            Err(ManifestError::KindChanged { ordinal: 3, .. })
        ));

        let mut renamed = old.successor(AbiVersion::new(1, 4));
        renamed.slots[0].name = Some("fn_z".into());
        assert!(matches!(
            old.check_successor(&renamed),
            Err(ManifestError::Renamed { ordinal: 0, .. })
        ));
    }

    #[test]
    fn test_stabilization_release_is_fixed() {
        let old = v3();
        let mut next = old.successor(AbiVersion::new(1, 4));
        next.slots[2].since = Some(AbiVersion::new(1, 4));
        assert!(matches!(
            old.check_successor(&next),
            Err(ManifestError::Redated { ordinal: 2, .. })
        ));

        let mut next = old.successor(AbiVersion::new(1, 4));
        next.slots[0].since = None;
        assert!(matches!(
            old.check_successor(&next),
            Err(ManifestError::Redated { ordinal: 0, .. })
        ));

        // Retraction keeps the original stabilization release.
        let mut next = old.successor(AbiVersion::new(1, 4));
        next.retract("fn_c");
        assert!(old.check_successor(&next).is_ok());
    }

    #[test]
    fn test_holes_are_permanent() {
        let mut old = v3();
        old.retract("fn_e");
        let mut next = old.successor(AbiVersion::new(1, 4));
        next.slots[4].retracted = false;
        assert!(matches!(
            old.check_successor(&next),
            Err(ManifestError::HoleRefilled { ordinal: 4 })
        ));

        // Filling a reserved position with a new capability changes its kind.
        let mut next = old.successor(AbiVersion::new(1, 4));
        next.slots[1].kind = SlotKind::Function;
        next.slots[1].name = Some("fn_new".into());
        assert!(old.check_successor(&next).is_err());
    }

    #[test]
    fn test_appended_since_must_be_new() {
        let old = v3();
        let mut next = old.successor(AbiVersion::new(1, 4));
        let ordinal = next.push("fn_f", SlotKind::Function);
        next.slots[ordinal].since = Some(AbiVersion::new(1, 2));
        assert!(matches!(
            old.check_successor(&next),
            Err(ManifestError::StaleSince { ordinal: 5, .. })
        ));
    }

    #[test]
    fn test_contract_skips_holes() {
        let mut m = v3();
        m.retract("fn_c");
        let contract = m.contract();
        assert_eq!(contract.version, AbiVersion::new(1, 3));
        assert_eq!(contract.length, 5);
        let ordinals: Vec<_> = contract.entries.iter().map(|e| e.ordinal).collect();
        assert_eq!(ordinals, vec![0, 3, 4]);
    }

    #[test]
    fn test_history_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        let old = v3();
        let mut next = old.successor(AbiVersion::new(1, 4));
        next.push("fn_f", SlotKind::Function);

        // Written newest first; loading sorts by version.
        std::fs::write(dir.path().join("a.yaml"), next.to_yaml().unwrap()).unwrap();
        std::fs::write(dir.path().join("b.yml"), old.to_yaml().unwrap()).unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "version: [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let history = ReleaseHistory::load_directory(dir.path()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().unwrap().version, AbiVersion::new(1, 4));
        assert!(history.get(AbiVersion::new(1, 3)).is_some());
    }

    #[test]
    fn test_history_load_directory_rejects_invalid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), v3().to_yaml().unwrap()).unwrap();

        let mut gap = v3().successor(AbiVersion::new(1, 4));
        gap.slots[4].ordinal = 7;
        std::fs::write(dir.path().join("b.yaml"), gap.to_yaml().unwrap()).unwrap();

        assert!(matches!(
            ReleaseHistory::load_directory(dir.path()),
            Err(ManifestError::NonContiguous { position: 4, ordinal: 7 })
        ));
    }

    #[test]
    fn test_history_rejects_broken_chain() {
        let mut history = ReleaseHistory::new();
        history.push(v3()).unwrap();
        let mut bad = v3().successor(AbiVersion::new(1, 4));
        bad.slots.truncate(2);
        assert!(history.push(bad).is_err());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_history_missing_directory_is_empty() {
        let history = ReleaseHistory::load_directory(Path::new("/nonexistent/manifests")).unwrap();
        assert!(history.is_empty());
    }
}
