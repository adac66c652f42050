//! Startup registry of stable target-kind tags.
use crate::errors::RegistryError;
use std::collections::HashMap;
use votes_shared::types::TargetKind;

/// Registry mapping stable tags to the entity kinds that registered them.
///
/// Each votable entity type registers its tag once at startup; the tag is
/// what the store persists, so reassigning one while records exist would
/// corrupt every reference using it. The registry enforces that both tags
/// and names stay unique within a process.
#[derive(Default)]
pub struct TargetKinds {
    names_by_tag: HashMap<i16, &'static str>,
    kinds_by_name: HashMap<&'static str, TargetKind>,
}

impl TargetKinds {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a votable entity kind under a stable tag.
    ///
    /// # Returns
    ///
    /// The `TargetKind` handle to build target references with, or a
    /// `RegistryError` if the tag or name is already taken.
    pub fn register(&mut self, tag: i16, name: &'static str) -> Result<TargetKind, RegistryError> {
        if self.names_by_tag.contains_key(&tag) {
            return Err(RegistryError::DuplicateTag(tag));
        }
        if self.kinds_by_name.contains_key(name) {
            return Err(RegistryError::DuplicateName(name));
        }
        let kind = TargetKind::new(tag);
        self.names_by_tag.insert(tag, name);
        self.kinds_by_name.insert(name, kind);
        Ok(kind)
    }

    /// Resolves a stored tag back to a registered kind.
    pub fn resolve(&self, tag: i16) -> Result<TargetKind, RegistryError> {
        if self.names_by_tag.contains_key(&tag) {
            Ok(TargetKind::new(tag))
        } else {
            Err(RegistryError::UnknownTag(tag))
        }
    }

    /// The name a kind was registered under, for diagnostics.
    pub fn name(&self, kind: TargetKind) -> Option<&'static str> {
        self.names_by_tag.get(&kind.tag()).copied()
    }

    /// Looks up a kind by its registered name.
    pub fn get(&self, name: &str) -> Option<TargetKind> {
        self.kinds_by_name.get(name).copied()
    }
}
