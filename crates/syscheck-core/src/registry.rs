//! ---
//! sc_section: "01-harness-core"
//! sc_subsection: "module"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "Subsystem registry, test dispatch, and run reporting."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
use indexmap::IndexMap;
use thiserror::Error;

use crate::subsystem::{parse_numeric_id, Subsystem, SubsystemId, TestId};

/// Errors raised while populating or querying the registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A subsystem with the same id or name is already registered.
    #[error("subsystem {0} already registered")]
    DuplicateSubsystem(SubsystemId),
    /// A test with the same id or name already exists in the subsystem.
    #[error("test {test} already registered in subsystem {subsystem}")]
    DuplicateTest {
        subsystem: SubsystemId,
        test: TestId,
    },
    /// No subsystem matches the selector.
    #[error("unknown subsystem '{0}'")]
    UnknownSubsystem(String),
    /// No test matches the selector within the named subsystem.
    #[error("unknown test '{test}' in subsystem '{subsystem}'")]
    UnknownTest { subsystem: String, test: String },
}

/// Explicit registry mapping subsystem ids to subsystems.
///
/// Populated once at startup and iterated by the dispatcher; insertion order
/// is preserved so runs and listings follow registration order. Entries are
/// torn down in reverse registration order when the registry drops.
#[derive(Debug, Default)]
pub struct Registry {
    subsystems: IndexMap<SubsystemId, Subsystem>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subsystem. Ids and names must be unique across the registry.
    pub fn register(&mut self, subsystem: Subsystem) -> Result<(), RegistryError> {
        if self.subsystems.contains_key(&subsystem.id())
            || self
                .subsystems
                .values()
                .any(|existing| existing.name() == subsystem.name())
        {
            return Err(RegistryError::DuplicateSubsystem(subsystem.id()));
        }
        self.subsystems.insert(subsystem.id(), subsystem);
        Ok(())
    }

    /// Iterate subsystems in registration order.
    pub fn subsystems(&self) -> impl Iterator<Item = &Subsystem> {
        self.subsystems.values()
    }

    /// Fetch a subsystem by id.
    pub fn get(&self, id: SubsystemId) -> Option<&Subsystem> {
        self.subsystems.get(&id)
    }

    /// Look up a subsystem by name or numeric id (`fileio`, `0x0a00`, `2560`).
    pub fn find(&self, selector: &str) -> Option<&Subsystem> {
        let id = parse_numeric_id(selector).map(SubsystemId);
        self.subsystems
            .values()
            .find(|s| s.name() == selector || Some(s.id()) == id)
    }

    pub fn len(&self) -> usize {
        self.subsystems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subsystems.is_empty()
    }

    /// Total number of tests across all subsystems.
    pub fn test_count(&self) -> usize {
        self.subsystems.values().map(Subsystem::test_count).sum()
    }
}
