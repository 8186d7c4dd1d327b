//! ---
//! sc_section: "01-harness-core"
//! sc_subsection: "module"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "Subsystem registry, test dispatch, and run reporting."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::TestContext;
use crate::registry::RegistryError;
use crate::report::TestFailure;

/// Stable numeric identifier for a registered subsystem.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubsystemId(pub u32);

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl fmt::Debug for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubsystemId(0x{:04x})", self.0)
    }
}

/// Stable numeric identifier for a test within a subsystem.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(pub u32);

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl fmt::Debug for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestId(0x{:04x})", self.0)
    }
}

/// Registration record describing a subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemDescriptor {
    pub id: SubsystemId,
    pub name: String,
    pub description: String,
}

/// Metadata for one runnable test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDescriptor {
    pub id: TestId,
    pub name: String,
    pub description: String,
}

impl TestDescriptor {
    /// Construct a descriptor from its stable id, name, and description.
    pub fn new(id: TestId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Entry point invoked when a test runs.
pub type TestFn = Arc<dyn Fn(&TestContext) -> Result<(), TestFailure> + Send + Sync>;

pub(crate) struct RegisteredTest {
    pub(crate) descriptor: TestDescriptor,
    pub(crate) entry: TestFn,
}

/// A subsystem: a descriptor plus an ordered list of registered tests.
///
/// Subsystems are values. A plugin exposes a constructor returning a
/// populated `Subsystem`; teardown is the drop of the registry entry.
pub struct Subsystem {
    descriptor: SubsystemDescriptor,
    tests: Vec<RegisteredTest>,
}

impl Subsystem {
    /// Create an empty subsystem with the given identity.
    pub fn new(id: SubsystemId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            descriptor: SubsystemDescriptor {
                id,
                name: name.into(),
                description: description.into(),
            },
            tests: Vec::new(),
        }
    }

    /// Register a test entry point. Test ids and names must be unique within
    /// the subsystem; registration order is preserved for dispatch.
    pub fn register_test(
        &mut self,
        descriptor: TestDescriptor,
        entry: TestFn,
    ) -> Result<(), RegistryError> {
        if self
            .tests
            .iter()
            .any(|t| t.descriptor.id == descriptor.id || t.descriptor.name == descriptor.name)
        {
            return Err(RegistryError::DuplicateTest {
                subsystem: self.descriptor.id,
                test: descriptor.id,
            });
        }
        self.tests.push(RegisteredTest { descriptor, entry });
        Ok(())
    }

    pub fn id(&self) -> SubsystemId {
        self.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &SubsystemDescriptor {
        &self.descriptor
    }

    /// Descriptors of every registered test, in registration order.
    pub fn test_descriptors(&self) -> Vec<TestDescriptor> {
        self.tests.iter().map(|t| t.descriptor.clone()).collect()
    }

    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    pub(crate) fn tests(&self) -> &[RegisteredTest] {
        &self.tests
    }

    /// Look up a test by name or numeric id (`open_close`, `0x0a01`, `2561`).
    pub(crate) fn find_test(&self, selector: &str) -> Option<&RegisteredTest> {
        let id = parse_numeric_id(selector).map(TestId);
        self.tests
            .iter()
            .find(|t| t.descriptor.name == selector || Some(t.descriptor.id) == id)
    }
}

impl fmt::Debug for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subsystem")
            .field("descriptor", &self.descriptor)
            .field("tests", &self.tests.len())
            .finish()
    }
}

/// Parse a selector as a numeric id, accepting `0x`-prefixed hex or decimal.
pub(crate) fn parse_numeric_id(selector: &str) -> Option<u32> {
    if let Some(hex) = selector.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()
    } else {
        selector.parse().ok()
    }
}
