//! ---
//! sc_section: "01-harness-core"
//! sc_subsection: "module"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "Subsystem registry, test dispatch, and run reporting."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::subsystem::{SubsystemDescriptor, SubsystemId, TestId};

/// Failure kinds a test can report.
///
/// `Open`, `Stat`, `Read`, and `SizeMismatch` are the conditions tests
/// distinguish themselves; `Panicked` and `TimedOut` are applied by the
/// dispatcher when an entry point misbehaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestFailure {
    #[error("failed to open {path}: {detail}")]
    Open { path: String, detail: String },
    #[error("failed to stat {path}: {detail}")]
    Stat { path: String, detail: String },
    #[error("failed to read {path}: {detail}")]
    Read { path: String, detail: String },
    #[error("stat size {expected} does not match bytes read {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("test panicked: {detail}")]
    Panicked { detail: String },
    #[error("test exceeded {timeout_ms}ms timeout")]
    TimedOut { timeout_ms: u64 },
}

/// Outcome recorded for a single test execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    Failed { failure: TestFailure },
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, TestOutcome::Passed)
    }
}

/// Result record for one test invocation, captured log lines included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub subsystem_id: SubsystemId,
    pub test_id: TestId,
    pub subsystem: String,
    pub test: String,
    pub outcome: TestOutcome,
    pub lines: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.outcome.passed()
    }
}

/// All test results for one subsystem within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemReport {
    pub descriptor: SubsystemDescriptor,
    pub tests: Vec<TestReport>,
}

impl SubsystemReport {
    pub fn passed(&self) -> bool {
        self.tests.iter().all(TestReport::passed)
    }

    pub fn failure_count(&self) -> usize {
        self.tests.iter().filter(|t| !t.passed()).count()
    }
}

/// Aggregate report for one dispatcher invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub subsystems: Vec<SubsystemReport>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.subsystems.iter().all(SubsystemReport::passed)
    }

    pub fn test_count(&self) -> usize {
        self.subsystems.iter().map(|s| s.tests.len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.subsystems
            .iter()
            .map(SubsystemReport::failure_count)
            .sum()
    }
}
