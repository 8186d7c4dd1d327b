//! ---
//! sc_section: "01-harness-core"
//! sc_subsection: "module"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "Subsystem registry, test dispatch, and run reporting."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
//! Harness core for the syscheck workspace.
//!
//! A subsystem is a named, numbered group of tests. Subsystems are plain
//! values registered with an explicit [`Registry`] at startup; the
//! [`Runner`] iterates the registry, executes test entry points, and
//! produces [`RunReport`]s carrying each test's captured log lines.

pub mod context;
pub mod registry;
pub mod report;
pub mod runner;
pub mod subsystem;

pub use context::{LogSink, TestContext};
pub use registry::{Registry, RegistryError};
pub use report::{RunReport, SubsystemReport, TestFailure, TestOutcome, TestReport};
pub use runner::{RunSelection, Runner, RunnerError, RunnerSettings};
pub use subsystem::{Subsystem, SubsystemDescriptor, SubsystemId, TestDescriptor, TestFn, TestId};
