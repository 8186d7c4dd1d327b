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
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use syscheck_kfile::FileStore;
use tracing::info;

/// Line-buffered sink capturing the pass/fail text a test reports.
///
/// Cloneable handle; the dispatcher keeps one side and folds the captured
/// lines into the test's report once the entry point returns.
#[derive(Clone, Default)]
pub struct LogSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line to the sink.
    pub fn record(&self, line: impl Into<String>) {
        self.lines.lock().push(line.into());
    }

    /// Snapshot of the captured lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("lines", &self.lines.lock().len())
            .finish()
    }
}

/// Everything a test invocation may touch: the logging sink, the file-access
/// capability, and the resolved fixture path.
pub struct TestContext {
    subsystem: String,
    test: String,
    store: Arc<dyn FileStore>,
    fixture: PathBuf,
    sink: LogSink,
}

impl TestContext {
    pub fn new(
        subsystem: impl Into<String>,
        test: impl Into<String>,
        store: Arc<dyn FileStore>,
        fixture: PathBuf,
    ) -> Self {
        Self {
            subsystem: subsystem.into(),
            test: test.into(),
            store,
            fixture,
            sink: LogSink::new(),
        }
    }

    /// Report a line of pass/fail text. Captured into the run report and
    /// mirrored to the tracing subscriber.
    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        info!(subsystem = %self.subsystem, test = %self.test, "{}", line);
        self.sink.record(line);
    }

    /// File-access capability for this invocation.
    pub fn store(&self) -> &dyn FileStore {
        self.store.as_ref()
    }

    /// Path of the fixture file provisioned for this run.
    pub fn fixture(&self) -> &Path {
        &self.fixture
    }

    /// Handle to the captured log lines.
    pub fn sink(&self) -> LogSink {
        self.sink.clone()
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("subsystem", &self.subsystem)
            .field("test", &self.test)
            .field("store", &self.store.name())
            .field("fixture", &self.fixture)
            .finish()
    }
}
