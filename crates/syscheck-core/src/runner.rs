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
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexMap;
use syscheck_kfile::FileStore;
use syscheck_metrics::HarnessMetrics;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::TestContext;
use crate::registry::{Registry, RegistryError};
use crate::report::{RunReport, SubsystemReport, TestFailure, TestOutcome, TestReport};
use crate::subsystem::{RegisteredTest, SubsystemId, TestId};

const FIXTURE_CONTENTS: &str = "syscheck fixture\nsecond line\nthird line\n";

/// Errors raised while dispatching tests.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to provision fixture: {0}")]
    Fixture(#[source] std::io::Error),
    #[error("subsystem task join failure: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Settings governing dispatch: fixture provisioning, timeout, fail-fast.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Fixture file the file-access tests open. When unset a throwaway
    /// fixture is written under `work_dir` for every subsystem run.
    pub fixture_path: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub test_timeout: Duration,
    /// Stop a subsystem's remaining tests after its first failure.
    pub fail_fast: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            fixture_path: None,
            work_dir: PathBuf::from("target/syscheck"),
            test_timeout: Duration::from_secs(30),
            fail_fast: false,
        }
    }
}

/// What a single dispatcher invocation should execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSelection {
    /// Every test of every registered subsystem.
    All,
    /// Every test of one subsystem, selected by name or numeric id.
    Subsystem(String),
    /// One test of one subsystem.
    Test { subsystem: String, test: String },
}

/// Test dispatcher: iterates the registry and executes entry points.
///
/// Tests within one subsystem run serially under that subsystem's lock;
/// distinct subsystems run concurrently. Entry points are synchronous and
/// executed on blocking threads with panic containment.
pub struct Runner {
    registry: Arc<Registry>,
    store: Arc<dyn FileStore>,
    settings: RunnerSettings,
    metrics: Option<HarnessMetrics>,
    locks: IndexMap<SubsystemId, Arc<Mutex<()>>>,
}

impl Runner {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<dyn FileStore>,
        settings: RunnerSettings,
        metrics: Option<HarnessMetrics>,
    ) -> Self {
        let locks = registry
            .subsystems()
            .map(|subsystem| (subsystem.id(), Arc::new(Mutex::new(()))))
            .collect();
        if let Some(metrics) = &metrics {
            metrics.set_subsystem_count(registry.len());
        }
        Self {
            registry,
            store,
            settings,
            metrics,
            locks,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Execute the given selection and return its aggregate report.
    pub async fn run(&self, selection: &RunSelection) -> Result<RunReport, RunnerError> {
        match selection {
            RunSelection::All => self.run_all().await,
            RunSelection::Subsystem(selector) => self.run_subsystem(selector).await,
            RunSelection::Test { subsystem, test } => self.run_test(subsystem, test).await,
        }
    }

    /// Run every registered subsystem, concurrently across subsystems.
    pub async fn run_all(&self) -> Result<RunReport, RunnerError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let mut handles = Vec::new();
        for subsystem in self.registry.subsystems() {
            let id = subsystem.id();
            handles.push(tokio::spawn(run_subsystem_inner(
                self.registry.clone(),
                id,
                None,
                self.store.clone(),
                self.settings.clone(),
                self.metrics.clone(),
                self.lock_for(id),
            )));
        }

        let mut subsystems = Vec::new();
        for handle in handles {
            subsystems.push(handle.await??);
        }
        Ok(finish_report(run_id, started_at, subsystems))
    }

    /// Run every test of the selected subsystem.
    pub async fn run_subsystem(&self, selector: &str) -> Result<RunReport, RunnerError> {
        let subsystem = self
            .registry
            .find(selector)
            .ok_or_else(|| RegistryError::UnknownSubsystem(selector.to_owned()))?;
        let id = subsystem.id();
        let started_at = Utc::now();
        let report = run_subsystem_inner(
            self.registry.clone(),
            id,
            None,
            self.store.clone(),
            self.settings.clone(),
            self.metrics.clone(),
            self.lock_for(id),
        )
        .await?;
        Ok(finish_report(Uuid::new_v4(), started_at, vec![report]))
    }

    /// Run one test of one subsystem.
    pub async fn run_test(&self, subsystem: &str, test: &str) -> Result<RunReport, RunnerError> {
        let target = self
            .registry
            .find(subsystem)
            .ok_or_else(|| RegistryError::UnknownSubsystem(subsystem.to_owned()))?;
        let test_id = target
            .find_test(test)
            .map(|t| t.descriptor.id)
            .ok_or_else(|| RegistryError::UnknownTest {
                subsystem: subsystem.to_owned(),
                test: test.to_owned(),
            })?;
        let id = target.id();
        let started_at = Utc::now();
        let report = run_subsystem_inner(
            self.registry.clone(),
            id,
            Some(test_id),
            self.store.clone(),
            self.settings.clone(),
            self.metrics.clone(),
            self.lock_for(id),
        )
        .await?;
        Ok(finish_report(Uuid::new_v4(), started_at, vec![report]))
    }

    fn lock_for(&self, id: SubsystemId) -> Arc<Mutex<()>> {
        self.locks
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Arc::new(Mutex::new(())))
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("subsystems", &self.registry.len())
            .field("store", &self.store.name())
            .field("settings", &self.settings)
            .finish()
    }
}

fn finish_report(
    run_id: Uuid,
    started_at: chrono::DateTime<Utc>,
    subsystems: Vec<SubsystemReport>,
) -> RunReport {
    RunReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        subsystems,
    }
}

async fn run_subsystem_inner(
    registry: Arc<Registry>,
    id: SubsystemId,
    only_test: Option<TestId>,
    store: Arc<dyn FileStore>,
    settings: RunnerSettings,
    metrics: Option<HarnessMetrics>,
    lock: Arc<Mutex<()>>,
) -> Result<SubsystemReport, RunnerError> {
    // Serialize runs within one subsystem; distinct subsystems proceed in
    // parallel on their own locks.
    let _guard = lock.lock().await;
    let subsystem = registry
        .get(id)
        .ok_or_else(|| RegistryError::UnknownSubsystem(id.to_string()))?;
    let fixture = FixtureGuard::provision(&settings)?;
    debug!(
        subsystem = %subsystem.name(),
        fixture = %fixture.path().display(),
        "subsystem run starting"
    );

    let mut reports = Vec::new();
    for test in subsystem.tests() {
        if only_test.is_some_and(|want| want != test.descriptor.id) {
            continue;
        }
        let report = execute_test(
            subsystem.name(),
            id,
            test,
            store.clone(),
            fixture.path(),
            settings.test_timeout,
            metrics.clone(),
        )
        .await;
        let failed = !report.passed();
        reports.push(report);
        if failed && settings.fail_fast {
            warn!(
                subsystem = %subsystem.name(),
                "fail-fast enabled; skipping remaining tests"
            );
            break;
        }
    }

    Ok(SubsystemReport {
        descriptor: subsystem.descriptor().clone(),
        tests: reports,
    })
}

async fn execute_test(
    subsystem_name: &str,
    subsystem_id: SubsystemId,
    test: &RegisteredTest,
    store: Arc<dyn FileStore>,
    fixture: &Path,
    timeout: Duration,
    metrics: Option<HarnessMetrics>,
) -> TestReport {
    let descriptor = test.descriptor.clone();
    let started_at = Utc::now();
    let clock = Instant::now();

    let ctx = TestContext::new(
        subsystem_name,
        &descriptor.name,
        store,
        fixture.to_path_buf(),
    );
    let sink = ctx.sink();
    let entry = test.entry.clone();
    let task = tokio::task::spawn_blocking(move || catch_unwind(AssertUnwindSafe(|| entry(&ctx))));

    // On timeout the blocking thread keeps running to completion; its result
    // is discarded.
    let outcome = match tokio::time::timeout(timeout, task).await {
        Err(_) => TestOutcome::Failed {
            failure: TestFailure::TimedOut {
                timeout_ms: timeout.as_millis() as u64,
            },
        },
        Ok(Err(join_err)) => TestOutcome::Failed {
            failure: TestFailure::Panicked {
                detail: join_err.to_string(),
            },
        },
        Ok(Ok(Err(payload))) => TestOutcome::Failed {
            failure: TestFailure::Panicked {
                detail: panic_detail(payload.as_ref()),
            },
        },
        Ok(Ok(Ok(Ok(())))) => TestOutcome::Passed,
        Ok(Ok(Ok(Err(failure)))) => TestOutcome::Failed { failure },
    };

    let duration = clock.elapsed();
    if let Some(metrics) = &metrics {
        metrics.observe_test(subsystem_name, outcome.passed(), duration.as_secs_f64());
    }
    match &outcome {
        TestOutcome::Passed => debug!(
            subsystem = %subsystem_name,
            test = %descriptor.name,
            duration_ms = duration.as_millis() as u64,
            "test passed"
        ),
        TestOutcome::Failed { failure } => warn!(
            subsystem = %subsystem_name,
            test = %descriptor.name,
            failure = %failure,
            "test failed"
        ),
    }

    TestReport {
        subsystem_id,
        test_id: descriptor.id,
        subsystem: subsystem_name.to_owned(),
        test: descriptor.name,
        outcome,
        lines: sink.lines(),
        started_at,
        duration_ms: duration.as_millis() as u64,
    }
}

fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_owned()
    }
}

/// Fixture file used by a subsystem run. Ephemeral fixtures are removed when
/// the guard drops; configured fixtures are left untouched.
struct FixtureGuard {
    path: PathBuf,
    ephemeral: bool,
}

impl FixtureGuard {
    fn provision(settings: &RunnerSettings) -> Result<Self, RunnerError> {
        if let Some(path) = &settings.fixture_path {
            return Ok(Self {
                path: path.clone(),
                ephemeral: false,
            });
        }
        std::fs::create_dir_all(&settings.work_dir).map_err(RunnerError::Fixture)?;
        let path = settings
            .work_dir
            .join(format!("fixture-{}.txt", Uuid::new_v4().simple()));
        std::fs::write(&path, FIXTURE_CONTENTS).map_err(RunnerError::Fixture)?;
        Ok(Self {
            path,
            ephemeral: true,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FixtureGuard {
    fn drop(&mut self) {
        if self.ephemeral {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use syscheck_kfile::{MemFileStore, OsFileStore};

    use crate::subsystem::{Subsystem, TestDescriptor, TestFn};

    use super::*;

    fn passing_entry(line: &'static str) -> TestFn {
        Arc::new(move |ctx| {
            ctx.log(line);
            Ok(())
        })
    }

    fn failing_entry() -> TestFn {
        Arc::new(|ctx| {
            ctx.log("size comparison failed");
            Err(TestFailure::SizeMismatch {
                expected: 10,
                actual: 9,
            })
        })
    }

    fn subsystem_with(
        id: u32,
        name: &str,
        tests: Vec<(u32, &str, TestFn)>,
    ) -> Subsystem {
        let mut subsystem = Subsystem::new(SubsystemId(id), name, "test subsystem");
        for (test_id, test_name, entry) in tests {
            subsystem
                .register_test(
                    TestDescriptor::new(TestId(test_id), test_name, "test case"),
                    entry,
                )
                .expect("unique test registration");
        }
        subsystem
    }

    fn mem_settings() -> RunnerSettings {
        RunnerSettings {
            fixture_path: Some(PathBuf::from("/virtual/fixture")),
            ..RunnerSettings::default()
        }
    }

    fn runner_with(subsystems: Vec<Subsystem>, settings: RunnerSettings) -> Runner {
        let mut registry = Registry::new();
        for subsystem in subsystems {
            registry.register(subsystem).expect("unique subsystem");
        }
        Runner::new(
            Arc::new(registry),
            Arc::new(MemFileStore::new()),
            settings,
            None,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_all_aggregates_results_in_registration_order() {
        let runner = runner_with(
            vec![
                subsystem_with(0x0100, "alpha", vec![(0x0101, "pass", passing_entry("ok"))]),
                subsystem_with(0x0200, "beta", vec![(0x0201, "fail", failing_entry())]),
            ],
            mem_settings(),
        );

        let report = runner.run_all().await.expect("run all");
        assert_eq!(report.test_count(), 2);
        assert_eq!(report.failure_count(), 1);
        assert!(!report.passed());

        let names: Vec<_> = report
            .subsystems
            .iter()
            .map(|s| s.descriptor.name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(report.subsystems[0].tests[0].lines, vec!["ok"]);
        assert!(matches!(
            report.subsystems[1].tests[0].outcome,
            TestOutcome::Failed {
                failure: TestFailure::SizeMismatch { .. }
            }
        ));
    }

    #[tokio::test]
    async fn run_test_executes_only_the_selected_test() {
        let runner = runner_with(
            vec![subsystem_with(
                0x0100,
                "alpha",
                vec![
                    (0x0101, "first", passing_entry("first ran")),
                    (0x0102, "second", passing_entry("second ran")),
                ],
            )],
            mem_settings(),
        );

        let report = runner.run_test("alpha", "second").await.expect("run test");
        assert_eq!(report.test_count(), 1);
        assert_eq!(report.subsystems[0].tests[0].test, "second");
    }

    #[tokio::test]
    async fn unknown_selectors_are_errors() {
        let runner = runner_with(
            vec![subsystem_with(0x0100, "alpha", vec![])],
            mem_settings(),
        );

        let err = runner.run_subsystem("absent").await.expect_err("unknown");
        assert!(matches!(
            err,
            RunnerError::Registry(RegistryError::UnknownSubsystem(_))
        ));

        let err = runner.run_test("alpha", "absent").await.expect_err("unknown");
        assert!(matches!(
            err,
            RunnerError::Registry(RegistryError::UnknownTest { .. })
        ));
    }

    #[tokio::test]
    async fn empty_subsystem_reports_an_empty_run() {
        let runner = runner_with(
            vec![subsystem_with(0x0100, "alpha", vec![])],
            mem_settings(),
        );
        let report = runner.run_subsystem("alpha").await.expect("run");
        assert_eq!(report.test_count(), 0);
        assert!(report.passed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_test_is_contained_and_reported() {
        let panicking: TestFn = Arc::new(|_ctx| panic!("boom"));
        let runner = runner_with(
            vec![subsystem_with(
                0x0100,
                "alpha",
                vec![(0x0101, "panics", panicking)],
            )],
            mem_settings(),
        );

        let report = runner.run_all().await.expect("run all survives panic");
        match &report.subsystems[0].tests[0].outcome {
            TestOutcome::Failed {
                failure: TestFailure::Panicked { detail },
            } => assert!(detail.contains("boom")),
            other => panic!("expected contained panic, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fail_fast_stops_after_first_failure() {
        let settings = RunnerSettings {
            fail_fast: true,
            ..mem_settings()
        };
        let runner = runner_with(
            vec![subsystem_with(
                0x0100,
                "alpha",
                vec![
                    (0x0101, "fails", failing_entry()),
                    (0x0102, "skipped", passing_entry("should not run")),
                ],
            )],
            settings,
        );

        let report = runner.run_subsystem("alpha").await.expect("run");
        assert_eq!(report.test_count(), 1);
        assert_eq!(report.subsystems[0].tests[0].test, "fails");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_test_times_out() {
        let slow: TestFn = Arc::new(|_ctx| {
            std::thread::sleep(Duration::from_millis(250));
            Ok(())
        });
        let settings = RunnerSettings {
            test_timeout: Duration::from_millis(25),
            ..mem_settings()
        };
        let runner = runner_with(
            vec![subsystem_with(0x0100, "alpha", vec![(0x0101, "slow", slow)])],
            settings,
        );

        let report = runner.run_subsystem("alpha").await.expect("run");
        assert!(matches!(
            report.subsystems[0].tests[0].outcome,
            TestOutcome::Failed {
                failure: TestFailure::TimedOut { .. }
            }
        ));
    }

    #[tokio::test]
    async fn ephemeral_fixture_is_provisioned_and_removed() {
        let work_dir = tempfile::tempdir().expect("tempdir");
        let read_fixture: TestFn = Arc::new(|ctx| {
            let mut handle = ctx.store().open(ctx.fixture()).map_err(|err| {
                TestFailure::Open {
                    path: ctx.fixture().display().to_string(),
                    detail: err.to_string(),
                }
            })?;
            let size = handle.size().map_err(|err| TestFailure::Stat {
                path: ctx.fixture().display().to_string(),
                detail: err.to_string(),
            })?;
            ctx.log(format!("fixture holds {} bytes", size));
            Ok(())
        });

        let settings = RunnerSettings {
            fixture_path: None,
            work_dir: work_dir.path().to_path_buf(),
            ..RunnerSettings::default()
        };
        let mut registry = Registry::new();
        registry
            .register(subsystem_with(
                0x0100,
                "alpha",
                vec![(0x0101, "reads", read_fixture)],
            ))
            .expect("register");
        let runner = Runner::new(
            Arc::new(registry),
            Arc::new(OsFileStore::new()),
            settings,
            None,
        );

        let report = runner.run_subsystem("alpha").await.expect("run");
        assert!(report.passed());

        let leftovers = std::fs::read_dir(work_dir.path())
            .expect("read work dir")
            .count();
        assert_eq!(leftovers, 0, "ephemeral fixture must be cleaned up");
    }
}
