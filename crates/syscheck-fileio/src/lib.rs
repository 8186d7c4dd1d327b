//! ---
//! sc_section: "02-capabilities"
//! sc_subsection: "module"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "File-access smoke-test subsystem."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
//! File-access smoke tests.
//!
//! Two short tests exercising the file-access capability end to end: open a
//! fixture and release the handle, then stat it, read it fully, and compare
//! the byte counts. Handles are released by drop on every exit path.

use std::sync::Arc;

use syscheck_core::{
    RegistryError, Subsystem, SubsystemId, TestContext, TestDescriptor, TestFailure, TestId,
};

/// Stable identifier for the file-access subsystem.
pub const SUBSYSTEM_ID: SubsystemId = SubsystemId(0x0a00);
/// Stable identifier for the open/close smoke test.
pub const OPEN_CLOSE_ID: TestId = TestId(0x0a01);
/// Stable identifier for the size/read smoke test.
pub const SIZE_READ_ID: TestId = TestId(0x0a02);

/// Registered subsystem name.
pub const SUBSYSTEM_NAME: &str = "fileio";

/// Build the fileio subsystem with both smoke tests registered.
pub fn build() -> Result<Subsystem, RegistryError> {
    let mut subsystem = Subsystem::new(SUBSYSTEM_ID, SUBSYSTEM_NAME, "file access smoke tests");
    subsystem.register_test(
        TestDescriptor::new(OPEN_CLOSE_ID, "open_close", "file open/close test"),
        Arc::new(open_close),
    )?;
    subsystem.register_test(
        TestDescriptor::new(SIZE_READ_ID, "size_read", "file size/read test"),
        Arc::new(size_read),
    )?;
    Ok(subsystem)
}

fn open_close(ctx: &TestContext) -> Result<(), TestFailure> {
    let path = ctx.fixture();
    let handle = ctx.store().open(path).map_err(|err| {
        ctx.log(format!("failed to open test file {}: {}", path.display(), err));
        TestFailure::Open {
            path: path.display().to_string(),
            detail: err.to_string(),
        }
    })?;
    drop(handle);
    ctx.log(format!(
        "successfully opened and closed test file {}",
        path.display()
    ));
    Ok(())
}

fn size_read(ctx: &TestContext) -> Result<(), TestFailure> {
    let path = ctx.fixture();
    let mut handle = ctx.store().open(path).map_err(|err| {
        ctx.log(format!("failed to open test file {}: {}", path.display(), err));
        TestFailure::Open {
            path: path.display().to_string(),
            detail: err.to_string(),
        }
    })?;

    let size = handle.size().map_err(|err| {
        ctx.log(format!("failed to stat test file {}: {}", path.display(), err));
        TestFailure::Stat {
            path: path.display().to_string(),
            detail: err.to_string(),
        }
    })?;

    let mut buf = vec![0u8; size as usize];
    let read = handle.read_at(&mut buf, 0).map_err(|err| {
        ctx.log(format!("failed to read test file {}: {}", path.display(), err));
        TestFailure::Read {
            path: path.display().to_string(),
            detail: err.to_string(),
        }
    })?;

    if read as u64 != size {
        ctx.log(format!(
            "stat size ({}) does not match number of bytes read ({})",
            size, read
        ));
        return Err(TestFailure::SizeMismatch {
            expected: size,
            actual: read as u64,
        });
    }

    ctx.log(format!(
        "successfully stat'ed and read expected number of bytes ({}) from test file {}",
        size,
        path.display()
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use syscheck_kfile::MemFileStore;

    use super::*;

    const FIXTURE: &str = "/virtual/fixture";

    fn context_for(store: &MemFileStore, test: &str) -> TestContext {
        TestContext::new(
            SUBSYSTEM_NAME,
            test,
            Arc::new(store.clone()),
            PathBuf::from(FIXTURE),
        )
    }

    fn seeded_store() -> MemFileStore {
        let store = MemFileStore::new();
        store.insert(FIXTURE, b"syscheck fixture contents\n".to_vec());
        store
    }

    #[test]
    fn build_registers_both_tests_with_stable_ids() {
        let subsystem = build().expect("build subsystem");
        assert_eq!(subsystem.id(), SUBSYSTEM_ID);
        assert_eq!(subsystem.name(), SUBSYSTEM_NAME);

        let descriptors = subsystem.test_descriptors();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].id, OPEN_CLOSE_ID);
        assert_eq!(descriptors[0].name, "open_close");
        assert_eq!(descriptors[1].id, SIZE_READ_ID);
        assert_eq!(descriptors[1].name, "size_read");
    }

    #[test]
    fn open_close_passes_and_releases_the_handle() {
        let store = seeded_store();
        let ctx = context_for(&store, "open_close");

        open_close(&ctx).expect("open/close passes");
        assert_eq!(store.open_count(), 1);
        assert_eq!(store.close_count(), 1);

        let lines = ctx.sink().lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("successfully opened and closed"));
    }

    #[test]
    fn open_close_reports_missing_fixture() {
        let store = MemFileStore::new();
        let ctx = context_for(&store, "open_close");

        let err = open_close(&ctx).expect_err("absent fixture fails");
        assert!(matches!(err, TestFailure::Open { .. }));
        assert_eq!(store.open_count(), 0);
        assert_eq!(store.close_count(), 0);
    }

    #[test]
    fn size_read_passes_on_matching_counts() {
        let store = seeded_store();
        let ctx = context_for(&store, "size_read");

        size_read(&ctx).expect("size/read passes");
        assert_eq!(store.close_count(), 1);

        let lines = ctx.sink().lines();
        assert!(lines
            .last()
            .expect("success line")
            .contains("expected number of bytes"));
    }

    #[test]
    fn size_read_reports_stat_failure_and_still_closes() {
        let store = seeded_store();
        store.set_fail_stat(true);
        let ctx = context_for(&store, "size_read");

        let err = size_read(&ctx).expect_err("stat failure propagates");
        assert!(matches!(err, TestFailure::Stat { .. }));
        assert_eq!(store.close_count(), 1);
    }

    #[test]
    fn size_read_detects_short_reads_and_still_closes() {
        let store = seeded_store();
        store.set_short_reads(true);
        let ctx = context_for(&store, "size_read");

        let err = size_read(&ctx).expect_err("short read is a mismatch");
        match err {
            TestFailure::SizeMismatch { expected, actual } => {
                assert_eq!(expected, 26);
                assert_eq!(actual, 25);
            }
            other => panic!("expected size mismatch, got {:?}", other),
        }
        assert_eq!(store.close_count(), 1);
    }

    #[test]
    fn bytes_read_never_exceed_reported_size() {
        let store = seeded_store();
        let ctx = context_for(&store, "size_read");

        let mut handle = ctx.store().open(ctx.fixture()).expect("open");
        let size = handle.size().expect("size");
        let mut buf = vec![0u8; size as usize + 32];
        let read = handle.read_at(&mut buf, 0).expect("read");
        assert!(read as u64 <= size);
    }
}
