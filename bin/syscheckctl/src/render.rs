//! ---
//! sc_section: "05-control-plane"
//! sc_subsection: "binary"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "Operator control CLI for the syscheck daemon."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
use syscheck_api::{StatusResponse, SubsystemInfo};
use syscheck_core::{RunReport, TestOutcome};

pub fn status(status: &StatusResponse) {
    println!("Version: {}", status.version);
    println!("Uptime: {}s", status.uptime_seconds);
    println!(
        "Registered: {} subsystems, {} tests",
        status.subsystem_count, status.test_count
    );
    println!("Runs recorded: {}", status.runs_recorded);
}

pub fn subsystems(subsystems: &[SubsystemInfo]) {
    for info in subsystems {
        println!(
            "{}  {}  {}",
            info.descriptor.id, info.descriptor.name, info.descriptor.description
        );
        for test in &info.tests {
            println!("  {}  {}  {}", test.id, test.name, test.description);
        }
    }
}

/// Print a full run report with captured log lines. Returns overall pass.
pub fn run_report(report: &RunReport) -> bool {
    for subsystem in &report.subsystems {
        for test in &subsystem.tests {
            match &test.outcome {
                TestOutcome::Passed => println!(
                    "{}/{}: PASS ({} ms)",
                    test.subsystem, test.test, test.duration_ms
                ),
                TestOutcome::Failed { failure } => println!(
                    "{}/{}: FAIL ({} ms) - {}",
                    test.subsystem, test.test, test.duration_ms, failure
                ),
            }
            for line in &test.lines {
                println!("    {}", line);
            }
        }
    }
    println!(
        "summary: {} tests, {} failed",
        report.test_count(),
        report.failure_count()
    );
    report.passed()
}

pub fn report_summaries(reports: &[RunReport], limit: usize) {
    if reports.is_empty() {
        println!("no runs recorded");
        return;
    }
    for report in reports.iter().take(limit) {
        println!(
            "{}  {}  {} tests, {} failed",
            report.run_id,
            report.started_at.to_rfc3339(),
            report.test_count(),
            report.failure_count()
        );
    }
}
