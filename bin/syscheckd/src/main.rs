//! ---
//! sc_section: "01-harness-core"
//! sc_subsection: "binary"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "Binary entrypoint for the syscheck daemon."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use syscheck_api::{spawn_api_server, ApiServer, ApiState};
use syscheck_common::config::{hash_app_config, AppConfig};
use syscheck_common::logging::init_tracing;
use syscheck_common::version::VersionInfo;
use syscheck_core::{Registry, RunReport, Runner, RunnerSettings, TestOutcome};
use syscheck_kfile::OsFileStore;
use syscheck_metrics::{new_registry, spawn_http_server, HarnessMetrics};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "syscheck harness daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the daemon with the control API")]
    Run,
    #[command(about = "Print registered subsystems and their tests, then exit")]
    List,
    #[command(about = "Run every registered test once; exit non-zero on any failure")]
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let version = VersionInfo::current();
    if cli.version {
        println!("{}", version.extended());
        return Ok(());
    }

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/syscheck.toml"));
    candidates.push(PathBuf::from("configs/example.toml"));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    let config_path = loaded.source;
    let config_hash = hash_app_config(&config)?;

    init_tracing("syscheckd", &config.logging)?;
    info!(
        config_path = %config_path.display(),
        config_hash = %config_hash,
        load_ms = load_started.elapsed().as_millis() as u64,
        "configuration loaded"
    );

    let registry = bootstrap_registry()?;
    info!(
        subsystems = registry.len(),
        tests = registry.test_count(),
        "registry populated"
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config, registry, version).await?,
        Commands::List => list_registry(&registry),
        Commands::Check => {
            let runner = Runner::new(
                registry,
                Arc::new(OsFileStore::new()),
                runner_settings(&config),
                None,
            );
            let report = runner.run_all().await?;
            render_run_report(&report);
            if !report.passed() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Register every built-in subsystem. New plugins are added here.
fn bootstrap_registry() -> Result<Arc<Registry>> {
    let mut registry = Registry::new();
    registry.register(syscheck_fileio::build()?)?;
    Ok(Arc::new(registry))
}

fn runner_settings(config: &AppConfig) -> RunnerSettings {
    RunnerSettings {
        fixture_path: config.harness.fixture_path.clone(),
        work_dir: config.harness.work_dir.clone(),
        test_timeout: config.harness.test_timeout,
        fail_fast: config.harness.fail_fast,
    }
}

async fn run_daemon(config: AppConfig, registry: Arc<Registry>, version: VersionInfo) -> Result<()> {
    let metrics_settings = config.metrics.clone();
    let api_settings = config.api.clone();

    let mut harness_metrics = None;
    let metrics_server = if metrics_settings.enabled {
        let metrics_registry = new_registry();
        harness_metrics = Some(HarnessMetrics::new(metrics_registry.clone())?);
        let server = spawn_http_server(metrics_registry, metrics_settings.listen)?;
        info!(address = %server.addr(), "metrics exporter enabled");
        Some(server)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let runner = Arc::new(Runner::new(
        registry,
        Arc::new(OsFileStore::new()),
        runner_settings(&config),
        harness_metrics,
    ));

    let mut api_server: Option<ApiServer> = None;
    if api_settings.enabled {
        let state = Arc::new(ApiState::new(
            runner.clone(),
            version,
            api_settings.report_history,
        ));
        match spawn_api_server(state, api_settings.listen) {
            Ok(server) => {
                info!(address = %server.addr(), "api server listening");
                api_server = Some(server);
            }
            Err(err) => {
                warn!(error = %err, "failed to start api server");
            }
        }
    } else {
        info!("api server disabled by configuration");
    }

    info!("daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    if let Some(server) = api_server {
        server.shutdown().await?;
    }
    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    Ok(())
}

fn list_registry(registry: &Registry) {
    for subsystem in registry.subsystems() {
        let descriptor = subsystem.descriptor();
        println!(
            "{}  {}  {}",
            descriptor.id, descriptor.name, descriptor.description
        );
        for test in subsystem.test_descriptors() {
            println!("  {}  {}  {}", test.id, test.name, test.description);
        }
    }
}

fn render_run_report(report: &RunReport) {
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
        }
    }
    println!(
        "summary: {} tests, {} failed",
        report.test_count(),
        report.failure_count()
    );
}
