//! ---
//! sc_section: "05-control-plane"
//! sc_subsection: "module"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "REST control surface for the harness daemon."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
//! REST control surface consumed by `syscheckctl`.
//!
//! The daemon owns the dispatcher; this crate exposes it over HTTP so the
//! operator CLI can discover subsystems, trigger runs, and fetch recent
//! reports.

use std::collections::VecDeque;
use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use syscheck_common::VersionInfo;
use syscheck_core::{
    RegistryError, RunReport, RunSelection, Runner, RunnerError, SubsystemDescriptor,
    TestDescriptor,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared API state exposed to handlers.
pub struct ApiState {
    runner: Arc<Runner>,
    version: VersionInfo,
    start: Instant,
    reports: RwLock<VecDeque<RunReport>>,
    report_history: usize,
}

impl ApiState {
    pub fn new(runner: Arc<Runner>, version: VersionInfo, report_history: usize) -> Self {
        Self {
            runner,
            version,
            start: Instant::now(),
            reports: RwLock::new(VecDeque::new()),
            report_history: report_history.max(1),
        }
    }

    /// Execute a selection through the dispatcher and retain the report.
    pub async fn execute(&self, selection: &RunSelection) -> Result<RunReport, RunnerError> {
        let report = self.runner.run(selection).await?;
        self.record_report(report.clone());
        Ok(report)
    }

    fn status(&self) -> StatusResponse {
        let registry = self.runner.registry();
        StatusResponse {
            version: self.version.cli_string(),
            uptime_seconds: self.start.elapsed().as_secs(),
            subsystem_count: registry.len(),
            test_count: registry.test_count(),
            runs_recorded: self.reports.read().len(),
        }
    }

    fn subsystems(&self) -> Vec<SubsystemInfo> {
        self.runner
            .registry()
            .subsystems()
            .map(|subsystem| SubsystemInfo {
                descriptor: subsystem.descriptor().clone(),
                tests: subsystem.test_descriptors(),
            })
            .collect()
    }

    fn record_report(&self, report: RunReport) {
        let mut reports = self.reports.write();
        if reports.len() == self.report_history {
            reports.pop_front();
        }
        reports.push_back(report);
    }

    /// Recent run reports, newest first.
    pub fn recent_reports(&self) -> Vec<RunReport> {
        self.reports.read().iter().rev().cloned().collect()
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("version", &self.version)
            .field("report_history", &self.report_history)
            .finish_non_exhaustive()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// Actual bound address; differs from the requested one for port 0.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Spawn the REST API server.
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let router = Router::new()
        .route("/api/status", get(get_status))
        .route("/api/subsystems", get(get_subsystems))
        .route("/api/run", post(post_run))
        .route("/api/reports", get(get_reports))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    let addr = listener
        .local_addr()
        .context("failed to resolve API listener address")?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_seconds: u64,
    pub subsystem_count: usize,
    pub test_count: usize,
    pub runs_recorded: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubsystemInfo {
    pub descriptor: SubsystemDescriptor,
    pub tests: Vec<TestDescriptor>,
}

/// Body of `POST /api/run`. Omitting both selectors runs everything.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct RunRequest {
    #[serde(default)]
    pub subsystem: Option<String>,
    #[serde(default)]
    pub test: Option<String>,
}

impl RunRequest {
    fn selection(self) -> Result<RunSelection, ApiError> {
        match (self.subsystem, self.test) {
            (None, None) => Ok(RunSelection::All),
            (Some(subsystem), None) => Ok(RunSelection::Subsystem(subsystem)),
            (Some(subsystem), Some(test)) => Ok(RunSelection::Test { subsystem, test }),
            (None, Some(_)) => Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "a test selector requires a subsystem selector",
            )),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn from_runner(err: RunnerError) -> Self {
        match &err {
            RunnerError::Registry(
                RegistryError::UnknownSubsystem(_) | RegistryError::UnknownTest { .. },
            ) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(state.status())
}

async fn get_subsystems(State(state): State<Arc<ApiState>>) -> Json<Vec<SubsystemInfo>> {
    Json(state.subsystems())
}

async fn post_run(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<RunRequest>,
) -> Result<Json<RunReport>, ApiError> {
    let selection = request.selection()?;
    state
        .execute(&selection)
        .await
        .map(Json)
        .map_err(ApiError::from_runner)
}

async fn get_reports(State(state): State<Arc<ApiState>>) -> Json<Vec<RunReport>> {
    Json(state.recent_reports())
}
