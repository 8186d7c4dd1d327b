//! ---
//! sc_section: "01-harness-core"
//! sc_subsection: "module"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "Shared primitives and utilities for the harness runtime."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
//! Core shared primitives for the syscheck workspace.
//! This crate exposes configuration loading, logging setup, and version
//! metadata utilities consumed across the workspace.

pub mod config;
pub mod logging;
pub mod version;

pub use config::{
    ApiConfig, AppConfig, HarnessConfig, LoadedAppConfig, LoggingConfig, MetricsConfig,
    hash_app_config,
};
pub use logging::{init_tracing, LogFormat};
pub use version::VersionInfo;
