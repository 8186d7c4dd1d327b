//! ---
//! sc_section: "01-harness-core"
//! sc_subsection: "module"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "Shared primitives and utilities for the harness runtime."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
use serde::Serialize;

/// Build-time version metadata surfaced by the binaries and the status API.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub semver: String,
}

impl VersionInfo {
    /// Version metadata for the currently running workspace build.
    pub fn current() -> Self {
        Self {
            semver: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }

    /// Short form used in CLI banners, e.g. `syscheck 0.1.0`.
    pub fn cli_string(&self) -> String {
        format!("syscheck {}", self.semver)
    }

    /// Multi-line form for `--version` output.
    pub fn extended(&self) -> String {
        format!("syscheck {}\nlicense: Apache-2.0", self.semver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_string_contains_semver() {
        let version = VersionInfo::current();
        assert!(version.cli_string().contains(&version.semver));
        assert!(version.extended().starts_with("syscheck "));
    }
}
