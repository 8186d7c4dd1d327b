//! ---
//! sc_section: "05-control-plane"
//! sc_subsection: "binary"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "Operator control CLI for the syscheck daemon."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
use anyhow::{anyhow, Context, Result};
use syscheck_api::{RunRequest, StatusResponse, SubsystemInfo};
use syscheck_core::RunReport;

/// Thin HTTP client for the daemon control API.
pub struct ApiClient {
    base: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_owned(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let url = format!("{}/api/status", self.base);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach daemon at {}", url))?;
        Self::expect_success(&url, &response)?;
        response
            .json()
            .await
            .with_context(|| "failed to decode status response")
    }

    pub async fn subsystems(&self) -> Result<Vec<SubsystemInfo>> {
        let url = format!("{}/api/subsystems", self.base);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach daemon at {}", url))?;
        Self::expect_success(&url, &response)?;
        response
            .json()
            .await
            .with_context(|| "failed to decode subsystem listing")
    }

    pub async fn run(&self, request: &RunRequest) -> Result<RunReport> {
        let url = format!("{}/api/run", self.base);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("failed to reach daemon at {}", url))?;
        if !response.status().is_success() {
            let status = response.status();
            let message = Self::error_message(response).await;
            return Err(anyhow!("daemon rejected run ({}): {}", status, message));
        }
        response
            .json()
            .await
            .with_context(|| "failed to decode run report")
    }

    pub async fn reports(&self) -> Result<Vec<RunReport>> {
        let url = format!("{}/api/reports", self.base);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach daemon at {}", url))?;
        Self::expect_success(&url, &response)?;
        response
            .json()
            .await
            .with_context(|| "failed to decode report history")
    }

    fn expect_success(url: &str, response: &reqwest::Response) -> Result<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("daemon returned {} for {}", response.status(), url))
        }
    }

    async fn error_message(response: reqwest::Response) -> String {
        match response.json::<serde_json::Value>().await {
            Ok(body) => body
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("no error detail provided")
                .to_owned(),
            Err(_) => "no error detail provided".to_owned(),
        }
    }
}
