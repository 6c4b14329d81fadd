//! Text-generation provider connectivity check
//!
//! A single request/response exchange used only to decide whether a submitted
//! credential may be used to register an agent.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ConnectivityConfig;
use crate::domain::Provider;
use crate::error::{HiveError, Result};

const GOOGLE_PROBE_MODEL: &str = "gemini-1.5-flash";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Verifies that a provider accepts a credential
#[async_trait]
pub trait ConnectivityCheck: Send + Sync {
    /// `Ok(true)` if the provider answered the probe. Transport failures are
    /// a plain `false`, never an error.
    async fn check(&self, provider: Provider, api_key: &str) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Option<serde_json::Value>,
}

/// HTTP connectivity check against the public provider APIs
pub struct HttpConnectivityCheck {
    http: Client,
    config: ConnectivityConfig,
}

impl HttpConnectivityCheck {
    pub fn new(config: ConnectivityConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { http, config })
    }

    async fn probe_google(&self, api_key: &str) -> std::result::Result<bool, reqwest::Error> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.google_url.trim_end_matches('/'),
            GOOGLE_PROBE_MODEL
        );
        let body = json!({ "contents": [{ "parts": [{ "text": "Respond with 'Success'." }] }] });

        let response = self
            .http
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let parsed: GenerateContentResponse = response.json().await?;
        Ok(parsed.candidates.is_some())
    }

    async fn probe_openai(&self, api_key: &str) -> std::result::Result<bool, reqwest::Error> {
        let url = format!("{}/v1/models", self.config.openai_url.trim_end_matches('/'));
        let response = self.http.get(&url).bearer_auth(api_key).send().await?;
        Ok(response.status().is_success())
    }

    async fn probe_anthropic(&self, api_key: &str) -> std::result::Result<bool, reqwest::Error> {
        let url = format!("{}/v1/models", self.config.anthropic_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl ConnectivityCheck for HttpConnectivityCheck {
    async fn check(&self, provider: Provider, api_key: &str) -> Result<bool> {
        if api_key.trim().is_empty() {
            return Err(HiveError::Validation("Enter API Key.".to_string()));
        }

        debug!(%provider, "Probing provider connectivity");
        let outcome = match provider {
            Provider::Google => self.probe_google(api_key).await,
            Provider::OpenAI => self.probe_openai(api_key).await,
            Provider::Anthropic => self.probe_anthropic(api_key).await,
        };

        match outcome {
            Ok(ok) => Ok(ok),
            Err(e) => {
                warn!(%provider, "Connectivity probe failed: {}", e);
                Ok(false)
            }
        }
    }
}

/// Connectivity check that accepts every non-empty key (offline mode)
pub struct AcceptAllConnectivity;

#[async_trait]
impl ConnectivityCheck for AcceptAllConnectivity {
    async fn check(&self, _provider: Provider, api_key: &str) -> Result<bool> {
        if api_key.trim().is_empty() {
            return Err(HiveError::Validation("Enter API Key.".to_string()));
        }
        Ok(true)
    }
}
