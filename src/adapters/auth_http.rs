//! Hosted auth service client (password grant)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;
use zeroize::Zeroize;

use super::session::{require_credentials, SessionHub, SessionProvider, SessionSubscription};
use crate::config::AuthConfig;
use crate::domain::Principal;
use crate::error::{HiveError, Result};

#[derive(Debug, Serialize)]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<AuthUser>,
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    #[serde(default, alias = "error_description", alias = "msg")]
    message: Option<String>,
}

/// Session provider backed by the hosted auth REST API
pub struct HttpSessionProvider {
    http: Client,
    base_url: String,
    anon_key: String,
    hub: SessionHub,
    access_token: RwLock<Option<String>>,
}

impl HttpSessionProvider {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(HiveError::Validation("auth.url is not configured".to_string()));
        }

        Ok(Self {
            http: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            hub: SessionHub::new(),
            access_token: RwLock::new(None),
        })
    }

    async fn post_credentials(&self, path: &str, email: &str, password: &str) -> Result<SessionResponse> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Auth request: {}", path);

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&PasswordRequest { email, password })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<AuthErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.to_string());
            return Err(HiveError::Auth(message));
        }

        Ok(response.json().await?)
    }

    async fn adopt(&self, body: SessionResponse, fallback_email: &str) -> Option<Principal> {
        let token = body.access_token?;
        let user = body.user?;

        let principal = Principal {
            user_id: user.id,
            email: user.email.unwrap_or_else(|| fallback_email.to_string()),
        };
        let previous = self.access_token.write().await.replace(token);
        if let Some(mut old) = previous {
            old.zeroize();
        }
        self.hub.set(Some(principal.clone()));
        Some(principal)
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn current_session(&self) -> Result<Option<Principal>> {
        Ok(self.hub.current())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal> {
        require_credentials(email, password)?;
        let body = self
            .post_credentials("/auth/v1/token?grant_type=password", email, password)
            .await?;

        self.adopt(body, email)
            .await
            .ok_or_else(|| HiveError::Auth("auth response carried no session".to_string()))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Principal>> {
        require_credentials(email, password)?;
        let body = self.post_credentials("/auth/v1/signup", email, password).await?;
        Ok(self.adopt(body, email).await)
    }

    async fn sign_out(&self) -> Result<()> {
        let token = self.access_token.write().await.take();

        if let Some(mut token) = token {
            let url = format!("{}/auth/v1/logout", self.base_url);
            let result = self
                .http
                .post(&url)
                .header("apikey", &self.anon_key)
                .bearer_auth(&token)
                .send()
                .await;
            token.zeroize();

            // The local session ends regardless of what the server says.
            if let Err(e) = result {
                warn!("Remote sign-out failed: {}", e);
            }
        }

        self.hub.set(None);
        Ok(())
    }

    fn subscribe(&self) -> SessionSubscription {
        self.hub.subscribe()
    }
}
