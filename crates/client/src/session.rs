//! Session acquisition: turning "Plaud Desktop is installed and signed in"
//! into something API calls can use.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::bridge::{self, BridgeHandle};
use crate::config::{AuthStrategy, Config};
use crate::error::{from_reqwest, ClientError, Result};
use crate::token;

/// An acquired authenticated context.
///
/// The two desktop-backed variants are deliberately kept distinct: a token is
/// a stored secret with an expiry, a bridge is a capability handed off by a
/// cooperating process, and they invalidate differently.
#[derive(Debug, Clone)]
pub enum Session {
    Token(TokenSession),
    Bridge(Arc<BridgeHandle>),
}

#[derive(Debug, Clone)]
pub struct TokenSession {
    pub jwt: String,
    pub user_id: String,
    /// Seconds since the epoch, when known.
    pub expires_at: Option<i64>,
}

impl Session {
    /// Which strategy produced this session, for logs and status reports.
    pub fn strategy_name(&self) -> &'static str {
        match self {
            Session::Token(_) => "token",
            Session::Bridge(_) => "bridge",
        }
    }

    /// A token past its `exp` claim is invalid before any call is made.
    pub fn is_expired(&self, now_secs: i64) -> bool {
        match self {
            Session::Token(t) => t.expires_at.is_some_and(|exp| exp <= now_secs),
            Session::Bridge(_) => false,
        }
    }
}

/// Source of sessions. The production implementation reads the desktop app;
/// tests inject fakes to drive expiry and re-acquisition paths.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self) -> Result<Session>;
}

/// Acquires sessions from Plaud Desktop using the configured strategy.
pub struct DesktopAcquirer {
    config: Config,
    http: reqwest::Client,
}

impl DesktopAcquirer {
    pub fn new(config: Config) -> Self {
        DesktopAcquirer {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn extract(&self) -> Result<Session> {
        token::extract_token(&self.config.storage_dir).map(Session::Token)
    }

    async fn attach(&self) -> Result<Session> {
        bridge::attach(&self.config)
            .await
            .map(|handle| Session::Bridge(Arc::new(handle)))
    }

    /// Exchange configured client credentials for a bearer token.
    async fn exchange_keys(&self) -> Result<Session> {
        let (Some(client_id), Some(client_secret)) =
            (&self.config.client_id, &self.config.client_secret)
        else {
            return Err(ClientError::CredentialNotFound(
                "PLAUD_CLIENT_ID / PLAUD_CLIENT_SECRET not configured".to_string(),
            ));
        };

        let response = self
            .http
            .post(format!("{}/auth/token", self.config.api_base))
            .json(&serde_json::json!({
                "client_id": client_id,
                "client_secret": client_secret,
                "grant_type": "client_credentials",
            }))
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ClientError::Unauthorized(
                "client credentials rejected".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(ClientError::RemoteError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response.json().await.map_err(from_reqwest)?;
        let jwt = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::RemoteError {
                status: 0,
                message: "token endpoint returned no access_token".to_string(),
            })?
            .to_string();
        let expires_at = body
            .get("expires_in")
            .and_then(Value::as_i64)
            .map(|secs| chrono::Utc::now().timestamp() + secs);

        Ok(Session::Token(TokenSession {
            jwt,
            user_id: client_id.clone(),
            expires_at,
        }))
    }
}

#[async_trait]
impl SessionProvider for DesktopAcquirer {
    async fn acquire(&self) -> Result<Session> {
        match self.config.strategy {
            AuthStrategy::Token => self.extract(),
            AuthStrategy::Bridge => self.attach().await,
            AuthStrategy::Keys => self.exchange_keys().await,
            AuthStrategy::Auto => {
                // Token extraction is cheap and has no side effects on the
                // desktop app, so it goes first.
                match self.extract() {
                    Ok(session) => Ok(session),
                    Err(extract_err) => {
                        log::debug!("token extraction failed ({extract_err}), trying bridge");
                        self.attach().await
                    }
                }
            }
        }
    }
}
