//! Bearer-token providers for the Keycloak admin API.
//!
//! The pipeline only needs [`CredentialProvider`]: hand out a bearer token, and forget it when
//! the source answers 401 so the next call fetches a fresh one. [`OidcTokenProvider`] obtains
//! tokens from the OpenID Connect token endpoint of the admin realm using exactly one of the
//! supported authentication modes.

use crate::error::ExportError;
use crate::source::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(30);

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(60);

/// Supplies bearer tokens for source requests.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current bearer token, refreshed transparently when close to expiry.
    async fn bearer_token(&self) -> Result<String, ExportError>;

    /// Drop the cached token (called after a 401).
    async fn invalidate(&self);
}

/// How the exporter authenticates against the admin realm. Exactly one is active per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Resource-owner password grant, optionally with a TOTP code
    Password {
        username: String,
        password: String,
        totp: Option<String>,
    },
    /// Client-credentials grant with a client secret
    ClientSecret { secret: String },
    /// Client-credentials grant authenticated by a TLS client certificate (PEM, cert + key)
    ClientCertificate { cert_path: PathBuf },
}

impl AuthMode {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMode::Password { .. } => "password",
            AuthMode::ClientSecret { .. } => "client-secret",
            AuthMode::ClientCertificate { .. } => "client-certificate",
        }
    }
}

/// Build the HTTP client shared by the token provider and the source client.
///
/// With [`AuthMode::ClientCertificate`] the identity is installed on the client so both the
/// token request and admin API calls present the certificate.
pub fn build_http_client(mode: &AuthMode, timeout: Duration) -> Result<reqwest::Client, ExportError> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let AuthMode::ClientCertificate { cert_path } = mode {
        let pem = std::fs::read(cert_path).map_err(|e| {
            ExportError::Config(format!(
                "cannot read client certificate {}: {}",
                cert_path.display(),
                e
            ))
        })?;
        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|e| ExportError::Config(format!("invalid client certificate: {}", e)))?;
        builder = builder.identity(identity);
    }
    builder
        .build()
        .map_err(|e| ExportError::Config(format!("cannot build HTTP client: {}", e)))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// OpenID Connect token-endpoint provider.
///
/// Connection errors and transient statuses from the token endpoint are retried per
/// [`RetryPolicy`] and end in [`ExportError::Transport`] once the budget is spent. Only a
/// rejected grant (400, 401, 403) is an [`ExportError::AuthFailure`].
pub struct OidcTokenProvider {
    token_url: String,
    auth_realm: String,
    client_id: String,
    mode: AuthMode,
    http: reqwest::Client,
    retry: RetryPolicy,
    cached: Mutex<Option<CachedToken>>,
}

impl OidcTokenProvider {
    pub fn new(
        base_url: &str,
        auth_realm: &str,
        client_id: &str,
        mode: AuthMode,
        http: reqwest::Client,
    ) -> Self {
        Self {
            token_url: format!(
                "{}/realms/{}/protocol/openid-connect/token",
                base_url.trim_end_matches('/'),
                urlencoding::encode(auth_realm)
            ),
            auth_realm: auth_realm.to_string(),
            client_id: client_id.to_string(),
            mode,
            http,
            retry: RetryPolicy::default(),
            cached: Mutex::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    fn grant_form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![("client_id", self.client_id.clone())];
        match &self.mode {
            AuthMode::Password {
                username,
                password,
                totp,
            } => {
                form.push(("grant_type", "password".to_string()));
                form.push(("username", username.clone()));
                form.push(("password", password.clone()));
                if let Some(code) = totp {
                    form.push(("totp", code.clone()));
                }
            }
            AuthMode::ClientSecret { secret } => {
                form.push(("grant_type", "client_credentials".to_string()));
                form.push(("client_secret", secret.clone()));
            }
            AuthMode::ClientCertificate { .. } => {
                form.push(("grant_type", "client_credentials".to_string()));
            }
        }
        form
    }

    fn transport_error(&self, message: String) -> ExportError {
        ExportError::Transport {
            realm: self.auth_realm.clone(),
            collection: "token".to_string(),
            message,
        }
    }

    async fn request_token(&self) -> Result<CachedToken, ExportError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            tracing::debug!(
                mode = self.mode.name(),
                url = %self.token_url,
                attempt = attempt,
                "Requesting admin token"
            );

            let response = match self
                .http
                .post(&self.token_url)
                .form(&self.grant_form())
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    if self.retry.allows_retry(attempt) {
                        let delay = self.retry.backoff(attempt);
                        tracing::warn!(
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Token endpoint unreachable, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(self.transport_error(format!(
                        "token endpoint unreachable: {} (after {} attempts)",
                        e, attempt
                    )));
                }
            };

            let status = response.status();
            if status.is_success() {
                let token: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| self.transport_error(format!("unreadable token response: {}", e)))?;

                let lifetime = token
                    .expires_in
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_TOKEN_LIFETIME);

                return Ok(CachedToken {
                    access_token: token.access_token,
                    refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
                });
            }

            if is_rejected_grant(status) {
                return Err(ExportError::AuthFailure {
                    reason: format!("token endpoint returned HTTP {}", status.as_u16()),
                });
            }

            if self.retry.is_transient(status) && self.retry.allows_retry(attempt) {
                let delay = self.retry.backoff(attempt);
                tracing::warn!(
                    status = status.as_u16(),
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Token endpoint returned a transient status, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(self.transport_error(format!(
                "token endpoint returned HTTP {} after {} attempts",
                status.as_u16(),
                attempt
            )));
        }
    }
}

/// Statuses with which the token endpoint refuses the credential itself.
fn is_rejected_grant(status: StatusCode) -> bool {
    status == StatusCode::BAD_REQUEST
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
}

#[async_trait]
impl CredentialProvider for OidcTokenProvider {
    async fn bearer_token(&self) -> Result<String, ExportError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.access_token.clone());
            }
            tracing::debug!("Admin token close to expiry, refreshing");
        }
        let fresh = self.request_token().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

/// A fixed bearer token, for pre-issued tokens and tests.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String, ExportError> {
        Ok(self.0.clone())
    }

    async fn invalidate(&self) {}
}
