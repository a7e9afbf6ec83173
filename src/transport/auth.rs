use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use super::ApiError;
use crate::config::DEFAULT_SCOPES;

const IMPERSONATED_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Authentication settings from the provider block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: Option<String>,
    /// Service account key, either JSON contents or a path to the key file
    pub credentials: Option<String>,
    pub impersonate_service_account: Option<String>,
    pub impersonate_service_account_delegates: Vec<String>,
    pub scopes: Vec<String>,
}

enum BaseToken {
    Static(String),
    Provider(Arc<dyn TokenProvider>),
}

struct Impersonation {
    target: String,
    delegates: Vec<String>,
    cache: RwLock<Option<CachedToken>>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Source of OAuth2 access tokens for API calls
pub struct TokenSource {
    base: BaseToken,
    scopes: Vec<String>,
    impersonation: Option<Impersonation>,
}

impl Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let base = match self.base {
            BaseToken::Static(_) => "access_token",
            BaseToken::Provider(_) => "credentials",
        };
        f.debug_struct("TokenSource")
            .field("base", &base)
            .field("scopes", &self.scopes)
            .field(
                "impersonate_service_account",
                &self.impersonation.as_ref().map(|i| &i.target),
            )
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenRequest<'a> {
    delegates: Vec<String>,
    scope: &'a [String],
    lifetime: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
    access_token: String,
}

impl TokenSource {
    /// Always use the same token
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            base: BaseToken::Static(token.into()),
            scopes: default_scopes(),
            impersonation: None,
        }
    }

    /// Resolve credentials: access token first, then a service account key,
    /// then the application default credentials
    pub async fn resolve(credentials: &Credentials) -> Result<Self> {
        let base = if let Some(token) = &credentials.access_token {
            debug!("Authenticating using the configured access_token");
            BaseToken::Static(token.clone())
        } else if let Some(key) = &credentials.credentials {
            let account = if key.trim_start().starts_with('{') {
                debug!("Authenticating using the configured credentials contents");
                CustomServiceAccount::from_json(key)
                    .context("failed to parse the credentials contents")?
            } else {
                debug!(path = %key, "Authenticating using the configured credentials file");
                CustomServiceAccount::from_file(key)
                    .with_context(|| format!("failed to load the credentials file {key}"))?
            };
            BaseToken::Provider(Arc::new(account))
        } else {
            debug!("Authenticating using application default credentials");
            BaseToken::Provider(
                gcp_auth::provider()
                    .await
                    .context("failed to find application default credentials")?,
            )
        };

        let scopes = if credentials.scopes.is_empty() {
            default_scopes()
        } else {
            credentials.scopes.clone()
        };

        let impersonation = credentials
            .impersonate_service_account
            .as_ref()
            .map(|target| Impersonation {
                target: target.clone(),
                delegates: credentials.impersonate_service_account_delegates.clone(),
                cache: RwLock::new(None),
            });

        Ok(Self {
            base,
            scopes,
            impersonation,
        })
    }

    async fn base_token(&self) -> Result<String> {
        match &self.base {
            BaseToken::Static(token) => Ok(token.clone()),
            BaseToken::Provider(provider) => {
                let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
                let token = provider
                    .token(&scopes)
                    .await
                    .context("failed to get an access token")?;
                Ok(token.as_str().to_owned())
            }
        }
    }

    /// Get a valid access token
    ///
    /// Impersonated tokens are exchanged through `iam_credentials_base` and cached.
    pub async fn token(&self, client: &reqwest::Client, iam_credentials_base: &str) -> Result<String> {
        let Some(impersonation) = &self.impersonation else {
            return self.base_token().await;
        };

        if let Some(cached) = impersonation.cache.read().await.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.token.clone());
            }
        }

        let mut cache = impersonation.cache.write().await;
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.token.clone());
            }
        }

        info!(target = %impersonation.target, "Impersonating service account");
        let url = format!(
            "{iam_credentials_base}projects/-/serviceAccounts/{}:generateAccessToken",
            impersonation.target
        );
        let request = GenerateAccessTokenRequest {
            delegates: impersonation
                .delegates
                .iter()
                .map(|d| format!("projects/-/serviceAccounts/{d}"))
                .collect(),
            scope: &self.scopes,
            lifetime: format!("{}s", IMPERSONATED_TOKEN_LIFETIME.as_secs()),
        };
        let response = client
            .post(&url)
            .bearer_auth(self.base_token().await?)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("failed to impersonate {}", impersonation.target))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_body(status.as_u16(), body))
                .with_context(|| format!("failed to impersonate {}", impersonation.target));
        }
        let response: GenerateAccessTokenResponse = response
            .json()
            .await
            .context("invalid generateAccessToken response")?;

        *cache = Some(CachedToken {
            token: response.access_token.clone(),
            expires_at: Instant::now() + IMPERSONATED_TOKEN_LIFETIME - REFRESH_MARGIN,
        });
        Ok(response.access_token)
    }
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}
