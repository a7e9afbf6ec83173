//! Authenticated HTTP calls to the GCP REST APIs

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::USER_AGENT;
use tracing::{debug, warn};
use url::Url;

pub use reqwest::Method;

use crate::config::{Config, Service};

mod auth;
mod error;
mod mutex;
mod retry;

pub use auth::{Credentials, TokenSource};
pub use error::{api_error, has_status, is_conflict, is_not_found, is_too_many_requests, ApiError};
pub use mutex::MutexKv;
pub use retry::{
    is_common_retryable_code, is_connection_error, is_operation_in_progress, is_quota_per_minute,
    is_subnetwork_not_ready, retry_time_duration, retryable_reason, RetryPredicate,
    DEFAULT_RETRY_PREDICATES,
};

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

impl Config {
    /// Access token for the next request
    pub async fn access_token(&self) -> Result<String> {
        self.tokens
            .token(&self.client, self.base_path(Service::IamCredentials))
            .await
    }
}

/// A single API call, retried on transient errors
#[derive(Debug)]
pub struct ApiRequest<'a> {
    config: &'a Config,
    method: Method,
    url: String,
    billing_project: Option<String>,
    user_agent: Option<&'a str>,
    body: Option<serde_json::Value>,
    timeout: Duration,
    retry_predicates: Vec<RetryPredicate>,
}

impl<'a> ApiRequest<'a> {
    pub fn new(config: &'a Config, method: Method, url: impl Into<String>) -> Self {
        Self {
            config,
            method,
            url: url.into(),
            billing_project: None,
            user_agent: None,
            body: None,
            timeout: config.request_timeout,
            retry_predicates: DEFAULT_RETRY_PREDICATES.to_vec(),
        }
    }

    pub fn get(config: &'a Config, url: impl Into<String>) -> Self {
        Self::new(config, Method::GET, url)
    }

    pub fn post(config: &'a Config, url: impl Into<String>) -> Self {
        Self::new(config, Method::POST, url)
    }

    pub fn delete(config: &'a Config, url: impl Into<String>) -> Self {
        Self::new(config, Method::DELETE, url)
    }

    /// Project billed for the call when `user_project_override` is enabled
    pub fn billing_project(mut self, project: Option<&str>) -> Self {
        self.billing_project = project.filter(|p| !p.is_empty()).map(str::to_owned);
        self
    }

    pub fn user_agent(mut self, user_agent: &'a str) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    pub fn body(mut self, body: JsonMap) -> Self {
        self.body = Some(serde_json::Value::Object(body));
        self
    }

    /// Total time allowed, retries included
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Treat more errors as transient
    pub fn retry_on(mut self, predicate: RetryPredicate) -> Self {
        self.retry_predicates.push(predicate);
        self
    }

    pub async fn send(self) -> Result<JsonMap> {
        let this = &self;
        retry_time_duration(self.timeout, &self.retry_predicates, || this.send_once()).await
    }

    async fn send_once(&self) -> Result<JsonMap> {
        let config = self.config;
        let token = config.access_token().await?;
        let mut request = config
            .client
            .request(self.method.clone(), &self.url)
            .bearer_auth(token)
            .header(USER_AGENT, self.user_agent.unwrap_or(config.user_agent.as_str()))
            .timeout(config.request_timeout);

        if config.user_project_override {
            if let Some(project) = &self.billing_project {
                request = request.header("X-Goog-User-Project", project);
            }
        }
        if let Some(reason) = &config.request_reason {
            request = request.header("X-Goog-Request-Reason", reason);
        }
        if let Some(body) = &self.body {
            debug!(method = %self.method, url = %self.url, %body, "Sending request");
            request = request.json(body);
        } else {
            debug!(method = %self.method, url = %self.url, "Sending request");
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("error sending {} {}", self.method, self.url))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("error reading response of {} {}", self.method, self.url))?;

        if !status.is_success() {
            debug!(%status, body = %text, "Request failed");
            return Err(ApiError::from_body(status.as_u16(), text).into());
        }
        if text.trim().is_empty() {
            return Ok(JsonMap::new());
        }
        serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON object in response of {} {}", self.method, self.url))
    }
}

/// Append query parameters to `raw_url`
pub fn add_query_params(raw_url: &str, params: &[(&str, &str)]) -> Result<String> {
    let mut url = Url::parse(raw_url).with_context(|| format!("invalid url {raw_url}"))?;
    if !params.is_empty() {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, value);
        }
    }
    Ok(url.to_string())
}

/// Treat a 404 as the resource being gone
///
/// Reads use it to remove resources deleted outside of Terraform from the state.
pub fn handle_not_found<T>(result: Result<T>, resource: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if is_not_found(&err) => {
            warn!("Removing {resource} because it's gone");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Project to bill: the provider billing project when set, otherwise the resource project
pub fn billing_project<'b>(config: &'b Config, project: Option<&'b str>) -> Option<&'b str> {
    config
        .billing_project
        .as_deref()
        .filter(|p| !p.is_empty())
        .or(project)
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn query_params() {
        let url = add_query_params(
            "https://managedkafka.googleapis.com/v1/projects/p/locations/l/clusters/c",
            &[("updateMask", "capacityConfig,labels")],
        )
        .unwrap();
        assert_eq!(
            url,
            "https://managedkafka.googleapis.com/v1/projects/p/locations/l/clusters/c?updateMask=capacityConfig%2Clabels"
        );

        let url = add_query_params("https://dlp.googleapis.com/v2/x?a=b", &[("c", "d e")]).unwrap();
        assert_eq!(url, "https://dlp.googleapis.com/v2/x?a=b&c=d+e");
    }

    #[test]
    fn not_found_is_gone() {
        let gone: Result<()> = Err(ApiError::from_body(404, String::new()).into());
        assert_eq!(handle_not_found(gone, "Cluster").ok(), Some(None));

        let other: Result<()> = Err(anyhow!("boom"));
        assert!(handle_not_found(other, "Cluster").is_err());
    }

    #[test]
    fn billing_project_override() {
        let mut config = Config::new(TokenSource::fixed("t"), reqwest::Client::new());
        assert_eq!(billing_project(&config, Some("res")), Some("res"));
        config.billing_project = Some("billing".to_owned());
        assert_eq!(billing_project(&config, Some("res")), Some("billing"));
    }
}
