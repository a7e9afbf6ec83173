//! Long-running operations returned by the GCP APIs

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::transport::{api_error, ApiRequest, JsonMap};

mod state_change;

pub use state_change::{StateChangeConf, StateChangeError};

const PENDING: &[&str] = &["done: false"];
const TARGET: &[&str] = &["done: true"];

/// `google.longrunning.Operation`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonMap>,
}

/// `google.rpc.Status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Error)]
#[error("Error code {code}, message: {message}")]
pub struct Status {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<serde_json::Value>,
}

impl Operation {
    pub fn from_json(op: JsonMap) -> Result<Self> {
        serde_json::from_value(serde_json::Value::Object(op)).context("invalid operation")
    }

    fn state(&self) -> String {
        format!("done: {}", self.done)
    }

    /// The operation result: its response, or its error
    pub fn into_result(self) -> Result<JsonMap> {
        match self.error {
            Some(status) => Err(status.into()),
            None => Ok(self.response.unwrap_or_default()),
        }
    }
}

/// The operation resource can take a moment to be visible after it is returned
fn operation_not_found(err: &anyhow::Error) -> Option<&'static str> {
    (api_error(err)?.code == 404).then_some("operation not found yet")
}

/// Poll an operation resource until it is done
#[derive(Debug)]
pub struct OperationWaiter<'a> {
    config: &'a Config,
    base_path: &'a str,
    project: Option<&'a str>,
    user_agent: &'a str,
}

impl<'a> OperationWaiter<'a> {
    pub fn new(config: &'a Config, base_path: &'a str, project: Option<&'a str>, user_agent: &'a str) -> Self {
        Self {
            config,
            base_path,
            project,
            user_agent,
        }
    }

    async fn refresh(&self, name: &str) -> Result<Option<(Operation, String)>> {
        let url = format!("{}{}", self.base_path, name);
        let op = ApiRequest::get(self.config, url)
            .billing_project(self.project)
            .user_agent(self.user_agent)
            .retry_on(operation_not_found)
            .send()
            .await?;
        let op = Operation::from_json(op)?;
        let state = op.state();
        Ok(Some((op, state)))
    }

    pub async fn wait(&self, op: Operation, activity: &str, timeout: Duration) -> Result<Operation> {
        if op.done {
            return Ok(op);
        }
        if op.name.is_empty() {
            anyhow::bail!("{activity}: operation has no name");
        }

        info!(operation = %op.name, "Waiting for {activity}");
        let mut conf = StateChangeConf::new(PENDING, TARGET, timeout);
        conf.min_timeout = self.config.poll_interval;
        let name = op.name.as_str();
        let done = conf
            .wait_for_state(move || self.refresh(name))
            .await
            .map_err(|err| match err.downcast_ref::<StateChangeError>() {
                Some(StateChangeError::Timeout { .. }) => anyhow::anyhow!(
                    "timeout while waiting for operation {} to finish",
                    op.name
                ),
                _ => err,
            })?;
        debug!(operation = %done.name, "Operation finished");
        Ok(done)
    }
}

/// Wait for `op` to finish and return its response
pub async fn operation_wait_time_with_response(
    config: &Config,
    op: JsonMap,
    base_path: &str,
    activity: &str,
    project: Option<&str>,
    user_agent: &str,
    timeout: Duration,
) -> Result<JsonMap> {
    let op = Operation::from_json(op)?;
    OperationWaiter::new(config, base_path, project, user_agent)
        .wait(op, activity, timeout)
        .await?
        .into_result()
        .with_context(|| format!("Error waiting for {activity}"))
}

/// Wait for `op` to finish, reporting its error if any
pub async fn operation_wait_time(
    config: &Config,
    op: JsonMap,
    base_path: &str,
    activity: &str,
    project: Option<&str>,
    user_agent: &str,
    timeout: Duration,
) -> Result<()> {
    operation_wait_time_with_response(config, op, base_path, activity, project, user_agent, timeout)
        .await
        .map(|_| ())
}
