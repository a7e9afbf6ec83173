use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, trace};

const INITIAL_WAIT: Duration = Duration::from_millis(100);
const MAX_WAIT: Duration = Duration::from_secs(10);
const DEFAULT_NOT_FOUND_CHECKS: usize = 20;

#[derive(Debug, Error)]
pub enum StateChangeError {
    #[error("timeout while waiting for state to become '{target}' (last state: '{last_state}', timeout: {timeout:?})")]
    Timeout {
        target: String,
        last_state: String,
        timeout: Duration,
    },
    #[error("unexpected state '{state}', wanted target '{target}'")]
    UnexpectedState { state: String, target: String },
    #[error("couldn't find resource ({checks} retries)")]
    NotFound { checks: usize },
}

/// Poll a resource until it reaches one of the `target` states
///
/// The refresh function returns `None` while the resource cannot be found, and the
/// value with its current state otherwise. An empty `pending` list accepts any state.
#[derive(Debug, Clone)]
pub struct StateChangeConf<'s> {
    pub pending: &'s [&'s str],
    pub target: &'s [&'s str],
    pub timeout: Duration,
    /// Wait before the first refresh
    pub delay: Duration,
    /// Lower bound of the wait between two refreshes
    pub min_timeout: Duration,
    /// Fixed wait between two refreshes, replacing the exponential backoff
    pub poll_interval: Option<Duration>,
    pub not_found_checks: usize,
    /// Number of consecutive refreshes that must observe a target state
    pub continuous_target_occurence: usize,
}

impl<'s> StateChangeConf<'s> {
    pub fn new(pending: &'s [&'s str], target: &'s [&'s str], timeout: Duration) -> Self {
        Self {
            pending,
            target,
            timeout,
            delay: Duration::ZERO,
            min_timeout: Duration::ZERO,
            poll_interval: None,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            continuous_target_occurence: 1,
        }
    }

    pub async fn wait_for_state<T, F, Fut>(&self, refresh: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<(T, String)>>>,
    {
        let mut last_state = String::new();
        let polled = tokio::time::timeout(self.timeout, self.poll(refresh, &mut last_state)).await;
        match polled {
            Ok(result) => result,
            Err(_) => Err(StateChangeError::Timeout {
                target: self.target.join(", "),
                last_state,
                timeout: self.timeout,
            }
            .into()),
        }
    }

    async fn poll<T, F, Fut>(&self, mut refresh: F, last_state: &mut String) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<(T, String)>>>,
    {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut wait = INITIAL_WAIT;
        let mut not_found_ticks = 0;
        let mut target_occurence = 0;
        loop {
            match refresh().await? {
                None => {
                    target_occurence = 0;
                    not_found_ticks += 1;
                    if not_found_ticks > self.not_found_checks {
                        return Err(StateChangeError::NotFound {
                            checks: not_found_ticks,
                        }
                        .into());
                    }
                }
                Some((value, state)) => {
                    trace!(%state, "Refreshed state");
                    not_found_ticks = 0;
                    if self.target.contains(&state.as_str()) {
                        target_occurence += 1;
                        if target_occurence >= self.continuous_target_occurence.max(1) {
                            return Ok(value);
                        }
                    } else if self.pending.is_empty() || self.pending.contains(&state.as_str()) {
                        target_occurence = 0;
                    } else {
                        return Err(StateChangeError::UnexpectedState {
                            state,
                            target: self.target.join(", "),
                        }
                        .into());
                    }
                    *last_state = state;
                }
            }

            if target_occurence == 0 {
                wait *= 2;
            }
            wait = match self.poll_interval {
                Some(interval) if !interval.is_zero() => interval,
                _ => wait.max(self.min_timeout).min(MAX_WAIT),
            };
            debug!(?wait, "Waiting before next refresh");
            tokio::time::sleep(wait).await;
        }
    }
}
