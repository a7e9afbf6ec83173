use std::future::Future;
use std::io::ErrorKind;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::api_error;

/// Decide if an error is transient, returning the reason when it is
pub type RetryPredicate = fn(&anyhow::Error) -> Option<&'static str>;

pub const DEFAULT_RETRY_PREDICATES: &[RetryPredicate] = &[
    is_common_retryable_code,
    is_operation_in_progress,
    is_quota_per_minute,
    is_connection_error,
];

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

pub fn is_common_retryable_code(err: &anyhow::Error) -> Option<&'static str> {
    match api_error(err)?.code {
        429 => Some("too many requests"),
        500 => Some("internal server error"),
        502 => Some("bad gateway"),
        503 => Some("service unavailable"),
        _ => None,
    }
}

/// 409s are returned while another operation is running on the same resource
pub fn is_operation_in_progress(err: &anyhow::Error) -> Option<&'static str> {
    let err = api_error(err)?;
    (err.code == 409 && err.body.contains("operationInProgress"))
        .then_some("operation in progress on the resource")
}

/// Per-minute quotas are replenished quickly enough to wait for them
pub fn is_quota_per_minute(err: &anyhow::Error) -> Option<&'static str> {
    static QUOTA: OnceLock<Option<Regex>> = OnceLock::new();
    let err = api_error(err)?;
    if err.code != 403 && err.code != 429 {
        return None;
    }
    QUOTA
        .get_or_init(|| {
            Regex::new(
                r"Quota exceeded for quota (?:metric|group) '[^']*' and limit '[^']* per minute",
            )
            .ok()
        })
        .as_ref()
        .is_some_and(|quota| quota.is_match(&err.body))
        .then_some("per minute quota exceeded")
}

pub fn is_connection_error(err: &anyhow::Error) -> Option<&'static str> {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<reqwest::Error>() {
            if err.is_timeout() {
                return Some("request timed out");
            }
            if err.is_connect() {
                return Some("connection failed");
            }
        }
        if let Some(err) = cause.downcast_ref::<std::io::Error>() {
            match err.kind() {
                ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::TimedOut
                | ErrorKind::UnexpectedEof => return Some("connection interrupted"),
                _ => (),
            }
        }
    }
    None
}

/// Subnetworks that were just created can be reported as not ready
pub fn is_subnetwork_not_ready(err: &anyhow::Error) -> Option<&'static str> {
    let err = api_error(err)?;
    (err.code == 400 && err.body.contains("resourceNotReady") && err.body.contains("subnetworks"))
        .then_some("subnetwork not ready")
}

pub fn retryable_reason(err: &anyhow::Error, predicates: &[RetryPredicate]) -> Option<&'static str> {
    predicates.iter().find_map(|predicate| predicate(err))
}

fn jittered(wait: Duration) -> Duration {
    wait.mul_f64(rand::thread_rng().gen_range(0.8..1.2))
}

/// Call `f` until it succeeds, fails with a non-transient error, or `timeout` elapses
///
/// The last error is returned when the time is up.
pub async fn retry_time_duration<T, F, Fut>(
    timeout: Duration,
    predicates: &[RetryPredicate],
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut wait = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        let err = match f().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let Some(reason) = retryable_reason(&err, predicates) else {
            return Err(err);
        };
        let delay = jittered(wait);
        if Instant::now() + delay > deadline {
            warn!(attempt, "Giving up after transient error ({reason}): {err:#}");
            return Err(err);
        }
        debug!(attempt, ?delay, "Retrying after transient error ({reason}): {err:#}");
        tokio::time::sleep(delay).await;
        wait = (wait * 2).min(MAX_BACKOFF);
        attempt += 1;
    }
}
