use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::time::sleep;
use tracing::debug;

use super::policy::{compare_iam_policies, Policy};
use crate::transport::{
    is_conflict, is_too_many_requests, retry_time_duration, MutexKv, DEFAULT_RETRY_PREDICATES,
};

const MAX_BACKOFF: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(600);
const CONFIRMATIONS: usize = 3;

/// Get and set the IAM policy of one resource
#[async_trait]
pub trait ResourceIamUpdater: Send + Sync {
    async fn get_resource_iam_policy(&self) -> Result<Policy>;
    async fn set_resource_iam_policy(&self, policy: &Policy) -> Result<()>;

    /// Key serialising the policy changes of the resource, such as `iam-project-{id}`
    fn get_mutex_key(&self) -> String;
    fn get_resource_id(&self) -> String;
    /// Description of the resource used in messages, including its id
    fn describe_resource(&self) -> String;
}

/// Fetch the policy of a resource, retrying transient errors
pub async fn iam_policy_read_with_retry(updater: &dyn ResourceIamUpdater) -> Result<Policy> {
    let _guard = MutexKv::global().lock(&updater.get_mutex_key()).await;
    let desc = updater.describe_resource();
    debug!("Retrieving policy for {desc}");
    let policy = retry_time_duration(READ_TIMEOUT, DEFAULT_RETRY_PREDICATES, || {
        updater.get_resource_iam_policy()
    })
    .await?;
    debug!(?policy, "Retrieved policy for {desc}");
    Ok(policy)
}

/// Apply `modify` to the current policy of a resource and write it back
///
/// Concurrent changes are retried with backoff. Once written, the policy is read again
/// until `modify` leaves it unchanged several times in a row, so that later reads
/// observe the change.
pub async fn iam_policy_read_modify_write<F>(
    updater: &dyn ResourceIamUpdater,
    mut modify: F,
) -> Result<()>
where
    F: FnMut(&mut Policy) -> Result<()> + Send,
{
    let _guard = MutexKv::global().lock(&updater.get_mutex_key()).await;
    let desc = updater.describe_resource();

    let mut backoff = Duration::from_secs(1);
    loop {
        debug!("Retrieving policy for {desc}");
        let mut policy = match updater.get_resource_iam_policy().await {
            Ok(policy) => policy,
            Err(err) if is_too_many_requests(&err) => {
                debug!("429 while reading policy for {desc}, waiting {backoff:?}");
                sleep(backoff).await;
                continue;
            }
            Err(err) => return Err(err),
        };

        modify(&mut policy)?;

        debug!(?policy, "Setting policy for {desc}");
        match updater.set_resource_iam_policy(&policy).await {
            Ok(()) => break,
            Err(err) if is_conflict(&err) => {
                debug!("Concurrent policy changes, restarting read-modify-write after {backoff:?}");
                sleep(backoff).await;
                backoff *= 2;
                if backoff > MAX_BACKOFF {
                    return Err(err.context(format!(
                        "Error applying IAM policy to {desc}: Too many conflicts"
                    )));
                }
            }
            Err(err) => {
                return Err(err.context(format!("Error applying IAM policy for {desc}")));
            }
        }
    }

    let mut fetch_backoff = Duration::from_secs(1);
    let mut confirmations = 0;
    while confirmations < CONFIRMATIONS {
        if fetch_backoff > MAX_BACKOFF {
            return Err(anyhow!(
                "Error applying IAM policy to {desc}: Waited too long for propagation."
            ));
        }
        sleep(fetch_backoff).await;
        let fetched = match updater.get_resource_iam_policy().await {
            Ok(fetched) => fetched,
            Err(err) if is_too_many_requests(&err) => {
                fetch_backoff *= 2;
                continue;
            }
            Err(err) => return Err(err),
        };
        let mut modified = fetched.clone();
        modify(&mut modified)?;
        if compare_iam_policies(&modified, &fetched) {
            confirmations += 1;
        } else {
            debug!("Policy of {desc} not propagated yet");
            fetch_backoff *= 2;
        }
    }
    debug!("Set policy for {desc}");
    Ok(())
}
