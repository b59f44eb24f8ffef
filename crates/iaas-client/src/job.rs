//! Bounded polling of asynchronous cloud jobs
//!
//! Mutating cloud calls return a job id; provisioning completes out of band.
//! `wait_for_job` polls the job at a fixed interval until it reaches a
//! terminal state or the deadline elapses. A deadline expiry is surfaced as
//! `IaasError::Timeout` so callers can requeue the whole reconciliation
//! instead of treating it as permanent.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::error::IaasError;
use crate::iaas_trait::IaasClientTrait;
use crate::models::JobStatus;

/// Default interval between job status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default overall deadline for a single job
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(180);

/// Poll a job until it reaches a terminal state.
///
/// Returns `Ok(())` on terminal success, `IaasError::JobFailed` on terminal
/// failure and `IaasError::Timeout` when the deadline elapses first.
pub async fn wait_for_job(
    client: &dyn IaasClientTrait,
    job_id: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<(), IaasError> {
    let deadline = Instant::now() + timeout;

    loop {
        let job = client.describe_job(job_id).await?;
        debug!("Job {} ({}) is {:?}", job.id, job.action, job.status);

        match job.status {
            JobStatus::Successful => return Ok(()),
            JobStatus::Failed => {
                return Err(IaasError::JobFailed(format!(
                    "job {} ({}) failed: {}",
                    job.id,
                    job.action,
                    job.error.unwrap_or_else(|| "no detail".to_string())
                )));
            }
            JobStatus::Pending | JobStatus::Working => {
                if Instant::now() + interval > deadline {
                    return Err(IaasError::Timeout(format!(
                        "job {} ({}) not terminal after {:?}",
                        job.id, job.action, timeout
                    )));
                }
                sleep(interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockIaasClient;
    use crate::models::Job;

    #[tokio::test]
    async fn test_wait_for_job_success() {
        let client = MockIaasClient::new("http://test-iaas");
        client.add_job(Job {
            id: "j-1".to_string(),
            action: "CreateLoadBalancer".to_string(),
            status: JobStatus::Successful,
            error: None,
        });

        let result = wait_for_job(
            &client,
            "j-1",
            Duration::from_millis(10),
            Duration::from_millis(100),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_job_failure() {
        let client = MockIaasClient::new("http://test-iaas");
        client.add_job(Job {
            id: "j-2".to_string(),
            action: "AllocateEip".to_string(),
            status: JobStatus::Failed,
            error: Some("quota exceeded".to_string()),
        });

        let result = wait_for_job(
            &client,
            "j-2",
            Duration::from_millis(10),
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(result, Err(IaasError::JobFailed(_))));
    }

    #[tokio::test]
    async fn test_wait_for_job_timeout_is_distinct() {
        let client = MockIaasClient::new("http://test-iaas");
        client.add_job(Job {
            id: "j-3".to_string(),
            action: "AllocateEip".to_string(),
            status: JobStatus::Working,
            error: None,
        });

        let result = wait_for_job(
            &client,
            "j-3",
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, IaasError::Timeout(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_wait_for_unknown_job() {
        let client = MockIaasClient::new("http://test-iaas");

        let result = wait_for_job(
            &client,
            "j-missing",
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(result, Err(IaasError::NotFound(_))));
    }
}
