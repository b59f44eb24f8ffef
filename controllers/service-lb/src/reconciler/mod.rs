//! Convergence engine for LoadBalancer Services.
//!
//! This module is organized by concern:
//! - `desired`: desired-state derivation from Service + Nodes + annotations
//! - `engine`: the ensure/get/update/delete convergence algorithm
//! - `eip`: elastic-IP strategy resolution (reuse | allocate)
//! - `security_group`: ingress rule synchronization
//! - `tags`: classification tag binding
//!
//! All cloud state is re-queried on every call; the cloud is the source of
//! truth and may be mutated out-of-band, so nothing is cached across calls.

pub mod desired;
pub mod engine;
pub mod eip;
pub mod security_group;
pub mod tags;

#[cfg(test)]
mod engine_test;

use std::sync::Arc;
use std::time::Duration;

use iaas_client::IaasClientTrait;
use iaas_client::job::{DEFAULT_JOB_TIMEOUT, DEFAULT_POLL_INTERVAL};

/// Immutable per-cluster configuration shared by all reconciliation calls.
///
/// Constructed once at startup and passed into the engine; never ambient
/// global state.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Cluster identifier baked into derived resource names
    pub cluster_id: String,
    /// Cloud account the controller operates as; reused EIPs must belong to it
    pub user_id: String,
    /// Network/subnet new balancers are placed in
    pub default_network_id: String,
    /// Classification tags bound to created resources; empty disables tagging
    pub tag_ids: Vec<String>,
}

/// Reconciles LoadBalancer Services against the cloud.
///
/// Re-entrant and safe to call concurrently for different Services. Calls for
/// the same Service must be serialized by the caller (the watch loop's
/// per-key scheduling provides this).
pub struct Reconciler {
    pub(crate) client: Arc<dyn IaasClientTrait>,
    pub(crate) config: ReconcilerConfig,
    pub(crate) job_poll_interval: Duration,
    pub(crate) job_timeout: Duration,
}

impl Reconciler {
    /// Creates a new reconciler over the given cloud client.
    pub fn new(client: Arc<dyn IaasClientTrait>, config: ReconcilerConfig) -> Self {
        Self {
            client,
            config,
            job_poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    /// Override job polling cadence (tight intervals for tests)
    pub fn with_job_timing(mut self, interval: Duration, timeout: Duration) -> Self {
        self.job_poll_interval = interval;
        self.job_timeout = timeout;
        self
    }

    pub(crate) async fn wait_for_job(&self, job_id: &str) -> Result<(), iaas_client::IaasError> {
        iaas_client::job::wait_for_job(
            self.client.as_ref(),
            job_id,
            self.job_poll_interval,
            self.job_timeout,
        )
        .await
    }
}
