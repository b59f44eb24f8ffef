//! IaaS REST API Client
//!
//! A Rust client library for the cloud API surface driven by the service-lb
//! controller: load balancers, listeners, backends, elastic IPs, security
//! groups, tags and asynchronous jobs.
//!
//! # Example
//!
//! ```no_run
//! use iaas_client::{IaasClient, IaasClientTrait, job};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create a client
//! let client = IaasClient::new(
//!     "https://api.iaas.example".to_string(),
//!     "access-key".to_string(),
//!     "secret-key".to_string(),
//! )?;
//!
//! // Look up a load balancer by its derived name
//! let lb = client.describe_load_balancer_by_name("k8s-mycluster-default-web").await?;
//!
//! // Allocate an elastic IP and wait for the provisioning job
//! let created = client.allocate_eip("k8s-mycluster-default-web").await?;
//! job::wait_for_job(
//!     &client,
//!     &created.job_id,
//!     job::DEFAULT_POLL_INTERVAL,
//!     job::DEFAULT_JOB_TIMEOUT,
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Async jobs**: Mutating calls return job ids pollable via [`job::wait_for_job`]
//! - **Typed errors**: Not-found, conflict and transient kinds are distinguishable
//! - **Mocking**: `test-util` feature exposes an in-memory [`MockIaasClient`]
//!   that records every mutation for ordering/idempotence assertions

pub mod client;
pub mod error;
pub mod job;
pub mod models;
#[path = "trait.rs"]
pub mod iaas_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::IaasClient;
pub use error::IaasError;
pub use iaas_trait::IaasClientTrait;
pub use models::*;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockIaasClient;
