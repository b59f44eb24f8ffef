//! IaasClient trait for mocking
//!
//! This trait abstracts the IaasClient to enable mocking in unit tests.
//! The concrete IaasClient implements this trait, and tests can use mock
//! implementations.

use crate::error::IaasError;
use crate::models::*;

/// Trait for IaaS API client operations
///
/// This trait enables mocking of cloud API calls for unit testing.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
///
/// Mutating calls either complete synchronously or return a job id that must
/// be polled to a terminal state (see [`crate::job::wait_for_job`]).
#[async_trait::async_trait]
pub trait IaasClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    // Load balancer operations
    async fn describe_load_balancer(&self, id: &str) -> Result<LoadBalancer, IaasError>;
    async fn describe_load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>, IaasError>;
    async fn create_load_balancer(&self, request: CreateLoadBalancerRequest) -> Result<CreatedResource, IaasError>;
    async fn delete_load_balancer(&self, id: &str) -> Result<String, IaasError>;
    /// Commit pending listener/backend changes; returns the apply job id
    async fn apply_load_balancer(&self, id: &str) -> Result<String, IaasError>;

    // Listener operations
    async fn list_listeners(&self, load_balancer_id: &str) -> Result<Vec<Listener>, IaasError>;
    async fn add_listener(&self, load_balancer_id: &str, spec: ListenerSpec) -> Result<String, IaasError>;
    async fn delete_listener(&self, listener_id: &str) -> Result<(), IaasError>;

    // Backend operations
    async fn list_backends(&self, listener_id: &str) -> Result<Vec<Backend>, IaasError>;
    async fn add_backends(&self, listener_id: &str, specs: Vec<BackendSpec>) -> Result<Vec<String>, IaasError>;
    async fn delete_backends(&self, backend_ids: &[String]) -> Result<(), IaasError>;

    // Elastic IP operations
    async fn describe_eip(&self, id: &str) -> Result<Eip, IaasError>;
    async fn allocate_eip(&self, name: &str) -> Result<CreatedResource, IaasError>;
    async fn release_eip(&self, id: &str) -> Result<(), IaasError>;
    /// Bind the address to a load balancer; returns the association job id
    async fn associate_eip(&self, eip_id: &str, load_balancer_id: &str) -> Result<String, IaasError>;
    async fn dissociate_eip(&self, eip_id: &str) -> Result<String, IaasError>;

    // Security group operations
    async fn describe_security_group(&self, id: &str) -> Result<SecurityGroup, IaasError>;
    async fn create_security_group(&self, name: &str) -> Result<String, IaasError>;
    /// Bind the group to a load balancer so it governs the balancer's ingress
    async fn attach_security_group(&self, security_group_id: &str, load_balancer_id: &str) -> Result<(), IaasError>;
    async fn delete_security_group(&self, id: &str) -> Result<(), IaasError>;
    async fn list_security_group_rules(&self, security_group_id: &str) -> Result<Vec<SecurityGroupRule>, IaasError>;
    async fn add_security_group_rules(&self, security_group_id: &str, specs: Vec<RuleSpec>) -> Result<Vec<String>, IaasError>;
    async fn delete_security_group_rules(&self, rule_ids: &[String]) -> Result<(), IaasError>;
    /// Commit pending rule changes to running instances; returns the apply job id
    async fn apply_security_group(&self, security_group_id: &str) -> Result<String, IaasError>;

    // Tag operations
    async fn list_resource_tags(&self, resource_id: &str) -> Result<Vec<String>, IaasError>;
    async fn attach_tags(&self, tag_ids: &[String], resource_id: &str, resource_type: &str) -> Result<(), IaasError>;
    async fn detach_tags(&self, tag_ids: &[String], resource_id: &str, resource_type: &str) -> Result<(), IaasError>;

    // Job operations
    async fn describe_job(&self, id: &str) -> Result<Job, IaasError>;
}
