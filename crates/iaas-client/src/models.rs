//! IaaS API models
//!
//! These models match the cloud API resource serializers for the
//! load-balancer, listener, elastic-IP, security-group, tag and job
//! endpoints driven by the service-lb controller.

use serde::{Deserialize, Serialize};

/// IaaS API response wrapper (for paginated list responses)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Terminal and in-flight states of an asynchronous cloud job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Working,
    Successful,
    Failed,
}

impl JobStatus {
    /// Whether the job has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Successful | JobStatus::Failed)
    }
}

/// Asynchronous job handle returned by mutating cloud calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub action: String,
    pub status: JobStatus,
    /// Error detail populated when `status` is `failed`
    pub error: Option<String>,
}

/// Load balancer resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,
    /// Lifecycle status reported by the cloud ("pending", "active", "deleted")
    pub status: String,
    /// Balancer tier/class, 0 is the base tier
    pub lb_type: i32,
    /// Network/subnet the balancer fronts
    pub network_id: String,
    /// Security group attached to the balancer, if any
    pub security_group_id: Option<String>,
    /// Elastic IPs currently associated with the balancer
    pub eips: Vec<NestedEip>,
}

/// Elastic IP summary embedded in a load balancer description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedEip {
    pub id: String,
    pub name: String,
    pub address: String,
}

/// Elastic IP resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Eip {
    pub id: String,
    pub name: String,
    pub address: String,
    pub status: String,
    /// Account that owns the address
    pub owner: String,
    /// Resource the address is currently bound to, if any
    pub associated_resource: Option<AssociatedResource>,
}

/// Resource an elastic IP is bound to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociatedResource {
    pub resource_id: String,
    pub resource_type: String,
}

/// Listener exposed by a load balancer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listener {
    pub id: String,
    pub load_balancer_id: String,
    pub protocol: String,
    pub port: i32,
}

/// Backend registered under a listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backend {
    pub id: String,
    pub listener_id: String,
    /// Instance the listener forwards to
    pub resource_id: String,
    /// Target port on the instance
    pub port: i32,
}

/// Security group resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
}

/// Ingress rule within a security group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    pub id: String,
    pub security_group_id: String,
    pub protocol: String,
    pub port: i32,
    pub cidr: String,
    /// Free-form marker; the controller stamps rules it owns
    pub description: Option<String>,
}

/// Request body for creating a load balancer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLoadBalancerRequest {
    pub name: String,
    pub lb_type: i32,
    pub network_id: String,
}

/// Request body for adding a listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub protocol: String,
    pub port: i32,
}

/// Request body for registering a backend under a listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSpec {
    pub resource_id: String,
    pub port: i32,
}

/// Request body for adding a security group rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub protocol: String,
    pub port: i32,
    pub cidr: String,
    pub description: Option<String>,
}

/// Identifier pair returned by asynchronous create calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedResource {
    /// Identifier of the resource being provisioned
    pub resource_id: String,
    /// Job to poll for provisioning completion
    pub job_id: String,
}
