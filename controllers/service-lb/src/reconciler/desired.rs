//! Desired-state derivation
//!
//! Translates a Kubernetes Service (ports, annotations, source ranges) and
//! its backing Nodes into the immutable `DesiredLoadBalancer` the engine
//! converges on. Derivation happens once per reconciliation call; the result
//! is never mutated afterwards.

use k8s_openapi::api::core::v1::{Node, Service};
use tracing::warn;

use super::ReconcilerConfig;
use crate::error::ControllerError;

/// Comma-separated EIP ids to reuse instead of allocating
pub const ANNOTATION_EIP_IDS: &str = "service.beta.kubernetes.io/lb-eip-ids";
/// Explicit EIP strategy: "reuse" or "allocate"
pub const ANNOTATION_EIP_STRATEGY: &str = "service.beta.kubernetes.io/lb-eip-strategy";
/// Balancer tier selector (0..=3)
pub const ANNOTATION_LB_TYPE: &str = "service.beta.kubernetes.io/lb-type";

/// Cloud resource names are capped at 63 characters (DNS label bound)
const MAX_NAME_LEN: usize = 63;

/// How the external address of the balancer is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EipStrategy {
    /// Allocate a fresh address owned by the controller
    Allocate,
    /// Reuse pre-existing addresses owned by the account
    Reuse(Vec<String>),
}

/// A (protocol, external port, node port) listener tuple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerPort {
    pub protocol: String,
    pub port: i32,
    pub node_port: i32,
}

/// A backend node eligible to serve traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendNode {
    pub instance_id: String,
    pub private_ip: String,
}

/// Desired state of the cloud load balancer, derived once per call
#[derive(Debug, Clone)]
pub struct DesiredLoadBalancer {
    pub name: String,
    pub lb_type: i32,
    pub network_id: String,
    pub listeners: Vec<ListenerPort>,
    pub backends: Vec<BackendNode>,
    pub eip_strategy: EipStrategy,
    pub source_ranges: Vec<String>,
    pub tag_ids: Vec<String>,
}

/// Derive the cloud resource name for a Service.
///
/// Pure function of (cluster id, namespace, service name). Names over the
/// length bound are truncated with a hash suffix so distinct Services never
/// collide.
pub fn load_balancer_name(cluster_id: &str, namespace: &str, service_name: &str) -> String {
    let full = format!("k8s-{}-{}-{}", cluster_id, namespace, service_name);
    if full.len() <= MAX_NAME_LEN {
        return full;
    }
    let digest = fnv1a64(full.as_bytes()) as u32;
    format!("{}-{:08x}", &full[..MAX_NAME_LEN - 9], digest)
}

/// FNV-1a, stable across builds (std hashers are not)
fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl DesiredLoadBalancer {
    /// Build the desired state from a Service and its backing Nodes.
    ///
    /// Rejects Services with no listener ports, malformed reuse EIP ids, an
    /// unknown EIP strategy or an out-of-range balancer tier.
    pub fn from_service(
        service: &Service,
        nodes: &[Node],
        config: &ReconcilerConfig,
    ) -> Result<Self, ControllerError> {
        let name = service
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::Validation("Service has no name".to_string()))?;
        let namespace = service.metadata.namespace.as_deref().unwrap_or("default");
        let spec = service
            .spec
            .as_ref()
            .ok_or_else(|| ControllerError::Validation(format!("Service {}/{} has no spec", namespace, name)))?;

        let listeners = listener_ports(spec.ports.as_deref().unwrap_or(&[]), namespace, name)?;

        let annotations = service.metadata.annotations.clone().unwrap_or_default();
        let eip_strategy = eip_strategy(
            annotations.get(ANNOTATION_EIP_STRATEGY).map(String::as_str),
            annotations.get(ANNOTATION_EIP_IDS).map(String::as_str),
        )?;
        let lb_type = lb_type(annotations.get(ANNOTATION_LB_TYPE).map(String::as_str))?;

        Ok(Self {
            name: load_balancer_name(&config.cluster_id, namespace, name),
            lb_type,
            network_id: config.default_network_id.clone(),
            listeners,
            backends: backend_nodes(nodes),
            eip_strategy,
            source_ranges: spec.load_balancer_source_ranges.clone().unwrap_or_default(),
            tag_ids: config.tag_ids.clone(),
        })
    }
}

fn listener_ports(
    ports: &[k8s_openapi::api::core::v1::ServicePort],
    namespace: &str,
    name: &str,
) -> Result<Vec<ListenerPort>, ControllerError> {
    if ports.is_empty() {
        return Err(ControllerError::Validation(format!(
            "Service {}/{} exposes no ports",
            namespace, name
        )));
    }
    let mut listeners = Vec::with_capacity(ports.len());
    for port in ports {
        let protocol = match port.protocol.as_deref().unwrap_or("TCP") {
            "TCP" => "tcp",
            "UDP" => "udp",
            other => {
                return Err(ControllerError::Validation(format!(
                    "Service {}/{} port {} has unsupported protocol {}",
                    namespace, name, port.port, other
                )));
            }
        };
        let node_port = port.node_port.ok_or_else(|| {
            ControllerError::Validation(format!(
                "Service {}/{} port {} has no node port allocated yet",
                namespace, name, port.port
            ))
        })?;
        listeners.push(ListenerPort {
            protocol: protocol.to_string(),
            port: port.port,
            node_port,
        });
    }
    Ok(listeners)
}

fn backend_nodes(nodes: &[Node]) -> Vec<BackendNode> {
    let mut backends = Vec::with_capacity(nodes.len());
    for node in nodes {
        let node_name = node.metadata.name.as_deref().unwrap_or("<unnamed>");
        // Provider id carries the instance id as "<provider>:///<instance>";
        // fall back to the node name for nodes registered without one
        let instance_id = node
            .spec
            .as_ref()
            .and_then(|s| s.provider_id.as_deref())
            .and_then(|p| p.rsplit('/').next())
            .filter(|id| !id.is_empty())
            .unwrap_or(node_name)
            .to_string();
        let private_ip = node
            .status
            .as_ref()
            .and_then(|s| s.addresses.as_deref())
            .and_then(|addrs| addrs.iter().find(|a| a.type_ == "InternalIP"))
            .map(|a| a.address.clone());
        match private_ip {
            Some(private_ip) => backends.push(BackendNode { instance_id, private_ip }),
            None => warn!("Node {} has no InternalIP address, skipping as backend", node_name),
        }
    }
    backends
}

fn eip_strategy(strategy: Option<&str>, ids: Option<&str>) -> Result<EipStrategy, ControllerError> {
    match strategy {
        Some("allocate") => Ok(EipStrategy::Allocate),
        Some("reuse") => Ok(EipStrategy::Reuse(parse_eip_ids(ids)?)),
        Some(other) => Err(ControllerError::Validation(format!(
            "unknown EIP strategy {:?} (expected \"reuse\" or \"allocate\")",
            other
        ))),
        // No explicit strategy: the presence of reuse ids implies reuse
        None if ids.is_some() => Ok(EipStrategy::Reuse(parse_eip_ids(ids)?)),
        None => Ok(EipStrategy::Allocate),
    }
}

fn parse_eip_ids(ids: Option<&str>) -> Result<Vec<String>, ControllerError> {
    let raw = ids.ok_or_else(|| {
        ControllerError::Validation(format!(
            "EIP strategy is \"reuse\" but annotation {} is missing",
            ANNOTATION_EIP_IDS
        ))
    })?;
    let parsed: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if parsed.is_empty() {
        return Err(ControllerError::Validation(format!(
            "annotation {} contains no EIP ids",
            ANNOTATION_EIP_IDS
        )));
    }
    for id in &parsed {
        if !id.starts_with("eip-") || id.len() <= 4 {
            return Err(ControllerError::Validation(format!("malformed EIP id {:?}", id)));
        }
    }
    Ok(parsed)
}

fn lb_type(annotation: Option<&str>) -> Result<i32, ControllerError> {
    match annotation {
        None => Ok(0),
        Some(raw) => {
            let parsed: i32 = raw.parse().map_err(|_| {
                ControllerError::Validation(format!("balancer type {:?} is not an integer", raw))
            })?;
            if !(0..=3).contains(&parsed) {
                return Err(ControllerError::Validation(format!(
                    "balancer type {} out of range 0..=3",
                    parsed
                )));
            }
            Ok(parsed)
        }
    }
}
