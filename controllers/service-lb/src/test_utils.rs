//! Test utilities for unit testing the convergence engine
//!
//! This module provides helpers for creating test data and setting up test
//! scenarios against the in-memory mock cloud client.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use iaas_client::MockIaasClient;
use k8s_openapi::api::core::v1::{
    Node, NodeAddress, NodeSpec, NodeStatus, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::reconciler::{Reconciler, ReconcilerConfig};

/// Cluster id used by every test reconciler
pub const TEST_CLUSTER: &str = "testcluster";

/// Account the mock stamps on allocated EIPs
pub const TEST_USER: &str = "usr-test";

/// Helper to create a test LoadBalancer Service.
///
/// `ports` is a list of (external port, node port) pairs, all TCP.
pub fn create_test_service(
    namespace: &str,
    name: &str,
    ports: &[(i32, i32)],
    annotations: &[(&str, &str)],
) -> Service {
    let annotations: BTreeMap<String, String> = annotations
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: if annotations.is_empty() { None } else { Some(annotations) },
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            ports: Some(
                ports
                    .iter()
                    .map(|(port, node_port)| ServicePort {
                        port: *port,
                        node_port: Some(*node_port),
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}

/// Helper to create a test Node with an instance id and private address
pub fn create_test_node(name: &str, instance_id: &str, private_ip: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: Some(format!("iaas:///{}", instance_id)),
            ..Default::default()
        }),
        status: Some(NodeStatus {
            addresses: Some(vec![NodeAddress {
                type_: "InternalIP".to_string(),
                address: private_ip.to_string(),
            }]),
            ..Default::default()
        }),
    }
}

/// Helper to create a reconciler over a mock client, tagging disabled
pub fn create_test_reconciler(client: MockIaasClient) -> Reconciler {
    create_test_reconciler_with_tags(client, Vec::new())
}

/// Helper to create a reconciler over a mock client with tagging enabled
pub fn create_test_reconciler_with_tags(client: MockIaasClient, tag_ids: Vec<String>) -> Reconciler {
    Reconciler::new(
        Arc::new(client),
        ReconcilerConfig {
            cluster_id: TEST_CLUSTER.to_string(),
            user_id: TEST_USER.to_string(),
            default_network_id: "net-default".to_string(),
            tag_ids,
        },
    )
    .with_job_timing(Duration::from_millis(5), Duration::from_millis(200))
}
