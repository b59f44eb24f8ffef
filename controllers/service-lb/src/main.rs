//! Service LoadBalancer Controller
//!
//! Converges Kubernetes Services of type LoadBalancer onto external IaaS
//! load balancers:
//! - Load balancer + listeners + backend membership
//! - Elastic IP binding (reuse or allocate strategies)
//! - Security group ingress rules
//! - Optional classification tags
//!
//! The cloud is the single source of truth; every reconciliation re-queries
//! live state instead of caching it.

mod controller;
mod error;
mod reconciler;
#[cfg(test)]
mod test_utils;

use std::env;
use std::sync::Arc;

use iaas_client::IaasClient;
use tracing::info;

use crate::error::ControllerError;
use crate::reconciler::{Reconciler, ReconcilerConfig};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting service-lb controller");

    // Load configuration from environment variables
    let api_url = env::var("IAAS_API_URL")
        .unwrap_or_else(|_| "https://api.iaas.example".to_string());
    let access_key = env::var("IAAS_ACCESS_KEY")
        .map_err(|_| ControllerError::InvalidConfig(
            "IAAS_ACCESS_KEY environment variable is required".to_string()
        ))?;
    let secret_key = env::var("IAAS_SECRET_KEY")
        .map_err(|_| ControllerError::InvalidConfig(
            "IAAS_SECRET_KEY environment variable is required".to_string()
        ))?;
    let cluster_id = env::var("CLUSTER_ID")
        .map_err(|_| ControllerError::InvalidConfig(
            "CLUSTER_ID environment variable is required".to_string()
        ))?;
    let user_id = env::var("IAAS_USER_ID")
        .map_err(|_| ControllerError::InvalidConfig(
            "IAAS_USER_ID environment variable is required".to_string()
        ))?;
    let default_network_id = env::var("DEFAULT_NETWORK_ID")
        .map_err(|_| ControllerError::InvalidConfig(
            "DEFAULT_NETWORK_ID environment variable is required".to_string()
        ))?;
    let tag_ids: Vec<String> = env::var("TAG_IDS")
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let namespace = env::var("WATCH_NAMESPACE").ok();

    info!("Configuration:");
    info!("  IaaS API URL: {}", api_url);
    info!("  Cluster: {}", cluster_id);
    info!("  Default network: {}", default_network_id);
    info!("  Tagging: {}", if tag_ids.is_empty() { "disabled".to_string() } else { tag_ids.join(",") });
    info!("  Namespace: {}", namespace.as_deref().unwrap_or("all namespaces"));

    let iaas_client = IaasClient::new(api_url, access_key, secret_key)
        .map_err(ControllerError::Iaas)?;

    let kube_client = kube::Client::try_default().await
        .map_err(ControllerError::Kube)?;

    let reconciler = Reconciler::new(
        Arc::new(iaas_client),
        ReconcilerConfig {
            cluster_id,
            user_id,
            default_network_id,
            tag_ids,
        },
    );

    controller::run(kube_client, reconciler, namespace).await
}
