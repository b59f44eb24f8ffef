//! Service watch loop.
//!
//! Watches Services through `kube_runtime::Controller`, which serializes
//! reconciliations per object key; the engine relies on that for its
//! no-concurrent-self-overlap assumption. Only Services of type LoadBalancer
//! are converged; everything else is ignored until it changes.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Service};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use kube_runtime::{Controller, controller::{Action, Config as ControllerConfig}, watcher};
use tracing::{debug, error, info};

use crate::error::ControllerError;
use crate::reconciler::Reconciler;

/// Resync interval for converged services; the engine is idempotent so this
/// is cheap and repairs out-of-band cloud drift
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Requeue delay after a failed reconciliation
const ERROR_REQUEUE: Duration = Duration::from_secs(60);

/// Shared state handed to every reconcile invocation.
pub struct Context {
    client: Client,
    nodes: Api<Node>,
    reconciler: Reconciler,
}

async fn reconcile(service: Arc<Service>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let name = service.name_any();
    let namespace = service.metadata.namespace.as_deref().unwrap_or("default");

    let is_load_balancer = service
        .spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        == Some("LoadBalancer");
    if !is_load_balancer {
        debug!("Service {}/{} is not a LoadBalancer, ignoring", namespace, name);
        return Ok(Action::await_change());
    }

    if service.metadata.deletion_timestamp.is_some() {
        info!("Service {}/{} is terminating, deleting load balancer", namespace, name);
        // The Service object may already be partially gone; skip the
        // existence pre-check and tolerate not-found at every step
        ctx.reconciler.delete(&service, true).await?;
        return Ok(Action::await_change());
    }

    debug!("Reconciling Service {}/{}", namespace, name);
    let nodes = ctx.nodes.list(&ListParams::default()).await?.items;
    let status = ctx.reconciler.ensure(&service, &nodes).await?;

    if let Some(ingress) = &status.ingress {
        for ing in ingress {
            info!(
                "Service {}/{} has external IP {}",
                namespace,
                name,
                ing.ip.as_deref().unwrap_or("<pending>")
            );
        }
    }

    let api: Api<Service> = Api::namespaced(ctx.client.clone(), namespace);
    let patch = serde_json::json!({ "status": { "loadBalancer": status } });
    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    Ok(Action::requeue(RESYNC_INTERVAL))
}

fn error_policy(service: Arc<Service>, error: &ControllerError, _ctx: Arc<Context>) -> Action {
    error!(
        "Reconciliation error for Service {}/{}: {}",
        service.metadata.namespace.as_deref().unwrap_or("default"),
        service.name_any(),
        error
    );
    Action::requeue(ERROR_REQUEUE)
}

/// Runs the Service controller until shutdown.
pub async fn run(
    client: Client,
    reconciler: Reconciler,
    namespace: Option<String>,
) -> Result<(), ControllerError> {
    info!("Starting Service watcher");

    let services: Api<Service> = match &namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let context = Arc::new(Context {
        nodes: Api::all(client.clone()),
        client,
        reconciler,
    });

    // Debounce batches bursts of Service/endpoint updates; concurrency bounds
    // simultaneous cloud convergences (still one per service key)
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(3);

    Controller::new(services, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, context)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error: {:?}", e);
            }
        })
        .await;

    Ok(())
}
