//! Ensure/Get/Update/Delete convergence algorithm
//!
//! Each operation derives desired state, queries live cloud state, and
//! applies only the delta. A failed step leaves the balancer in its last
//! good state; the next call recomputes the plan from live state, so there
//! is no persisted partial plan and no failed terminal state.

use std::collections::BTreeMap;

use iaas_client::{BackendSpec, CreateLoadBalancerRequest, ListenerSpec, LoadBalancer};
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, Node, Service};
use tracing::{debug, info, warn};

use super::Reconciler;
use super::desired::{DesiredLoadBalancer, load_balancer_name};
use super::security_group::owned_group_name;
use crate::error::ControllerError;

impl Reconciler {
    /// Create or converge the load balancer for a Service and return its
    /// external ingress addresses.
    ///
    /// Fully idempotent: a second call with identical inputs and unchanged
    /// cloud state performs zero cloud mutations.
    pub async fn ensure(
        &self,
        service: &Service,
        nodes: &[Node],
    ) -> Result<LoadBalancerStatus, ControllerError> {
        let desired = DesiredLoadBalancer::from_service(service, nodes, &self.config)?;
        info!("Ensuring load balancer {}", desired.name);

        let observed = self.client.describe_load_balancer_by_name(&desired.name).await?;

        // Reuse conflicts are fatal and must apply no mutation, so they are
        // detected before anything is created
        self.preflight_reuse(&desired, observed.as_ref()).await?;

        let (lb, mut mutated) = match observed {
            Some(lb) => (lb, false),
            None => (self.create_cloud_resource(&desired).await?, true),
        };

        match self.resolve_eips(&desired, &lb).await {
            Ok(changed) => mutated |= changed,
            Err(e) => return Err(classify_step_error(mutated, e)),
        }
        match self.sync_listeners(&desired, &lb).await {
            Ok(changed) => mutated |= changed,
            Err(e) => return Err(classify_step_error(mutated, e)),
        }
        let sg_id = match self.sync_security_group(&desired, &lb).await {
            Ok((sg_id, changed)) => {
                mutated |= changed;
                sg_id
            }
            Err(e) => return Err(classify_step_error(mutated, e)),
        };
        match self.bind_tags(&lb.id, "load_balancer").await {
            Ok(changed) => mutated |= changed,
            Err(e) => return Err(classify_step_error(mutated, e)),
        }
        match self.bind_tags(&sg_id, "security_group").await {
            Ok(changed) => mutated |= changed,
            Err(e) => return Err(classify_step_error(mutated, e)),
        }

        if mutated {
            debug!("Load balancer {} converged with changes", desired.name);
        } else {
            debug!("Load balancer {} already converged", desired.name);
        }

        // Status is projected from confirmed cloud state, not from the local
        // plan: asynchronous jobs may not apply instantaneously
        let confirmed = self.client.describe_load_balancer(&lb.id).await?;
        Ok(ingress_status(&confirmed))
    }

    /// Read-only existence/status query.
    ///
    /// Returns `(None, false)` with no error when no cloud resource exists.
    pub async fn get_status(
        &self,
        service: &Service,
    ) -> Result<(Option<LoadBalancerStatus>, bool), ControllerError> {
        let name = self.derived_name(service)?;
        match self.client.describe_load_balancer_by_name(&name).await {
            Ok(Some(lb)) => Ok((Some(ingress_status(&lb)), true)),
            Ok(None) => Ok((None, false)),
            Err(e) if e.is_not_found() => Ok((None, false)),
            Err(e) => Err(e.into()),
        }
    }

    /// Converge listeners/backends without returning the status.
    pub async fn update(&self, service: &Service, nodes: &[Node]) -> Result<(), ControllerError> {
        self.ensure(service, nodes).await.map(|_| ())
    }

    /// Tear down the load balancer and its exclusively-owned dependents.
    ///
    /// Already-deleted (or never-created) resources are success, not errors.
    /// With `skip_check` the existence lookup is not required to succeed
    /// first; deletion proceeds optimistically and every not-found response
    /// along the way counts as success.
    pub async fn delete(&self, service: &Service, skip_check: bool) -> Result<(), ControllerError> {
        let name = self.derived_name(service)?;

        if !skip_check {
            let (_, exists) = self.get_status(service).await?;
            if !exists {
                debug!("Load balancer {} already absent", name);
                return Ok(());
            }
        }

        let lb = match self.client.describe_load_balancer_by_name(&name).await {
            Ok(Some(lb)) => lb,
            Ok(None) => return Ok(()),
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        info!("Deleting load balancer {} ({})", name, lb.id);

        // Detach addresses first; release only those this controller
        // allocated (marked by carrying the balancer's name). Reused
        // addresses have external owners and are never released.
        for nested in &lb.eips {
            match self.client.dissociate_eip(&nested.id).await {
                Ok(job_id) => self.wait_for_job(&job_id).await?,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            }
            if nested.name == lb.name {
                match self.client.release_eip(&nested.id).await {
                    Ok(()) => debug!("Released allocated EIP {}", nested.id),
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        match self.unbind_tags(&lb.id, "load_balancer").await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        match self.client.delete_load_balancer(&lb.id).await {
            Ok(job_id) => self.wait_for_job(&job_id).await?,
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        // Same ownership gate as addresses: only the group this engine
        // created (named after the balancer) is torn down. Groups attached
        // out-of-band stay.
        if let Some(sg_id) = &lb.security_group_id {
            match self.client.describe_security_group(sg_id).await {
                Ok(sg) if sg.name == owned_group_name(&lb.name) => {
                    match self.unbind_tags(sg_id, "security_group").await {
                        Ok(_) => {}
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e),
                    }
                    match self.client.delete_security_group(sg_id).await {
                        Ok(()) => {}
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(sg) => {
                    debug!("Keeping security group {} ({}): not created for {}", sg.id, sg.name, name);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!("Deleted load balancer {}", name);
        Ok(())
    }

    /// Derived cloud resource name for a Service (no spec validation needed)
    fn derived_name(&self, service: &Service) -> Result<String, ControllerError> {
        let name = service
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::Validation("Service has no name".to_string()))?;
        let namespace = service.metadata.namespace.as_deref().unwrap_or("default");
        Ok(load_balancer_name(&self.config.cluster_id, namespace, name))
    }

    /// Create a bare balancer (no listeners/backends yet) and wait for it.
    async fn create_cloud_resource(
        &self,
        desired: &DesiredLoadBalancer,
    ) -> Result<LoadBalancer, ControllerError> {
        info!("Creating load balancer {}", desired.name);
        let created = self
            .client
            .create_load_balancer(CreateLoadBalancerRequest {
                name: desired.name.clone(),
                lb_type: desired.lb_type,
                network_id: desired.network_id.clone(),
            })
            .await?;
        self.wait_for_job(&created.job_id).await?;
        Ok(self.client.describe_load_balancer(&created.resource_id).await?)
    }

    /// Diff listeners and backend membership against the live balancer.
    ///
    /// Removals are applied before additions so stale and fresh backends
    /// never serve conflicting routing at the same time. Returns whether any
    /// mutation was applied.
    pub(crate) async fn sync_listeners(
        &self,
        desired: &DesiredLoadBalancer,
        lb: &LoadBalancer,
    ) -> Result<bool, ControllerError> {
        let observed = self.client.list_listeners(&lb.id).await?;
        let mut wanted: BTreeMap<(String, i32), &super::desired::ListenerPort> = BTreeMap::new();
        for listener in &desired.listeners {
            wanted.insert((listener.protocol.clone(), listener.port), listener);
        }

        let mut changed = false;

        // Stale listeners go first
        let mut kept = Vec::new();
        for listener in observed {
            let key = (listener.protocol.clone(), listener.port);
            if wanted.contains_key(&key) {
                kept.push(listener);
            } else {
                debug!("Removing stale listener {}:{}", listener.protocol, listener.port);
                self.client.delete_listener(&listener.id).await?;
                changed = true;
            }
        }

        // Converge backend membership of surviving listeners
        for listener in &kept {
            let key = (listener.protocol.clone(), listener.port);
            let spec = wanted.remove(&key).ok_or_else(|| {
                ControllerError::Validation(format!("listener {:?} vanished from plan", key))
            })?;
            changed |= self.sync_backends(&listener.id, spec, desired).await?;
        }

        // Remaining wanted listeners are missing; add them with full backends
        for (key, spec) in wanted {
            debug!("Adding listener {}:{}", key.0, key.1);
            let listener_id = self
                .client
                .add_listener(
                    &lb.id,
                    ListenerSpec {
                        protocol: spec.protocol.clone(),
                        port: spec.port,
                    },
                )
                .await?;
            let backends = desired
                .backends
                .iter()
                .map(|b| BackendSpec {
                    resource_id: b.instance_id.clone(),
                    port: spec.node_port,
                })
                .collect::<Vec<_>>();
            if !backends.is_empty() {
                self.client.add_backends(&listener_id, backends).await?;
            }
            changed = true;
        }

        // Listener/backend edits are staged; commit them in one apply job
        if changed {
            let job_id = self.client.apply_load_balancer(&lb.id).await?;
            self.wait_for_job(&job_id).await?;
        }
        Ok(changed)
    }

    /// Converge one listener's backend set, removals before additions.
    async fn sync_backends(
        &self,
        listener_id: &str,
        spec: &super::desired::ListenerPort,
        desired: &DesiredLoadBalancer,
    ) -> Result<bool, ControllerError> {
        let observed = self.client.list_backends(listener_id).await?;
        let wanted: Vec<(&str, i32)> = desired
            .backends
            .iter()
            .map(|b| (b.instance_id.as_str(), spec.node_port))
            .collect();

        let stale: Vec<String> = observed
            .iter()
            .filter(|b| !wanted.contains(&(b.resource_id.as_str(), b.port)))
            .map(|b| b.id.clone())
            .collect();

        let missing: Vec<BackendSpec> = wanted
            .iter()
            .filter(|(resource_id, port)| {
                !observed
                    .iter()
                    .any(|b| b.resource_id == *resource_id && b.port == *port)
            })
            .map(|(resource_id, port)| BackendSpec {
                resource_id: (*resource_id).to_string(),
                port: *port,
            })
            .collect();

        let mut changed = false;
        if !stale.is_empty() {
            debug!("Removing {} stale backends from listener {}", stale.len(), listener_id);
            self.client.delete_backends(&stale).await?;
            changed = true;
        }
        if !missing.is_empty() {
            debug!("Adding {} backends to listener {}", missing.len(), listener_id);
            self.client.add_backends(listener_id, missing).await?;
            changed = true;
        }
        Ok(changed)
    }
}

/// Project confirmed cloud state onto the Kubernetes status shape.
fn ingress_status(lb: &LoadBalancer) -> LoadBalancerStatus {
    let ingress: Vec<LoadBalancerIngress> = lb
        .eips
        .iter()
        .map(|eip| LoadBalancerIngress {
            ip: Some(eip.address.clone()),
            ..Default::default()
        })
        .collect();
    if ingress.is_empty() {
        warn!("Load balancer {} has no external addresses yet", lb.name);
    }
    LoadBalancerStatus { ingress: Some(ingress) }
}

/// Wrap step failures that follow applied mutations so callers can tell a
/// clean failure from a partially-applied plan. Validation and conflict
/// failures keep their kind; they need operator action either way.
fn classify_step_error(mutated: bool, err: ControllerError) -> ControllerError {
    if !mutated {
        return err;
    }
    match err {
        e @ (ControllerError::Validation(_) | ControllerError::Conflict(_)) => e,
        e => ControllerError::PartialApply(e.to_string()),
    }
}
