//! Elastic-IP strategy resolution
//!
//! `reuse` binds operator-supplied addresses after checking account scope and
//! current attachment; `allocate` provisions a fresh address owned by the
//! controller. Addresses bound to the balancer but no longer desired (a
//! strategy or id change) are detached first, released only when the engine
//! allocated them. Re-running either strategy against a converged balancer
//! is a no-op, never a duplicate allocation.

use iaas_client::LoadBalancer;
use tracing::{debug, info};

use super::Reconciler;
use super::desired::{DesiredLoadBalancer, EipStrategy};
use crate::error::ControllerError;

impl Reconciler {
    /// Validate a reuse strategy before any mutation happens.
    ///
    /// An address bound to anything other than this Service's balancer is a
    /// conflict that must abort the call while it is still side-effect free.
    pub(crate) async fn preflight_reuse(
        &self,
        desired: &DesiredLoadBalancer,
        observed: Option<&LoadBalancer>,
    ) -> Result<(), ControllerError> {
        let EipStrategy::Reuse(ids) = &desired.eip_strategy else {
            return Ok(());
        };
        for id in ids {
            let eip = self.client.describe_eip(id).await?;
            if eip.owner != self.config.user_id {
                return Err(ControllerError::Validation(format!(
                    "EIP {} belongs to account {}, not {}",
                    id, eip.owner, self.config.user_id
                )));
            }
            if let Some(assoc) = &eip.associated_resource {
                let bound_here = observed.is_some_and(|lb| lb.id == assoc.resource_id);
                if !bound_here {
                    return Err(ControllerError::Conflict(format!(
                        "EIP {} is already bound to {} {}",
                        id, assoc.resource_type, assoc.resource_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Settle the balancer's external addresses per the desired strategy.
    ///
    /// Returns whether any cloud mutation was applied.
    pub(crate) async fn resolve_eips(
        &self,
        desired: &DesiredLoadBalancer,
        lb: &LoadBalancer,
    ) -> Result<bool, ControllerError> {
        match &desired.eip_strategy {
            EipStrategy::Reuse(ids) => self.resolve_reuse(ids, lb).await,
            EipStrategy::Allocate => self.resolve_allocate(desired, lb).await,
        }
    }

    async fn resolve_reuse(&self, ids: &[String], lb: &LoadBalancer) -> Result<bool, ControllerError> {
        // Detach before attach, like listeners
        let mut changed = self
            .detach_undesired(lb, |nested| ids.iter().any(|id| id == &nested.id))
            .await?;
        for id in ids {
            let eip = self.client.describe_eip(id).await?;
            match &eip.associated_resource {
                Some(assoc) if assoc.resource_id == lb.id => {
                    debug!("EIP {} already bound to {}", id, lb.name);
                }
                Some(assoc) => {
                    // Re-check under live state; the preflight ran against a
                    // snapshot and the cloud may have moved underneath us
                    return Err(ControllerError::Conflict(format!(
                        "EIP {} is already bound to {} {}",
                        id, assoc.resource_type, assoc.resource_id
                    )));
                }
                None => {
                    info!("Binding reused EIP {} to {}", id, lb.name);
                    let job_id = self.client.associate_eip(id, &lb.id).await?;
                    self.wait_for_job(&job_id).await?;
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    async fn resolve_allocate(
        &self,
        desired: &DesiredLoadBalancer,
        lb: &LoadBalancer,
    ) -> Result<bool, ControllerError> {
        // Only an engine-allocated address (it carries the balancer's name)
        // satisfies this strategy; leftovers from a reuse strategy are
        // detached and handed back to their owners
        let changed = self
            .detach_undesired(lb, |nested| nested.name == lb.name)
            .await?;
        if lb.eips.iter().any(|nested| nested.name == lb.name) {
            debug!("Load balancer {} already has its allocated address", lb.name);
            return Ok(changed);
        }

        // The address carries the balancer's name to mark controller
        // ownership; deletion releases only addresses named this way
        info!("Allocating EIP for {}", desired.name);
        let created = self.client.allocate_eip(&desired.name).await?;
        self.wait_for_job(&created.job_id).await?;

        let job_id = self.client.associate_eip(&created.resource_id, &lb.id).await?;
        self.wait_for_job(&job_id).await?;
        Ok(true)
    }

    /// Detach attached addresses the predicate does not mark as desired.
    /// Engine-allocated ones (named after the balancer) are released too;
    /// the rest stay alive for their owners.
    async fn detach_undesired(
        &self,
        lb: &LoadBalancer,
        desired: impl Fn(&iaas_client::NestedEip) -> bool,
    ) -> Result<bool, ControllerError> {
        let mut changed = false;
        for nested in &lb.eips {
            if desired(nested) {
                continue;
            }
            info!("Detaching no-longer-desired EIP {} from {}", nested.id, lb.name);
            let job_id = self.client.dissociate_eip(&nested.id).await?;
            self.wait_for_job(&job_id).await?;
            if nested.name == lb.name {
                self.client.release_eip(&nested.id).await?;
            }
            changed = true;
        }
        Ok(changed)
    }
}
