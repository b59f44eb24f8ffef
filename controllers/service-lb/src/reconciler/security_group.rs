//! Security-group rule synchronization
//!
//! One ingress rule per (protocol, external port, source CIDR) tuple. Rules
//! are diffed by that identity, not by object identity, so equivalent rules
//! created through different calls count as already satisfied. Only rules
//! stamped with the controller's ownership marker are ever removed; rules
//! added out-of-band stay untouched.

use std::collections::BTreeSet;

use iaas_client::{LoadBalancer, RuleSpec, SecurityGroupRule};
use tracing::{debug, info};

use super::Reconciler;
use super::desired::DesiredLoadBalancer;
use crate::error::ControllerError;

/// Marker stamped into the description of rules this controller owns
pub const RULE_OWNER_MARK: &str = "managed-by-service-lb";

/// Source CIDR used when the Service restricts nothing
const ANY_SOURCE: &str = "0.0.0.0/0";

/// Name of the security group the engine creates for a balancer. Deletion
/// uses the same convention as its ownership check.
pub(crate) fn owned_group_name(lb_name: &str) -> String {
    format!("{}-sg", lb_name)
}

/// Identity of an ingress rule
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RuleKey {
    pub protocol: String,
    pub port: i32,
    pub cidr: String,
}

/// The rule set implied by the Service's exposed ports and source ranges.
pub fn wanted_rules(desired: &DesiredLoadBalancer) -> BTreeSet<RuleKey> {
    let sources: Vec<&str> = if desired.source_ranges.is_empty() {
        vec![ANY_SOURCE]
    } else {
        desired.source_ranges.iter().map(String::as_str).collect()
    };
    let mut rules = BTreeSet::new();
    for listener in &desired.listeners {
        for source in &sources {
            rules.insert(RuleKey {
                protocol: listener.protocol.clone(),
                port: listener.port,
                cidr: (*source).to_string(),
            });
        }
    }
    rules
}

/// Compute the rule delta: additions for unsatisfied wanted tuples, removals
/// for owned rules with no corresponding wanted tuple.
pub fn diff_rules(
    observed: &[SecurityGroupRule],
    wanted: &BTreeSet<RuleKey>,
) -> (Vec<RuleSpec>, Vec<String>) {
    let satisfied: BTreeSet<RuleKey> = observed
        .iter()
        .map(|r| RuleKey {
            protocol: r.protocol.clone(),
            port: r.port,
            cidr: r.cidr.clone(),
        })
        .collect();

    let to_add: Vec<RuleSpec> = wanted
        .iter()
        .filter(|key| !satisfied.contains(*key))
        .map(|key| RuleSpec {
            protocol: key.protocol.clone(),
            port: key.port,
            cidr: key.cidr.clone(),
            description: Some(RULE_OWNER_MARK.to_string()),
        })
        .collect();

    let to_remove: Vec<String> = observed
        .iter()
        .filter(|r| r.description.as_deref() == Some(RULE_OWNER_MARK))
        .filter(|r| {
            !wanted.contains(&RuleKey {
                protocol: r.protocol.clone(),
                port: r.port,
                cidr: r.cidr.clone(),
            })
        })
        .map(|r| r.id.clone())
        .collect();

    (to_add, to_remove)
}

impl Reconciler {
    /// Converge the balancer's security group onto the wanted rule set.
    ///
    /// Creates and attaches the group on first need. Returns the group id
    /// and whether any mutation was applied.
    pub(crate) async fn sync_security_group(
        &self,
        desired: &DesiredLoadBalancer,
        lb: &LoadBalancer,
    ) -> Result<(String, bool), ControllerError> {
        let mut changed = false;
        let sg_id = match &lb.security_group_id {
            Some(id) => id.clone(),
            None => {
                let name = owned_group_name(&desired.name);
                info!("Creating security group {}", name);
                let id = self.client.create_security_group(&name).await?;
                self.client.attach_security_group(&id, &lb.id).await?;
                changed = true;
                id
            }
        };

        let observed = self.client.list_security_group_rules(&sg_id).await?;
        let wanted = wanted_rules(desired);
        let (to_add, to_remove) = diff_rules(&observed, &wanted);

        // Removals before additions, same ordering discipline as listeners
        if !to_remove.is_empty() {
            debug!("Removing {} stale rules from {}", to_remove.len(), sg_id);
            self.client.delete_security_group_rules(&to_remove).await?;
            changed = true;
        }
        if !to_add.is_empty() {
            debug!("Adding {} rules to {}", to_add.len(), sg_id);
            self.client.add_security_group_rules(&sg_id, to_add).await?;
            changed = true;
        }

        if changed {
            let job_id = self.client.apply_security_group(&sg_id).await?;
            self.wait_for_job(&job_id).await?;
        }
        Ok((sg_id, changed))
    }
}
