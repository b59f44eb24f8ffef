//! Mock IaasClient for unit testing
//!
//! This module provides a mock implementation of IaasClientTrait that can be
//! used in unit tests without requiring a live cloud account.
//!
//! Every mutating call is appended to an ordered mutation log so tests can
//! assert idempotence (no entries on a converged re-run) and call ordering
//! (removals before additions).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::IaasError;
use crate::iaas_trait::IaasClientTrait;
use crate::models::*;

/// Mock IaasClient for testing
///
/// Stores resources in memory. Jobs created by mutating calls complete
/// immediately as `successful`; tests that need a stuck or failed job insert
/// one with [`MockIaasClient::add_job`].
#[derive(Clone)]
pub struct MockIaasClient {
    base_url: String,
    /// Owner stamped on EIPs allocated through the mock
    owner: String,
    // In-memory storage for resources
    load_balancers: Arc<Mutex<HashMap<String, LoadBalancer>>>,
    listeners: Arc<Mutex<HashMap<String, Listener>>>,
    backends: Arc<Mutex<HashMap<String, Backend>>>,
    eips: Arc<Mutex<HashMap<String, Eip>>>,
    security_groups: Arc<Mutex<HashMap<String, SecurityGroup>>>,
    rules: Arc<Mutex<HashMap<String, SecurityGroupRule>>>,
    attached_tags: Arc<Mutex<HashSet<(String, String)>>>,
    jobs: Arc<Mutex<HashMap<String, Job>>>,
    // Ordered log of mutating calls
    mutation_log: Arc<Mutex<Vec<String>>>,
    // Counter for generating IDs
    next_id: Arc<Mutex<u64>>,
}

impl MockIaasClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            owner: "usr-test".to_string(),
            load_balancers: Arc::new(Mutex::new(HashMap::new())),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            backends: Arc::new(Mutex::new(HashMap::new())),
            eips: Arc::new(Mutex::new(HashMap::new())),
            security_groups: Arc::new(Mutex::new(HashMap::new())),
            rules: Arc::new(Mutex::new(HashMap::new())),
            attached_tags: Arc::new(Mutex::new(HashSet::new())),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            mutation_log: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Add a load balancer to the mock store (for test setup)
    pub fn add_load_balancer(&self, lb: LoadBalancer) {
        self.load_balancers.lock().unwrap().insert(lb.id.clone(), lb);
    }

    /// Add an EIP to the mock store (for test setup)
    pub fn add_eip(&self, eip: Eip) {
        self.eips.lock().unwrap().insert(eip.id.clone(), eip);
    }

    /// Add a security group to the mock store (for test setup)
    pub fn add_security_group(&self, group: SecurityGroup) {
        self.security_groups.lock().unwrap().insert(group.id.clone(), group);
    }

    /// Add a security group rule to the mock store (for test setup)
    pub fn add_security_group_rule(&self, rule: SecurityGroupRule) {
        self.rules.lock().unwrap().insert(rule.id.clone(), rule);
    }

    /// Add a job to the mock store (for test setup)
    pub fn add_job(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }

    /// Snapshot of the ordered mutation log
    pub fn mutations(&self) -> Vec<String> {
        self.mutation_log.lock().unwrap().clone()
    }

    /// Clear the mutation log (between phases of a test)
    pub fn clear_mutations(&self) {
        self.mutation_log.lock().unwrap().clear();
    }

    /// Look up an EIP by id (for test assertions)
    pub fn eip(&self, id: &str) -> Option<Eip> {
        self.eips.lock().unwrap().get(id).cloned()
    }

    /// Generate next ID
    fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        let current = *id;
        *id += 1;
        current
    }

    fn log(&self, entry: String) {
        self.mutation_log.lock().unwrap().push(entry);
    }

    /// Insert an already-successful job and return its id
    fn finished_job(&self, action: &str) -> String {
        let id = format!("j-{}", self.next_id());
        self.jobs.lock().unwrap().insert(
            id.clone(),
            Job {
                id: id.clone(),
                action: action.to_string(),
                status: JobStatus::Successful,
                error: None,
            },
        );
        id
    }
}

#[async_trait::async_trait]
impl IaasClientTrait for MockIaasClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn describe_load_balancer(&self, id: &str) -> Result<LoadBalancer, IaasError> {
        self.load_balancers
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| IaasError::NotFound(format!("load balancer {}", id)))
    }

    async fn describe_load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>, IaasError> {
        Ok(self
            .load_balancers
            .lock()
            .unwrap()
            .values()
            .find(|lb| lb.name == name)
            .cloned())
    }

    async fn create_load_balancer(&self, request: CreateLoadBalancerRequest) -> Result<CreatedResource, IaasError> {
        let id = format!("lb-{}", self.next_id());
        let lb = LoadBalancer {
            id: id.clone(),
            name: request.name.clone(),
            status: "active".to_string(),
            lb_type: request.lb_type,
            network_id: request.network_id,
            security_group_id: None,
            eips: Vec::new(),
        };
        self.load_balancers.lock().unwrap().insert(id.clone(), lb);
        self.log(format!("create_load_balancer {}", request.name));
        Ok(CreatedResource {
            resource_id: id,
            job_id: self.finished_job("CreateLoadBalancer"),
        })
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<String, IaasError> {
        let removed = self.load_balancers.lock().unwrap().remove(id);
        if removed.is_none() {
            return Err(IaasError::NotFound(format!("load balancer {}", id)));
        }
        // Deleting the balancer cascades to its listeners and their backends
        let doomed: Vec<String> = {
            let mut listeners = self.listeners.lock().unwrap();
            let ids: Vec<String> = listeners
                .values()
                .filter(|l| l.load_balancer_id == id)
                .map(|l| l.id.clone())
                .collect();
            for lid in &ids {
                listeners.remove(lid);
            }
            ids
        };
        self.backends
            .lock()
            .unwrap()
            .retain(|_, b| !doomed.contains(&b.listener_id));
        self.log(format!("delete_load_balancer {}", id));
        Ok(self.finished_job("DeleteLoadBalancer"))
    }

    async fn apply_load_balancer(&self, id: &str) -> Result<String, IaasError> {
        if !self.load_balancers.lock().unwrap().contains_key(id) {
            return Err(IaasError::NotFound(format!("load balancer {}", id)));
        }
        self.log(format!("apply_load_balancer {}", id));
        Ok(self.finished_job("ApplyLoadBalancer"))
    }

    async fn list_listeners(&self, load_balancer_id: &str) -> Result<Vec<Listener>, IaasError> {
        let mut listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.load_balancer_id == load_balancer_id)
            .cloned()
            .collect();
        listeners.sort_by(|a, b| a.port.cmp(&b.port));
        Ok(listeners)
    }

    async fn add_listener(&self, load_balancer_id: &str, spec: ListenerSpec) -> Result<String, IaasError> {
        if !self.load_balancers.lock().unwrap().contains_key(load_balancer_id) {
            return Err(IaasError::NotFound(format!("load balancer {}", load_balancer_id)));
        }
        let id = format!("lsn-{}", self.next_id());
        self.listeners.lock().unwrap().insert(
            id.clone(),
            Listener {
                id: id.clone(),
                load_balancer_id: load_balancer_id.to_string(),
                protocol: spec.protocol.clone(),
                port: spec.port,
            },
        );
        self.log(format!("add_listener {} {}:{}", load_balancer_id, spec.protocol, spec.port));
        Ok(id)
    }

    async fn delete_listener(&self, listener_id: &str) -> Result<(), IaasError> {
        let removed = self.listeners.lock().unwrap().remove(listener_id);
        if removed.is_none() {
            return Err(IaasError::NotFound(format!("listener {}", listener_id)));
        }
        self.backends
            .lock()
            .unwrap()
            .retain(|_, b| b.listener_id != listener_id);
        self.log(format!("delete_listener {}", listener_id));
        Ok(())
    }

    async fn list_backends(&self, listener_id: &str) -> Result<Vec<Backend>, IaasError> {
        let mut backends: Vec<Backend> = self
            .backends
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.listener_id == listener_id)
            .cloned()
            .collect();
        backends.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        Ok(backends)
    }

    async fn add_backends(&self, listener_id: &str, specs: Vec<BackendSpec>) -> Result<Vec<String>, IaasError> {
        if !self.listeners.lock().unwrap().contains_key(listener_id) {
            return Err(IaasError::NotFound(format!("listener {}", listener_id)));
        }
        let mut ids = Vec::new();
        for spec in specs {
            let id = format!("bkd-{}", self.next_id());
            self.backends.lock().unwrap().insert(
                id.clone(),
                Backend {
                    id: id.clone(),
                    listener_id: listener_id.to_string(),
                    resource_id: spec.resource_id.clone(),
                    port: spec.port,
                },
            );
            self.log(format!("add_backend {} {}:{}", listener_id, spec.resource_id, spec.port));
            ids.push(id);
        }
        Ok(ids)
    }

    async fn delete_backends(&self, backend_ids: &[String]) -> Result<(), IaasError> {
        let mut backends = self.backends.lock().unwrap();
        for id in backend_ids {
            if backends.remove(id).is_none() {
                return Err(IaasError::NotFound(format!("backend {}", id)));
            }
        }
        drop(backends);
        for id in backend_ids {
            self.log(format!("delete_backend {}", id));
        }
        Ok(())
    }

    async fn describe_eip(&self, id: &str) -> Result<Eip, IaasError> {
        self.eips
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| IaasError::NotFound(format!("eip {}", id)))
    }

    async fn allocate_eip(&self, name: &str) -> Result<CreatedResource, IaasError> {
        let n = self.next_id();
        let id = format!("eip-{}", n);
        self.eips.lock().unwrap().insert(
            id.clone(),
            Eip {
                id: id.clone(),
                name: name.to_string(),
                address: format!("203.0.113.{}", n % 256),
                status: "available".to_string(),
                owner: self.owner.clone(),
                associated_resource: None,
            },
        );
        self.log(format!("allocate_eip {}", name));
        Ok(CreatedResource {
            resource_id: id,
            job_id: self.finished_job("AllocateEip"),
        })
    }

    async fn release_eip(&self, id: &str) -> Result<(), IaasError> {
        let removed = self.eips.lock().unwrap().remove(id);
        if removed.is_none() {
            return Err(IaasError::NotFound(format!("eip {}", id)));
        }
        self.log(format!("release_eip {}", id));
        Ok(())
    }

    async fn associate_eip(&self, eip_id: &str, load_balancer_id: &str) -> Result<String, IaasError> {
        let nested = {
            let mut eips = self.eips.lock().unwrap();
            let eip = eips
                .get_mut(eip_id)
                .ok_or_else(|| IaasError::NotFound(format!("eip {}", eip_id)))?;
            if let Some(assoc) = &eip.associated_resource {
                if assoc.resource_id != load_balancer_id {
                    return Err(IaasError::Conflict(format!(
                        "eip {} already bound to {}",
                        eip_id, assoc.resource_id
                    )));
                }
            }
            eip.associated_resource = Some(AssociatedResource {
                resource_id: load_balancer_id.to_string(),
                resource_type: "load_balancer".to_string(),
            });
            NestedEip {
                id: eip.id.clone(),
                name: eip.name.clone(),
                address: eip.address.clone(),
            }
        };
        {
            let mut lbs = self.load_balancers.lock().unwrap();
            let lb = lbs
                .get_mut(load_balancer_id)
                .ok_or_else(|| IaasError::NotFound(format!("load balancer {}", load_balancer_id)))?;
            if !lb.eips.iter().any(|e| e.id == nested.id) {
                lb.eips.push(nested);
            }
        }
        self.log(format!("associate_eip {} {}", eip_id, load_balancer_id));
        Ok(self.finished_job("AssociateEip"))
    }

    async fn dissociate_eip(&self, eip_id: &str) -> Result<String, IaasError> {
        let bound_to = {
            let mut eips = self.eips.lock().unwrap();
            let eip = eips
                .get_mut(eip_id)
                .ok_or_else(|| IaasError::NotFound(format!("eip {}", eip_id)))?;
            eip.associated_resource.take().map(|a| a.resource_id)
        };
        if let Some(lb_id) = bound_to {
            if let Some(lb) = self.load_balancers.lock().unwrap().get_mut(&lb_id) {
                lb.eips.retain(|e| e.id != eip_id);
            }
        }
        self.log(format!("dissociate_eip {}", eip_id));
        Ok(self.finished_job("DissociateEip"))
    }

    async fn describe_security_group(&self, id: &str) -> Result<SecurityGroup, IaasError> {
        self.security_groups
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| IaasError::NotFound(format!("security group {}", id)))
    }

    async fn create_security_group(&self, name: &str) -> Result<String, IaasError> {
        let id = format!("sg-{}", self.next_id());
        self.security_groups.lock().unwrap().insert(
            id.clone(),
            SecurityGroup {
                id: id.clone(),
                name: name.to_string(),
            },
        );
        self.log(format!("create_security_group {}", name));
        Ok(id)
    }

    async fn attach_security_group(&self, security_group_id: &str, load_balancer_id: &str) -> Result<(), IaasError> {
        if !self.security_groups.lock().unwrap().contains_key(security_group_id) {
            return Err(IaasError::NotFound(format!("security group {}", security_group_id)));
        }
        let mut lbs = self.load_balancers.lock().unwrap();
        let lb = lbs
            .get_mut(load_balancer_id)
            .ok_or_else(|| IaasError::NotFound(format!("load balancer {}", load_balancer_id)))?;
        lb.security_group_id = Some(security_group_id.to_string());
        drop(lbs);
        self.log(format!("attach_security_group {} {}", security_group_id, load_balancer_id));
        Ok(())
    }

    async fn delete_security_group(&self, id: &str) -> Result<(), IaasError> {
        let removed = self.security_groups.lock().unwrap().remove(id);
        if removed.is_none() {
            return Err(IaasError::NotFound(format!("security group {}", id)));
        }
        self.rules.lock().unwrap().retain(|_, r| r.security_group_id != id);
        self.log(format!("delete_security_group {}", id));
        Ok(())
    }

    async fn list_security_group_rules(&self, security_group_id: &str) -> Result<Vec<SecurityGroupRule>, IaasError> {
        let mut rules: Vec<SecurityGroupRule> = self
            .rules
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.security_group_id == security_group_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.port.cmp(&b.port));
        Ok(rules)
    }

    async fn add_security_group_rules(&self, security_group_id: &str, specs: Vec<RuleSpec>) -> Result<Vec<String>, IaasError> {
        if !self.security_groups.lock().unwrap().contains_key(security_group_id) {
            return Err(IaasError::NotFound(format!("security group {}", security_group_id)));
        }
        let mut ids = Vec::new();
        for spec in specs {
            let id = format!("sgr-{}", self.next_id());
            self.rules.lock().unwrap().insert(
                id.clone(),
                SecurityGroupRule {
                    id: id.clone(),
                    security_group_id: security_group_id.to_string(),
                    protocol: spec.protocol.clone(),
                    port: spec.port,
                    cidr: spec.cidr.clone(),
                    description: spec.description.clone(),
                },
            );
            self.log(format!(
                "add_security_group_rule {} {}:{} {}",
                security_group_id, spec.protocol, spec.port, spec.cidr
            ));
            ids.push(id);
        }
        Ok(ids)
    }

    async fn delete_security_group_rules(&self, rule_ids: &[String]) -> Result<(), IaasError> {
        let mut rules = self.rules.lock().unwrap();
        for id in rule_ids {
            if rules.remove(id).is_none() {
                return Err(IaasError::NotFound(format!("security group rule {}", id)));
            }
        }
        drop(rules);
        for id in rule_ids {
            self.log(format!("delete_security_group_rule {}", id));
        }
        Ok(())
    }

    async fn apply_security_group(&self, security_group_id: &str) -> Result<String, IaasError> {
        if !self.security_groups.lock().unwrap().contains_key(security_group_id) {
            return Err(IaasError::NotFound(format!("security group {}", security_group_id)));
        }
        self.log(format!("apply_security_group {}", security_group_id));
        Ok(self.finished_job("ApplySecurityGroup"))
    }

    async fn list_resource_tags(&self, resource_id: &str) -> Result<Vec<String>, IaasError> {
        let mut tags: Vec<String> = self
            .attached_tags
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| r == resource_id)
            .map(|(t, _)| t.clone())
            .collect();
        tags.sort();
        Ok(tags)
    }

    async fn attach_tags(&self, tag_ids: &[String], resource_id: &str, resource_type: &str) -> Result<(), IaasError> {
        let mut attached = self.attached_tags.lock().unwrap();
        for tag in tag_ids {
            // Re-attaching an already-attached tag is not an error
            attached.insert((tag.clone(), resource_id.to_string()));
        }
        drop(attached);
        self.log(format!("attach_tags {} {}", resource_type, resource_id));
        Ok(())
    }

    async fn detach_tags(&self, tag_ids: &[String], resource_id: &str, resource_type: &str) -> Result<(), IaasError> {
        let mut attached = self.attached_tags.lock().unwrap();
        for tag in tag_ids {
            attached.remove(&(tag.clone(), resource_id.to_string()));
        }
        drop(attached);
        self.log(format!("detach_tags {} {}", resource_type, resource_id));
        Ok(())
    }

    async fn describe_job(&self, id: &str) -> Result<Job, IaasError> {
        self.jobs
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| IaasError::NotFound(format!("job {}", id)))
    }
}
