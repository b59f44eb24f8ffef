//! IaaS API client
//!
//! Implements the cloud REST API client for the load-balancer, listener,
//! elastic-IP, security-group, tag and job endpoints.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::IaasError;
use crate::iaas_trait::IaasClientTrait;
use crate::models::*;

/// Response body carrying only a job id
#[derive(Debug, Deserialize)]
struct JobRef {
    job_id: String,
}

/// Response body carrying a single created resource id
#[derive(Debug, Deserialize)]
struct CreatedId {
    id: String,
}

/// Response body carrying a batch of created resource ids
#[derive(Debug, Deserialize)]
struct CreatedIds {
    ids: Vec<String>,
}

/// IaaS API client
pub struct IaasClient {
    client: Client,
    base_url: String,
    access_key: String,
    secret_key: String,
}

impl IaasClient {
    /// Create a new IaaS client
    ///
    /// # Arguments
    /// * `base_url` - API base URL (e.g., "https://api.iaas.example")
    /// * `access_key` - API access key id
    /// * `secret_key` - API secret key
    pub fn new(base_url: String, access_key: String, secret_key: String) -> Result<Self, IaasError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(IaasError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_key,
            secret_key,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, url)
            .header("X-Access-Key", &self.access_key)
            .header("X-Secret-Key", &self.secret_key)
            .header("Accept", "application/json")
    }

    /// Send a request and decode the JSON body, mapping HTTP error statuses
    /// onto the client error taxonomy.
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, IaasError> {
        let response = builder.send().await.map_err(IaasError::Http)?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(IaasError::NotFound(body));
        }
        if status == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            return Err(IaasError::Conflict(body));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(IaasError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IaasError::Api(format!("{} - {}", status, body)));
        }

        // Capture the body so decode failures carry useful context
        let response_text = response.text().await?;
        serde_json::from_str(&response_text).map_err(|e| {
            IaasError::Api(format!(
                "error decoding response body: {} - Response (first 500 chars): {}",
                e,
                response_text.chars().take(500).collect::<String>()
            ))
        })
    }

    /// Send a request expecting no meaningful body
    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), IaasError> {
        let response = builder.send().await.map_err(IaasError::Http)?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(IaasError::NotFound(body));
        }
        if status == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            return Err(IaasError::Conflict(body));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(IaasError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IaasError::Api(format!("{} - {}", status, body)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IaasClientTrait for IaasClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn describe_load_balancer(&self, id: &str) -> Result<LoadBalancer, IaasError> {
        debug!("Fetching load balancer {}", id);
        self.send(self.request(Method::GET, &format!("/v1/load_balancers/{}", id)))
            .await
    }

    async fn describe_load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>, IaasError> {
        debug!("Searching load balancer by name {}", name);
        let path = format!("/v1/load_balancers?name={}", urlencoding::encode(name));
        let page: PaginatedResponse<LoadBalancer> = self.send(self.request(Method::GET, &path)).await?;
        // Name lookup is exact; the API may still return unrelated partial matches
        Ok(page.results.into_iter().find(|lb| lb.name == name))
    }

    async fn create_load_balancer(&self, request: CreateLoadBalancerRequest) -> Result<CreatedResource, IaasError> {
        debug!("Creating load balancer {}", request.name);
        self.send(self.request(Method::POST, "/v1/load_balancers").json(&request))
            .await
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<String, IaasError> {
        debug!("Deleting load balancer {}", id);
        let job: JobRef = self
            .send(self.request(Method::DELETE, &format!("/v1/load_balancers/{}", id)))
            .await?;
        Ok(job.job_id)
    }

    async fn apply_load_balancer(&self, id: &str) -> Result<String, IaasError> {
        debug!("Applying pending changes to load balancer {}", id);
        let job: JobRef = self
            .send(self.request(Method::POST, &format!("/v1/load_balancers/{}/apply", id)))
            .await?;
        Ok(job.job_id)
    }

    async fn list_listeners(&self, load_balancer_id: &str) -> Result<Vec<Listener>, IaasError> {
        let path = format!("/v1/load_balancers/{}/listeners", load_balancer_id);
        let page: PaginatedResponse<Listener> = self.send(self.request(Method::GET, &path)).await?;
        Ok(page.results)
    }

    async fn add_listener(&self, load_balancer_id: &str, spec: ListenerSpec) -> Result<String, IaasError> {
        debug!(
            "Adding listener {}:{} to load balancer {}",
            spec.protocol, spec.port, load_balancer_id
        );
        let path = format!("/v1/load_balancers/{}/listeners", load_balancer_id);
        let created: CreatedId = self.send(self.request(Method::POST, &path).json(&spec)).await?;
        Ok(created.id)
    }

    async fn delete_listener(&self, listener_id: &str) -> Result<(), IaasError> {
        debug!("Deleting listener {}", listener_id);
        self.send_empty(self.request(Method::DELETE, &format!("/v1/listeners/{}", listener_id)))
            .await
    }

    async fn list_backends(&self, listener_id: &str) -> Result<Vec<Backend>, IaasError> {
        let path = format!("/v1/listeners/{}/backends", listener_id);
        let page: PaginatedResponse<Backend> = self.send(self.request(Method::GET, &path)).await?;
        Ok(page.results)
    }

    async fn add_backends(&self, listener_id: &str, specs: Vec<BackendSpec>) -> Result<Vec<String>, IaasError> {
        debug!("Adding {} backends to listener {}", specs.len(), listener_id);
        let path = format!("/v1/listeners/{}/backends", listener_id);
        let body = serde_json::json!({ "backends": specs });
        let created: CreatedIds = self.send(self.request(Method::POST, &path).json(&body)).await?;
        Ok(created.ids)
    }

    async fn delete_backends(&self, backend_ids: &[String]) -> Result<(), IaasError> {
        debug!("Deleting {} backends", backend_ids.len());
        let body = serde_json::json!({ "ids": backend_ids });
        self.send_empty(self.request(Method::DELETE, "/v1/backends").json(&body))
            .await
    }

    async fn describe_eip(&self, id: &str) -> Result<Eip, IaasError> {
        debug!("Fetching EIP {}", id);
        self.send(self.request(Method::GET, &format!("/v1/eips/{}", id))).await
    }

    async fn allocate_eip(&self, name: &str) -> Result<CreatedResource, IaasError> {
        debug!("Allocating EIP named {}", name);
        let body = serde_json::json!({ "name": name });
        self.send(self.request(Method::POST, "/v1/eips").json(&body)).await
    }

    async fn release_eip(&self, id: &str) -> Result<(), IaasError> {
        debug!("Releasing EIP {}", id);
        self.send_empty(self.request(Method::DELETE, &format!("/v1/eips/{}", id)))
            .await
    }

    async fn associate_eip(&self, eip_id: &str, load_balancer_id: &str) -> Result<String, IaasError> {
        debug!("Associating EIP {} with load balancer {}", eip_id, load_balancer_id);
        let body = serde_json::json!({ "load_balancer_id": load_balancer_id });
        let job: JobRef = self
            .send(self.request(Method::POST, &format!("/v1/eips/{}/associate", eip_id)).json(&body))
            .await?;
        Ok(job.job_id)
    }

    async fn dissociate_eip(&self, eip_id: &str) -> Result<String, IaasError> {
        debug!("Dissociating EIP {}", eip_id);
        let job: JobRef = self
            .send(self.request(Method::POST, &format!("/v1/eips/{}/dissociate", eip_id)))
            .await?;
        Ok(job.job_id)
    }

    async fn describe_security_group(&self, id: &str) -> Result<SecurityGroup, IaasError> {
        self.send(self.request(Method::GET, &format!("/v1/security_groups/{}", id)))
            .await
    }

    async fn create_security_group(&self, name: &str) -> Result<String, IaasError> {
        debug!("Creating security group {}", name);
        let body = serde_json::json!({ "name": name });
        let created: CreatedId = self
            .send(self.request(Method::POST, "/v1/security_groups").json(&body))
            .await?;
        Ok(created.id)
    }

    async fn attach_security_group(&self, security_group_id: &str, load_balancer_id: &str) -> Result<(), IaasError> {
        debug!("Attaching security group {} to load balancer {}", security_group_id, load_balancer_id);
        let body = serde_json::json!({ "load_balancer_id": load_balancer_id });
        self.send_empty(
            self.request(Method::POST, &format!("/v1/security_groups/{}/attach", security_group_id))
                .json(&body),
        )
        .await
    }

    async fn delete_security_group(&self, id: &str) -> Result<(), IaasError> {
        debug!("Deleting security group {}", id);
        self.send_empty(self.request(Method::DELETE, &format!("/v1/security_groups/{}", id)))
            .await
    }

    async fn list_security_group_rules(&self, security_group_id: &str) -> Result<Vec<SecurityGroupRule>, IaasError> {
        let path = format!("/v1/security_groups/{}/rules", security_group_id);
        let page: PaginatedResponse<SecurityGroupRule> =
            self.send(self.request(Method::GET, &path)).await?;
        Ok(page.results)
    }

    async fn add_security_group_rules(&self, security_group_id: &str, specs: Vec<RuleSpec>) -> Result<Vec<String>, IaasError> {
        debug!("Adding {} rules to security group {}", specs.len(), security_group_id);
        let path = format!("/v1/security_groups/{}/rules", security_group_id);
        let body = serde_json::json!({ "rules": specs });
        let created: CreatedIds = self.send(self.request(Method::POST, &path).json(&body)).await?;
        Ok(created.ids)
    }

    async fn delete_security_group_rules(&self, rule_ids: &[String]) -> Result<(), IaasError> {
        debug!("Deleting {} security group rules", rule_ids.len());
        let body = serde_json::json!({ "ids": rule_ids });
        self.send_empty(self.request(Method::DELETE, "/v1/security_group_rules").json(&body))
            .await
    }

    async fn apply_security_group(&self, security_group_id: &str) -> Result<String, IaasError> {
        debug!("Applying security group {}", security_group_id);
        let job: JobRef = self
            .send(self.request(Method::POST, &format!("/v1/security_groups/{}/apply", security_group_id)))
            .await?;
        Ok(job.job_id)
    }

    async fn list_resource_tags(&self, resource_id: &str) -> Result<Vec<String>, IaasError> {
        let path = format!("/v1/tags?resource_id={}", urlencoding::encode(resource_id));
        let page: PaginatedResponse<String> = self.send(self.request(Method::GET, &path)).await?;
        Ok(page.results)
    }

    async fn attach_tags(&self, tag_ids: &[String], resource_id: &str, resource_type: &str) -> Result<(), IaasError> {
        debug!("Attaching tags {:?} to {} {}", tag_ids, resource_type, resource_id);
        let body = serde_json::json!({
            "tag_ids": tag_ids,
            "resource_id": resource_id,
            "resource_type": resource_type,
        });
        self.send_empty(self.request(Method::POST, "/v1/tags/attach").json(&body))
            .await
    }

    async fn detach_tags(&self, tag_ids: &[String], resource_id: &str, resource_type: &str) -> Result<(), IaasError> {
        debug!("Detaching tags {:?} from {} {}", tag_ids, resource_type, resource_id);
        let body = serde_json::json!({
            "tag_ids": tag_ids,
            "resource_id": resource_id,
            "resource_type": resource_type,
        });
        self.send_empty(self.request(Method::POST, "/v1/tags/detach").json(&body))
            .await
    }

    async fn describe_job(&self, id: &str) -> Result<Job, IaasError> {
        self.send(self.request(Method::GET, &format!("/v1/jobs/{}", id))).await
    }
}
