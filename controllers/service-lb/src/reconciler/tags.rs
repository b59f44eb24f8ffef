//! Classification tag binding
//!
//! Optional: an empty configured tag set disables the whole concern. Binding
//! diffs against the tags already attached so a converged resource costs no
//! mutation, and attaching an already-attached tag is not an error anyway.

use tracing::debug;

use super::Reconciler;
use crate::error::ControllerError;

impl Reconciler {
    /// Attach the configured tags to a resource. Returns whether a mutation
    /// was applied; no-op success when tagging is disabled.
    pub(crate) async fn bind_tags(
        &self,
        resource_id: &str,
        resource_type: &str,
    ) -> Result<bool, ControllerError> {
        if self.config.tag_ids.is_empty() {
            return Ok(false);
        }
        let attached = self.client.list_resource_tags(resource_id).await?;
        let missing: Vec<String> = self
            .config
            .tag_ids
            .iter()
            .filter(|tag| !attached.contains(tag))
            .cloned()
            .collect();
        if missing.is_empty() {
            debug!("{} {} already carries all tags", resource_type, resource_id);
            return Ok(false);
        }
        self.client.attach_tags(&missing, resource_id, resource_type).await?;
        Ok(true)
    }

    /// Detach the configured tags from a resource; symmetric to `bind_tags`.
    pub(crate) async fn unbind_tags(
        &self,
        resource_id: &str,
        resource_type: &str,
    ) -> Result<bool, ControllerError> {
        if self.config.tag_ids.is_empty() {
            return Ok(false);
        }
        let attached = self.client.list_resource_tags(resource_id).await?;
        let present: Vec<String> = self
            .config
            .tag_ids
            .iter()
            .filter(|tag| attached.contains(tag))
            .cloned()
            .collect();
        if present.is_empty() {
            return Ok(false);
        }
        self.client.detach_tags(&present, resource_id, resource_type).await?;
        Ok(true)
    }
}
