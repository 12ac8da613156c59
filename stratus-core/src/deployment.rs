//! Deployment read, create and destroy flows
//!
//! Day-0/day-N plumbing around the reconciler: fetching the resource view as
//! a consistent snapshot, requesting a new deployment from a catalog item,
//! and driving the deployment-level Destroy action.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::actions::{ACTION_DESTROY, resolve_actions};
use crate::api::{
    CatalogItemRequestTemplate, DEPLOYMENT_RESOURCE_TYPE, ProvisioningClient,
};
use crate::config::{DeploymentModel, ResourceConfiguration};
use crate::error::{Error, Result};
use crate::request::RequestWaiter;
use crate::template::{coerce_config_value, set_template_value, template_data_for_component};

/// Fetch every page of a request's resource view.
///
/// Each full read is treated as one consistent snapshot: if the pagination
/// metadata disagrees between pages, the service mutated the view mid-read
/// and the whole read is surfaced as retryable instead of silently truncated.
pub async fn fetch_resource_view(
    client: &dyn ProvisioningClient,
    request_id: &str,
) -> Result<Vec<Value>> {
    let first = client.request_resource_view(request_id, 1).await?;
    let total_pages = first.metadata.total_pages.max(1);
    let mut content = first.content;

    for page in 2..=total_pages {
        let next = client.request_resource_view(request_id, page).await?;
        if next.metadata.total_pages != total_pages {
            return Err(Error::InconsistentResourceView {
                expected: total_pages,
                actual: next.metadata.total_pages,
            });
        }
        content.extend(next.content);
    }
    Ok(content)
}

/// Read the current state of the deployment provisioned by `request_id`.
/// An empty resource view means the deployment no longer exists.
pub async fn read_deployment_state(
    client: &dyn ProvisioningClient,
    request_id: &str,
) -> Result<DeploymentModel> {
    let content = fetch_resource_view(client, request_id).await?;
    if content.is_empty() {
        return Err(Error::DeploymentNotFound(request_id.to_string()));
    }
    Ok(DeploymentModel::from_resource_view(&content))
}

/// Locate the deployment resource id within a request's resource view
pub async fn deployment_id_from_request(
    client: &dyn ProvisioningClient,
    request_id: &str,
) -> Result<String> {
    let content = fetch_resource_view(client, request_id).await?;
    content
        .iter()
        .filter_map(Value::as_object)
        .find(|row| {
            row.get("resourceType").and_then(Value::as_str) == Some(DEPLOYMENT_RESOURCE_TYPE)
        })
        .and_then(|row| row.get("resourceId").and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| Error::DeploymentNotFound(request_id.to_string()))
}

/// The component names a catalog blueprint exposes: the keys of the request
/// template whose values are objects
pub fn blueprint_components(template: &CatalogItemRequestTemplate) -> HashSet<String> {
    template
        .data
        .iter()
        .filter(|(_, value)| value.is_object())
        .map(|(key, _)| key.clone())
        .collect()
}

/// Reject configurations that reference component names absent from the
/// blueprint, before anything is mutated remotely
pub fn validate_components(
    template: &CatalogItemRequestTemplate,
    configurations: &[ResourceConfiguration],
) -> Result<()> {
    let components = blueprint_components(template);
    let invalid: Vec<String> = configurations
        .iter()
        .filter(|config| !components.contains(&config.component_name))
        .map(|config| config.component_name.clone())
        .collect();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidComponents { names: invalid })
    }
}

/// A new deployment to be requested from a catalog item
#[derive(Debug, Clone, Default)]
pub struct DeploymentRequest {
    pub catalog_item_id: String,
    pub description: Option<String>,
    pub reasons: Option<String>,
    pub business_group_id: Option<String>,
    pub lease_days: Option<i64>,
    /// Deployment-level fields set directly on the template data
    pub deployment_configuration: HashMap<String, String>,
    /// Per-component configuration and cluster sizes
    pub resource_configuration: Vec<ResourceConfiguration>,
}

impl DeploymentRequest {
    pub fn new(catalog_item_id: impl Into<String>) -> Self {
        Self {
            catalog_item_id: catalog_item_id.into(),
            ..Self::default()
        }
    }

    /// Fetch the catalog item's request template, fill it in and submit it.
    /// Returns the id of the provisioning request to wait on.
    pub async fn submit(&self, client: &dyn ProvisioningClient) -> Result<String> {
        let mut template = client
            .catalog_item_request_template(&self.catalog_item_id)
            .await?;
        validate_components(&template, &self.resource_configuration)?;

        if self.description.is_some() {
            template.description = self.description.clone();
        }
        if self.reasons.is_some() {
            template.reasons = self.reasons.clone();
        }
        // when no business group is given, the template's default one is used
        if self.business_group_id.is_some() {
            template.business_group_id = self.business_group_id.clone();
        }
        if let Some(days) = self.lease_days {
            template
                .data
                .insert("_leaseDays".to_string(), Value::from(days));
        }
        for (field, value) in &self.deployment_configuration {
            template
                .data
                .insert(field.clone(), coerce_config_value(value));
        }

        for config in &self.resource_configuration {
            // validated above, so the component sub-map exists
            let Some(component) =
                template_data_for_component(&mut template.data, &config.component_name)
            else {
                continue;
            };
            if config.cluster != 0 {
                set_template_value(component, "_cluster", Value::from(config.cluster));
            }
            for (property, value) in &config.configuration {
                set_template_value(component, property, coerce_config_value(value));
            }
        }

        info!(catalog_item_id = %self.catalog_item_id, "submitting catalog request");
        let request = client.request_catalog_item(&template).await?;
        Ok(request.id)
    }
}

/// Destroy a deployment through its day-2 Destroy action.
///
/// Returns `false` without error when the action is unavailable (the
/// deployment is already gone or the service forbids it right now).
pub async fn destroy_deployment(
    client: &dyn ProvisioningClient,
    deployment_id: &str,
    waiter: &RequestWaiter,
    wait_timeout: Duration,
) -> Result<bool> {
    let actions = resolve_actions(client, deployment_id).await?;
    let Some(action_id) = actions.id(ACTION_DESTROY) else {
        warn!(deployment_id, "Destroy action unavailable, nothing to do");
        return Ok(false);
    };

    let template = client
        .resource_action_template(deployment_id, action_id)
        .await?;
    let request_id = client
        .post_resource_action(deployment_id, action_id, &template)
        .await?;
    info!(deployment_id, request_id, "destroy request submitted");
    waiter.wait(client, &request_id, wait_timeout).await?;
    Ok(true)
}
