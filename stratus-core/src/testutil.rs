//! Scripted client used by the driver, reconciler and deployment tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Map;

use crate::api::{
    CatalogItemRequestTemplate, CatalogRequest, Deployment, Operation, ProvisioningClient,
    RequestCompletion, RequestPhase, RequestStatusView, ResourceActionTemplate, ResourceViewPage,
};
use crate::error::{Error, Result};

/// One action submission observed by the mock
#[derive(Debug, Clone)]
pub struct PostedAction {
    pub resource_id: String,
    pub action_id: String,
    pub template: ResourceActionTemplate,
}

#[derive(Default)]
pub struct MockClient {
    /// resource id -> permitted operations
    pub actions: HashMap<String, Vec<Operation>>,
    /// action id -> template handed out for it
    pub templates: HashMap<String, ResourceActionTemplate>,
    /// catalog item id -> request template
    pub catalog_templates: HashMap<String, CatalogItemRequestTemplate>,
    /// deployment id -> detail payload
    pub deployments: HashMap<String, Deployment>,
    /// pages served by request_resource_view, in page order
    pub pages: Vec<ResourceViewPage>,
    /// phases served by request_status, in call order; once drained the
    /// mock keeps answering IN_PROGRESS
    pub phases: Mutex<VecDeque<RequestPhase>>,
    pub status_calls: Mutex<u32>,
    pub posted: Mutex<Vec<PostedAction>>,
    pub catalog_requests: Mutex<Vec<CatalogItemRequestTemplate>>,
}

impl MockClient {
    pub fn with_phases(phases: impl IntoIterator<Item = RequestPhase>) -> Self {
        Self {
            phases: Mutex::new(phases.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn operation(name: &str, id: &str) -> Operation {
        Operation {
            name: name.to_string(),
            id: id.to_string(),
            description: None,
            operation_type: None,
        }
    }

    pub fn template(data: serde_json::Value) -> ResourceActionTemplate {
        let data = match data {
            serde_json::Value::Object(map) => map,
            _ => Map::new(),
        };
        ResourceActionTemplate {
            template_type: None,
            resource_id: None,
            action_id: None,
            description: None,
            reasons: None,
            data,
        }
    }

    pub fn posted_actions(&self) -> Vec<PostedAction> {
        self.posted.lock().unwrap().clone()
    }

    pub fn status_call_count(&self) -> u32 {
        *self.status_calls.lock().unwrap()
    }
}

#[async_trait]
impl ProvisioningClient for MockClient {
    async fn resource_actions(&self, resource_id: &str) -> Result<Vec<Operation>> {
        Ok(self.actions.get(resource_id).cloned().unwrap_or_default())
    }

    async fn resource_action_template(
        &self,
        _resource_id: &str,
        action_id: &str,
    ) -> Result<ResourceActionTemplate> {
        self.templates
            .get(action_id)
            .cloned()
            .ok_or_else(|| Error::api(format!("no template scripted for action {action_id}")))
    }

    async fn post_resource_action(
        &self,
        resource_id: &str,
        action_id: &str,
        template: &ResourceActionTemplate,
    ) -> Result<String> {
        let mut posted = self.posted.lock().unwrap();
        posted.push(PostedAction {
            resource_id: resource_id.to_string(),
            action_id: action_id.to_string(),
            template: template.clone(),
        });
        Ok(format!("req-{}", posted.len()))
    }

    async fn request_status(&self, _request_id: &str) -> Result<RequestStatusView> {
        *self.status_calls.lock().unwrap() += 1;
        let phase = self
            .phases
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RequestPhase::InProgress);
        Ok(RequestStatusView {
            phase,
            completion: RequestCompletion {
                state: None,
                details: match phase {
                    RequestPhase::Failed | RequestPhase::Rejected => {
                        Some("scripted failure".to_string())
                    }
                    _ => None,
                },
            },
        })
    }

    async fn request_resource_view(&self, _request_id: &str, page: u32) -> Result<ResourceViewPage> {
        self.pages
            .get((page.max(1) - 1) as usize)
            .cloned()
            .ok_or_else(|| Error::api(format!("no page {page} scripted")))
    }

    async fn deployment(&self, deployment_id: &str) -> Result<Deployment> {
        self.deployments
            .get(deployment_id)
            .cloned()
            .ok_or_else(|| Error::api(format!("no deployment scripted for {deployment_id}")))
    }

    async fn catalog_item_request_template(
        &self,
        catalog_item_id: &str,
    ) -> Result<CatalogItemRequestTemplate> {
        self.catalog_templates
            .get(catalog_item_id)
            .cloned()
            .ok_or_else(|| Error::api(format!("no catalog template scripted for {catalog_item_id}")))
    }

    async fn request_catalog_item(
        &self,
        template: &CatalogItemRequestTemplate,
    ) -> Result<CatalogRequest> {
        self.catalog_requests.lock().unwrap().push(template.clone());
        Ok(CatalogRequest {
            id: "catalog-req-1".to_string(),
            phase: Some(RequestPhase::Submitted),
            state: None,
        })
    }
}
