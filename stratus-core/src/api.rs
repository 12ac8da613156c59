//! Wire types and the client trait for the provisioning service
//!
//! The engine never talks HTTP itself; it consumes these operations from a
//! `ProvisioningClient` implementation (see the stratus-sdk crate for the
//! concrete REST client).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Resource type reported for provisioned machines in a resource view
pub const INFRASTRUCTURE_VIRTUAL: &str = "Infrastructure.Virtual";
/// Resource type reported for the deployment row itself
pub const DEPLOYMENT_RESOURCE_TYPE: &str = "composition.resource.type.deployment";

/// Phase of an asynchronous provisioning request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestPhase {
    Submitted,
    InProgress,
    Successful,
    Failed,
    Rejected,
    /// Any phase string this crate does not know about. Treated as still
    /// running by the request waiter.
    #[serde(other)]
    Unknown,
}

impl RequestPhase {
    /// Whether this phase ends the request's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed | Self::Rejected)
    }
}

impl std::fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "SUBMITTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Successful => "SUCCESSFUL",
            Self::Failed => "FAILED",
            Self::Rejected => "REJECTED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// One operation currently permitted on a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub operation_type: Option<String>,
}

/// The editable payload the service requires to run a specific action.
/// Fetched fresh per action, mutated in place, then posted back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceActionTemplate {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub template_type: Option<String>,
    #[serde(rename = "resourceId", default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(rename = "actionId", default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasons: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Completion block of a request status response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestCompletion {
    #[serde(rename = "requestCompletionState", default)]
    pub state: Option<String>,
    #[serde(rename = "CompletionDetails", default)]
    pub details: Option<String>,
}

/// Status of one asynchronous request
#[derive(Debug, Clone, Deserialize)]
pub struct RequestStatusView {
    pub phase: RequestPhase,
    #[serde(rename = "requestCompletion", default)]
    pub completion: RequestCompletion,
}

/// Pagination metadata attached to listing responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMetadata {
    #[serde(default)]
    pub size: u32,
    #[serde(rename = "totalElements", default)]
    pub total_elements: u32,
    #[serde(rename = "totalPages", default)]
    pub total_pages: u32,
    #[serde(default)]
    pub number: u32,
}

/// One page of the resource view for a provisioning request.
/// The content rows are heterogeneous JSON; the model builder in
/// [`crate::config`] picks them apart.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceViewPage {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub metadata: PageMetadata,
}

/// Lease window of a deployment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Lease {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// One component embedded in a resolved deployment detail payload
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentComponent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub component_type: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Fully resolved deployment detail payload
#[derive(Debug, Clone, Deserialize)]
pub struct Deployment {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub lease: Option<Lease>,
    #[serde(default)]
    pub components: Vec<DeploymentComponent>,
}

/// Request template for a catalog item, to be filled in and posted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItemRequestTemplate {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub template_type: Option<String>,
    #[serde(rename = "catalogItemId", default, skip_serializing_if = "Option::is_none")]
    pub catalog_item_id: Option<String>,
    #[serde(rename = "requestedFor", default, skip_serializing_if = "Option::is_none")]
    pub requested_for: Option<String>,
    #[serde(rename = "businessGroupId", default, skip_serializing_if = "Option::is_none")]
    pub business_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasons: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Response to a submitted catalog request
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRequest {
    pub id: String,
    #[serde(default)]
    pub phase: Option<RequestPhase>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Operations the engine consumes from the provisioning service.
///
/// All operations are synchronous request/response; the asynchronous part of
/// the protocol lives in the request ids they hand back, which are polled
/// through [`request_status`](Self::request_status).
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Enumerate the actions currently permitted on a resource
    async fn resource_actions(&self, resource_id: &str) -> Result<Vec<Operation>>;

    /// Fetch the editable payload for an action on a resource
    async fn resource_action_template(
        &self,
        resource_id: &str,
        action_id: &str,
    ) -> Result<ResourceActionTemplate>;

    /// Submit a filled action template; returns the new request's id
    async fn post_resource_action(
        &self,
        resource_id: &str,
        action_id: &str,
        template: &ResourceActionTemplate,
    ) -> Result<String>;

    /// Poll one asynchronous request
    async fn request_status(&self, request_id: &str) -> Result<RequestStatusView>;

    /// Fetch one page of the resources provisioned for a request
    async fn request_resource_view(&self, request_id: &str, page: u32) -> Result<ResourceViewPage>;

    /// Fetch a fully resolved deployment
    async fn deployment(&self, deployment_id: &str) -> Result<Deployment>;

    /// Fetch the request template for a catalog item
    async fn catalog_item_request_template(
        &self,
        catalog_item_id: &str,
    ) -> Result<CatalogItemRequestTemplate>;

    /// Submit a filled catalog request template to create a deployment
    async fn request_catalog_item(
        &self,
        template: &CatalogItemRequestTemplate,
    ) -> Result<CatalogRequest>;
}
