//! Catalog/request/resource endpoints of the provisioning service

use std::future::Future;

use async_trait::async_trait;
use serde::Deserialize;

use stratus_core::api::{
    CatalogItemRequestTemplate, CatalogRequest, Deployment, Operation, PageMetadata,
    ProvisioningClient, RequestStatusView, ResourceActionTemplate, ResourceViewPage,
};
use stratus_core::{Error, Result};

use crate::client::Client;

const CONSUMER: &str = "/catalog-service/api/consumer";
const PAGE_LIMIT: u32 = 20;

/// Listing wrapper used by the actions and catalog view endpoints
#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    content: Vec<T>,
    #[serde(default)]
    metadata: PageMetadata,
}

#[derive(Deserialize)]
struct CatalogItemView {
    #[serde(rename = "catalogItemId", default)]
    catalog_item_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// The id of the request an action POST created, taken from the trailing
/// segment of its `Location` URL
fn request_id_from_location(location: &str) -> Option<&str> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

impl Client {
    /// Resolve an entitled catalog item's id from its display name.
    ///
    /// The views endpoint has no name filter, so pages are scanned until the
    /// first exact match.
    pub async fn catalog_item_id_by_name(&self, name: &str) -> Result<String> {
        scan_catalog_pages(
            |page| async move {
                self.get_json(&format!(
                    "{CONSUMER}/entitledCatalogItemViews?page={page}&limit={PAGE_LIMIT}"
                ))
                .await
            },
            name,
        )
        .await
    }
}

/// Scan the paged catalog views for an item named `name`.
///
/// The page count is pinned from the first page; if a later page reports a
/// different count the listing changed mid-scan and the whole lookup is
/// surfaced as retryable rather than trusting a possibly truncated view.
async fn scan_catalog_pages<F, Fut>(fetch: F, name: &str) -> Result<String>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<Page<CatalogItemView>>>,
{
    let first = fetch(1).await?;
    let total_pages = first.metadata.total_pages.max(1);
    if let Some(id) = catalog_item_in_page(&first, name) {
        return Ok(id);
    }

    for page in 2..=total_pages {
        let views = fetch(page).await?;
        if views.metadata.total_pages != total_pages {
            return Err(Error::InconsistentResourceView {
                expected: total_pages,
                actual: views.metadata.total_pages,
            });
        }
        if let Some(id) = catalog_item_in_page(&views, name) {
            return Ok(id);
        }
    }
    Err(Error::CatalogItemNotFound(name.to_string()))
}

fn catalog_item_in_page(page: &Page<CatalogItemView>, name: &str) -> Option<String> {
    page.content
        .iter()
        .filter(|view| view.name.as_deref() == Some(name))
        .find_map(|view| view.catalog_item_id.clone())
}

#[async_trait]
impl ProvisioningClient for Client {
    async fn resource_actions(&self, resource_id: &str) -> Result<Vec<Operation>> {
        let page: Page<Operation> = self
            .get_json(&format!("{CONSUMER}/resources/{resource_id}/actions"))
            .await?;
        Ok(page.content)
    }

    async fn resource_action_template(
        &self,
        resource_id: &str,
        action_id: &str,
    ) -> Result<ResourceActionTemplate> {
        self.get_json(&format!(
            "{CONSUMER}/resources/{resource_id}/actions/{action_id}/requests/template"
        ))
        .await
    }

    async fn post_resource_action(
        &self,
        resource_id: &str,
        action_id: &str,
        template: &ResourceActionTemplate,
    ) -> Result<String> {
        let path =
            format!("{CONSUMER}/resources/{resource_id}/actions/{action_id}/requests");
        let location = self.post_for_location(&path, template).await?;
        request_id_from_location(&location)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::api(format!("POST {path}: Location header carries no request id"))
            })
    }

    async fn request_status(&self, request_id: &str) -> Result<RequestStatusView> {
        self.get_json(&format!("{CONSUMER}/requests/{request_id}"))
            .await
    }

    async fn request_resource_view(&self, request_id: &str, page: u32) -> Result<ResourceViewPage> {
        self.get_json(&format!(
            "{CONSUMER}/requests/{request_id}/resourceViews?page={page}&limit={PAGE_LIMIT}"
        ))
        .await
    }

    async fn deployment(&self, deployment_id: &str) -> Result<Deployment> {
        self.get_json(&format!("{CONSUMER}/deployments/{deployment_id}"))
            .await
    }

    async fn catalog_item_request_template(
        &self,
        catalog_item_id: &str,
    ) -> Result<CatalogItemRequestTemplate> {
        self.get_json(&format!(
            "{CONSUMER}/entitledCatalogItems/{catalog_item_id}/requests/template"
        ))
        .await
    }

    async fn request_catalog_item(
        &self,
        template: &CatalogItemRequestTemplate,
    ) -> Result<CatalogRequest> {
        let catalog_item_id = template
            .catalog_item_id
            .as_deref()
            .ok_or_else(|| Error::api("catalog request template carries no catalogItemId"))?;
        self.post_json(
            &format!("{CONSUMER}/entitledCatalogItems/{catalog_item_id}/requests"),
            template,
        )
        .await
    }
}
