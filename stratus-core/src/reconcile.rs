//! Day-2 reconciliation
//!
//! Diffs two deployment snapshots and drives the provisioning service's
//! day-2 actions to close the gap: a lease change first (metadata-only,
//! cheapest to fail fast on), then cluster scale actions, then per-instance
//! reconfigure actions. Actions run strictly one after another through the
//! submit/poll protocol; the first terminal failure aborts the run and
//! already-completed actions are not rolled back, so a re-run re-diffs and
//! converges. An action the service does not currently offer is skipped,
//! never an error.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::actions::{
    ACTION_CHANGE_LEASE, ACTION_RECONFIGURE, ACTION_SCALE_IN, ACTION_SCALE_OUT, ActionMap,
    resolve_actions,
};
use crate::api::ProvisioningClient;
use crate::config::{DeploymentModel, configuration_by_component};
use crate::deployment::validate_components;
use crate::error::Result;
use crate::request::RequestWaiter;
use crate::template::{
    coerce_config_value, replace_template_value, set_template_value, template_data_for_component,
};

/// Template field carrying the cluster size of a component
const CLUSTER_FIELD: &str = "_cluster";
/// Template field carrying the lease expiration timestamp
const EXPIRATION_FIELD: &str = "provider-ExpirationDate";

/// Drives a deployment from an observed snapshot to a desired one
pub struct Reconciler<'a> {
    client: &'a dyn ProvisioningClient,
    deployment_id: String,
    catalog_item_id: Option<String>,
    waiter: RequestWaiter,
}

impl<'a> Reconciler<'a> {
    pub fn new(client: &'a dyn ProvisioningClient, deployment_id: impl Into<String>) -> Self {
        Self {
            client,
            deployment_id: deployment_id.into(),
            catalog_item_id: None,
            waiter: RequestWaiter::new(),
        }
    }

    /// Enable up-front validation of component names against the catalog
    /// blueprint backing this deployment
    pub fn with_catalog_item(mut self, catalog_item_id: impl Into<String>) -> Self {
        self.catalog_item_id = Some(catalog_item_id.into());
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.waiter = RequestWaiter::with_poll_interval(poll_interval);
        self
    }

    /// Apply the difference between `old` and `new` to the remote deployment.
    ///
    /// On success the deployment reflects `new`. On failure the error names
    /// the first failing action; the caller re-runs reconciliation once the
    /// cause is corrected.
    pub async fn reconcile(
        &self,
        old: &DeploymentModel,
        new: &DeploymentModel,
        wait_timeout: Duration,
    ) -> Result<()> {
        if let Some(catalog_item_id) = &self.catalog_item_id {
            let template = self
                .client
                .catalog_item_request_template(catalog_item_id)
                .await?;
            validate_components(&template, &new.components)?;
        }

        if let Some(days) = new.lease_days
            && new.lease_days != old.lease_days
        {
            self.change_lease(days, wait_timeout).await?;
        }

        self.scale_components(old, new, wait_timeout).await?;
        self.reconfigure_instances(old, new, wait_timeout).await?;
        Ok(())
    }

    async fn change_lease(&self, days: i64, wait_timeout: Duration) -> Result<()> {
        let actions = resolve_actions(self.client, &self.deployment_id).await?;
        let Some(action_id) = actions.id(ACTION_CHANGE_LEASE) else {
            warn!(
                deployment_id = %self.deployment_id,
                "Change Lease action unavailable, lease not updated"
            );
            return Ok(());
        };

        let mut template = self
            .client
            .resource_action_template(&self.deployment_id, action_id)
            .await?;
        let expires = lease_expiration_text(days);
        info!(
            deployment_id = %self.deployment_id,
            days, %expires, "extending deployment lease"
        );
        replace_template_value(&mut template.data, EXPIRATION_FIELD, &Value::from(expires));

        let request_id = self
            .client
            .post_resource_action(&self.deployment_id, action_id, &template)
            .await?;
        self.waiter
            .wait(self.client, &request_id, wait_timeout)
            .await
    }

    async fn scale_components(
        &self,
        old: &DeploymentModel,
        new: &DeploymentModel,
        wait_timeout: Duration,
    ) -> Result<()> {
        let mut actions: Option<ActionMap> = None;

        for desired in &new.components {
            // components absent from the old snapshot were never provisioned
            // here; they are created through the deployment create flow
            let Some((_, observed)) =
                configuration_by_component(&old.components, &desired.component_name)
            else {
                continue;
            };
            if desired.cluster == 0 || desired.cluster == observed.cluster {
                continue;
            }

            let action_name = if desired.cluster > observed.cluster {
                ACTION_SCALE_OUT
            } else {
                ACTION_SCALE_IN
            };
            if actions.is_none() {
                actions = Some(resolve_actions(self.client, &self.deployment_id).await?);
            }
            let Some(action_id) = actions.as_ref().and_then(|map| map.id(action_name)) else {
                warn!(
                    component = %desired.component_name,
                    action = action_name,
                    "scale action unavailable, cluster size not applied"
                );
                continue;
            };

            let mut template = self
                .client
                .resource_action_template(&self.deployment_id, action_id)
                .await?;
            let Some(component) =
                template_data_for_component(&mut template.data, &desired.component_name)
            else {
                warn!(
                    component = %desired.component_name,
                    "component missing from action template, cluster size not applied"
                );
                continue;
            };
            replace_template_value(component, CLUSTER_FIELD, &Value::from(desired.cluster));

            info!(
                component = %desired.component_name,
                from = observed.cluster,
                to = desired.cluster,
                action = action_name,
                "scaling component"
            );
            let request_id = self
                .client
                .post_resource_action(&self.deployment_id, action_id, &template)
                .await?;
            self.waiter
                .wait(self.client, &request_id, wait_timeout)
                .await?;
        }
        Ok(())
    }

    async fn reconfigure_instances(
        &self,
        old: &DeploymentModel,
        new: &DeploymentModel,
        wait_timeout: Duration,
    ) -> Result<()> {
        for observed in &old.components {
            let Some((_, desired)) =
                configuration_by_component(&new.components, &observed.component_name)
            else {
                continue;
            };

            let changed: Vec<(&str, &str)> = desired
                .configuration
                .iter()
                .filter(|(key, value)| observed.configuration.get(*key) != Some(*value))
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect();
            if changed.is_empty() {
                continue;
            }

            for instance in &observed.instances {
                let actions = resolve_actions(self.client, &instance.resource_id).await?;
                let Some(action_id) = actions.id(ACTION_RECONFIGURE) else {
                    warn!(
                        component = %observed.component_name,
                        resource_id = %instance.resource_id,
                        "Reconfigure action unavailable, instance left as is"
                    );
                    continue;
                };

                let mut template = self
                    .client
                    .resource_action_template(&instance.resource_id, action_id)
                    .await?;
                for (key, value) in &changed {
                    set_template_value(&mut template.data, key, coerce_config_value(value));
                }

                info!(
                    component = %observed.component_name,
                    resource_id = %instance.resource_id,
                    changed = changed.len(),
                    "reconfiguring instance"
                );
                let request_id = self
                    .client
                    .post_resource_action(&instance.resource_id, action_id, &template)
                    .await?;
                self.waiter
                    .wait(self.client, &request_id, wait_timeout)
                    .await?;
            }
        }
        Ok(())
    }
}

/// The lease end timestamp in the text form the service expects
/// (e.g. `2020-04-16T00:15:44.700Z`)
pub fn lease_expiration_text(days: i64) -> String {
    (Utc::now() + chrono::Duration::days(days))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;
    use crate::api::RequestPhase;
    use crate::config::{Instance, ResourceConfiguration};
    use crate::error::Error;
    use crate::testutil::MockClient;
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn reconciler(client: &MockClient) -> Reconciler<'_> {
        Reconciler::new(client, "dep-1").with_poll_interval(Duration::from_millis(1))
    }

    fn web(cluster: u32, cpu: &str) -> ResourceConfiguration {
        ResourceConfiguration::new("web")
            .with_cluster(cluster)
            .with_configuration_entry("cpu", cpu)
            .with_instance(Instance::new("res-1"))
    }

    fn snapshot(component: ResourceConfiguration) -> DeploymentModel {
        DeploymentModel::default().with_component(component)
    }

    fn deployment_actions() -> (String, Vec<crate::api::Operation>) {
        (
            "dep-1".to_string(),
            vec![
                MockClient::operation(ACTION_SCALE_OUT, "act-out"),
                MockClient::operation(ACTION_SCALE_IN, "act-in"),
                MockClient::operation(ACTION_CHANGE_LEASE, "act-lease"),
            ],
        )
    }

    fn scale_templates() -> HashMap<String, crate::api::ResourceActionTemplate> {
        let template = MockClient::template(json!({"web": {"data": {"_cluster": 1}}}));
        HashMap::from([
            ("act-out".to_string(), template.clone()),
            ("act-in".to_string(), template),
        ])
    }

    #[tokio::test]
    async fn growth_selects_scale_out() {
        let client = MockClient {
            actions: HashMap::from([deployment_actions()]),
            templates: scale_templates(),
            phases: Mutex::new(VecDeque::from([RequestPhase::Successful])),
            ..MockClient::default()
        };

        reconciler(&client)
            .reconcile(&snapshot(web(1, "1")), &snapshot(web(3, "1")), TIMEOUT)
            .await
            .unwrap();

        let posted = client.posted_actions();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].action_id, "act-out");
        assert_eq!(posted[0].resource_id, "dep-1");
        assert_eq!(posted[0].template.data["web"]["data"]["_cluster"], json!(3));
    }

    #[tokio::test]
    async fn shrink_selects_scale_in() {
        let client = MockClient {
            actions: HashMap::from([deployment_actions()]),
            templates: scale_templates(),
            phases: Mutex::new(VecDeque::from([RequestPhase::Successful])),
            ..MockClient::default()
        };

        reconciler(&client)
            .reconcile(&snapshot(web(3, "1")), &snapshot(web(2, "1")), TIMEOUT)
            .await
            .unwrap();

        let posted = client.posted_actions();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].action_id, "act-in");
        assert_eq!(posted[0].template.data["web"]["data"]["_cluster"], json!(2));
    }

    #[tokio::test]
    async fn unavailable_scale_action_is_skipped() {
        // deployment offers no actions at all
        let client = MockClient::default();
        reconciler(&client)
            .reconcile(&snapshot(web(1, "1")), &snapshot(web(2, "1")), TIMEOUT)
            .await
            .unwrap();
        assert!(client.posted_actions().is_empty());
        assert_eq!(client.status_call_count(), 0);
    }

    #[tokio::test]
    async fn component_absent_from_old_snapshot_is_ignored() {
        let client = MockClient::default();
        reconciler(&client)
            .reconcile(
                &DeploymentModel::default(),
                &snapshot(web(2, "1")),
                TIMEOUT,
            )
            .await
            .unwrap();
        assert!(client.posted_actions().is_empty());
    }

    #[tokio::test]
    async fn reconfigure_sends_only_changed_keys_per_instance() {
        let old_config = ResourceConfiguration::new("web")
            .with_cluster(2)
            .with_configuration_entry("cpu", "1")
            .with_configuration_entry("memory", "512")
            .with_instance(Instance::new("res-1"))
            .with_instance(Instance::new("res-2"));
        let new_config = ResourceConfiguration::new("web")
            .with_cluster(2)
            .with_configuration_entry("cpu", "2")
            .with_configuration_entry("memory", "512");

        let reconfigure_ops = vec![MockClient::operation(ACTION_RECONFIGURE, "act-rec")];
        let client = MockClient {
            actions: HashMap::from([
                ("res-1".to_string(), reconfigure_ops.clone()),
                ("res-2".to_string(), reconfigure_ops),
            ]),
            templates: HashMap::from([(
                "act-rec".to_string(),
                MockClient::template(json!({"data": {"cpu": 1, "memory": 512}})),
            )]),
            phases: Mutex::new(VecDeque::from([
                RequestPhase::Successful,
                RequestPhase::Successful,
            ])),
            ..MockClient::default()
        };

        reconciler(&client)
            .reconcile(&snapshot(old_config), &snapshot(new_config), TIMEOUT)
            .await
            .unwrap();

        let posted = client.posted_actions();
        assert_eq!(posted.len(), 2);
        assert_eq!(posted[0].resource_id, "res-1");
        assert_eq!(posted[1].resource_id, "res-2");
        for action in &posted {
            assert_eq!(action.template.data["data"]["cpu"], json!(2));
            // untouched keys keep the template's value
            assert_eq!(action.template.data["data"]["memory"], json!(512));
        }
    }

    #[tokio::test]
    async fn lease_precedes_scale_precedes_reconfigure() {
        let old_config = web(1, "1");
        let new_config = ResourceConfiguration::new("web")
            .with_cluster(2)
            .with_configuration_entry("cpu", "2");

        let client = MockClient {
            actions: HashMap::from([
                deployment_actions(),
                (
                    "res-1".to_string(),
                    vec![MockClient::operation(ACTION_RECONFIGURE, "act-rec")],
                ),
            ]),
            templates: {
                let mut templates = scale_templates();
                templates.insert(
                    "act-lease".to_string(),
                    MockClient::template(json!({"data": {"provider-ExpirationDate": "old"}})),
                );
                templates.insert(
                    "act-rec".to_string(),
                    MockClient::template(json!({"data": {"cpu": 1}})),
                );
                templates
            },
            phases: Mutex::new(VecDeque::from([
                RequestPhase::Successful,
                RequestPhase::Successful,
                RequestPhase::Successful,
            ])),
            ..MockClient::default()
        };

        let old = snapshot(old_config).with_lease_days(5);
        let new = snapshot(new_config).with_lease_days(15);
        reconciler(&client).reconcile(&old, &new, TIMEOUT).await.unwrap();

        let posted = client.posted_actions();
        let order: Vec<&str> = posted.iter().map(|p| p.action_id.as_str()).collect();
        assert_eq!(order, vec!["act-lease", "act-out", "act-rec"]);

        let expires = posted[0].template.data["data"]["provider-ExpirationDate"]
            .as_str()
            .unwrap();
        assert_ne!(expires, "old");
        assert!(expires.ends_with('Z'));
    }

    #[tokio::test]
    async fn invalid_component_aborts_before_any_mutation() {
        let client = MockClient {
            catalog_templates: HashMap::from([(
                "cat-1".to_string(),
                crate::api::CatalogItemRequestTemplate {
                    template_type: None,
                    catalog_item_id: Some("cat-1".to_string()),
                    requested_for: None,
                    business_group_id: None,
                    description: None,
                    reasons: None,
                    data: match json!({"db": {"data": {}}}) {
                        serde_json::Value::Object(map) => map,
                        _ => unreachable!(),
                    },
                },
            )]),
            ..MockClient::default()
        };

        let err = Reconciler::new(&client, "dep-1")
            .with_catalog_item("cat-1")
            .with_poll_interval(Duration::from_millis(1))
            .reconcile(&snapshot(web(1, "1")), &snapshot(web(2, "1")), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidComponents { .. }));
        assert!(client.posted_actions().is_empty());
    }

    #[tokio::test]
    async fn terminal_failure_aborts_remaining_actions() {
        let old = DeploymentModel::default()
            .with_component(web(1, "1"))
            .with_component(
                ResourceConfiguration::new("db")
                    .with_cluster(1)
                    .with_instance(Instance::new("res-9")),
            );
        let new = DeploymentModel::default()
            .with_component(web(2, "1"))
            .with_component(ResourceConfiguration::new("db").with_cluster(2));

        let client = MockClient {
            actions: HashMap::from([deployment_actions()]),
            templates: {
                let mut templates = scale_templates();
                templates.insert(
                    "act-out".to_string(),
                    MockClient::template(json!({
                        "web": {"data": {"_cluster": 1}},
                        "db": {"data": {"_cluster": 1}}
                    })),
                );
                templates
            },
            phases: Mutex::new(VecDeque::from([RequestPhase::Failed])),
            ..MockClient::default()
        };

        let err = reconciler(&client)
            .reconcile(&old, &new, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestFailed { .. }));
        // the second scale action was never submitted
        assert_eq!(client.posted_actions().len(), 1);
    }

    #[tokio::test]
    async fn identical_snapshots_are_a_no_op() {
        let client = MockClient::default();
        let snapshot = snapshot(web(2, "1")).with_lease_days(5);
        reconciler(&client)
            .reconcile(&snapshot, &snapshot.clone(), TIMEOUT)
            .await
            .unwrap();
        assert!(client.posted_actions().is_empty());
        assert_eq!(client.status_call_count(), 0);
    }

    #[test]
    fn expiration_text_matches_service_format() {
        let text = lease_expiration_text(10);
        // e.g. 2020-04-16T00:15:44.700Z
        assert!(chrono::DateTime::parse_from_rfc3339(&text).is_ok());
        assert!(text.ends_with('Z'));
        assert_eq!(text.len(), "2020-04-16T00:15:44.700Z".len());
    }
}
