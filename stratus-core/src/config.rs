//! Resource configuration model
//!
//! The in-memory snapshot of a deployment: its components, their provisioned
//! instances, and flattened configuration values. Snapshots are built from
//! either resource view pages or a resolved deployment detail payload; the
//! two read paths produce equivalent models. The reconciler diffs two
//! independently built snapshots by value.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::api::{DEPLOYMENT_RESOURCE_TYPE, Deployment, INFRASTRUCTURE_VIRTUAL};
use crate::flatten::flatten_resource_data;

/// One provisioned virtual resource under a component
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// Identifier assigned by the service; primary key for per-instance
    /// day-2 actions
    pub resource_id: String,
    pub name: Option<String>,
    /// Flattened raw resource attributes (IP address, status, nested data)
    pub properties: HashMap<String, String>,
}

impl Instance {
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            name: None,
            properties: HashMap::new(),
        }
    }
}

/// Configuration of one named component of the deployment blueprint
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceConfiguration {
    /// Join key between desired and observed state; unique within a snapshot
    pub component_name: String,
    /// Desired/observed instance count; 0 means the count is not managed
    pub cluster: u32,
    /// Flattened user-tunable properties (cpu, memory, custom properties)
    pub configuration: HashMap<String, String>,
    pub parent_resource_id: Option<String>,
    pub request_id: Option<String>,
    pub request_state: Option<String>,
    pub instances: Vec<Instance>,
}

impl ResourceConfiguration {
    pub fn new(component_name: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            cluster: 0,
            configuration: HashMap::new(),
            parent_resource_id: None,
            request_id: None,
            request_state: None,
            instances: Vec::new(),
        }
    }

    pub fn with_cluster(mut self, cluster: u32) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn with_configuration_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }

    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }
}

/// Find a component configuration by name. Returns the position alongside the
/// entry; `None` when the snapshot has no component of that name.
pub fn configuration_by_component<'a>(
    configurations: &'a [ResourceConfiguration],
    component_name: &str,
) -> Option<(usize, &'a ResourceConfiguration)> {
    configurations
        .iter()
        .enumerate()
        .find(|(_, config)| config.component_name == component_name)
}

/// Snapshot of a deployment's observed (or desired) state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentModel {
    pub deployment_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub catalog_item_id: Option<String>,
    pub catalog_item_name: Option<String>,
    pub businessgroup_id: Option<String>,
    pub tenant_id: Option<String>,
    pub owners: Vec<String>,
    pub date_created: Option<String>,
    pub last_updated: Option<String>,
    pub lease_start: Option<String>,
    pub lease_end: Option<String>,
    /// Whole days remaining on the lease, derived from the lease end;
    /// `None` when the lease never expires
    pub lease_days: Option<i64>,
    pub components: Vec<ResourceConfiguration>,
}

impl DeploymentModel {
    pub fn with_lease_days(mut self, days: i64) -> Self {
        self.lease_days = Some(days);
        self
    }

    pub fn with_component(mut self, component: ResourceConfiguration) -> Self {
        self.components.push(component);
        self
    }

    /// Build a model from the rows of a request resource view.
    ///
    /// Machine rows are grouped by component name in one pass; the cluster
    /// size of a component is the number of rows observed for it, since the
    /// resource view does not report it directly. The deployment row
    /// contributes the deployment-level fields.
    pub fn from_resource_view(content: &[Value]) -> Self {
        let mut model = Self::default();
        let mut index: HashMap<String, usize> = HashMap::new();

        for row in content {
            let Some(row) = row.as_object() else { continue };
            match row.get("resourceType").and_then(Value::as_str) {
                Some(INFRASTRUCTURE_VIRTUAL) => model.add_machine_row(row, &mut index),
                Some(DEPLOYMENT_RESOURCE_TYPE) => model.read_deployment_row(row),
                _ => {}
            }
        }
        model
    }

    /// Build a model from a resolved deployment detail payload. Produces the
    /// same shape as [`from_resource_view`](Self::from_resource_view).
    pub fn from_deployment(deployment: &Deployment) -> Self {
        let mut model = Self {
            deployment_id: Some(deployment.id.clone()),
            name: deployment.name.clone(),
            description: deployment.description.clone(),
            status: deployment.status.clone(),
            ..Self::default()
        };
        if let Some(lease) = &deployment.lease {
            model.lease_start = lease.start.clone();
            model.lease_end = lease.end.clone();
            model.lease_days = lease.end.as_deref().and_then(lease_days_remaining);
        }

        let mut index: HashMap<String, usize> = HashMap::new();
        for component in &deployment.components {
            let Some(name) = component.data.get("Component").and_then(Value::as_str) else {
                continue;
            };
            let properties = flatten_resource_data(&component.data);
            let mut instance = Instance::new(component.id.clone().unwrap_or_default());
            instance.name = component.name.clone();
            instance.properties = properties.clone();
            model.push_instance(&mut index, name, properties, instance, None);
        }
        model
    }

    fn add_machine_row(&mut self, row: &Map<String, Value>, index: &mut HashMap<String, usize>) {
        let Some(data) = row.get("data").and_then(Value::as_object) else {
            return;
        };
        let Some(component_name) = data.get("Component").and_then(Value::as_str) else {
            return;
        };

        let properties = flatten_resource_data(data);
        let mut instance = Instance::new(str_field(row, "resourceId").unwrap_or_default());
        instance.name = str_field(row, "name");
        instance.properties = properties.clone();

        let provenance = Some(Provenance {
            parent_resource_id: str_field(row, "parentResourceId"),
            request_id: str_field(row, "requestId"),
            request_state: str_field(row, "requestState"),
        });
        self.push_instance(index, component_name, properties, instance, provenance);
    }

    fn push_instance(
        &mut self,
        index: &mut HashMap<String, usize>,
        component_name: &str,
        properties: HashMap<String, String>,
        instance: Instance,
        provenance: Option<Provenance>,
    ) {
        let position = *index.entry(component_name.to_string()).or_insert_with(|| {
            let mut config = ResourceConfiguration::new(component_name);
            config.configuration = properties;
            if let Some(provenance) = provenance {
                config.parent_resource_id = provenance.parent_resource_id;
                config.request_id = provenance.request_id;
                config.request_state = provenance.request_state;
            }
            self.components.push(config);
            self.components.len() - 1
        });
        let config = &mut self.components[position];
        config.cluster += 1;
        config.instances.push(instance);
    }

    fn read_deployment_row(&mut self, row: &Map<String, Value>) {
        self.deployment_id = str_field(row, "resourceId");
        self.name = str_field(row, "name");
        self.description = str_field(row, "description");
        self.status = str_field(row, "status");
        self.catalog_item_id = str_field(row, "catalogItemId");
        self.catalog_item_name = str_field(row, "catalogItemLabel");
        self.businessgroup_id = str_field(row, "businessGroupId");
        self.tenant_id = str_field(row, "tenantId");
        self.date_created = str_field(row, "dateCreated");
        self.last_updated = str_field(row, "lastUpdated");
        if let Some(owners) = row.get("owners").and_then(Value::as_array) {
            self.owners = owners
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        if let Some(lease) = row.get("lease").and_then(Value::as_object) {
            self.lease_start = str_field(lease, "start");
            // a lease that never expires has no end date
            self.lease_end = str_field(lease, "end");
            self.lease_days = self.lease_end.as_deref().and_then(lease_days_remaining);
        }
    }
}

struct Provenance {
    parent_resource_id: Option<String>,
    request_id: Option<String>,
    request_state: Option<String>,
}

fn str_field(row: &Map<String, Value>, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Whole days between now and the lease end. The views report the end date
/// but not the day count, so it is derived.
pub fn lease_days_remaining(lease_end: &str) -> Option<i64> {
    let end = DateTime::parse_from_rfc3339(lease_end).ok()?;
    let remaining = end.with_timezone(&Utc) - Utc::now();
    Some(remaining.num_hours() / 24)
}
