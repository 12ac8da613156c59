//! Day-2 action resolution
//!
//! The service exposes post-creation operations as (name, id) pairs whose
//! availability depends on the current state of the resource. The engine
//! looks actions up by their well-known names; an absent name means the
//! action is not currently available, which is never an error by itself.

use std::collections::HashMap;

use crate::api::{Operation, ProvisioningClient};
use crate::error::Result;

pub const ACTION_SCALE_OUT: &str = "Scale Out";
pub const ACTION_SCALE_IN: &str = "Scale In";
pub const ACTION_RECONFIGURE: &str = "Reconfigure";
pub const ACTION_DESTROY: &str = "Destroy";
pub const ACTION_CHANGE_LEASE: &str = "Change Lease";

/// Name → id lookup over the actions currently permitted on one resource
#[derive(Debug, Clone, Default)]
pub struct ActionMap {
    actions: HashMap<String, String>,
}

impl ActionMap {
    pub fn from_operations(operations: &[Operation]) -> Self {
        let actions = operations
            .iter()
            .map(|op| (op.name.clone(), op.id.clone()))
            .collect();
        Self { actions }
    }

    /// The action id for `name`, or `None` when the service does not
    /// currently permit that action on the resource
    pub fn id(&self, name: &str) -> Option<&str> {
        self.actions.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Fetch the permitted actions for a resource and index them by name
pub async fn resolve_actions(
    client: &dyn ProvisioningClient,
    resource_id: &str,
) -> Result<ActionMap> {
    let operations = client.resource_actions(resource_id).await?;
    Ok(ActionMap::from_operations(&operations))
}
