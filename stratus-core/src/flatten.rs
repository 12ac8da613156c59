//! JSON tree normalizer
//!
//! The provisioning service reports resource properties as arbitrarily nested
//! JSON. The engine works on flat string maps instead: nested keys are joined
//! with `.`, array elements are indexed by position, and scalars are rendered
//! in canonical text form. Flattening is one-directional; templates posted
//! back to the service are mutated as JSON trees, never rebuilt from flat
//! maps.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Mapping of property names from resource view payloads to the names the
/// catalog request template APIs use. Applied only at the top level of each
/// payload being flattened.
pub fn resource_mapper() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("MachineName", "name"),
        ("MachineDescription", "description"),
        ("MachineMemory", "memory"),
        ("MachineStorage", "storage"),
        ("MachineCPU", "cpu"),
        ("MachineStatus", "status"),
        ("MachineType", "type"),
    ])
}

/// Flatten a raw resource payload into a dotted-key string map.
///
/// Malformed or unexpected shapes never fail; the offending element is
/// skipped and the rest of the payload is still flattened.
pub fn flatten_resource_data(data: &Map<String, Value>) -> HashMap<String, String> {
    let mapper = resource_mapper();
    let mut flat = HashMap::new();
    for (key, value) in data {
        let key = mapper.get(key.as_str()).copied().unwrap_or(key.as_str());
        match value {
            Value::Object(nested) => flatten_map(key, &mut flat, nested),
            Value::Array(items) => flatten_array(key, &mut flat, items),
            scalar => {
                flat.insert(key.to_string(), scalar_to_string(scalar));
            }
        }
    }
    flat
}

fn flatten_map(prefix: &str, flat: &mut HashMap<String, String>, data: &Map<String, Value>) {
    for (key, value) in data {
        let path = format!("{prefix}.{key}");
        match value {
            Value::Object(nested) => flatten_map(&path, flat, nested),
            Value::Array(items) => flatten_array(&path, flat, items),
            scalar => {
                flat.insert(path, scalar_to_string(scalar));
            }
        }
    }
}

fn flatten_array(prefix: &str, flat: &mut HashMap<String, String>, items: &[Value]) {
    for (index, item) in items.iter().enumerate() {
        let path = format!("{prefix}.{index}");
        match item {
            // Array elements that are objects follow the service's metadata
            // wrapping convention: only the nested "data" map is of interest,
            // sibling keys (componentTypeId, classId, ...) are dropped.
            // An element without a "data" map is skipped entirely.
            Value::Object(wrapper) => {
                if let Some(Value::Object(data)) = wrapper.get("data") {
                    flatten_map(&path, flat, data);
                }
            }
            Value::Array(nested) => flatten_array(&path, flat, nested),
            scalar => {
                flat.insert(path, scalar_to_string(scalar));
            }
        }
    }
}

/// Render a scalar JSON value in the canonical text form the configuration
/// model uses. Floats are rendered with zero decimal digits; the service only
/// uses them for counts and sizes.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                format!("{:.0}", n.as_f64().unwrap_or(0.0))
            }
        }
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}
