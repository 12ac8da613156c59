//! Action template mutation
//!
//! Templates fetched from the service are owned JSON trees mutated in place
//! before submission. Setting a field either replaces an existing key found
//! anywhere in the nested tree, or injects the key under the template's
//! nested `data` object.

use serde_json::{Map, Value};

/// Replace the value of `field` wherever it already exists in the template
/// tree. Object values are descended into; the first match wins. Returns
/// whether a replacement happened.
pub fn replace_template_value(data: &mut Map<String, Value>, field: &str, value: &Value) -> bool {
    for (key, entry) in data.iter_mut() {
        match entry {
            Value::Object(nested) => {
                if replace_template_value(nested, field, value) {
                    return true;
                }
            }
            _ => {
                if key == field {
                    *entry = value.clone();
                    return true;
                }
            }
        }
    }
    false
}

/// Set `field` in the template: replace it if it exists anywhere in the tree,
/// otherwise inject it under the nested `data` object (creating that object
/// if the template does not carry one).
pub fn set_template_value(data: &mut Map<String, Value>, field: &str, value: Value) {
    if replace_template_value(data, field, &value) {
        return;
    }
    match data.get_mut("data") {
        Some(Value::Object(nested)) => {
            nested.insert(field.to_string(), value);
        }
        _ => {
            let mut nested = Map::new();
            nested.insert(field.to_string(), value);
            data.insert("data".to_string(), Value::Object(nested));
        }
    }
}

/// The sub-map of an action template corresponding to one component of the
/// deployment blueprint. `None` when the template has no object under that
/// component name.
pub fn template_data_for_component<'a>(
    data: &'a mut Map<String, Value>,
    component_name: &str,
) -> Option<&'a mut Map<String, Value>> {
    match data.get_mut(component_name) {
        Some(Value::Object(component)) => Some(component),
        _ => None,
    }
}

/// Configuration values travel as strings. Values that parse as JSON (counts,
/// booleans, embedded objects) are submitted in their parsed form so the
/// service sees the type it handed out in the template.
pub fn coerce_config_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
