//! `${name}` substitution for operator-supplied command templates.

use std::collections::BTreeMap;

/// Build parameters handed over by the CI system for one run.
pub type BuildParameters = BTreeMap<String, String>;

/// Reserved parameter that always carries the configured node name.
pub const NODE_NAME_PARAM: &str = "node_name";

/// Expand `${name}` placeholders in `template`.
///
/// Every non-empty parameter is substituted literally. `${node_name}` is
/// replaced last with `node_name`, whether or not a parameter already did.
/// Placeholders with no matching parameter are left as they are.
pub fn expand(template: &str, params: &BuildParameters, node_name: &str) -> String {
    let mut resolved = template.to_string();

    for (key, value) in params {
        if value.is_empty() {
            continue;
        }
        let placeholder = placeholder(key);
        if resolved.contains(&placeholder) {
            resolved = resolved.replace(&placeholder, value);
        }
    }

    resolved.replace(&placeholder(NODE_NAME_PARAM), node_name)
}

/// Copy of `params` with `node_name` forced to the configured value.
pub fn with_node_name(params: &BuildParameters, node_name: &str) -> BuildParameters {
    let mut params = params.clone();
    params.insert(NODE_NAME_PARAM.to_string(), node_name.to_string());
    params
}

fn placeholder(key: &str) -> String {
    format!("${{{}}}", key)
}
