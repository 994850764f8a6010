//! CS-008: IAM roles, managed policies, attachments, and instance profiles.
//!
//! Policy documents are declared as YAML mappings and handed to the engine
//! as compact JSON strings.

use super::{Properties, RenderCtx};
use crate::core::types::CloudResource;
use serde_json::Value;

/// Serialize a YAML policy document as a JSON string.
pub fn policy_json(owner: &str, field: &str, doc: &Option<serde_yaml_ng::Value>) -> Result<Value, String> {
    let doc = doc
        .as_ref()
        .ok_or_else(|| format!("resource '{}' has no {}", owner, field))?;
    if !doc.is_mapping() {
        return Err(format!("resource '{}' {} must be a mapping", owner, field));
    }
    serde_json::to_string(doc)
        .map(Value::String)
        .map_err(|e| format!("resource '{}' {} is not JSON-representable: {}", owner, field, e))
}

fn insert_path(props: &mut Properties, resource: &CloudResource) {
    if let Some(ref path) = resource.path {
        props.insert("path".to_string(), Value::String(path.clone()));
    }
}

pub fn role_properties(id: &str, resource: &CloudResource) -> Result<Properties, String> {
    let mut props = Properties::new();
    props.insert(
        "assumeRolePolicy".to_string(),
        policy_json(id, "assume_role_policy", &resource.assume_role_policy)?,
    );
    insert_path(&mut props, resource);
    Ok(props)
}

pub fn policy_properties(id: &str, resource: &CloudResource) -> Result<Properties, String> {
    let mut props = Properties::new();
    insert_path(&mut props, resource);
    if let Some(ref description) = resource.description {
        props.insert("description".to_string(), Value::String(description.clone()));
    }
    props.insert("policy".to_string(), policy_json(id, "document", &resource.document)?);
    Ok(props)
}

pub fn attachment_properties(
    id: &str,
    resource: &CloudResource,
    ctx: &RenderCtx,
) -> Result<Properties, String> {
    if resource.roles.is_empty() {
        return Err(format!("resource '{}' has no roles", id));
    }
    let policy = resource
        .policy
        .as_deref()
        .ok_or_else(|| format!("resource '{}' has no policy", id))?;

    let roles = resource
        .roles
        .iter()
        .map(|r| ctx.reference(r, "name").map(Value::String))
        .collect::<Result<Vec<_>, _>>()?;

    let mut props = Properties::new();
    props.insert("roles".to_string(), Value::Array(roles));
    props.insert("policyArn".to_string(), Value::String(ctx.reference(policy, "arn")?));
    Ok(props)
}

pub fn profile_properties(
    id: &str,
    resource: &CloudResource,
    ctx: &RenderCtx,
) -> Result<Properties, String> {
    let role = resource
        .role
        .as_deref()
        .ok_or_else(|| format!("resource '{}' has no role", id))?;
    let mut props = Properties::new();
    props.insert("role".to_string(), Value::String(ctx.reference(role, "name")?));
    insert_path(&mut props, resource);
    Ok(props)
}
