//! CS-003: Template resolution, parameter overrides, and dependency DAG.
//!
//! Resolves `{{params.key}}`, `{{stack.name}}` and `{{stack.region}}`
//! templates. Builds a DAG from reference fields plus explicit `depends_on`
//! edges and computes creation order using Kahn's algorithm with
//! deterministic (alphabetical) tie-breaking.

use super::types::*;
use crate::cloud;
use std::collections::{HashMap, HashSet, VecDeque};

/// Values a template may reference.
#[derive(Debug, Clone, Copy)]
pub struct TemplateScope<'a> {
    pub params: &'a HashMap<String, serde_yaml_ng::Value>,
    pub stack_name: &'a str,
    pub region: &'a str,
}

impl<'a> TemplateScope<'a> {
    pub fn from_config(config: &'a StackConfig) -> Self {
        Self {
            params: &config.params,
            stack_name: &config.name,
            region: &config.region,
        }
    }
}

/// Resolve all template variables in a string.
pub fn resolve_template(template: &str, scope: &TemplateScope) -> Result<String, String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or_else(|| format!("unclosed template at position {}", open))?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim();

        let value = if let Some(param_key) = key.strip_prefix("params.") {
            scope
                .params
                .get(param_key)
                .map(yaml_value_to_string)
                .ok_or_else(|| format!("unknown param: {}", param_key))?
        } else {
            match key {
                "stack.name" => scope.stack_name.to_string(),
                "stack.region" => scope.region.to_string(),
                _ => return Err(format!("unknown template variable: {}", key)),
            }
        };

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

fn resolve_opt(field: &mut Option<String>, scope: &TemplateScope) -> Result<(), String> {
    if let Some(ref s) = field {
        *field = Some(resolve_template(s, scope)?);
    }
    Ok(())
}

fn resolve_rules(rules: &mut [SecurityRule], scope: &TemplateScope) -> Result<(), String> {
    for rule in rules {
        for cidr in &mut rule.cidr_blocks {
            *cidr = resolve_template(cidr, scope)?;
        }
    }
    Ok(())
}

/// Resolve all templates in a resource's string fields.
///
/// Reference fields name other resources and are left untouched.
pub fn resolve_resource_templates(
    resource: &CloudResource,
    scope: &TemplateScope,
) -> Result<CloudResource, String> {
    let mut resolved = resource.clone();

    resolve_opt(&mut resolved.cidr_block, scope)?;
    resolve_opt(&mut resolved.availability_zone, scope)?;
    resolve_opt(&mut resolved.destination_cidr_block, scope)?;
    resolve_opt(&mut resolved.description, scope)?;
    resolve_opt(&mut resolved.path, scope)?;
    resolve_opt(&mut resolved.ami, scope)?;
    resolve_opt(&mut resolved.instance_type, scope)?;
    resolve_opt(&mut resolved.key_name, scope)?;

    for value in resolved.tags.values_mut() {
        *value = resolve_template(value, scope)?;
    }
    resolve_rules(&mut resolved.ingress, scope)?;
    resolve_rules(&mut resolved.egress, scope)?;

    for volume in &mut resolved.ebs_volumes {
        if let serde_yaml_ng::Value::String(ref s) = volume.size_gb {
            volume.size_gb = serde_yaml_ng::Value::String(resolve_template(s, scope)?);
        }
    }

    Ok(resolved)
}

/// Apply `KEY=VALUE` overrides to stack params.
///
/// Values are read as YAML scalars, so `8` becomes a number and `true` a bool.
pub fn apply_overrides(
    params: &mut HashMap<String, serde_yaml_ng::Value>,
    overrides: &[String],
) -> Result<(), String> {
    for item in overrides {
        let (key, raw) = item
            .split_once('=')
            .ok_or_else(|| format!("override '{}' is not KEY=VALUE", item))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("override '{}' has an empty key", item));
        }
        let value = match serde_yaml_ng::from_str::<serde_yaml_ng::Value>(raw) {
            Ok(v @ (serde_yaml_ng::Value::Number(_) | serde_yaml_ng::Value::Bool(_))) => v,
            _ => serde_yaml_ng::Value::String(raw.to_string()),
        };
        params.insert(key.to_string(), value);
    }
    Ok(())
}

/// Direct dependencies of a resource: reference targets, then `depends_on`,
/// without duplicates.
pub fn dependencies_of(resource: &CloudResource) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();
    let referenced = cloud::references(resource).into_iter().map(|r| r.target);
    for dep in referenced.chain(resource.depends_on.iter().map(String::as_str)) {
        if !deps.iter().any(|d| d == dep) {
            deps.push(dep.to_string());
        }
    }
    deps
}

/// Build the creation order of resources.
/// Uses Kahn's algorithm with alphabetical tie-breaking for determinism.
pub fn build_creation_order(config: &StackConfig) -> Result<Vec<String>, String> {
    let resource_ids: Vec<String> = config.resources.keys().cloned().collect();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for id in &resource_ids {
        in_degree.insert(id, 0);
        adjacency.insert(id, Vec::new());
    }

    for (id, resource) in &config.resources {
        for dep in dependencies_of(resource) {
            let Some((dep_key, _)) = config.resources.get_key_value(dep.as_str()) else {
                return Err(format!("resource '{}' depends on unknown '{}'", id, dep));
            };
            if let Some(edges) = adjacency.get_mut(dep_key.as_str()) {
                edges.push(id.as_str());
            }
            if let Some(degree) = in_degree.get_mut(id.as_str()) {
                *degree += 1;
            }
        }
    }

    let mut zero_degree: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| *id)
        .collect();
    zero_degree.sort_unstable();
    let mut queue: VecDeque<&str> = zero_degree.into_iter().collect();

    let mut order = Vec::new();
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());

        let mut next_ready: Vec<&str> = Vec::new();
        if let Some(neighbors) = adjacency.get(current) {
            for neighbor in neighbors {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        next_ready.push(*neighbor);
                    }
                }
            }
        }
        next_ready.sort_unstable();
        queue.extend(next_ready);
    }

    if order.len() != resource_ids.len() {
        let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
        let mut cycle_members: Vec<&str> = resource_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !ordered.contains(id))
            .collect();
        cycle_members.sort_unstable();
        return Err(format!(
            "dependency cycle detected involving: {}",
            cycle_members.join(", ")
        ));
    }

    Ok(order)
}
