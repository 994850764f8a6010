//! CS-007: Security group resources and rule checks.

use super::{Properties, RenderCtx};
use crate::core::types::{CloudResource, SecurityRule};
use serde_json::{json, Value};

const PROTOCOLS: &[&str] = &["tcp", "udp", "icmp", "-1"];

/// Problems with a single rule, empty when the rule is well formed.
pub fn rule_problems(rule: &SecurityRule) -> Vec<String> {
    let mut problems = Vec::new();
    if !PROTOCOLS.contains(&rule.protocol.as_str()) {
        problems.push(format!(
            "protocol '{}' is not one of {}",
            rule.protocol,
            PROTOCOLS.join(", ")
        ));
    }
    if rule.from_port > rule.to_port {
        problems.push(format!(
            "from_port {} is greater than to_port {}",
            rule.from_port, rule.to_port
        ));
    }
    if rule.protocol == "-1" && (rule.from_port != 0 || rule.to_port != 0) {
        problems.push("protocol -1 (all) requires ports 0..0".to_string());
    }
    if rule.cidr_blocks.is_empty() {
        problems.push("rule has no cidr_blocks".to_string());
    }
    problems
}

fn render_rules(rules: &[SecurityRule]) -> Value {
    Value::Array(
        rules
            .iter()
            .map(|r| {
                json!({
                    "fromPort": r.from_port,
                    "toPort": r.to_port,
                    "protocol": r.protocol,
                    "cidrBlocks": r.cidr_blocks,
                })
            })
            .collect(),
    )
}

pub fn group_properties(
    id: &str,
    resource: &CloudResource,
    ctx: &RenderCtx,
) -> Result<Properties, String> {
    let mut props = Properties::new();
    if let Some(ref description) = resource.description {
        props.insert("description".to_string(), Value::String(description.clone()));
    }
    props.insert("vpcId".to_string(), ctx.required_id(id, "vpc", &resource.vpc)?);
    if !resource.ingress.is_empty() {
        props.insert("ingress".to_string(), render_rules(&resource.ingress));
    }
    if !resource.egress.is_empty() {
        props.insert("egress".to_string(), render_rules(&resource.egress));
    }
    Ok(props)
}
