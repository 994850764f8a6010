//! CS-002: YAML parsing and validation.
//!
//! Parses cloudstrap.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Resource ids and logical names are well formed and unique
//! - References exist and point at the right resource type
//! - Required fields per resource type
//! - CIDR blocks parse, subnets sit inside their VPC and do not overlap
//! - Bootstraps are renderable and target an attached volume
//! - Outputs name an existing resource and an exported attribute

use super::bootstrap;
use super::resolver::{self, TemplateScope};
use super::types::*;
use crate::cloud::{self, compute, network::Cidr, security};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a cloudstrap.yaml file from disk.
pub fn parse_stack_file(path: &Path) -> Result<StackConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_stack(&content)
}

/// Parse a cloudstrap.yaml from a string.
pub fn parse_stack(yaml: &str) -> Result<StackConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

struct Patterns {
    id: Regex,
    logical: Regex,
}

impl Patterns {
    fn new() -> Result<Self, String> {
        Ok(Self {
            id: Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").map_err(|e| e.to_string())?,
            logical: Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").map_err(|e| e.to_string())?,
        })
    }
}

struct Errors(Vec<ValidationError>);

impl Errors {
    fn push(&mut self, message: String) {
        self.0.push(ValidationError { message });
    }
}

/// Validate a parsed stack. Returns a list of errors (empty = valid).
pub fn validate_stack(config: &StackConfig) -> Vec<ValidationError> {
    let mut errors = Errors(Vec::new());

    if config.version != "1.0" {
        errors.push(format!("version must be \"1.0\", got \"{}\"", config.version));
    }
    if config.name.is_empty() {
        errors.push("name must not be empty".to_string());
    }

    let patterns = match Patterns::new() {
        Ok(p) => p,
        Err(e) => {
            errors.push(format!("internal pattern error: {}", e));
            return errors.0;
        }
    };

    let scope = TemplateScope::from_config(config);
    let mut resolved: HashMap<&str, CloudResource> = HashMap::new();
    for (id, resource) in &config.resources {
        match resolver::resolve_resource_templates(resource, &scope) {
            Ok(r) => {
                resolved.insert(id.as_str(), r);
            }
            Err(e) => errors.push(format!("resource '{}': {}", id, e)),
        }
    }

    check_names(config, &patterns, &mut errors);

    for (id, resource) in &config.resources {
        check_references(config, id, resource, &mut errors);
        check_required(id, resource, &mut errors);
        if let Some(r) = resolved.get(id.as_str()) {
            check_values(id, r, &resolved, &mut errors);
        }
        check_bootstrap(id, resource, &mut errors);
    }

    check_subnet_overlap(config, &resolved, &mut errors);
    check_outputs(config, &mut errors);

    if let Err(e) = resolver::build_creation_order(config) {
        if e.contains("cycle") {
            errors.push(e);
        }
    }

    errors.0
}

fn check_names(config: &StackConfig, patterns: &Patterns, errors: &mut Errors) {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for (id, resource) in &config.resources {
        if !patterns.id.is_match(id) {
            errors.push(format!(
                "resource id '{}' must start with a letter or digit and contain only letters, digits, '-' or '_'",
                id
            ));
        }
        let logical = cloud::logical_name(id, resource);
        if !patterns.logical.is_match(&logical) {
            errors.push(format!(
                "resource '{}' has invalid logical name '{}'",
                id, logical
            ));
        }
        if let Some(other) = seen.insert(logical.clone(), id) {
            errors.push(format!(
                "resources '{}' and '{}' share logical name '{}'",
                other, id, logical
            ));
        }
    }
}

fn check_references(config: &StackConfig, id: &str, resource: &CloudResource, errors: &mut Errors) {
    for reference in cloud::references(resource) {
        if reference.target == id {
            errors.push(format!("resource '{}' {} references itself", id, reference.field));
            continue;
        }
        match config.resources.get(reference.target) {
            None => errors.push(format!(
                "resource '{}' {} references unknown resource '{}'",
                id, reference.field, reference.target
            )),
            Some(target) if target.resource_type != reference.expected => errors.push(format!(
                "resource '{}' {} must reference a {}, '{}' is a {}",
                id, reference.field, reference.expected, reference.target, target.resource_type
            )),
            Some(_) => {}
        }
    }

    for dep in &resource.depends_on {
        if dep == id {
            errors.push(format!("resource '{}' depends on itself", id));
        } else if !config.resources.contains_key(dep) {
            errors.push(format!(
                "resource '{}' depends on unknown resource '{}'",
                id, dep
            ));
        }
    }
}

fn required_fields(resource: &CloudResource) -> Vec<(&'static str, bool)> {
    let r = resource;
    match r.resource_type {
        CloudType::Vpc => vec![("cidr_block", r.cidr_block.is_some())],
        CloudType::Subnet => vec![
            ("vpc", r.vpc.is_some()),
            ("cidr_block", r.cidr_block.is_some()),
        ],
        CloudType::RouteTable | CloudType::InternetGateway | CloudType::SecurityGroup => {
            vec![("vpc", r.vpc.is_some())]
        }
        CloudType::Route => vec![
            ("route_table", r.route_table.is_some()),
            ("gateway", r.gateway.is_some()),
            ("destination_cidr_block", r.destination_cidr_block.is_some()),
        ],
        CloudType::RouteTableAssociation => vec![
            ("subnet", r.subnet.is_some()),
            ("route_table", r.route_table.is_some()),
        ],
        CloudType::IamRole => vec![("assume_role_policy", r.assume_role_policy.is_some())],
        CloudType::IamPolicy => vec![("document", r.document.is_some())],
        CloudType::IamPolicyAttachment => vec![
            ("roles", !r.roles.is_empty()),
            ("policy", r.policy.is_some()),
        ],
        CloudType::InstanceProfile => vec![("role", r.role.is_some())],
        CloudType::Instance => vec![
            ("ami", r.ami.is_some()),
            ("instance_type", r.instance_type.is_some()),
        ],
        CloudType::Bucket => vec![],
    }
}

fn check_required(id: &str, resource: &CloudResource, errors: &mut Errors) {
    for (field, present) in required_fields(resource) {
        if !present {
            errors.push(format!(
                "resource '{}' ({}) has no {}",
                id, resource.resource_type, field
            ));
        }
    }
    for (field, doc) in [
        ("assume_role_policy", &resource.assume_role_policy),
        ("document", &resource.document),
    ] {
        if doc.as_ref().is_some_and(|d| !d.is_mapping()) {
            errors.push(format!("resource '{}' {} must be a mapping", id, field));
        }
    }
}

/// Checks on template-resolved values.
fn check_values(
    id: &str,
    resource: &CloudResource,
    resolved: &HashMap<&str, CloudResource>,
    errors: &mut Errors,
) {
    let parse = |field: &str, value: &str, errors: &mut Errors| -> Option<Cidr> {
        match Cidr::parse(value) {
            Ok(c) => Some(c),
            Err(e) => {
                errors.push(format!("resource '{}' {}: {}", id, field, e));
                None
            }
        }
    };

    if let Some(ref block) = resource.cidr_block {
        let own = parse("cidr_block", block, errors);
        if resource.resource_type == CloudType::Subnet {
            let parent = resource
                .vpc
                .as_deref()
                .and_then(|v| resolved.get(v))
                .and_then(|v| v.cidr_block.as_deref())
                .and_then(|c| Cidr::parse(c).ok());
            if let (Some(own), Some(parent)) = (own, parent) {
                if !parent.contains(&own) {
                    errors.push(format!(
                        "resource '{}' cidr_block {} is outside its VPC block {}",
                        id, own, parent
                    ));
                }
            }
        }
    }
    if let Some(ref dest) = resource.destination_cidr_block {
        parse("destination_cidr_block", dest, errors);
    }

    for (direction, rules) in [("ingress", &resource.ingress), ("egress", &resource.egress)] {
        for (i, rule) in rules.iter().enumerate() {
            for problem in security::rule_problems(rule) {
                errors.push(format!("resource '{}' {}[{}]: {}", id, direction, i, problem));
            }
            for block in &rule.cidr_blocks {
                parse(direction, block, errors);
            }
        }
    }

    for volume in &resource.ebs_volumes {
        if let Err(e) = compute::volume_size(id, volume) {
            errors.push(e);
        }
    }
}

/// `/dev/sdf` and `/dev/xvdf` name the same attachment point.
fn same_device(a: &str, b: &str) -> bool {
    let norm = |d: &str| -> String {
        match d.strip_prefix("/dev/sd") {
            Some(rest) => format!("/dev/xvd{}", rest),
            None => d.to_string(),
        }
    };
    norm(a) == norm(b)
}

fn check_bootstrap(id: &str, resource: &CloudResource, errors: &mut Errors) {
    let Some(ref spec) = resource.bootstrap else {
        return;
    };
    if resource.resource_type != CloudType::Instance {
        errors.push(format!(
            "resource '{}' ({}) cannot carry a bootstrap, only instances can",
            id, resource.resource_type
        ));
        return;
    }
    for problem in bootstrap::check_spec(spec) {
        errors.push(format!("resource '{}' bootstrap: {}", id, problem));
    }
    if !resource
        .ebs_volumes
        .iter()
        .any(|v| same_device(&v.device_name, &spec.device))
    {
        errors.push(format!(
            "resource '{}' bootstrap device {} is not among its ebs_volumes",
            id, spec.device
        ));
    }
}

fn check_subnet_overlap(
    config: &StackConfig,
    resolved: &HashMap<&str, CloudResource>,
    errors: &mut Errors,
) {
    let mut by_vpc: HashMap<&str, Vec<(&str, Cidr)>> = HashMap::new();
    for id in config.resources.keys() {
        let Some(r) = resolved.get(id.as_str()) else {
            continue;
        };
        if r.resource_type != CloudType::Subnet {
            continue;
        }
        let (Some(vpc), Some(block)) = (r.vpc.as_deref(), r.cidr_block.as_deref()) else {
            continue;
        };
        if let Ok(cidr) = Cidr::parse(block) {
            by_vpc.entry(vpc).or_default().push((id.as_str(), cidr));
        }
    }

    let mut vpcs: Vec<_> = by_vpc.into_iter().collect();
    vpcs.sort_by_key(|(vpc, _)| *vpc);
    for (vpc, subnets) in vpcs {
        for (i, (a, ca)) in subnets.iter().enumerate() {
            for (b, cb) in &subnets[i + 1..] {
                if ca.overlaps(cb) {
                    errors.push(format!(
                        "subnets '{}' ({}) and '{}' ({}) overlap in VPC '{}'",
                        a, ca, b, cb, vpc
                    ));
                }
            }
        }
    }
}

fn check_outputs(config: &StackConfig, errors: &mut Errors) {
    for (name, target) in &config.outputs {
        let Some((res, attr)) = target.split_once('.') else {
            errors.push(format!(
                "output '{}' must be 'resource.attribute', got '{}'",
                name, target
            ));
            continue;
        };
        match config.resources.get(res) {
            None => errors.push(format!(
                "output '{}' references unknown resource '{}'",
                name, res
            )),
            Some(r) if !r.resource_type.attributes().contains(&attr) => errors.push(format!(
                "output '{}': {} '{}' has no attribute '{}' (available: {})",
                name,
                r.resource_type,
                res,
                attr,
                r.resource_type.attributes().join(", ")
            )),
            Some(_) => {}
        }
    }
}
