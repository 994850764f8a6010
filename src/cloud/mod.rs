//! Cloud resource renderers: map declared resources to engine properties.
//!
//! Each handler turns a template-resolved [`CloudResource`] into the property
//! map the provisioning engine expects. References to other resources render
//! as `${logicalName.attribute}` interpolations resolved by the engine.

pub mod compute;
pub mod iam;
pub mod network;
pub mod security;
pub mod storage;

use crate::core::types::{CloudResource, CloudType, StackConfig};
use serde_json::{Map, Value};

/// Property map of one engine resource.
pub type Properties = Map<String, Value>;

/// A reference from one resource field to another resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'a> {
    pub field: &'static str,
    pub target: &'a str,
    pub expected: CloudType,
}

fn push_ref<'a>(
    refs: &mut Vec<Reference<'a>>,
    field: &'static str,
    target: &'a Option<String>,
    expected: CloudType,
) {
    if let Some(t) = target.as_deref() {
        refs.push(Reference { field, target: t, expected });
    }
}

/// All references a resource makes, in field order.
pub fn references(resource: &CloudResource) -> Vec<Reference<'_>> {
    let mut refs = Vec::new();
    push_ref(&mut refs, "vpc", &resource.vpc, CloudType::Vpc);
    push_ref(&mut refs, "subnet", &resource.subnet, CloudType::Subnet);
    push_ref(&mut refs, "route_table", &resource.route_table, CloudType::RouteTable);
    push_ref(&mut refs, "gateway", &resource.gateway, CloudType::InternetGateway);
    push_ref(&mut refs, "policy", &resource.policy, CloudType::IamPolicy);
    push_ref(&mut refs, "role", &resource.role, CloudType::IamRole);
    push_ref(
        &mut refs,
        "instance_profile",
        &resource.instance_profile,
        CloudType::InstanceProfile,
    );

    for role in &resource.roles {
        refs.push(Reference {
            field: "roles",
            target: role,
            expected: CloudType::IamRole,
        });
    }
    for sg in &resource.security_groups {
        refs.push(Reference {
            field: "security_groups",
            target: sg,
            expected: CloudType::SecurityGroup,
        });
    }
    refs
}

/// Convert `snake_case` / `kebab-case` to `camelCase`.
pub fn camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, part) in s.split(|c: char| c == '-' || c == '_').filter(|p| !p.is_empty()).enumerate() {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                out.extend(first.to_lowercase());
            } else {
                out.extend(first.to_uppercase());
            }
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Engine logical name of a resource.
pub fn logical_name(id: &str, resource: &CloudResource) -> String {
    resource.name.clone().unwrap_or_else(|| camel_case(id))
}

/// Lookup context shared by the renderers.
pub struct RenderCtx<'a> {
    config: &'a StackConfig,
}

impl<'a> RenderCtx<'a> {
    pub fn new(config: &'a StackConfig) -> Self {
        Self { config }
    }

    /// Logical name of a declared resource.
    pub fn name_of(&self, id: &str) -> Result<String, String> {
        self.config
            .resources
            .get(id)
            .map(|r| logical_name(id, r))
            .ok_or_else(|| format!("unknown resource '{}'", id))
    }

    /// Interpolation of `attr` on resource `id`, e.g. `${myVpc.id}`.
    pub fn reference(&self, id: &str, attr: &str) -> Result<String, String> {
        Ok(format!("${{{}.{}}}", self.name_of(id)?, camel_case(attr)))
    }

    /// Interpolation of a whole resource, e.g. `${myVpc}`.
    pub fn resource_ref(&self, id: &str) -> Result<String, String> {
        Ok(format!("${{{}}}", self.name_of(id)?))
    }

    /// Required reference field rendered as `${name.id}`.
    pub fn required_id(
        &self,
        owner: &str,
        field: &str,
        target: &Option<String>,
    ) -> Result<Value, String> {
        let target = target
            .as_deref()
            .ok_or_else(|| format!("resource '{}' has no {}", owner, field))?;
        Ok(Value::String(self.reference(target, "id")?))
    }
}

/// Required string field, or an error naming the resource.
pub(crate) fn required_str(owner: &str, field: &str, value: &Option<String>) -> Result<Value, String> {
    value
        .as_deref()
        .map(|s| Value::String(s.to_string()))
        .ok_or_else(|| format!("resource '{}' has no {}", owner, field))
}

/// Insert tags when any are declared and the handler did not set its own.
pub(crate) fn insert_tags(props: &mut Properties, resource: &CloudResource) {
    if resource.tags.is_empty() || props.contains_key("tags") {
        return;
    }
    let tags: Map<String, Value> = resource
        .tags
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    props.insert("tags".to_string(), Value::Object(tags));
}

/// Render the engine properties of a template-resolved resource.
pub fn properties(id: &str, resource: &CloudResource, ctx: &RenderCtx) -> Result<Properties, String> {
    let mut props = match resource.resource_type {
        CloudType::Vpc => network::vpc_properties(id, resource)?,
        CloudType::Subnet => network::subnet_properties(id, resource, ctx)?,
        CloudType::RouteTable | CloudType::InternetGateway => {
            network::vpc_child_properties(id, resource, ctx)?
        }
        CloudType::Route => network::route_properties(id, resource, ctx)?,
        CloudType::RouteTableAssociation => network::association_properties(id, resource, ctx)?,
        CloudType::SecurityGroup => security::group_properties(id, resource, ctx)?,
        CloudType::IamRole => iam::role_properties(id, resource)?,
        CloudType::IamPolicy => iam::policy_properties(id, resource)?,
        CloudType::IamPolicyAttachment => iam::attachment_properties(id, resource, ctx)?,
        CloudType::InstanceProfile => iam::profile_properties(id, resource, ctx)?,
        CloudType::Instance => compute::instance_properties(id, resource, ctx)?,
        CloudType::Bucket => storage::bucket_properties(resource),
    };
    insert_tags(&mut props, resource);
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> StackConfig {
        serde_yaml_ng::from_str(
            r#"
version: "1.0"
name: t
resources:
  main-vpc: { type: vpc, cidr_block: 10.0.0.0/16 }
  gw: { type: internet_gateway, vpc: main-vpc, name: theGateway }
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_cs005_camel_case() {
        assert_eq!(camel_case("public-route-table"), "publicRouteTable");
        assert_eq!(camel_case("ec2_public"), "ec2Public");
        assert_eq!(camel_case("PublicRouteTableAssociation"), "publicRouteTableAssociation");
        assert_eq!(camel_case("cidr_block"), "cidrBlock");
        assert_eq!(camel_case("id"), "id");
    }

    #[test]
    fn test_cs005_references_in_field_order() {
        let r: CloudResource = serde_yaml_ng::from_str(
            "{ type: instance, subnet: s, instance_profile: p, security_groups: [a, b] }",
        )
        .unwrap();
        let refs = references(&r);
        let targets: Vec<_> = refs.iter().map(|r| (r.field, r.target)).collect();
        assert_eq!(
            targets,
            vec![
                ("subnet", "s"),
                ("instance_profile", "p"),
                ("security_groups", "a"),
                ("security_groups", "b"),
            ]
        );
        assert_eq!(refs[1].expected, CloudType::InstanceProfile);
    }

    #[test]
    fn test_cs005_reference_rendering() {
        let config = stack();
        let ctx = RenderCtx::new(&config);
        assert_eq!(ctx.reference("main-vpc", "cidr_block").unwrap(), "${mainVpc.cidrBlock}");
        assert_eq!(ctx.reference("gw", "id").unwrap(), "${theGateway.id}");
        assert_eq!(ctx.resource_ref("gw").unwrap(), "${theGateway}");
        assert!(ctx.reference("ghost", "id").is_err());
    }

    #[test]
    fn test_cs005_properties_with_tags() {
        let config = stack();
        let ctx = RenderCtx::new(&config);
        let mut vpc = config.resources["main-vpc"].clone();
        vpc.tags.insert("Name".to_string(), "main".to_string());
        let props = properties("main-vpc", &vpc, &ctx).unwrap();
        assert_eq!(props["cidrBlock"], "10.0.0.0/16");
        assert_eq!(props["tags"]["Name"], "main");
    }

    #[test]
    fn test_cs005_properties_gateway() {
        let config = stack();
        let ctx = RenderCtx::new(&config);
        let props = properties("gw", &config.resources["gw"], &ctx).unwrap();
        assert_eq!(props["vpcId"], "${mainVpc.id}");
        assert!(!props.contains_key("tags"));
    }
}
