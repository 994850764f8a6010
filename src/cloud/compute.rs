//! CS-009: EC2 instances, attached EBS volumes, and bootstrap user data.

use super::{required_str, Properties, RenderCtx};
use crate::core::bootstrap;
use crate::core::types::{CloudResource, EbsVolume};
use crate::provenance::hasher;
use serde_json::{json, Value};

/// Tag carrying the short hash of the rendered user data.
pub const USER_DATA_HASH_TAG: &str = "cloudstrap:user-data-hash";

/// Volume size in GiB from a resolved `size_gb` scalar.
pub fn volume_size(owner: &str, volume: &EbsVolume) -> Result<u32, String> {
    let parsed = match &volume.size_gb {
        serde_yaml_ng::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_yaml_ng::Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    match parsed {
        Some(size) if size > 0 => Ok(size),
        _ => Err(format!(
            "resource '{}' volume {} has invalid size_gb {:?}",
            owner, volume.device_name, volume.size_gb
        )),
    }
}

fn block_devices(id: &str, resource: &CloudResource) -> Result<Value, String> {
    let devices = resource
        .ebs_volumes
        .iter()
        .map(|v| -> Result<Value, String> {
            Ok(json!({
                "deviceName": v.device_name,
                "volumeSize": volume_size(id, v)?,
                "volumeType": v.volume_type,
            }))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(devices))
}

pub fn instance_properties(
    id: &str,
    resource: &CloudResource,
    ctx: &RenderCtx,
) -> Result<Properties, String> {
    let mut props = Properties::new();
    props.insert("ami".to_string(), required_str(id, "ami", &resource.ami)?);
    props.insert(
        "instanceType".to_string(),
        required_str(id, "instance_type", &resource.instance_type)?,
    );
    if let Some(ref az) = resource.availability_zone {
        props.insert("availabilityZone".to_string(), Value::String(az.clone()));
    }
    if let Some(ref subnet) = resource.subnet {
        props.insert("subnetId".to_string(), Value::String(ctx.reference(subnet, "id")?));
    }
    if let Some(ref key) = resource.key_name {
        props.insert("keyName".to_string(), Value::String(key.clone()));
    }
    if let Some(public) = resource.associate_public_ip {
        props.insert("associatePublicIpAddress".to_string(), Value::Bool(public));
    }
    if !resource.security_groups.is_empty() {
        let groups = resource
            .security_groups
            .iter()
            .map(|sg| ctx.reference(sg, "id").map(Value::String))
            .collect::<Result<Vec<_>, _>>()?;
        props.insert("vpcSecurityGroupIds".to_string(), Value::Array(groups));
    }
    if let Some(ref profile) = resource.instance_profile {
        props.insert(
            "iamInstanceProfile".to_string(),
            Value::String(ctx.reference(profile, "name")?),
        );
    }
    if !resource.ebs_volumes.is_empty() {
        props.insert("ebsBlockDevices".to_string(), block_devices(id, resource)?);
    }

    if let Some(ref spec) = resource.bootstrap {
        let user_data = bootstrap::render_user_data(spec)
            .map_err(|e| format!("resource '{}': {}", id, e))?;
        let hash = bootstrap::user_data_hash(&user_data);
        props.insert("userData".to_string(), Value::String(user_data));
        props.insert("userDataReplaceOnChange".to_string(), Value::Bool(true));

        let mut tags: serde_json::Map<String, Value> = resource
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        tags.insert(
            USER_DATA_HASH_TAG.to_string(),
            Value::String(hasher::short(&hash, 16).to_string()),
        );
        props.insert("tags".to_string(), Value::Object(tags));
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StackConfig;

    fn stack() -> StackConfig {
        serde_yaml_ng::from_str(
            r#"
version: "1.0"
name: c
resources:
  vpc: { type: vpc, cidr_block: 10.0.0.0/16 }
  private: { type: subnet, vpc: vpc, cidr_block: 10.0.2.0/24 }
  ssh-private: { type: security_group, vpc: vpc }
  role: { type: iam_role, assume_role_policy: { Version: "2012-10-17" } }
  profile: { type: instance_profile, role: role }
  ec2-private:
    type: instance
    ami: ami-0abcdef
    instance_type: t2.micro
    subnet: private
    key_name: ops
    associate_public_ip: false
    security_groups: [ssh-private]
    instance_profile: profile
    tags: { Name: ec2-private }
    ebs_volumes:
      - { device_name: /dev/xvdf, size_gb: 8 }
    bootstrap: {}
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_cs009_instance_properties() {
        let config = stack();
        let ctx = RenderCtx::new(&config);
        let props =
            instance_properties("ec2-private", &config.resources["ec2-private"], &ctx).unwrap();
        assert_eq!(props["ami"], "ami-0abcdef");
        assert_eq!(props["instanceType"], "t2.micro");
        assert_eq!(props["subnetId"], "${private.id}");
        assert_eq!(props["keyName"], "ops");
        assert_eq!(props["associatePublicIpAddress"], false);
        assert_eq!(props["vpcSecurityGroupIds"][0], "${sshPrivate.id}");
        assert_eq!(props["iamInstanceProfile"], "${profile.name}");
        assert_eq!(props["ebsBlockDevices"][0]["deviceName"], "/dev/xvdf");
        assert_eq!(props["ebsBlockDevices"][0]["volumeSize"], 8);
        assert_eq!(props["ebsBlockDevices"][0]["volumeType"], "gp2");
    }

    #[test]
    fn test_cs009_user_data_and_hash_tag() {
        let config = stack();
        let ctx = RenderCtx::new(&config);
        let props =
            instance_properties("ec2-private", &config.resources["ec2-private"], &ctx).unwrap();
        let ud = props["userData"].as_str().unwrap();
        assert!(ud.starts_with("#!/bin/bash"));
        assert_eq!(props["userDataReplaceOnChange"], true);
        let tag = props["tags"][USER_DATA_HASH_TAG].as_str().unwrap();
        assert_eq!(tag.len(), 16);
        assert_eq!(props["tags"]["Name"], "ec2-private");
    }

    #[test]
    fn test_cs009_full_render_keeps_hash_tag() {
        let config = stack();
        let ctx = RenderCtx::new(&config);
        let props =
            super::super::properties("ec2-private", &config.resources["ec2-private"], &ctx)
                .unwrap();
        assert!(props["tags"].get(USER_DATA_HASH_TAG).is_some());
    }

    #[test]
    fn test_cs009_volume_size() {
        let mut v = EbsVolume {
            device_name: "/dev/xvdf".to_string(),
            size_gb: serde_yaml_ng::Value::String("16".into()),
            volume_type: "gp3".to_string(),
        };
        assert_eq!(volume_size("i", &v).unwrap(), 16);
        v.size_gb = serde_yaml_ng::Value::String("{{params.size}}".into());
        assert!(volume_size("i", &v).unwrap_err().contains("invalid size_gb"));
        v.size_gb = serde_yaml_ng::from_str("0").unwrap();
        assert!(volume_size("i", &v).is_err());
    }

    #[test]
    fn test_cs009_requires_ami() {
        let config = stack();
        let ctx = RenderCtx::new(&config);
        let mut r = config.resources["ec2-private"].clone();
        r.ami = None;
        assert!(instance_properties("ec2-private", &r, &ctx).unwrap_err().contains("no ami"));
    }
}
