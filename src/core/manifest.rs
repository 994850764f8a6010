//! CS-016: Engine program rendering.
//!
//! Turns a validated stack into a declarative program for the provisioning
//! engine: resources in creation order with their properties, explicit
//! ordering hints, the region config, and exported outputs. The program is
//! emitted as YAML or JSON; the engine owns the actual cloud calls.

use super::parser;
use super::resolver::{self, TemplateScope};
use super::types::StackConfig;
use crate::cloud::{self, camel_case, Properties, RenderCtx};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A rendered engine program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub runtime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub config: IndexMap<String, ConfigValue>,
    pub resources: IndexMap<String, ProgramResource>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue {
    pub value: String,
}

/// One engine resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ResourceOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceOptions {
    #[serde(rename = "dependsOn")]
    pub depends_on: Vec<String>,
}

/// Render the engine program for a stack.
///
/// The stack is validated first; all validation errors are reported at once.
pub fn render_program(config: &StackConfig) -> Result<Program, String> {
    let errors = parser::validate_stack(config);
    if !errors.is_empty() {
        let lines: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
        return Err(format!(
            "stack '{}' has {} validation error(s):\n{}",
            config.name,
            errors.len(),
            lines.join("\n")
        ));
    }

    let order = resolver::build_creation_order(config)?;
    let scope = TemplateScope::from_config(config);
    let ctx = RenderCtx::new(config);

    let mut resources = IndexMap::new();
    for id in &order {
        let declared = config
            .resources
            .get(id)
            .ok_or_else(|| format!("unknown resource '{}'", id))?;
        let resolved = resolver::resolve_resource_templates(declared, &scope)
            .map_err(|e| format!("resource '{}': {}", id, e))?;
        let properties = cloud::properties(id, &resolved, &ctx)?;

        let options = if declared.depends_on.is_empty() {
            None
        } else {
            let depends_on = declared
                .depends_on
                .iter()
                .map(|d| ctx.resource_ref(d))
                .collect::<Result<Vec<_>, _>>()?;
            Some(ResourceOptions { depends_on })
        };

        resources.insert(
            cloud::logical_name(id, declared),
            ProgramResource {
                resource_type: declared.resource_type.engine_type().to_string(),
                properties,
                options,
            },
        );
    }

    let mut outputs = IndexMap::new();
    for (name, target) in &config.outputs {
        let (res, attr) = target
            .split_once('.')
            .ok_or_else(|| format!("output '{}' is not 'resource.attribute'", name))?;
        outputs.insert(camel_case(name), ctx.reference(res, attr)?);
    }

    let mut program_config = IndexMap::new();
    program_config.insert(
        "aws:region".to_string(),
        ConfigValue {
            value: config.region.clone(),
        },
    );

    Ok(Program {
        name: config.name.clone(),
        runtime: "yaml".to_string(),
        description: config.description.clone(),
        config: program_config,
        resources,
        outputs,
    })
}

/// Serialize a program as YAML.
pub fn to_yaml(program: &Program) -> Result<String, String> {
    serde_yaml_ng::to_string(program).map_err(|e| format!("YAML serialize error: {}", e))
}

/// Serialize a program as pretty JSON.
pub fn to_json(program: &Program) -> Result<String, String> {
    serde_json::to_string_pretty(program).map_err(|e| format!("JSON serialize error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_stack;

    const STACK: &str = r#"
version: "1.0"
name: demo
description: demo stack
region: eu-west-1
params:
  size: 8
resources:
  ec2-private:
    type: instance
    ami: ami-1
    instance_type: t2.micro
    subnet: private-subnet
    depends_on: [logs]
    ebs_volumes:
      - { device_name: /dev/xvdf, size_gb: "{{params.size}}" }
    bootstrap: {}
  private-subnet: { type: subnet, vpc: main-vpc, cidr_block: 10.0.2.0/24 }
  main-vpc: { type: vpc, cidr_block: 10.0.0.0/16, tags: { Name: "{{stack.name}}-vpc" } }
  logs: { type: bucket }
outputs:
  vpc_id: main-vpc.id
  private_ip: ec2-private.private_ip
"#;

    fn program() -> Program {
        render_program(&parse_stack(STACK).unwrap()).unwrap()
    }

    #[test]
    fn test_cs016_creation_order() {
        let p = program();
        let names: Vec<&str> = p.resources.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["logs", "mainVpc", "privateSubnet", "ec2Private"]);
    }

    #[test]
    fn test_cs016_resource_shape() {
        let p = program();
        assert_eq!(p.runtime, "yaml");
        assert_eq!(p.config["aws:region"].value, "eu-west-1");
        let vpc = &p.resources["mainVpc"];
        assert_eq!(vpc.resource_type, "aws:ec2:Vpc");
        assert_eq!(vpc.properties["tags"]["Name"], "demo-vpc");
        assert!(vpc.options.is_none());

        let ec2 = &p.resources["ec2Private"];
        assert_eq!(ec2.properties["subnetId"], "${privateSubnet.id}");
        assert_eq!(ec2.properties["ebsBlockDevices"][0]["volumeSize"], 8);
        let opts = ec2.options.as_ref().unwrap();
        assert_eq!(opts.depends_on, vec!["${logs}".to_string()]);
    }

    #[test]
    fn test_cs016_outputs() {
        let p = program();
        assert_eq!(p.outputs["vpcId"], "${mainVpc.id}");
        assert_eq!(p.outputs["privateIp"], "${ec2Private.privateIp}");
    }

    #[test]
    fn test_cs016_yaml_output() {
        let yaml = to_yaml(&program()).unwrap();
        assert!(yaml.contains("runtime: yaml"));
        assert!(yaml.contains("type: aws:s3:Bucket"));
        assert!(yaml.contains("dependsOn:"));
        // empty bucket properties are omitted
        let back: Program = serde_yaml_ng::from_str(&yaml).unwrap();
        assert!(back.resources["logs"].properties.is_empty());
        assert_eq!(back.resources.len(), 4);
    }

    #[test]
    fn test_cs016_json_output() {
        let json = to_json(&program()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["resources"]["mainVpc"]["properties"]["cidrBlock"], "10.0.0.0/16");
        assert!(v["resources"]["ec2Private"]["properties"]["userData"]
            .as_str()
            .unwrap()
            .starts_with("#!/bin/bash"));
    }

    #[test]
    fn test_cs016_deterministic() {
        assert_eq!(to_yaml(&program()).unwrap(), to_yaml(&program()).unwrap());
    }

    #[test]
    fn test_cs016_invalid_stack_rejected() {
        let config = parse_stack(&STACK.replace("main-vpc.id", "ghost.id")).unwrap();
        let err = render_program(&config).unwrap_err();
        assert!(err.contains("1 validation error(s)"));
        assert!(err.contains("ghost"));
    }
}
