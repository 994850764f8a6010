//! CS-001: Stack schema, bootstrap spec, and boot provenance types.
//!
//! Defines the YAML schema for a cloudstrap stack: the declared cloud
//! resources, their type-specific fields, exported outputs, and the first-boot
//! bootstrap attached to an instance. All types derive Serialize/Deserialize
//! for YAML roundtripping.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Top-level cloudstrap.yaml
// ============================================================================

/// Root configuration: the declared topology handed to the provisioning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Stack / project name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Cloud region the resources live in
    #[serde(default = "default_region")]
    pub region: String,

    /// Stack parameters (templatable via `{{params.key}}`)
    #[serde(default)]
    pub params: HashMap<String, serde_yaml_ng::Value>,

    /// Resource declarations (order-preserving)
    pub resources: IndexMap<String, CloudResource>,

    /// Exported values: export name → `resource.attribute`
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

// ============================================================================
// Resources
// ============================================================================

/// A single declared cloud resource.
///
/// Fields are flat; each resource type reads the subset it needs and the
/// validator rejects missing required ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudResource {
    /// Resource type
    #[serde(rename = "type")]
    pub resource_type: CloudType,

    /// Engine logical name (defaults to the camelCased resource id)
    #[serde(default)]
    pub name: Option<String>,

    /// Explicit ordering edges in addition to reference fields
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Resource tags
    #[serde(default)]
    pub tags: IndexMap<String, String>,

    // -- Network fields --
    /// CIDR block of a VPC or subnet
    #[serde(default)]
    pub cidr_block: Option<String>,

    /// VPC reference
    #[serde(default)]
    pub vpc: Option<String>,

    /// Availability zone
    #[serde(default)]
    pub availability_zone: Option<String>,

    /// Route table reference
    #[serde(default)]
    pub route_table: Option<String>,

    /// Subnet reference
    #[serde(default)]
    pub subnet: Option<String>,

    /// Internet gateway reference
    #[serde(default)]
    pub gateway: Option<String>,

    /// Route destination
    #[serde(default)]
    pub destination_cidr_block: Option<String>,

    // -- Security group fields --
    /// Free-form description (security groups, policies)
    #[serde(default)]
    pub description: Option<String>,

    /// Inbound rules
    #[serde(default)]
    pub ingress: Vec<SecurityRule>,

    /// Outbound rules
    #[serde(default)]
    pub egress: Vec<SecurityRule>,

    // -- IAM fields --
    /// Trust policy of a role
    #[serde(default)]
    pub assume_role_policy: Option<serde_yaml_ng::Value>,

    /// Policy document of a managed policy
    #[serde(default)]
    pub document: Option<serde_yaml_ng::Value>,

    /// IAM path
    #[serde(default)]
    pub path: Option<String>,

    /// Role references of a policy attachment
    #[serde(default)]
    pub roles: Vec<String>,

    /// Policy reference of a policy attachment
    #[serde(default)]
    pub policy: Option<String>,

    /// Role reference of an instance profile
    #[serde(default)]
    pub role: Option<String>,

    // -- Instance fields --
    /// Machine image
    #[serde(default)]
    pub ami: Option<String>,

    /// Instance size
    #[serde(default)]
    pub instance_type: Option<String>,

    /// SSH key pair name
    #[serde(default)]
    pub key_name: Option<String>,

    /// Assign a public IPv4 address
    #[serde(default)]
    pub associate_public_ip: Option<bool>,

    /// Security group references
    #[serde(default)]
    pub security_groups: Vec<String>,

    /// Instance profile reference
    #[serde(default)]
    pub instance_profile: Option<String>,

    /// Attached EBS volumes
    #[serde(default)]
    pub ebs_volumes: Vec<EbsVolume>,

    /// First-boot bootstrap
    #[serde(default)]
    pub bootstrap: Option<BootstrapSpec>,
}

/// Resource type enum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudType {
    #[default]
    Vpc,
    Subnet,
    RouteTable,
    Route,
    RouteTableAssociation,
    InternetGateway,
    SecurityGroup,
    IamRole,
    IamPolicy,
    IamPolicyAttachment,
    InstanceProfile,
    Instance,
    Bucket,
}

impl CloudType {
    /// Type token understood by the provisioning engine.
    pub fn engine_type(&self) -> &'static str {
        match self {
            Self::Vpc => "aws:ec2:Vpc",
            Self::Subnet => "aws:ec2:Subnet",
            Self::RouteTable => "aws:ec2:RouteTable",
            Self::Route => "aws:ec2:Route",
            Self::RouteTableAssociation => "aws:ec2:RouteTableAssociation",
            Self::InternetGateway => "aws:ec2:InternetGateway",
            Self::SecurityGroup => "aws:ec2:SecurityGroup",
            Self::IamRole => "aws:iam:Role",
            Self::IamPolicy => "aws:iam:Policy",
            Self::IamPolicyAttachment => "aws:iam:PolicyAttachment",
            Self::InstanceProfile => "aws:iam:InstanceProfile",
            Self::Instance => "aws:ec2:Instance",
            Self::Bucket => "aws:s3:Bucket",
        }
    }

    /// Attributes that may be referenced from outputs.
    pub fn attributes(&self) -> &'static [&'static str] {
        match self {
            Self::Vpc => &["id", "cidr_block", "arn"],
            Self::Subnet => &["id", "arn"],
            Self::SecurityGroup => &["id", "arn"],
            Self::IamRole | Self::IamPolicy | Self::InstanceProfile => &["id", "name", "arn"],
            Self::IamPolicyAttachment => &["id", "name"],
            Self::Instance => &["id", "arn", "public_ip", "private_ip"],
            Self::Bucket => &["id", "bucket", "arn"],
            Self::RouteTable
            | Self::Route
            | Self::RouteTableAssociation
            | Self::InternetGateway => &["id"],
        }
    }
}

impl fmt::Display for CloudType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Vpc => "vpc",
            Self::Subnet => "subnet",
            Self::RouteTable => "route_table",
            Self::Route => "route",
            Self::RouteTableAssociation => "route_table_association",
            Self::InternetGateway => "internet_gateway",
            Self::SecurityGroup => "security_group",
            Self::IamRole => "iam_role",
            Self::IamPolicy => "iam_policy",
            Self::IamPolicyAttachment => "iam_policy_attachment",
            Self::InstanceProfile => "instance_profile",
            Self::Instance => "instance",
            Self::Bucket => "bucket",
        };
        write!(f, "{}", s)
    }
}

/// A security group rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub from_port: u16,
    pub to_port: u16,
    /// "tcp", "udp", "icmp", or "-1" for all
    pub protocol: String,
    #[serde(default)]
    pub cidr_blocks: Vec<String>,
}

/// An EBS volume attached at launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EbsVolume {
    pub device_name: String,

    /// Size in GiB; templatable, so kept as a scalar and parsed at render time
    pub size_gb: serde_yaml_ng::Value,

    #[serde(default = "default_volume_type")]
    pub volume_type: String,
}

fn default_volume_type() -> String {
    "gp2".to_string()
}

// ============================================================================
// Bootstrap
// ============================================================================

/// First-boot bootstrap of an instance: prepare a volume, write the numbers file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapSpec {
    /// Block device to format and mount
    #[serde(default = "default_device")]
    pub device: String,

    /// Mount point directory
    #[serde(default = "default_mount_point")]
    pub mount_point: String,

    /// Filesystem created on the device
    #[serde(default = "default_fs_type")]
    pub fs_type: String,

    /// Target of the number sequence
    #[serde(default = "default_numbers_path")]
    pub numbers_path: String,

    /// Second-level script location (staged style)
    #[serde(default = "default_script_path")]
    pub script_path: String,

    /// Bounds of the number sequence
    #[serde(default)]
    pub sequence: SequenceBounds,

    /// How the numbers file is produced by the user data
    #[serde(default)]
    pub style: UserDataStyle,

    /// Format only when the device carries no filesystem signature
    #[serde(default = "default_true")]
    pub guard_format: bool,

    /// Record the mount in /etc/fstab
    #[serde(default)]
    pub persist_mount: bool,
}

impl Default for BootstrapSpec {
    fn default() -> Self {
        Self {
            device: default_device(),
            mount_point: default_mount_point(),
            fs_type: default_fs_type(),
            numbers_path: default_numbers_path(),
            script_path: default_script_path(),
            sequence: SequenceBounds::default(),
            style: UserDataStyle::default(),
            guard_format: true,
            persist_mount: false,
        }
    }
}

fn default_device() -> String {
    "/dev/xvdf".to_string()
}

fn default_mount_point() -> String {
    "/mnt/new-ebs-volume".to_string()
}

fn default_fs_type() -> String {
    "ext4".to_string()
}

fn default_numbers_path() -> String {
    "/home/ec2-user/numbers.txt".to_string()
}

fn default_script_path() -> String {
    "/home/ec2-user/numbers.sh".to_string()
}

fn default_true() -> bool {
    true
}

/// Closed integer range written to the numbers file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceBounds {
    pub start: u64,
    pub end: u64,
}

impl Default for SequenceBounds {
    fn default() -> Self {
        Self { start: 1, end: 100 }
    }
}

/// Most lines a numbers file may hold.
pub const MAX_SEQUENCE_LINES: u64 = 100_000_000;

impl SequenceBounds {
    /// Build bounds, rejecting an empty range or one longer than
    /// [`MAX_SEQUENCE_LINES`].
    pub fn new(start: u64, end: u64) -> Result<Self, String> {
        if start > end {
            return Err(format!(
                "sequence start {} is greater than end {}",
                start, end
            ));
        }
        if end - start >= MAX_SEQUENCE_LINES {
            return Err(format!(
                "sequence {}..={} is too large (more than {} lines)",
                start, end, MAX_SEQUENCE_LINES
            ));
        }
        Ok(Self { start, end })
    }

    /// Re-check bounds that were deserialized without going through `new`.
    pub fn check(self) -> Result<Self, String> {
        Self::new(self.start, self.end)
    }
}

impl fmt::Display for SequenceBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// User data layout for the numbers step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserDataStyle {
    /// Write the rendered file directly from a heredoc
    #[default]
    Inline,
    /// Emit a second-level script line by line, then run it
    Staged,
}

impl fmt::Display for UserDataStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => write!(f, "inline"),
            Self::Staged => write!(f, "staged"),
        }
    }
}

// ============================================================================
// Boot provenance
// ============================================================================

/// Steps performed by the boot runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootStep {
    Volume,
    Numbers,
}

impl fmt::Display for BootStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volume => write!(f, "volume"),
            Self::Numbers => write!(f, "numbers"),
        }
    }
}

/// Provenance event for the JSONL boot log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BootEvent {
    BootStarted {
        run_id: String,
        cloudstrap_version: String,
    },
    StepStarted {
        step: BootStep,
    },
    StepCompleted {
        step: BootStep,
        duration_seconds: f64,
        #[serde(default)]
        hash: Option<String>,
    },
    StepFailed {
        step: BootStep,
        error: String,
    },
    BootCompleted {
        run_id: String,
        steps_completed: u32,
        steps_failed: u32,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: BootEvent,
}

// ============================================================================
// Template helper
// ============================================================================

/// Convert a serde_yaml_ng::Value to a string for template resolution.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}

// ============================================================================
// Tests
// ============================================================================
