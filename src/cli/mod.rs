//! CS-020: CLI subcommands (init, validate, graph, render, user-data, boot,
//! numbers, verify, completions).

use crate::boot::{self, BootOptions, StepOutcome};
use crate::core::types::{BootstrapSpec, SequenceBounds, StackConfig};
use crate::core::{bootstrap, manifest, parser, resolver, sequence};
use crate::transport::LocalRunner;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "cloudstrap",
    version,
    about = "Declarative AWS stacks with first-boot volume and bootstrap provisioning"
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Program serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Yaml,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter cloudstrap.yaml describing the full demo topology
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate cloudstrap.yaml
    Validate {
        /// Path to cloudstrap.yaml
        #[arg(short, long, default_value = "cloudstrap.yaml")]
        file: PathBuf,
    },

    /// Show resource creation order and dependencies
    Graph {
        /// Path to cloudstrap.yaml
        #[arg(short, long, default_value = "cloudstrap.yaml")]
        file: PathBuf,
    },

    /// Render the provisioning engine program
    Render {
        /// Path to cloudstrap.yaml
        #[arg(short, long, default_value = "cloudstrap.yaml")]
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: Format,

        /// Override a stack param (KEY=VALUE, repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the first-boot user data of an instance
    UserData {
        /// Path to cloudstrap.yaml
        #[arg(short, long, default_value = "cloudstrap.yaml")]
        file: PathBuf,

        /// Instance resource id (required when several instances bootstrap)
        #[arg(short, long)]
        instance: Option<String>,

        /// Print base64 as submitted to the EC2 API
        #[arg(long)]
        base64: bool,

        /// Override a stack param (KEY=VALUE, repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Run the bootstrap natively on this host
    Boot {
        /// Take the bootstrap from this stack (default: built-in defaults)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Instance resource id within the stack
        #[arg(short, long)]
        instance: Option<String>,

        /// Directory for the JSONL boot event log
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Skip formatting and mounting the volume
        #[arg(long)]
        skip_volume: bool,

        /// Override where the numbers file is written
        #[arg(long)]
        numbers_path: Option<String>,
    },

    /// Write the number sequence file
    Numbers {
        #[arg(long, default_value_t = 1)]
        start: u64,

        #[arg(long, default_value_t = 100)]
        end: u64,

        /// Target file
        #[arg(short, long, default_value = "numbers.txt")]
        output: PathBuf,
    },

    /// Check a numbers file against its expected content
    Verify {
        /// File to check
        path: PathBuf,

        #[arg(long, default_value_t = 1)]
        start: u64,

        #[arg(long, default_value_t = 100)]
        end: u64,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Graph { file } => cmd_graph(&file),
        Commands::Render {
            file,
            format,
            set,
            output,
        } => cmd_render(&file, format, &set, output.as_deref()),
        Commands::UserData {
            file,
            instance,
            base64,
            set,
        } => cmd_user_data(&file, instance.as_deref(), base64, &set),
        Commands::Boot {
            file,
            instance,
            state_dir,
            skip_volume,
            numbers_path,
        } => cmd_boot(
            file.as_deref(),
            instance.as_deref(),
            state_dir.as_deref(),
            skip_volume,
            numbers_path,
        ),
        Commands::Numbers { start, end, output } => cmd_numbers(start, end, &output),
        Commands::Verify { path, start, end } => cmd_verify(&path, start, end),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "cloudstrap", &mut std::io::stdout());
            Ok(())
        }
    }
}

const INIT_TEMPLATE: &str = r#"version: "1.0"
name: cloudstrap-demo
description: VPC with public and private subnets, an S3 bucket, a read-only IAM role, and two EC2 instances
region: us-east-1

params:
  instance_type: t2.micro
  ebs_volume_size: 8
  ami: ami-05c13eab67c5d8861
  key_name: cloudstrap
  az: us-east-1a

resources:
  my-vpc:
    type: vpc
    cidr_block: 10.0.0.0/16

  public-route-table:
    type: route_table
    vpc: my-vpc

  private-route-table:
    type: route_table
    vpc: my-vpc

  internet-gateway:
    type: internet_gateway
    vpc: my-vpc

  public-route:
    type: route
    route_table: public-route-table
    gateway: internet-gateway
    destination_cidr_block: 0.0.0.0/0

  public-subnet:
    type: subnet
    vpc: my-vpc
    cidr_block: 10.0.1.0/24
    availability_zone: "{{params.az}}"

  public-route-table-association:
    type: route_table_association
    subnet: public-subnet
    route_table: public-route-table

  private-subnet:
    type: subnet
    vpc: my-vpc
    cidr_block: 10.0.2.0/24
    availability_zone: "{{params.az}}"

  private-route-table-association:
    type: route_table_association
    subnet: private-subnet
    route_table: private-route-table

  bucket:
    type: bucket

  ec2-role:
    type: iam_role
    assume_role_policy:
      Version: "2012-10-17"
      Statement:
        - Effect: Allow
          Action: ["sts:AssumeRole"]
          Principal:
            Service: ["ec2.amazonaws.com"]

  s3-read-only-policy:
    type: iam_policy
    name: S3ReadOnlyPolicy
    path: /
    description: List S3 buckets
    document:
      Version: "2012-10-17"
      Statement:
        - Sid: ListBuckets
          Effect: Allow
          Action: ["s3:ListBucket", "s3:ListAllMyBuckets"]
          Resource: "*"

  ec2-role-attach:
    type: iam_policy_attachment
    roles: [ec2-role]
    policy: s3-read-only-policy

  ec2-instance-profile:
    type: instance_profile
    role: ec2-role
    depends_on: [ec2-role-attach]

  ssh-public:
    type: security_group
    name: SSHPublic
    description: Allow SSH from Public
    vpc: my-vpc
    ingress:
      - { from_port: 22, to_port: 22, protocol: tcp, cidr_blocks: [0.0.0.0/0] }
    egress:
      - { from_port: 0, to_port: 0, protocol: "-1", cidr_blocks: [0.0.0.0/0] }
    tags:
      Name: Allow_SSH_public

  ec2-public:
    type: instance
    ami: "{{params.ami}}"
    instance_type: "{{params.instance_type}}"
    availability_zone: "{{params.az}}"
    subnet: public-subnet
    key_name: "{{params.key_name}}"
    associate_public_ip: true
    security_groups: [ssh-public]
    tags:
      Name: EC2_Public

  ec2-private:
    type: instance
    ami: "{{params.ami}}"
    instance_type: "{{params.instance_type}}"
    availability_zone: "{{params.az}}"
    subnet: private-subnet
    key_name: "{{params.key_name}}"
    instance_profile: ec2-instance-profile
    ebs_volumes:
      - device_name: /dev/xvdf
        size_gb: "{{params.ebs_volume_size}}"
        volume_type: gp2
    bootstrap:
      device: /dev/xvdf
      mount_point: /mnt/new-ebs-volume
      numbers_path: /home/ec2-user/numbers.txt
      script_path: /home/ec2-user/numbers.sh
      style: staged
    tags:
      Name: EC2_Private

outputs:
  vpc_id: my-vpc.id
  vpc_cidr: my-vpc.cidr_block
  public_route_table_id: public-route-table.id
  private_route_table_id: private-route-table.id
  internet_gateway_id: internet-gateway.id
  public_subnet_id: public-subnet.id
  private_subnet_id: private-subnet.id
  s3_bucket_name: bucket.id
  policy_arn: s3-read-only-policy.arn
  ec2_role_attach: ec2-role-attach.name
  iam_role_name: ec2-role.name
  ec2_public_ip: ec2-public.public_ip
  ec2_private_ip: ec2-private.private_ip
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("cloudstrap.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    std::fs::write(&config_path, INIT_TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized cloudstrap stack at {}", path.display());
    println!("  Created: {}", config_path.display());
    Ok(())
}

/// Parse a stack file and apply `--set` overrides.
fn load_stack(file: &Path, overrides: &[String]) -> Result<StackConfig, String> {
    let mut config = parser::parse_stack_file(file)?;
    resolver::apply_overrides(&mut config.params, overrides)?;
    Ok(config)
}

/// Parse and validate a stack file, printing every error.
fn parse_and_validate(file: &Path, overrides: &[String]) -> Result<StackConfig, String> {
    let config = load_stack(file, overrides)?;
    let errors = parser::validate_stack(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(format!("{} validation error(s)", errors.len()))
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = parse_and_validate(file, &[])?;
    let bootstraps = config
        .resources
        .values()
        .filter(|r| r.bootstrap.is_some())
        .count();
    println!(
        "OK: {} ({} resources, {} outputs, {} bootstrapped instance(s))",
        config.name,
        config.resources.len(),
        config.outputs.len(),
        bootstraps
    );
    Ok(())
}

fn cmd_graph(file: &Path) -> Result<(), String> {
    let config = parse_and_validate(file, &[])?;
    let order = resolver::build_creation_order(&config)?;
    println!("Creation order: {} ({} resources)", config.name, order.len());
    for (i, id) in order.iter().enumerate() {
        let Some(resource) = config.resources.get(id) else {
            continue;
        };
        let deps = resolver::dependencies_of(resource);
        if deps.is_empty() {
            println!("  {:>2}. {} ({})", i + 1, id, resource.resource_type);
        } else {
            println!(
                "  {:>2}. {} ({}) <- {}",
                i + 1,
                id,
                resource.resource_type,
                deps.join(", ")
            );
        }
    }
    Ok(())
}

fn emit(content: &str, output: Option<&Path>) -> Result<(), String> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
            tracing::info!(path = %path.display(), bytes = content.len(), "wrote output");
            Ok(())
        }
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}

fn cmd_render(
    file: &Path,
    format: Format,
    overrides: &[String],
    output: Option<&Path>,
) -> Result<(), String> {
    let config = parse_and_validate(file, overrides)?;
    let program = manifest::render_program(&config)?;
    tracing::debug!(resources = program.resources.len(), "program rendered");
    let content = match format {
        Format::Yaml => manifest::to_yaml(&program)?,
        Format::Json => {
            let mut json = manifest::to_json(&program)?;
            json.push('\n');
            json
        }
    };
    emit(&content, output)
}

fn cmd_user_data(
    file: &Path,
    instance: Option<&str>,
    base64: bool,
    overrides: &[String],
) -> Result<(), String> {
    let config = parse_and_validate(file, overrides)?;
    let (id, spec) = bootstrap::select_bootstrap(&config, instance)?;
    let script = bootstrap::render_user_data(spec).map_err(|e| format!("instance '{}': {}", id, e))?;
    tracing::info!(
        instance = %id,
        bytes = script.len(),
        hash = %bootstrap::user_data_hash(&script),
        "user data rendered"
    );
    if base64 {
        println!("{}", bootstrap::encode_user_data(&script));
    } else {
        print!("{}", script);
    }
    Ok(())
}

fn cmd_boot(
    file: Option<&Path>,
    instance: Option<&str>,
    state_dir: Option<&Path>,
    skip_volume: bool,
    numbers_path: Option<String>,
) -> Result<(), String> {
    let mut spec = match file {
        Some(f) => {
            let config = parse_and_validate(f, &[])?;
            let (_, spec) = bootstrap::select_bootstrap(&config, instance)?;
            spec.clone()
        }
        None => BootstrapSpec::default(),
    };
    if let Some(path) = numbers_path {
        spec.numbers_path = path;
    }
    let problems = bootstrap::check_spec(&spec);
    if !problems.is_empty() {
        return Err(format!("invalid bootstrap: {}", problems.join("; ")));
    }

    let report = boot::run(
        &BootOptions {
            spec: &spec,
            state_dir,
            skip_volume,
        },
        &LocalRunner,
    );

    for step in &report.steps {
        match &step.outcome {
            StepOutcome::Completed { .. } => {
                println!("  ok      {} ({:.2}s)", step.step, step.duration.as_secs_f64())
            }
            StepOutcome::Failed(e) => println!("  FAILED  {}: {}", step.step, e),
            StepOutcome::Skipped => println!("  skipped {}", step.step),
        }
    }
    println!(
        "Boot {}: {} completed, {} failed ({:.2}s)",
        report.run_id,
        report.completed(),
        report.failed(),
        report.total.as_secs_f64()
    );

    if report.success() {
        Ok(())
    } else {
        Err(format!("{} boot step(s) failed", report.failed()))
    }
}

fn cmd_numbers(start: u64, end: u64, output: &Path) -> Result<(), String> {
    let bounds = SequenceBounds::new(start, end)?;
    sequence::write_sequence(output, bounds)
        .map_err(|e| format!("cannot write {}: {}", output.display(), e))?;
    println!(
        "Wrote {} ({} lines, {} bytes)",
        output.display(),
        sequence::line_count(bounds),
        sequence::byte_len(bounds)
    );
    Ok(())
}

fn cmd_verify(path: &Path, start: u64, end: u64) -> Result<(), String> {
    let bounds = SequenceBounds::new(start, end)?;
    match sequence::verify_file(path, bounds)? {
        sequence::SequenceCheck::Valid { lines, bytes } => {
            println!("OK: {} ({} lines, {} bytes)", path.display(), lines, bytes);
            Ok(())
        }
        other => Err(format!("{}: {}", path.display(), other)),
    }
}
