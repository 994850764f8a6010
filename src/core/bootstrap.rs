//! CS-004: First-boot user data generation.
//!
//! Renders the bash program an instance runs on first boot. The volume step
//! and the numbers step are independent: a failed format or mount is
//! reported but never prevents the numbers file from being written.

use super::sequence;
use super::types::{BootstrapSpec, CloudType, StackConfig, UserDataStyle};
use crate::provenance::hasher;
use crate::resources::{file, mount};
use base64::Engine as _;

/// Maximum size of EC2 user data before base64 encoding.
pub const USER_DATA_LIMIT: usize = 16384;

/// Problems with a bootstrap spec, empty when it can be rendered.
pub fn check_spec(spec: &BootstrapSpec) -> Vec<String> {
    let mut problems = Vec::new();
    for (field, value) in [
        ("device", &spec.device),
        ("mount_point", &spec.mount_point),
        ("numbers_path", &spec.numbers_path),
        ("script_path", &spec.script_path),
    ] {
        if !value.starts_with('/') {
            problems.push(format!("{} '{}' must be an absolute path", field, value));
        }
    }
    if spec.fs_type.is_empty() || !spec.fs_type.chars().all(|c| c.is_ascii_alphanumeric()) {
        problems.push(format!("fs_type '{}' is not a filesystem name", spec.fs_type));
    }
    let bounds_ok = match spec.sequence.check() {
        Ok(_) => true,
        Err(e) => {
            problems.push(e);
            false
        }
    };
    // bash arithmetic is signed 64-bit and the loop increments past `end`
    if spec.style == UserDataStyle::Staged && spec.sequence.end >= i64::MAX as u64 {
        problems.push(format!(
            "sequence end {} is too large for the staged style",
            spec.sequence.end
        ));
    }
    if bounds_ok {
        problems.extend(size_problem(spec));
    }
    problems
}

/// Inline user data embeds the whole file, so its size is bounded before
/// anything is rendered.
fn size_problem(spec: &BootstrapSpec) -> Option<String> {
    let limit = USER_DATA_LIMIT as u64;
    if spec.style == UserDataStyle::Inline && sequence::byte_len(spec.sequence) > limit {
        return Some(format!(
            "numbers file is {} bytes, user data limit is {} (use style: staged for long sequences)",
            sequence::byte_len(spec.sequence),
            USER_DATA_LIMIT
        ));
    }
    let len = assemble(spec).len();
    (len > USER_DATA_LIMIT).then(|| {
        format!(
            "user data is {} bytes, limit is {} (use style: staged for long sequences)",
            len, USER_DATA_LIMIT
        )
    })
}

fn numbers_step(spec: &BootstrapSpec) -> String {
    match spec.style {
        UserDataStyle::Inline => file::inline_script(&spec.numbers_path, spec.sequence),
        UserDataStyle::Staged => {
            file::staged_script(&spec.script_path, &spec.numbers_path, spec.sequence)
        }
    }
}

/// Render the user data script for a bootstrap spec.
pub fn render_user_data(spec: &BootstrapSpec) -> Result<String, String> {
    let problems = check_spec(spec);
    if !problems.is_empty() {
        return Err(format!("invalid bootstrap: {}", problems.join("; ")));
    }
    Ok(assemble(spec))
}

fn assemble(spec: &BootstrapSpec) -> String {
    let mut out = String::new();
    out.push_str("#!/bin/bash\n");
    out.push_str(&format!(
        "# cloudstrap {}: prepare {} at {}, write {} ({}, {})\n",
        env!("CARGO_PKG_VERSION"),
        spec.device,
        spec.mount_point,
        spec.numbers_path,
        spec.sequence,
        spec.style
    ));
    out.push('\n');
    out.push_str(&mount::user_data_block(spec));
    out.push_str("\n\n");
    out.push_str(&format!(
        "(\n{}\n)\nnumbers_rc=$?\nif [ \"$numbers_rc\" -ne 0 ]; then\n  echo \"cloudstrap: numbers step failed (exit $numbers_rc)\" >&2\nfi\n",
        numbers_step(spec)
    ));
    out.push_str("\nif [ \"$volume_rc\" -ne 0 ] || [ \"$numbers_rc\" -ne 0 ]; then\n  exit 1\nfi\n");
    out
}

/// Base64 encoding as submitted to the EC2 API.
pub fn encode_user_data(script: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(script.as_bytes())
}

/// Content hash of rendered user data.
pub fn user_data_hash(script: &str) -> String {
    hasher::hash_string(script)
}

/// Pick the instance whose bootstrap to use.
///
/// With `instance` the named resource must be an instance with a bootstrap.
/// Without it the stack must contain exactly one bootstrapped instance.
pub fn select_bootstrap<'a>(
    config: &'a StackConfig,
    instance: Option<&str>,
) -> Result<(&'a String, &'a BootstrapSpec), String> {
    if let Some(id) = instance {
        let (key, resource) = config
            .resources
            .get_key_value(id)
            .ok_or_else(|| format!("unknown resource '{}'", id))?;
        if resource.resource_type != CloudType::Instance {
            return Err(format!("resource '{}' is a {}, not an instance", id, resource.resource_type));
        }
        let spec = resource
            .bootstrap
            .as_ref()
            .ok_or_else(|| format!("instance '{}' has no bootstrap", id))?;
        return Ok((key, spec));
    }

    let candidates: Vec<(&String, &BootstrapSpec)> = config
        .resources
        .iter()
        .filter(|(_, r)| r.resource_type == CloudType::Instance)
        .filter_map(|(id, r)| r.bootstrap.as_ref().map(|b| (id, b)))
        .collect();

    match candidates.as_slice() {
        [] => Err("no instance declares a bootstrap".to_string()),
        [only] => Ok(*only),
        many => Err(format!(
            "several instances declare a bootstrap ({}), pick one with --instance",
            many.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>().join(", ")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SequenceBounds;

    fn staged() -> BootstrapSpec {
        BootstrapSpec {
            style: UserDataStyle::Staged,
            ..BootstrapSpec::default()
        }
    }

    #[test]
    fn test_cs004_render_default() {
        let ud = render_user_data(&BootstrapSpec::default()).unwrap();
        assert!(ud.starts_with("#!/bin/bash\n"));
        assert!(ud.contains("mkfs -t 'ext4' '/dev/xvdf'"));
        assert!(ud.contains("mount '/dev/xvdf' '/mnt/new-ebs-volume'"));
        assert!(ud.contains(&sequence::render(SequenceBounds::default())));
        assert!(ud.len() <= USER_DATA_LIMIT);
    }

    #[test]
    fn test_cs004_volume_precedes_numbers() {
        let ud = render_user_data(&BootstrapSpec::default()).unwrap();
        let mount = ud.find("volume_rc=$?").unwrap();
        let numbers = ud.find("CLOUDSTRAP_EOF").unwrap();
        assert!(mount < numbers);
    }

    #[test]
    fn test_cs004_no_top_level_errexit() {
        let ud = render_user_data(&BootstrapSpec::default()).unwrap();
        let top: Vec<&str> = ud.lines().take(3).collect();
        assert!(!top.iter().any(|l| l.starts_with("set -e")));
    }

    #[test]
    fn test_cs004_render_staged() {
        let ud = render_user_data(&staged()).unwrap();
        assert!(ud.contains("echo '#!/bin/bash' > '/home/ec2-user/numbers.sh'"));
        assert!(ud.contains("bash '/home/ec2-user/numbers.sh'"));
        assert!(!ud.contains("CLOUDSTRAP_EOF"));
    }

    #[test]
    fn test_cs004_deterministic() {
        let a = render_user_data(&BootstrapSpec::default()).unwrap();
        let b = render_user_data(&BootstrapSpec::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(user_data_hash(&a), user_data_hash(&b));
        assert_ne!(user_data_hash(&a), user_data_hash(&render_user_data(&staged()).unwrap()));
    }

    #[test]
    fn test_cs004_size_limit() {
        let spec = BootstrapSpec {
            sequence: SequenceBounds { start: 1, end: 10_000 },
            ..BootstrapSpec::default()
        };
        let err = render_user_data(&spec).unwrap_err();
        assert!(err.contains("limit is 16384"));
        assert!(err.contains("use style: staged"));
        assert_eq!(check_spec(&spec).len(), 1);

        let spec = BootstrapSpec {
            style: UserDataStyle::Staged,
            ..spec
        };
        assert!(render_user_data(&spec).is_ok());
    }

    #[test]
    fn test_cs004_huge_inline_rejected_before_rendering() {
        let spec = BootstrapSpec {
            sequence: SequenceBounds { start: 1, end: 99_000_000 },
            ..BootstrapSpec::default()
        };
        let problems = check_spec(&spec);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("numbers file is"));
    }

    #[test]
    fn test_cs004_overhead_counts_toward_limit() {
        // The numbers alone fit, the full script does not.
        let mut end = 100;
        while sequence::byte_len(SequenceBounds { start: 1, end: end + 1 }) <= USER_DATA_LIMIT as u64 {
            end += 1;
        }
        let spec = BootstrapSpec {
            sequence: SequenceBounds { start: 1, end },
            ..BootstrapSpec::default()
        };
        let problems = check_spec(&spec);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("user data is"));
    }

    #[test]
    fn test_cs004_check_spec() {
        let spec = BootstrapSpec {
            device: "xvdf".to_string(),
            fs_type: "ext4; rm -rf /".to_string(),
            sequence: SequenceBounds { start: 5, end: 1 },
            ..BootstrapSpec::default()
        };
        let problems = check_spec(&spec);
        assert_eq!(problems.len(), 3);
        assert!(render_user_data(&spec).unwrap_err().starts_with("invalid bootstrap"));

        let big = BootstrapSpec {
            style: UserDataStyle::Staged,
            sequence: SequenceBounds { start: 1, end: u64::MAX },
            ..BootstrapSpec::default()
        };
        assert!(check_spec(&big)[0].contains("too large"));
    }

    #[test]
    fn test_cs004_encode() {
        use base64::Engine as _;
        let ud = render_user_data(&BootstrapSpec::default()).unwrap();
        let encoded = encode_user_data(&ud);
        let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
        assert_eq!(decoded, ud.as_bytes());
    }

    #[test]
    fn test_cs004_numbers_written_when_volume_fails() {
        let dir = tempfile::tempdir().unwrap();
        let numbers = dir.path().join("home").join("numbers.txt");
        let spec = BootstrapSpec {
            device: dir.path().join("absent-dev").display().to_string(),
            mount_point: dir.path().join("mnt").display().to_string(),
            numbers_path: numbers.display().to_string(),
            ..BootstrapSpec::default()
        };
        let ud = render_user_data(&spec).unwrap();
        let out = std::process::Command::new("bash")
            .arg("-c")
            .arg(&ud)
            .output()
            .unwrap();
        assert_eq!(out.status.code(), Some(1));
        assert_eq!(
            std::fs::read_to_string(&numbers).unwrap(),
            sequence::render(SequenceBounds::default())
        );
    }

    fn two_instances() -> StackConfig {
        serde_yaml_ng::from_str(
            r#"
version: "1.0"
name: t
resources:
  web: { type: instance, ami: ami-1, instance_type: t2.micro, bootstrap: {} }
  worker: { type: instance, ami: ami-1, instance_type: t2.micro, bootstrap: { style: staged } }
  plain: { type: instance, ami: ami-1, instance_type: t2.micro }
  vpc: { type: vpc, cidr_block: 10.0.0.0/16 }
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_cs004_select_bootstrap_named() {
        let config = two_instances();
        let (id, spec) = select_bootstrap(&config, Some("worker")).unwrap();
        assert_eq!(id, "worker");
        assert_eq!(spec.style, UserDataStyle::Staged);
        assert!(select_bootstrap(&config, Some("plain")).unwrap_err().contains("no bootstrap"));
        assert!(select_bootstrap(&config, Some("vpc")).unwrap_err().contains("not an instance"));
        assert!(select_bootstrap(&config, Some("ghost")).unwrap_err().contains("unknown"));
    }

    #[test]
    fn test_cs004_select_bootstrap_ambiguous() {
        let mut config = two_instances();
        let err = select_bootstrap(&config, None).unwrap_err();
        assert!(err.contains("web, worker"));
        config.resources.shift_remove("worker");
        let (id, _) = select_bootstrap(&config, None).unwrap();
        assert_eq!(id, "web");
        config.resources.shift_remove("web");
        assert!(select_bootstrap(&config, None).is_err());
    }
}
