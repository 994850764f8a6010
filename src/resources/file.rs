//! CS-013: Numbers file generation.
//!
//! Two layouts produce the same file:
//! - inline: the rendered sequence is written from a quoted heredoc
//! - staged: a generator script is echoed line by line to disk, then run

use super::{parent_dir, shell_quote};
use crate::core::sequence;
use crate::core::types::SequenceBounds;

const HEREDOC_TAG: &str = "CLOUDSTRAP_EOF";

fn mkdir_parent(lines: &mut Vec<String>, path: &str) {
    if let Some(parent) = parent_dir(path) {
        lines.push(format!("mkdir -p {}", shell_quote(&parent)));
    }
}

/// Shell that writes the numbers file from an embedded heredoc.
///
/// The file is written beside its target and renamed into place.
pub fn inline_script(numbers_path: &str, bounds: SequenceBounds) -> String {
    let target = shell_quote(numbers_path);
    let tmp = shell_quote(&format!("{}.tmp", numbers_path));
    let mut lines = vec!["set -euo pipefail".to_string()];
    mkdir_parent(&mut lines, numbers_path);
    lines.push(format!(
        "cat > {tmp} <<'{tag}'\n{body}{tag}",
        tmp = tmp,
        tag = HEREDOC_TAG,
        body = sequence::render(bounds)
    ));
    lines.push(format!("mv -f {} {}", tmp, target));
    lines.join("\n")
}

/// Lines of the second-level generator script.
pub fn generator_lines(numbers_path: &str, bounds: SequenceBounds) -> Vec<String> {
    let target = shell_quote(numbers_path);
    let tmp = shell_quote(&format!("{}.tmp", numbers_path));
    let mut lines = vec!["#!/bin/bash".to_string(), "set -euo pipefail".to_string()];
    mkdir_parent(&mut lines, numbers_path);
    lines.push(format!("i={}", bounds.start));
    lines.push(format!("while [ \"$i\" -le {} ]; do", bounds.end));
    lines.push("  printf '%d\\n' \"$i\"".to_string());
    lines.push("  i=$((i + 1))".to_string());
    lines.push(format!("done > {}", tmp));
    lines.push(format!("mv -f {} {}", tmp, target));
    lines
}

/// Shell that writes the generator script with `echo`, then runs it.
pub fn staged_script(script_path: &str, numbers_path: &str, bounds: SequenceBounds) -> String {
    let script = shell_quote(script_path);
    let mut lines = vec!["set -euo pipefail".to_string()];
    mkdir_parent(&mut lines, script_path);
    for (i, line) in generator_lines(numbers_path, bounds).iter().enumerate() {
        let redirect = if i == 0 { ">" } else { ">>" };
        lines.push(format!("echo {} {} {}", shell_quote(line), redirect, script));
    }
    lines.push(format!("chmod +x {}", script));
    lines.push(format!("bash {}", script));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::process::Command;

    fn run_bash(script: &str) -> std::process::Output {
        Command::new("bash").arg("-c").arg(script).output().unwrap()
    }

    fn path_str(p: &Path) -> String {
        p.display().to_string()
    }

    #[test]
    fn test_cs013_inline_heredoc_quoted() {
        let script = inline_script("/home/ec2-user/numbers.txt", SequenceBounds::default());
        assert!(script.contains("<<'CLOUDSTRAP_EOF'"));
        assert!(script.contains("mkdir -p '/home/ec2-user'"));
        assert!(script.contains("\n1\n2\n3\n"));
        assert!(script.contains("\n100\nCLOUDSTRAP_EOF"));
        assert!(script.ends_with("mv -f '/home/ec2-user/numbers.txt.tmp' '/home/ec2-user/numbers.txt'"));
    }

    #[test]
    fn test_cs013_generator_lines() {
        let lines = generator_lines("/tmp/n.txt", SequenceBounds { start: 3, end: 9 });
        assert_eq!(lines[0], "#!/bin/bash");
        assert!(lines.contains(&"i=3".to_string()));
        assert!(lines.contains(&"while [ \"$i\" -le 9 ]; do".to_string()));
        assert_eq!(lines.last().unwrap(), "mv -f '/tmp/n.txt.tmp' '/tmp/n.txt'");
    }

    #[test]
    fn test_cs013_staged_echoes_lines() {
        let script = staged_script("/home/ec2-user/numbers.sh", "/home/ec2-user/numbers.txt", SequenceBounds::default());
        assert!(script.contains("echo '#!/bin/bash' > '/home/ec2-user/numbers.sh'"));
        assert!(script.contains(">> '/home/ec2-user/numbers.sh'"));
        assert!(script.contains("chmod +x '/home/ec2-user/numbers.sh'"));
        assert!(script.ends_with("bash '/home/ec2-user/numbers.sh'"));
        assert_eq!(script.matches(" > '/home/ec2-user/numbers.sh'").count(), 1);
    }

    #[test]
    fn test_cs013_inline_runs_in_bash() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("home").join("numbers.txt");
        let out = run_bash(&inline_script(&path_str(&target), SequenceBounds::default()));
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        let content = std::fs::read_to_string(&target).unwrap();
        assert_eq!(content, sequence::render(SequenceBounds::default()));
        assert_eq!(content.len(), 292);
        assert!(!dir.path().join("home").join("numbers.txt.tmp").exists());
    }

    #[test]
    fn test_cs013_staged_runs_in_bash() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("bin").join("numbers.sh");
        let target = dir.path().join("numbers.txt");
        let out = run_bash(&staged_script(
            &path_str(&script_path),
            &path_str(&target),
            SequenceBounds::default(),
        ));
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        assert!(script_path.exists());
        let content = std::fs::read_to_string(&target).unwrap();
        assert_eq!(content, sequence::render(SequenceBounds::default()));
    }

    #[test]
    fn test_cs013_styles_agree_on_custom_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let bounds = SequenceBounds { start: 95, end: 105 };
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let s = dir.path().join("gen.sh");
        assert!(run_bash(&inline_script(&path_str(&a), bounds)).status.success());
        assert!(run_bash(&staged_script(&path_str(&s), &path_str(&b), bounds)).status.success());
        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn test_cs013_rerun_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("numbers.txt");
        std::fs::write(&target, "stale\n").unwrap();
        let script = inline_script(&path_str(&target), SequenceBounds::default());
        assert!(run_bash(&script).status.success());
        assert!(run_bash(&script).status.success());
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            sequence::render(SequenceBounds::default())
        );
    }
}
