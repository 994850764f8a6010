//! Shell generators for the on-instance bootstrap steps.
//!
//! Each generator emits a self-contained bash fragment:
//! 1. `mount` prepares the block device and mount point
//! 2. `file` writes the number sequence, inline or via a second-level script

pub mod file;
pub mod mount;

use std::path::Path;

/// Single-quote a string for bash.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Parent directory of a path, if it is one worth creating.
pub(crate) fn parent_dir(path: &str) -> Option<String> {
    Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty() && *p != Path::new("/"))
        .map(|p| p.display().to_string())
}
