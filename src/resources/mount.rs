//! CS-012: Block device preparation (format, mount, optional fstab entry).

use super::shell_quote;
use crate::core::types::BootstrapSpec;

/// Generate shell that formats the device and mounts it.
///
/// With `guard_format` the device is only formatted when `blkid` finds no
/// filesystem signature, and the mount is skipped when already mounted, so
/// the script is safe to re-run.
pub fn prepare_script(spec: &BootstrapSpec) -> String {
    let dev = shell_quote(&spec.device);
    let target = shell_quote(&spec.mount_point);
    let fstype = shell_quote(&spec.fs_type);

    let mut lines = vec!["set -euo pipefail".to_string()];

    lines.push(format!(
        "if [ ! -b {dev} ]; then\n  echo {msg} >&2\n  exit 1\nfi",
        dev = dev,
        msg = shell_quote(&format!("cloudstrap: {} is not a block device", spec.device)),
    ));

    if spec.guard_format {
        lines.push(format!(
            "if [ -z \"$(blkid -o value -s TYPE {dev} 2>/dev/null || true)\" ]; then\n  mkfs -t {fs} {dev}\nfi",
            dev = dev,
            fs = fstype
        ));
    } else {
        lines.push(format!("mkfs -t {} {}", fstype, dev));
    }

    lines.push(format!("mkdir -p {}", target));
    lines.push(format!(
        "if ! mountpoint -q {t}; then\n  mount {d} {t}\nfi",
        t = target,
        d = dev
    ));

    if spec.persist_mount {
        let entry = shell_quote(&format!(
            "{} {} {} defaults,nofail 0 2",
            spec.device, spec.mount_point, spec.fs_type
        ));
        lines.push(format!(
            "grep -qsxF {e} /etc/fstab || echo {e} >> /etc/fstab",
            e = entry
        ));
    }

    lines.join("\n")
}

/// Volume step as embedded in user data.
///
/// Runs in a subshell so a failure is contained; the exit status lands in
/// `volume_rc` and the rest of the user data keeps going.
pub fn user_data_block(spec: &BootstrapSpec) -> String {
    format!(
        "(\n{}\n)\nvolume_rc=$?\nif [ \"$volume_rc\" -ne 0 ]; then\n  echo \"cloudstrap: volume step failed (exit $volume_rc), continuing\" >&2\nfi",
        prepare_script(spec)
    )
}
