//! CS-019: Number sequence: render, persist, and verify the numbers file.
//!
//! The file holds one decimal integer per line, ascending, closed range,
//! each line terminated by `\n` and nothing else.

use super::types::SequenceBounds;
use std::fmt::Write as _;
use std::path::Path;

/// Render the sequence as file content.
pub fn render(bounds: SequenceBounds) -> String {
    let mut out = String::with_capacity(usize::try_from(byte_len(bounds)).unwrap_or(0));
    for n in bounds.start..=bounds.end {
        // Writing to a String cannot fail.
        let _ = writeln!(out, "{}", n);
    }
    out
}

/// Number of lines the rendered file holds, saturating at `u64::MAX`.
pub fn line_count(bounds: SequenceBounds) -> u64 {
    bounds.end.saturating_sub(bounds.start).saturating_add(1)
}

/// Byte length of the rendered file, computed from digit widths and
/// saturating at `u64::MAX`.
pub fn byte_len(bounds: SequenceBounds) -> u64 {
    let mut total = 0u64;
    let mut width = 1u32;
    let mut lo = 0u64;
    loop {
        // Numbers with `width` digits span [lo, hi].
        let hi = 10u64.checked_pow(width).map_or(u64::MAX, |p| p - 1);
        let from = bounds.start.max(lo);
        let to = bounds.end.min(hi);
        if from <= to {
            let span = (to - from).saturating_add(1);
            total = total.saturating_add(span.saturating_mul(u64::from(width) + 1));
        }
        if hi >= bounds.end {
            break;
        }
        lo = hi + 1;
        width += 1;
    }
    total
}

/// Write the sequence to `path`, replacing any previous content.
///
/// Parent directories are created; the content lands in a temp sibling first
/// and is renamed over the target.
pub fn write_sequence(path: &Path, bounds: SequenceBounds) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, render(bounds))?;
    std::fs::rename(&tmp_path, path)
}

/// Result of checking a numbers file against its expected bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Content matches exactly.
    Valid { lines: u64, bytes: u64 },
    /// File does not exist.
    Missing,
    /// Content differs; `line` is the first mismatching 1-based line.
    Mismatch { line: u64, detail: String },
}

impl std::fmt::Display for SequenceCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid { lines, bytes } => write!(f, "ok ({} lines, {} bytes)", lines, bytes),
            Self::Missing => write!(f, "missing"),
            Self::Mismatch { line, detail } => write!(f, "line {}: {}", line, detail),
        }
    }
}

/// Check a numbers file against the expected rendering.
pub fn verify_file(path: &Path, bounds: SequenceBounds) -> Result<SequenceCheck, String> {
    if !path.exists() {
        return Ok(SequenceCheck::Missing);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    Ok(check_content(&content, bounds))
}

/// Check rendered content against the expected bounds.
pub fn check_content(content: &str, bounds: SequenceBounds) -> SequenceCheck {
    let mut expected = bounds.start..=bounds.end;
    let mut line_no = 0u64;

    for raw in content.split_inclusive('\n') {
        line_no += 1;
        let Some(line) = raw.strip_suffix('\n') else {
            return SequenceCheck::Mismatch {
                line: line_no,
                detail: "missing trailing newline".to_string(),
            };
        };
        match expected.next() {
            Some(n) if line == n.to_string() => {}
            Some(n) => {
                return SequenceCheck::Mismatch {
                    line: line_no,
                    detail: format!("expected {:?}, found {:?}", n.to_string(), line),
                }
            }
            None => {
                return SequenceCheck::Mismatch {
                    line: line_no,
                    detail: format!("unexpected extra line {:?}", line),
                }
            }
        }
    }

    if let Some(n) = expected.next() {
        return SequenceCheck::Mismatch {
            line: line_no + 1,
            detail: format!("file ends before {}", n),
        };
    }

    SequenceCheck::Valid {
        lines: line_no,
        bytes: content.len() as u64,
    }
}
