//! CS-015: Append-only JSONL boot event log.

use crate::core::types::{BootEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current UTC time as ISO 8601 with second precision.
pub fn now_iso8601() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

/// Generate a boot run ID.
pub fn generate_run_id() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .unsigned_abs();
    format!("b-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Event log location inside a state directory.
pub fn event_log_path(state_dir: &Path) -> PathBuf {
    state_dir.join("events.jsonl")
}

/// Append an event to the log, creating the state directory if needed.
pub fn append_event(state_dir: &Path, event: BootEvent) -> Result<(), String> {
    let path = event_log_path(state_dir);
    std::fs::create_dir_all(state_dir).map_err(|e| format!("cannot create state dir: {}", e))?;

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;

    writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))?;

    Ok(())
}

/// Read every event in the log. A missing log is empty.
pub fn read_events(state_dir: &Path) -> Result<Vec<TimestampedEvent>, String> {
    let path = event_log_path(state_dir);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(format!("cannot read {}: {}", path.display(), e)),
    };
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| format!("{} line {}: {}", path.display(), i + 1, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BootStep;

    #[test]
    fn test_cs015_now_iso8601() {
        let ts = now_iso8601();
        assert!(ts.starts_with("20"));
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), 20);
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn test_cs015_generate_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("b-"));
        assert_eq!(id.len(), 14);
    }

    #[test]
    fn test_cs015_event_log_path() {
        let p = event_log_path(Path::new("/var/lib/cloudstrap"));
        assert_eq!(p, PathBuf::from("/var/lib/cloudstrap/events.jsonl"));
    }

    #[test]
    fn test_cs015_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");
        append_event(
            &state,
            BootEvent::BootStarted {
                run_id: "b-abc".to_string(),
                cloudstrap_version: "0.3.0".to_string(),
            },
        )
        .unwrap();
        append_event(
            &state,
            BootEvent::StepFailed {
                step: BootStep::Volume,
                error: "no device".to_string(),
            },
        )
        .unwrap();

        let content = std::fs::read_to_string(state.join("events.jsonl")).unwrap();
        assert!(content.contains("\"event\":\"boot_started\""));
        assert!(content.contains("b-abc"));

        let events = read_events(&state).unwrap();
        assert_eq!(events.len(), 2);
        match &events[1].event {
            BootEvent::StepFailed { step, error } => {
                assert_eq!(*step, BootStep::Volume);
                assert_eq!(error, "no device");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_cs015_read_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_events(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_cs015_read_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("events.jsonl"), "not json\n").unwrap();
        let err = read_events(dir.path()).unwrap_err();
        assert!(err.contains("line 1"));
    }
}
