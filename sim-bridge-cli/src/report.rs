//! Report generation
//!
//! Renders the callback transcript as a text summary or JSON.

use crate::callbacks::CallbackRecord;
use anyhow::{Context, Result};
use sim_bridge::CallbackKind;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const KINDS: [CallbackKind; 6] = [
    CallbackKind::Plot,
    CallbackKind::Write,
    CallbackKind::InitControls,
    CallbackKind::CheckControls,
    CallbackKind::StepControls,
    CallbackKind::Event,
];

/// Text summary: counts per callback kind, then the transcript
pub fn render_summary(session: &str, records: &[CallbackRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Session: {}", session);
    let _ = writeln!(out, "Callbacks received: {}", records.len());
    let _ = writeln!(out);

    for kind in KINDS {
        let count = records.iter().filter(|r| r.kind == kind).count();
        let _ = writeln!(out, "  {:<16}{:>6}", kind.to_string(), count);
    }

    if !records.is_empty() {
        let _ = writeln!(out);
        for record in records {
            let _ = write!(out, "  {} {}", record.at.format("%H:%M:%S%.3f"), record.kind);
            if !record.detail.is_empty() {
                let _ = write!(out, "  {}", record.detail);
            }
            let _ = writeln!(out);
        }
    }

    out
}

/// Write the transcript as pretty-printed JSON
pub fn write_json(path: &Path, records: &[CallbackRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records).context("Failed to serialize transcript")?;
    fs::write(path, json).with_context(|| format!("Failed to write report: {:?}", path))?;
    log::info!("Transcript written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(kind: CallbackKind, detail: &str) -> CallbackRecord {
        CallbackRecord {
            at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            kind,
            detail: detail.to_string(),
        }
    }

    #[test]
    fn test_summary_counts() {
        let records = vec![
            record(CallbackKind::InitControls, ""),
            record(CallbackKind::CheckControls, ""),
            record(CallbackKind::CheckControls, ""),
            record(CallbackKind::Plot, "Profile plot"),
        ];

        let summary = render_summary("ieee13", &records);
        assert!(summary.starts_with("Session: ieee13\nCallbacks received: 4\n"));
        assert!(summary.contains("  check-controls       2\n"));
        assert!(summary.contains("  event                0\n"));
        assert!(summary.contains("12:30:00.000 plot  Profile plot\n"));
    }

    #[test]
    fn test_json_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.json");
        write_json(&path, &[record(CallbackKind::Event, "clear (step 0)")]).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["kind"], "event");
        assert_eq!(value[0]["detail"], "clear (step 0)");
    }
}
