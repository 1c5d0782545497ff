//! Text summary builder for CLI output.
//!
//! This module computes stage timing metrics and formats human-readable lines for text mode.

use crate::metrics;
use crate::model::{EntryKind, Role, RunReport};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn role_list(roles: &[Role]) -> String {
    if roles.is_empty() {
        return "-".into();
    }
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build a text summary from a finished run's report.
pub(crate) fn build_text_summary(report: &RunReport) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!(
        "Run {}: {:?} / target {} / backend {}",
        report.run, report.status, report.subject_name, report.backend
    ));
    lines.push(format!("Command: {}", report.command));
    lines.push(format!(
        "Stages: completed {} / failed {} / skipped {}",
        role_list(&report.tally.completed),
        role_list(&report.tally.failed),
        role_list(&report.tally.skipped)
    ));

    let durations = metrics::stage_durations_ms(&report.entries);
    if let Some((mean, median, p25, p75)) = metrics::compute_metrics(&durations) {
        lines.push(format!(
            "Stage time: avg {:.0} med {:.0} p25 {:.0} p75 {:.0} ms",
            mean, median, p25, p75
        ));
    }

    for entry in report.entries.iter().filter(|e| e.is_terminal()) {
        lines.push(String::new());
        let marker = match entry.kind {
            EntryKind::Error => " [ERROR]",
            _ => "",
        };
        match entry.duration_ms {
            Some(ms) => lines.push(format!(
                "== {}{marker} ({:.1}s) ==",
                entry.speaker.label(),
                ms as f64 / 1000.0
            )),
            None => lines.push(format!("== {}{marker} ==", entry.speaker.label())),
        }
        lines.extend(entry.text.lines().map(str::to_string));
    }

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryId, LogEntry, RunId, RunStatus, Speaker, StageTally};

    fn entry(id: u64, speaker: Speaker, kind: EntryKind, text: &str, ms: Option<u64>) -> LogEntry {
        LogEntry {
            id: EntryId(id),
            run: RunId(1),
            speaker,
            kind,
            text: text.into(),
            created_at: time::OffsetDateTime::UNIX_EPOCH,
            duration_ms: ms,
        }
    }

    #[test]
    fn summary_lists_outcomes_and_terminal_entries() {
        let report = RunReport {
            run: RunId(1),
            timestamp_utc: "2024-05-01T12:00:00Z".into(),
            command: "go".into(),
            subject_id: "x".into(),
            subject_name: "X".into(),
            backend: "offline".into(),
            status: RunStatus::Completed,
            tally: StageTally {
                completed: vec![Role::Context],
                failed: vec![Role::Strategy],
                skipped: vec![Role::Creative],
            },
            entries: vec![
                entry(1, Speaker::User, EntryKind::UserCommand, "COMMAND RECEIVED: go", None),
                entry(
                    4,
                    Speaker::Agent(Role::Context),
                    EntryKind::Result,
                    "line one\nline two",
                    Some(1500),
                ),
                entry(
                    5,
                    Speaker::Agent(Role::Strategy),
                    EntryKind::Error,
                    "G3 - Strategy offline",
                    Some(500),
                ),
            ],
        };

        let lines = build_text_summary(&report).lines;
        assert_eq!(lines[0], "Run #1: Completed / target X / backend offline");
        assert_eq!(lines[2], "Stages: completed context / failed strategy / skipped creative");
        assert_eq!(lines[3], "Stage time: avg 1000 med 1500 p25 500 p75 1500 ms");
        assert!(lines.contains(&"== G2 - Context (1.5s) ==".to_string()));
        assert!(lines.contains(&"== G3 - Strategy [ERROR] (0.5s) ==".to_string()));
        assert!(lines.contains(&"line two".to_string()));
        assert!(!lines.iter().any(|l| l.contains("COMMAND RECEIVED")));
    }
}
