//! Post-run processing utilities.
//!
//! Turns a finished run into a `RunReport` and handles the optional JSON export.

use super::session::{Run, SessionController};
use crate::model::RunReport;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub report: RunReport,
    pub export_messages: Vec<String>,
}

/// Snapshot the run's entries and outcome into a report.
pub(crate) fn build_report(run: &Run, session: &SessionController) -> RunReport {
    let log = session.log();
    debug!(run = %run.id, session_entries = log.len(), "building report");
    RunReport {
        run: run.id,
        timestamp_utc: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into()),
        command: run.command.clone(),
        subject_id: run.subject.id.clone(),
        subject_name: run.subject.name.clone(),
        backend: session.backend_name().to_string(),
        status: run.status,
        tally: run.tally.clone().unwrap_or_default(),
        entries: log.entries_for(run.id).cloned().collect(),
    }
}

/// Build the report for the current run and write it to `export_path` when one is set.
pub(crate) fn process_run_completion(
    session: &SessionController,
    export_path: Option<&Path>,
) -> Option<ProcessedRun> {
    let run = session.current_run().filter(|run| run.status.is_terminal())?;
    let report = build_report(&run, session);

    let mut export_messages = Vec::new();
    if let Some(path) = export_path {
        match export_json(path, &report) {
            Ok(()) => export_messages.push(format!("Exported JSON: {}", path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    Some(ProcessedRun {
        report,
        export_messages,
    })
}

pub(crate) fn export_json(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let data = serde_json::to_vec_pretty(report).context("serialize run report")?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Default export file name for a report, placed in `dir`.
pub(crate) fn default_export_path(dir: &Path, report: &RunReport) -> PathBuf {
    let stamp = report.timestamp_utc.replace(':', "-").replace('T', "_");
    dir.join(format!(
        "lechuza-run{}-{}-{}.json",
        report.run.0, report.subject_id, stamp
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::StubBackend;
    use crate::model::{EntryKind, RunStatus, SessionEvent};
    use crate::stages::StageDefinition;
    use crate::subjects::Subject;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Semaphore};

    #[tokio::test]
    async fn finished_run_is_exported_as_json() {
        let (tx, _rx) = mpsc::unbounded_channel::<SessionEvent>();
        let mut session =
            SessionController::new(StageDefinition::linear(), Arc::new(StubBackend::ok()), tx);
        let subject = Subject::new("max-raphael", "Max RAPHAEL", "Art historian.", &[]);
        session.submit("go", Some(&subject));
        session.wait().await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run.json");
        let processed = process_run_completion(&session, Some(&path)).unwrap();
        assert_eq!(processed.report.status, RunStatus::Completed);
        assert_eq!(processed.report.backend, "stub");
        assert_eq!(processed.report.entries.len(), 5);
        assert_eq!(processed.export_messages.len(), 1);
        assert!(processed.export_messages[0].starts_with("Exported JSON"));

        let back: RunReport = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back.subject_id, "max-raphael");
        assert_eq!(back.entries[0].kind, EntryKind::UserCommand);
        assert_eq!(back.tally.completed.len(), 4);

        let default = default_export_path(dir.path(), &back);
        let name = default.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("lechuza-run1-max-raphael-"));
        assert!(!name.contains(':'));
    }

    #[tokio::test]
    async fn run_in_progress_has_no_report_yet() {
        let (tx, _rx) = mpsc::unbounded_channel::<SessionEvent>();
        let gate = Arc::new(Semaphore::new(0));
        let backend = StubBackend::ok().with_gate(gate.clone());
        let mut session = SessionController::new(StageDefinition::linear(), Arc::new(backend), tx);
        let subject = Subject::new("max-raphael", "Max RAPHAEL", "Art historian.", &[]);
        session.submit("go", Some(&subject));

        assert!(process_run_completion(&session, None).is_none());

        gate.add_permits(8);
        session.wait().await;
        assert!(process_run_completion(&session, None).is_some());
    }
}
