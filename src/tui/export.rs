use crate::model::RunReport;
use crate::orchestrator;
use anyhow::{Context, Result};
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use super::state::UiState;

static CLIPBOARD_QUEUE: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();
const CLIPBOARD_HOLD: Duration = Duration::from_secs(2);

/// Export a report into the current directory under its default name.
/// Returns the absolute path of the exported file.
pub fn export_report_json(report: &RunReport) -> Result<std::path::PathBuf> {
    let current_dir = std::env::current_dir().context("get current directory")?;
    let path = orchestrator::default_export_path(&current_dir, report);
    orchestrator::export_json(&path, report)?;
    Ok(path)
}

/// Export the last finished run and update state.info with the outcome.
pub fn export_and_show_path(state: &mut UiState) {
    let Some(report) = state.last_report.as_ref() else {
        state.info = "No finished run to export yet.".into();
        return;
    };
    match export_report_json(report) {
        Ok(path) => {
            state.info = format!("Exported: {}", path.display());
            state.last_exported_path = Some(path.display().to_string());
        }
        Err(e) => {
            state.info = format!("Export failed: {e:#}");
        }
    }
}

/// Copy the most recent report text and update state.info.
pub fn copy_last_result(state: &mut UiState) {
    let Some(text) = state.last_result_text().map(str::to_string) else {
        state.info = "No report to copy yet.".into();
        return;
    };
    state.info = match copy_to_clipboard(&text) {
        Ok(()) => "Copied last report to clipboard".into(),
        Err(e) => format!("Clipboard error: {e:#}"),
    };
}

/// Background thread that owns the clipboard. Each text gets its own `arboard` handle,
/// held for `CLIPBOARD_HOLD` so X11/Wayland managers can take ownership of it.
fn clipboard_queue() -> &'static std_mpsc::Sender<String> {
    CLIPBOARD_QUEUE.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();
        std::thread::spawn(move || {
            for text in rx {
                let Ok(mut clipboard) = arboard::Clipboard::new() else {
                    continue;
                };
                if clipboard.set_text(text).is_ok() {
                    std::thread::sleep(CLIPBOARD_HOLD);
                }
            }
        });
        tx
    })
}

/// Queue text for the clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    clipboard_queue()
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("clipboard thread has stopped"))
}
