use crate::model::{EntryKind, RunReport, SessionEvent};
use crate::session_log::SessionLog;
use crate::subjects::Subject;
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use time::UtcOffset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    WarRoom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Identity,
    AccessKey,
}

pub struct UiState {
    pub screen: Screen,
    pub tab: usize,
    pub info: String,

    // Login form
    pub login_identity: String,
    pub login_key: String,
    pub login_field: LoginField,
    pub login_error: Option<String>,

    // Selector
    pub subjects: Vec<Subject>,
    pub selected: usize,

    pub input: String,
    /// Mirror of the session log, rebuilt from events.
    pub log: SessionLog,
    pub busy: bool,
    /// Lines scrolled up from the bottom of the log view.
    pub scroll: u16,
    pub spinner: usize,

    pub last_report: Option<RunReport>,
    pub last_exported_path: Option<String>,
    pub backend_name: String,
    pub topology: String,
    pub utc_offset: UtcOffset,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            screen: Screen::Login,
            tab: 0,
            info: String::new(),
            login_identity: String::new(),
            login_key: String::new(),
            login_field: LoginField::Identity,
            login_error: None,
            subjects: Vec::new(),
            selected: 0,
            input: String::new(),
            log: SessionLog::new(),
            busy: false,
            scroll: 0,
            spinner: 0,
            last_report: None,
            last_exported_path: None,
            backend_name: String::new(),
            topology: String::new(),
            utc_offset: UtcOffset::UTC,
        }
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Account for borders (2 chars on each side)
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;
    let first_width = usable_width.saturating_sub(label_width + 1).max(1) as usize;
    let rest_width = usable_width.saturating_sub(2).max(1) as usize;

    let value_chars: Vec<char> = value.chars().collect();
    let (head, mut remaining) = value_chars.split_at(first_width.min(value_chars.len()));
    out.push(Line::from(vec![
        Span::styled(label_text, Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::raw(head.iter().collect::<String>()),
    ]));

    while !remaining.is_empty() {
        let (line_chars, rest) = remaining.split_at(rest_width.min(remaining.len()));
        out.push(Line::from(vec![
            Span::raw("  "),
            Span::raw(line_chars.iter().collect::<String>()),
        ]));
        remaining = rest;
    }
}

/// Hard-wrap `text` to `width` columns, keeping explicit line breaks.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    for raw in text.lines() {
        let chars: Vec<char> = raw.chars().collect();
        if chars.is_empty() {
            out.push(String::new());
            continue;
        }
        out.extend(chars.chunks(width).map(|c| c.iter().collect::<String>()));
    }
    out
}

impl UiState {
    pub fn new(subjects: Vec<Subject>) -> Self {
        Self {
            subjects,
            ..Default::default()
        }
    }

    pub fn selected_subject(&self) -> Option<&Subject> {
        self.subjects.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if !self.subjects.is_empty() {
            self.selected = (self.selected + 1) % self.subjects.len();
        }
    }

    pub fn select_prev(&mut self) {
        if !self.subjects.is_empty() {
            self.selected = self
                .selected
                .checked_sub(1)
                .unwrap_or(self.subjects.len() - 1);
        }
    }

    /// Text of the most recent successful stage report.
    pub fn last_result_text(&self) -> Option<&str> {
        self.log
            .entries()
            .filter(|e| e.kind == EntryKind::Result)
            .last()
            .map(|e| e.text.as_str())
    }

    pub fn apply_event(&mut self, ev: SessionEvent) {
        match ev {
            SessionEvent::RunStarted { run, .. } => {
                self.busy = true;
                self.input.clear();
                self.scroll = 0;
                self.info = format!("Run {run} started");
            }
            ev @ (SessionEvent::EntryAppended { .. } | SessionEvent::EntryReplaced { .. }) => {
                self.log.apply(&ev);
                self.scroll = 0;
            }
            SessionEvent::RunFinished { run, status } => {
                self.busy = false;
                self.info = format!("Run {run} finished: {status:?}");
            }
            SessionEvent::Info(info) => {
                self.info = info.to_message();
            }
            SessionEvent::RunCompleted { report } => {
                self.last_report = Some(*report);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryId, InfoEvent, LogEntry, Role, RunId, RunStatus, Speaker};

    fn entry(id: u64, kind: EntryKind, text: &str) -> LogEntry {
        LogEntry {
            id: EntryId(id),
            run: RunId(1),
            speaker: Speaker::Agent(Role::Context),
            kind,
            text: text.into(),
            created_at: time::OffsetDateTime::UNIX_EPOCH,
            duration_ms: None,
        }
    }

    #[test]
    fn events_drive_busy_flag_and_mirror() {
        let mut state = UiState::new(vec![Subject::new("a", "A", "bio", &[])]);
        state.input = "go".into();

        state.apply_event(SessionEvent::RunStarted {
            run: RunId(1),
            command: "go".into(),
            subject_id: "a".into(),
        });
        assert!(state.busy);
        assert!(state.input.is_empty());

        state.apply_event(SessionEvent::EntryAppended {
            entry: entry(1, EntryKind::Placeholder, "Gathering intelligence..."),
        });
        state.apply_event(SessionEvent::EntryReplaced {
            removed: EntryId(1),
            entry: entry(2, EntryKind::Result, "context-OK"),
        });
        assert_eq!(state.log.len(), 1);
        assert_eq!(state.last_result_text(), Some("context-OK"));

        state.apply_event(SessionEvent::Info(InfoEvent::SubmissionRejected {
            reason: "a run is already in progress".into(),
        }));
        assert!(state.info.contains("already in progress"));

        state.apply_event(SessionEvent::RunFinished {
            run: RunId(1),
            status: RunStatus::Completed,
        });
        assert!(!state.busy);
    }

    #[test]
    fn selection_wraps_around() {
        let mut state = UiState::new(vec![
            Subject::new("a", "A", "bio", &[]),
            Subject::new("b", "B", "bio", &[]),
        ]);
        state.select_prev();
        assert_eq!(state.selected_subject().unwrap().id, "b");
        state.select_next();
        assert_eq!(state.selected_subject().unwrap().id, "a");
    }

    #[test]
    fn wrap_text_keeps_line_breaks() {
        assert_eq!(
            wrap_text("abcdef\n\nxy", 4),
            vec!["abcd", "ef", "", "xy"]
        );
    }

    #[test]
    fn status_values_wrap_under_their_label() {
        let mut out = Vec::new();
        push_wrapped_status_kv(&mut out, "Info", "abcdefghij", 14);
        // usable 10, label "Info:" + space leaves 4 on the first line, 8 after.
        assert_eq!(out.len(), 2);
        push_wrapped_status_kv(&mut out, "Empty", "   ", 14);
        assert_eq!(out.len(), 2);
    }
}
