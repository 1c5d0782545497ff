//! Append-only session log.
//!
//! Entries are ordered by the time they reached their final form: a placeholder is
//! removed and its Result/Error appended at the end in a single update, so within a run
//! the order is completion order. Only placeholders are ever removed.

use crate::model::{EntryId, EntryKind, InfoEvent, LogEntry, RunId, SessionEvent, Speaker};
use anyhow::{bail, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Default, Clone)]
pub struct SessionLog {
    entries: Vec<LogEntry>,
    next_id: u64,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> EntryId {
        self.next_id += 1;
        EntryId(self.next_id)
    }

    pub fn append(
        &mut self,
        run: RunId,
        speaker: Speaker,
        kind: EntryKind,
        text: impl Into<String>,
    ) -> LogEntry {
        let entry = LogEntry {
            id: self.allocate_id(),
            run,
            speaker,
            kind,
            text: text.into(),
            created_at: OffsetDateTime::now_utc(),
            duration_ms: None,
        };
        self.entries.push(entry.clone());
        entry
    }

    /// Remove a placeholder and append its terminal entry at the end of the log.
    pub fn replace_placeholder(
        &mut self,
        placeholder: EntryId,
        kind: EntryKind,
        text: impl Into<String>,
        elapsed: Option<Duration>,
    ) -> Result<LogEntry> {
        if !kind.is_terminal() {
            bail!("placeholder {} can only be replaced by a result or an error", placeholder.0);
        }
        let Some(pos) = self.entries.iter().position(|e| e.id == placeholder) else {
            bail!("placeholder {} is not in the log", placeholder.0);
        };
        if self.entries[pos].kind != EntryKind::Placeholder {
            bail!(
                "entry {} is a {:?}, not a placeholder",
                placeholder.0,
                self.entries[pos].kind
            );
        }
        let removed = self.entries.remove(pos);
        let entry = LogEntry {
            id: self.allocate_id(),
            run: removed.run,
            speaker: removed.speaker,
            kind,
            text: text.into(),
            created_at: OffsetDateTime::now_utc(),
            duration_ms: elapsed.map(|d| d.as_millis() as u64),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Restartable view over every entry, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> + '_ {
        self.entries.iter()
    }

    pub fn entries_for(&self, run: RunId) -> impl Iterator<Item = &LogEntry> + '_ {
        self.entries.iter().filter(move |e| e.run == run)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replay an event from another log, keeping this one as a mirror.
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::EntryAppended { entry } => {
                self.next_id = self.next_id.max(entry.id.0);
                self.entries.push(entry.clone());
            }
            SessionEvent::EntryReplaced { removed, entry } => {
                self.entries.retain(|e| e.id != *removed);
                self.next_id = self.next_id.max(entry.id.0);
                self.entries.push(entry.clone());
            }
            _ => {}
        }
    }
}

/// Shared handle through which runs mutate the log and notify observers.
///
/// Every mutation sends its event while the lock is held, so observers see events in
/// the same order the log changed.
#[derive(Clone)]
pub struct LogWriter {
    log: Arc<Mutex<SessionLog>>,
    event_tx: UnboundedSender<SessionEvent>,
}

impl LogWriter {
    pub fn new(event_tx: UnboundedSender<SessionEvent>) -> Self {
        Self {
            log: Arc::new(Mutex::new(SessionLog::new())),
            event_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionLog> {
        // A panicking run must not take the whole session log down with it.
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(
        &self,
        run: RunId,
        speaker: Speaker,
        kind: EntryKind,
        text: impl Into<String>,
    ) -> EntryId {
        let mut log = self.lock();
        let entry = log.append(run, speaker, kind, text);
        let id = entry.id;
        let _ = self.event_tx.send(SessionEvent::EntryAppended { entry });
        id
    }

    pub fn replace_placeholder(
        &self,
        placeholder: EntryId,
        kind: EntryKind,
        text: impl Into<String>,
        elapsed: Option<Duration>,
    ) -> Result<EntryId> {
        let mut log = self.lock();
        let entry = log.replace_placeholder(placeholder, kind, text, elapsed)?;
        let id = entry.id;
        let _ = self.event_tx.send(SessionEvent::EntryReplaced {
            removed: placeholder,
            entry,
        });
        Ok(id)
    }

    pub fn emit(&self, event: SessionEvent) {
        let _guard = self.lock();
        let _ = self.event_tx.send(event);
    }

    pub fn info(&self, info: InfoEvent) {
        self.emit(SessionEvent::Info(info));
    }

    pub fn snapshot(&self) -> SessionLog {
        self.lock().clone()
    }

    pub fn entries_for(&self, run: RunId) -> Vec<LogEntry> {
        self.lock().entries_for(run).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use tokio::sync::mpsc;

    fn kinds(log: &SessionLog) -> Vec<EntryKind> {
        log.entries().map(|e| e.kind).collect()
    }

    #[test]
    fn replacement_moves_terminal_entry_to_the_end() {
        let mut log = SessionLog::new();
        let run = RunId(1);
        log.append(run, Speaker::User, EntryKind::UserCommand, "go");
        let first = log.append(run, Speaker::Agent(Role::Strategy), EntryKind::Placeholder, "…");
        let second = log.append(run, Speaker::Agent(Role::Risk), EntryKind::Placeholder, "…");

        log.replace_placeholder(second.id, EntryKind::Result, "risk-OK", None)
            .unwrap();
        log.replace_placeholder(first.id, EntryKind::Result, "strategy-OK", None)
            .unwrap();

        let texts: Vec<&str> = log.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["go", "risk-OK", "strategy-OK"]);
        assert!(log.entries().all(|e| e.id != first.id && e.id != second.id));
    }

    #[test]
    fn terminal_entries_keep_speaker_and_get_fresh_ids() {
        let mut log = SessionLog::new();
        let ph = log.append(RunId(3), Speaker::Agent(Role::Context), EntryKind::Placeholder, "…");
        let done = log
            .replace_placeholder(
                ph.id,
                EntryKind::Error,
                "G2 - Context offline",
                Some(Duration::from_millis(1200)),
            )
            .unwrap();
        assert_eq!(done.speaker, Speaker::Agent(Role::Context));
        assert_eq!(done.run, RunId(3));
        assert_ne!(done.id, ph.id);
        assert_eq!(done.duration_ms, Some(1200));
    }

    #[test]
    fn only_placeholders_can_be_replaced() {
        let mut log = SessionLog::new();
        let cmd = log.append(RunId(1), Speaker::User, EntryKind::UserCommand, "go");
        assert!(log
            .replace_placeholder(cmd.id, EntryKind::Result, "x", None)
            .is_err());
        assert!(log
            .replace_placeholder(EntryId(99), EntryKind::Result, "x", None)
            .is_err());

        let ph = log.append(RunId(1), Speaker::Agent(Role::Risk), EntryKind::Placeholder, "…");
        assert!(log
            .replace_placeholder(ph.id, EntryKind::Placeholder, "again", None)
            .is_err());
        assert_eq!(kinds(&log), vec![EntryKind::UserCommand, EntryKind::Placeholder]);
    }

    #[test]
    fn entries_for_filters_by_run() {
        let mut log = SessionLog::new();
        log.append(RunId(1), Speaker::User, EntryKind::UserCommand, "one");
        log.append(RunId(2), Speaker::User, EntryKind::UserCommand, "two");
        let run2: Vec<&str> = log.entries_for(RunId(2)).map(|e| e.text.as_str()).collect();
        assert_eq!(run2, vec!["two"]);
    }

    #[test]
    fn mirror_follows_writer_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let writer = LogWriter::new(tx);
        let run = RunId(1);
        writer.append(run, Speaker::User, EntryKind::UserCommand, "go");
        let ph = writer.append(run, Speaker::Agent(Role::Context), EntryKind::Placeholder, "…");
        writer
            .replace_placeholder(ph, EntryKind::Result, "context-OK", None)
            .unwrap();

        let mut mirror = SessionLog::new();
        let mut replaced = 0;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, SessionEvent::EntryReplaced { .. }) {
                replaced += 1;
            }
            mirror.apply(&ev);
        }
        assert_eq!(replaced, 1);
        let source = writer.snapshot();
        assert_eq!(
            mirror.entries().collect::<Vec<_>>(),
            source.entries().collect::<Vec<_>>()
        );
    }
}
