//! Per-command run lifecycle.
//!
//! The controller owns the current run. It accepts one command at a time, writes the
//! command entry synchronously, then hands the run to the scheduler on its own task.

use crate::engine::{run_stages, ReportBackend, RunContext};
use crate::model::{
    EntryKind, InfoEvent, RunId, RunStatus, SessionEvent, Speaker, StageTally,
};
use crate::session_log::{LogWriter, SessionLog};
use crate::stages::StageDefinition;
use crate::subjects::Subject;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

/// Text prefix of the entry written when a run dies outside any single stage.
pub const CRITICAL_FAILURE: &str = "CRITICAL FAILURE IN OPERATION.";

#[derive(Debug, Clone)]
pub struct Run {
    pub id: RunId,
    pub command: String,
    pub subject: Subject,
    pub status: RunStatus,
    /// Set once the scheduler returns normally.
    pub tally: Option<StageTally>,
}

/// Why a submission was refused. Refusals never touch the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("a run is already in progress")]
    Busy,
    #[error("the command is empty")]
    EmptyCommand,
    #[error("no subject is selected")]
    NoSubject,
}

struct ActiveRun {
    run: Arc<Mutex<Run>>,
    handle: Option<JoinHandle<RunStatus>>,
}

pub struct SessionController {
    stages: Arc<StageDefinition>,
    backend: Arc<dyn ReportBackend>,
    writer: LogWriter,
    busy: Arc<AtomicBool>,
    next_run: u64,
    current: Option<ActiveRun>,
}

fn lock_run(run: &Mutex<Run>) -> MutexGuard<'_, Run> {
    run.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionController {
    pub fn new(
        stages: StageDefinition,
        backend: Arc<dyn ReportBackend>,
        event_tx: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            stages: Arc::new(stages),
            backend,
            writer: LogWriter::new(event_tx),
            busy: Arc::new(AtomicBool::new(false)),
            next_run: 0,
            current: None,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// True while a run is between acceptance and its terminal status.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Accept or refuse a command. Must be called from within the tokio runtime.
    pub fn submit(&mut self, command: &str, subject: Option<&Subject>) -> bool {
        self.try_submit(command, subject).is_ok()
    }

    pub fn try_submit(
        &mut self,
        command: &str,
        subject: Option<&Subject>,
    ) -> Result<RunId, Rejection> {
        if self.is_busy() {
            return Err(Rejection::Busy);
        }
        let command = command.trim();
        if command.is_empty() {
            return Err(Rejection::EmptyCommand);
        }
        let subject = subject.ok_or(Rejection::NoSubject)?.clone();

        self.next_run += 1;
        let id = RunId(self.next_run);
        self.busy.store(true, Ordering::SeqCst);

        let run = Arc::new(Mutex::new(Run {
            id,
            command: command.to_string(),
            subject: subject.clone(),
            status: RunStatus::Pending,
            tally: None,
        }));
        self.writer.emit(SessionEvent::RunStarted {
            run: id,
            command: command.to_string(),
            subject_id: subject.id.clone(),
        });
        self.writer.append(
            id,
            Speaker::User,
            EntryKind::UserCommand,
            format!("COMMAND RECEIVED: {command} for TARGET: {}", subject.name),
        );
        lock_run(&run).status = RunStatus::Running;
        info!(run = %id, subject = %subject.id, "run accepted");

        let handle = self.spawn_run(id, command.to_string(), subject, run.clone());
        self.current = Some(ActiveRun {
            run,
            handle: Some(handle),
        });
        Ok(id)
    }

    fn spawn_run(
        &self,
        id: RunId,
        command: String,
        subject: Subject,
        run: Arc<Mutex<Run>>,
    ) -> JoinHandle<RunStatus> {
        let stages = self.stages.clone();
        let backend = self.backend.clone();
        let writer = self.writer.clone();
        let busy = self.busy.clone();

        tokio::spawn(async move {
            // Stages run on their own task so a panic lands here as a JoinError.
            let stage_writer = writer.clone();
            let stage_task = tokio::spawn(async move {
                let ctx = RunContext {
                    run: id,
                    subject: &subject,
                    command: &command,
                };
                run_stages(ctx, &stages, backend.as_ref(), &stage_writer).await
            });

            let (status, tally) = match stage_task.await {
                Ok(Ok(tally)) => (RunStatus::Completed, Some(tally)),
                Ok(Err(err)) => {
                    record_fault(&writer, id, &format!("{err:#}"));
                    (RunStatus::Failed, None)
                }
                Err(err) => {
                    record_fault(&writer, id, &join_message(&err));
                    (RunStatus::Failed, None)
                }
            };

            {
                let mut run = lock_run(&run);
                run.status = status;
                run.tally = tally;
            }
            busy.store(false, Ordering::SeqCst);
            info!(run = %id, ?status, "run finished");
            writer.emit(SessionEvent::RunFinished { run: id, status });
            status
        })
    }

    pub(crate) fn active_handle_mut(&mut self) -> Option<&mut JoinHandle<RunStatus>> {
        self.current.as_mut().and_then(|c| c.handle.as_mut())
    }

    /// Record the outcome of the run task once its handle resolved.
    pub(crate) fn settle(&mut self, joined: Result<RunStatus, JoinError>) -> RunStatus {
        let Some(active) = self.current.as_mut() else {
            return RunStatus::Failed;
        };
        active.handle = None;
        match joined {
            Ok(status) => status,
            Err(err) => {
                // Only reachable if the bookkeeping task itself died.
                let id = {
                    let mut run = lock_run(&active.run);
                    run.status = RunStatus::Failed;
                    run.id
                };
                record_fault(&self.writer, id, &join_message(&err));
                self.busy.store(false, Ordering::SeqCst);
                self.writer.emit(SessionEvent::RunFinished {
                    run: id,
                    status: RunStatus::Failed,
                });
                RunStatus::Failed
            }
        }
    }

    /// Wait for the current run to reach a terminal status.
    pub async fn wait(&mut self) -> Option<RunStatus> {
        let handle = self.active_handle_mut()?;
        let joined = handle.await;
        Some(self.settle(joined))
    }

    pub fn current_run(&self) -> Option<Run> {
        self.current.as_ref().map(|c| lock_run(&c.run).clone())
    }

    /// Snapshot of the whole session log.
    pub fn log(&self) -> SessionLog {
        self.writer.snapshot()
    }

    pub(crate) fn info(&self, info: InfoEvent) {
        self.writer.info(info);
    }
}

fn record_fault(writer: &LogWriter, run: RunId, message: &str) {
    error!(%run, error = %message, "run failed outside stage isolation");
    writer.append(
        run,
        Speaker::System,
        EntryKind::Error,
        format!("{CRITICAL_FAILURE} {message}"),
    );
}

fn join_message(err: &JoinError) -> String {
    if err.is_panic() {
        "run task panicked".to_string()
    } else {
        format!("run task aborted: {err}")
    }
}
