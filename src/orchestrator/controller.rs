//! Session command loop.
//!
//! Routes UI commands into the session controller and emits events for presentation layers.

use super::post_process::process_run_completion;
use super::session::SessionController;
use crate::model::{InfoEvent, RunStatus, SessionEvent};
use crate::subjects::SubjectCatalog;
use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Submit {
        command: String,
        subject_id: Option<String>,
    },
    Quit,
}

/// Serve UI commands until `Quit`, letting the active run finish first.
pub(crate) async fn run_controller(
    mut session: SessionController,
    catalog: SubjectCatalog,
    export_json: Option<PathBuf>,
    event_tx: UnboundedSender<SessionEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut quit_pending = false;

    loop {
        tokio::select! {
            // After a quit the sender may be gone; a closed channel would win every pass.
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(UiCommand::Submit { command, subject_id }) => {
                        let subject = subject_id.as_deref().and_then(|id| catalog.get(id));
                        if let (Some(id), None) = (subject_id.as_deref(), subject) {
                            session.info(InfoEvent::SubmissionRejected {
                                reason: format!("unknown subject '{id}'"),
                            });
                            continue;
                        }
                        match session.try_submit(&command, subject) {
                            Ok(run) => debug!(%run, "command accepted"),
                            Err(rejection) => {
                                debug!(%rejection, "command rejected");
                                session.info(InfoEvent::SubmissionRejected {
                                    reason: rejection.to_string(),
                                });
                            }
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        // Runs cannot be cancelled; quitting waits for the current one.
                        quit_pending = true;
                        match session.current_run() {
                            Some(run) if session.is_busy() => {
                                session.info(InfoEvent::WaitingForRun { run: run.id });
                            }
                            _ => {
                                if session.active_handle_mut().is_none() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(h) = session.active_handle_mut() {
                    return Some(h.await);
                }
                futures::future::pending().await
            } => {
                if let Some(joined) = maybe_done {
                    let status = session.settle(joined);
                    if status == RunStatus::Failed {
                        session.info(InfoEvent::Message("Run failed".into()));
                    }
                    let processed = process_run_completion(&session, export_json.as_deref());
                    if let Some(processed) = processed {
                        for msg in processed.export_messages {
                            session.info(InfoEvent::Message(msg));
                        }
                        let _ = event_tx.send(SessionEvent::RunCompleted {
                            report: Box::new(processed.report),
                        });
                    }
                    if quit_pending {
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::StubBackend;
    use crate::model::Role;
    use crate::stages::StageDefinition;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{mpsc, Semaphore};

    fn spawn_controller(
        backend: StubBackend,
    ) -> (
        UnboundedSender<UiCommand>,
        UnboundedReceiver<SessionEvent>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let session = SessionController::new(
            StageDefinition::reference(),
            Arc::new(backend),
            event_tx.clone(),
        );
        let handle = tokio::spawn(run_controller(
            session,
            SubjectCatalog::builtin(),
            None,
            event_tx,
            cmd_rx,
        ));
        (cmd_tx, event_rx, handle)
    }

    async fn drain(mut rx: UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn quit_waits_for_the_active_run_and_reports_it() {
        let (cmd_tx, rx, handle) = spawn_controller(StubBackend::ok().failing(Role::Risk));
        let subject_id = SubjectCatalog::builtin().iter().next().unwrap().id.clone();
        cmd_tx
            .send(UiCommand::Submit {
                command: "raise awareness".into(),
                subject_id: Some(subject_id.clone()),
            })
            .unwrap();
        cmd_tx.send(UiCommand::Quit).unwrap();

        handle.await.unwrap().unwrap();
        let events = drain(rx).await;

        let report = events
            .iter()
            .find_map(|ev| match ev {
                SessionEvent::RunCompleted { report } => Some(report.clone()),
                _ => None,
            })
            .expect("no report emitted");
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.subject_id, subject_id);
        assert_eq!(report.tally.failed, vec![Role::Risk]);
        let finished = events
            .iter()
            .position(|ev| matches!(ev, SessionEvent::RunFinished { .. }))
            .unwrap();
        let completed = events
            .iter()
            .position(|ev| matches!(ev, SessionEvent::RunCompleted { .. }))
            .unwrap();
        assert!(finished < completed);
    }

    #[tokio::test]
    async fn closed_command_channel_after_quit_waits_quietly() {
        let gate = Arc::new(Semaphore::new(0));
        let (cmd_tx, mut rx, handle) = spawn_controller(StubBackend::ok().with_gate(gate.clone()));
        let subject_id = SubjectCatalog::builtin().iter().next().unwrap().id.clone();
        cmd_tx
            .send(UiCommand::Submit {
                command: "hold".into(),
                subject_id: Some(subject_id),
            })
            .unwrap();
        cmd_tx.send(UiCommand::Quit).unwrap();
        drop(cmd_tx);

        // Wait until the quit was seen, then keep the run held for a while.
        loop {
            let ev = rx.recv().await.expect("controller stopped early");
            if matches!(ev, SessionEvent::Info(InfoEvent::WaitingForRun { .. })) {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!handle.is_finished());

        gate.add_permits(16);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("controller did not stop after the run")
            .unwrap()
            .unwrap();

        let events = drain(rx).await;
        let waiting = events
            .iter()
            .filter(|ev| matches!(ev, SessionEvent::Info(InfoEvent::WaitingForRun { .. })))
            .count();
        assert_eq!(waiting, 0, "WaitingForRun repeated while the run was held");
        assert!(events
            .iter()
            .any(|ev| matches!(ev, SessionEvent::RunCompleted { .. })));
    }

    #[tokio::test]
    async fn unknown_or_missing_subject_is_reported_as_a_rejection() {
        let (cmd_tx, rx, handle) = spawn_controller(StubBackend::ok());
        cmd_tx
            .send(UiCommand::Submit {
                command: "go".into(),
                subject_id: Some("nobody".into()),
            })
            .unwrap();
        cmd_tx
            .send(UiCommand::Submit {
                command: "go".into(),
                subject_id: None,
            })
            .unwrap();
        cmd_tx.send(UiCommand::Quit).unwrap();

        handle.await.unwrap().unwrap();
        let reasons: Vec<String> = drain(rx)
            .await
            .into_iter()
            .filter_map(|ev| match ev {
                SessionEvent::Info(InfoEvent::SubmissionRejected { reason }) => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(
            reasons,
            vec!["unknown subject 'nobody'".to_string(), "no subject is selected".to_string()]
        );
    }
}
