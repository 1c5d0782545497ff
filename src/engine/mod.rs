//! Run scheduler.
//!
//! Walks a [`StageDefinition`] for one run: every stage whose dependencies are all done is
//! launched at once, its placeholder goes into the session log, and the placeholder is
//! swapped for a result or error entry when the backend call settles. A failed stage only
//! stops its own dependents.

mod backend;
mod gemini;
mod offline;
mod prompts;
#[cfg(test)]
pub(crate) mod testing;

pub use backend::{BackendError, CampaignPlanner, ReportBackend, ReportRequest};
pub use gemini::GeminiBackend;
pub use offline::OfflineBackend;

use crate::model::{BackendConfig, EntryKind, InfoEvent, Role, RunId, Speaker, StageTally};
use crate::session_log::LogWriter;
use crate::stages::StageDefinition;
use crate::subjects::Subject;
use anyhow::{bail, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-run inputs shared by every stage.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub run: RunId,
    pub subject: &'a Subject,
    pub command: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    NotStarted,
    InFlight,
    Done,
    Failed,
}

/// Build the backend selected by the configuration.
pub fn build_backend(cfg: &BackendConfig) -> Result<Arc<dyn ReportBackend>> {
    if cfg.offline {
        let backend = OfflineBackend::new(cfg.offline_latency)
            .with_failures(cfg.offline_fail_roles.iter().copied());
        return Ok(Arc::new(backend));
    }
    Ok(Arc::new(GeminiBackend::new(cfg)?))
}

/// Build the planner behind `--matrix`, using the same backend selection.
pub fn build_planner(cfg: &BackendConfig) -> Result<Arc<dyn CampaignPlanner>> {
    if cfg.offline {
        return Ok(Arc::new(OfflineBackend::new(cfg.offline_latency)));
    }
    Ok(Arc::new(GeminiBackend::new(cfg)?))
}

/// Drive every stage of `definition` for one run.
///
/// Stage failures, including a panicking backend call, become Error entries and never
/// surface as `Err`. An `Err` means the run
/// itself could not continue (invalid definition, log inconsistency).
pub async fn run_stages(
    ctx: RunContext<'_>,
    definition: &StageDefinition,
    backend: &dyn ReportBackend,
    writer: &LogWriter,
) -> Result<StageTally> {
    definition.validate()?;

    let mut states: BTreeMap<Role, StageState> = definition
        .roles()
        .map(|role| (role, StageState::NotStarted))
        .collect();
    let mut outputs: HashMap<Role, String> = HashMap::new();
    let mut tally = StageTally::default();
    let mut in_flight = FuturesUnordered::new();

    loop {
        // Launch in declaration order so simultaneous placeholders line up predictably.
        for spec in definition.specs() {
            if states.get(&spec.role) != Some(&StageState::NotStarted) {
                continue;
            }
            let ready = spec
                .depends_on
                .iter()
                .all(|dep| states.get(dep) == Some(&StageState::Done));
            if !ready {
                continue;
            }

            let role = spec.role;
            let placeholder = writer.append(
                ctx.run,
                Speaker::Agent(role),
                EntryKind::Placeholder,
                role.placeholder_text(),
            );
            states.insert(role, StageState::InFlight);
            let context: Vec<String> = spec
                .depends_on
                .iter()
                .filter_map(|dep| outputs.get(dep).cloned())
                .collect();
            debug!(run = %ctx.run, %role, inputs = context.len(), "stage started");

            in_flight.push(async move {
                let started = Instant::now();
                let call = backend.generate(ReportRequest {
                    role,
                    subject: ctx.subject,
                    command: ctx.command,
                    context: &context,
                });
                // A panicking backend call fails its own stage, not the run.
                let result = match AssertUnwindSafe(call).catch_unwind().await {
                    Ok(Ok(text)) => Ok(text),
                    Ok(Err(err)) => Err(err.to_string()),
                    Err(payload) => Err(format!("backend panicked: {}", panic_message(&*payload))),
                };
                (role, placeholder, started.elapsed(), result)
            });
        }

        let Some((role, placeholder, elapsed, result)) = in_flight.next().await else {
            break;
        };

        match result {
            Ok(text) => {
                writer.replace_placeholder(
                    placeholder,
                    EntryKind::Result,
                    text.as_str(),
                    Some(elapsed),
                )?;
                info!(run = %ctx.run, %role, elapsed_ms = elapsed.as_millis() as u64, "stage done");
                outputs.insert(role, text);
                states.insert(role, StageState::Done);
                tally.completed.push(role);
            }
            Err(err) => {
                warn!(run = %ctx.run, %role, error = %err, "stage failed");
                writer.replace_placeholder(
                    placeholder,
                    EntryKind::Error,
                    format!("{} offline: {err}", role.display_name()),
                    Some(elapsed),
                )?;
                states.insert(role, StageState::Failed);
                tally.failed.push(role);
            }
        }
    }

    for spec in definition.specs() {
        if states.get(&spec.role) != Some(&StageState::NotStarted) {
            continue;
        }
        let blocked = spec
            .depends_on
            .iter()
            .any(|dep| states.get(dep) == Some(&StageState::Failed));
        if !blocked {
            bail!("stage '{}' was never started", spec.role);
        }
        debug!(run = %ctx.run, role = %spec.role, "stage skipped");
        writer.info(InfoEvent::StageSkipped { role: spec.role });
        tally.skipped.push(spec.role);
    }

    Ok(tally)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubBackend;
    use super::*;
    use crate::model::{EntryId, LogEntry, SessionEvent};
    use crate::stages::StageSpec;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tokio::sync::{mpsc, Barrier};

    fn subject() -> Subject {
        Subject::new("louise-alcan", "Louise ALCAN", "Publisher.", &["Publishing"])
    }

    async fn run_with(
        definition: &StageDefinition,
        backend: &StubBackend,
    ) -> (Result<StageTally>, Vec<LogEntry>, Vec<SessionEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let writer = LogWriter::new(tx);
        let subject = subject();
        let run = RunId(1);
        writer.append(run, Speaker::User, EntryKind::UserCommand, "COMMAND RECEIVED: go");
        let tally = run_stages(
            RunContext {
                run,
                subject: &subject,
                command: "go",
            },
            definition,
            backend,
            &writer,
        )
        .await;
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        (tally, writer.entries_for(run), events)
    }

    fn position(entries: &[LogEntry], role: Role) -> usize {
        entries
            .iter()
            .position(|e| e.role() == Some(role))
            .unwrap_or_else(|| panic!("no entry for {role}"))
    }

    #[tokio::test]
    async fn reference_dag_completes_every_role() {
        let backend = StubBackend::ok();
        let (tally, entries, _) = run_with(&StageDefinition::reference(), &backend).await;
        let tally = tally.unwrap();

        assert_eq!(tally.completed.len(), 4);
        assert!(tally.failed.is_empty() && tally.skipped.is_empty());
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].kind, EntryKind::UserCommand);
        assert!(entries[1..].iter().all(|e| e.kind == EntryKind::Result));

        let roles: BTreeSet<Role> = entries[1..].iter().filter_map(LogEntry::role).collect();
        assert_eq!(roles, Role::ALL.into_iter().collect());
        for entry in &entries[1..] {
            let role = entry.role().unwrap();
            assert_eq!(entry.text, format!("{role}-OK"));
            assert!(entry.duration_ms.is_some());
        }

        let creative = position(&entries, Role::Creative);
        assert!(creative > position(&entries, Role::Context));
        assert!(creative > position(&entries, Role::Strategy));
    }

    #[tokio::test]
    async fn failed_stage_stops_only_its_dependents() {
        let backend = StubBackend::ok().failing(Role::Strategy);
        let (tally, entries, events) = run_with(&StageDefinition::reference(), &backend).await;
        let tally = tally.unwrap();

        assert_eq!(backend.calls_for(Role::Creative), 0);
        assert_eq!(tally.failed, vec![Role::Strategy]);
        assert_eq!(tally.skipped, vec![Role::Creative]);

        let context = &entries[position(&entries, Role::Context)];
        let risk = &entries[position(&entries, Role::Risk)];
        let strategy = &entries[position(&entries, Role::Strategy)];
        assert_eq!(context.kind, EntryKind::Result);
        assert_eq!(risk.kind, EntryKind::Result);
        assert_eq!(strategy.kind, EntryKind::Error);
        assert!(strategy.text.starts_with("G3 - Strategy offline"));
        assert!(entries.iter().all(|e| e.role() != Some(Role::Creative)));

        assert!(events.iter().any(|ev| matches!(
            ev,
            SessionEvent::Info(InfoEvent::StageSkipped { role: Role::Creative })
        )));
    }

    #[tokio::test]
    async fn independent_stages_are_in_flight_together() {
        // Strategy and risk each wait for the other; a sequential scheduler would hang.
        let barrier = Arc::new(Barrier::new(2));
        let backend = StubBackend::ok().with_barrier(&[Role::Strategy, Role::Risk], barrier);
        let definition = StageDefinition::reference();

        let (tally, _, _) = tokio::time::timeout(
            Duration::from_secs(5),
            run_with(&definition, &backend),
        )
        .await
        .expect("strategy and risk were not invoked concurrently");
        assert_eq!(tally.unwrap().completed.len(), 4);
    }

    #[tokio::test]
    async fn dependents_receive_outputs_in_declared_order() {
        let backend = StubBackend::ok();
        run_with(&StageDefinition::reference(), &backend).await.0.unwrap();

        let calls = backend.calls();
        let (_, creative_ctx) = calls.iter().find(|(r, _)| *r == Role::Creative).unwrap();
        assert_eq!(creative_ctx, &vec!["context-OK".to_string(), "strategy-OK".to_string()]);
        let (_, context_ctx) = calls.iter().find(|(r, _)| *r == Role::Context).unwrap();
        assert!(context_ctx.is_empty());
    }

    #[tokio::test]
    async fn every_placeholder_is_replaced_exactly_once() {
        let backend = StubBackend::ok().failing(Role::Risk);
        let (_, entries, events) = run_with(&StageDefinition::reference(), &backend).await;

        let mut open: BTreeMap<EntryId, Role> = BTreeMap::new();
        let mut started = BTreeSet::new();
        for ev in &events {
            match ev {
                SessionEvent::EntryAppended { entry } if entry.kind == EntryKind::Placeholder => {
                    let role = entry.role().unwrap();
                    assert!(started.insert(role), "{role} started twice");
                    open.insert(entry.id, role);
                }
                SessionEvent::EntryReplaced { removed, entry } => {
                    let role = open.remove(removed).expect("replaced an unknown placeholder");
                    assert_eq!(entry.role(), Some(role));
                    assert!(entry.is_terminal());
                }
                _ => {}
            }
        }
        assert!(open.is_empty());
        assert_eq!(started.len(), 4);
        assert!(entries.iter().all(|e| e.kind != EntryKind::Placeholder));
        for role in Role::ALL {
            let terminal = entries.iter().filter(|e| e.role() == Some(role)).count();
            assert_eq!(terminal, 1, "{role}");
        }
    }

    #[tokio::test]
    async fn panicking_stage_fails_alone() {
        let backend = StubBackend::ok().panicking(Role::Strategy);
        let (tally, entries, _) = run_with(&StageDefinition::reference(), &backend).await;
        let tally = tally.unwrap();

        assert_eq!(tally.failed, vec![Role::Strategy]);
        assert_eq!(tally.skipped, vec![Role::Creative]);
        assert_eq!(entries[position(&entries, Role::Risk)].kind, EntryKind::Result);
        let strategy = &entries[position(&entries, Role::Strategy)];
        assert_eq!(strategy.kind, EntryKind::Error);
        assert!(strategy.text.contains("backend panicked: stub backend exploded"));
        assert!(entries.iter().all(|e| e.kind != EntryKind::Placeholder));
        assert!(entries.iter().all(|e| e.speaker != Speaker::System));
    }

    #[tokio::test]
    async fn linear_topology_runs_in_chain_order() {
        let backend = StubBackend::ok();
        let (tally, entries, _) = run_with(&StageDefinition::linear(), &backend).await;
        assert_eq!(
            tally.unwrap().completed,
            vec![Role::Context, Role::Strategy, Role::Risk, Role::Creative]
        );
        let roles: Vec<Role> = entries.iter().filter_map(LogEntry::role).collect();
        assert_eq!(roles, vec![Role::Context, Role::Strategy, Role::Risk, Role::Creative]);
    }

    #[tokio::test]
    async fn failing_root_skips_the_whole_fan_out() {
        let backend = StubBackend::ok().failing(Role::Context);
        let (tally, entries, _) = run_with(&StageDefinition::fan_out(), &backend).await;
        let tally = tally.unwrap();

        assert_eq!(backend.calls().len(), 1);
        assert_eq!(tally.failed, vec![Role::Context]);
        assert_eq!(tally.skipped, vec![Role::Strategy, Role::Risk, Role::Creative]);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].kind, EntryKind::Error);
    }

    #[tokio::test]
    async fn roots_start_together_without_dependencies() {
        let definition = StageDefinition::new(vec![
            StageSpec::new(Role::Context, []),
            StageSpec::new(Role::Risk, []),
            StageSpec::new(Role::Creative, [Role::Risk]),
        ])
        .unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let backend = StubBackend::ok().with_barrier(&[Role::Context, Role::Risk], barrier);

        let (tally, entries, _) =
            tokio::time::timeout(Duration::from_secs(5), run_with(&definition, &backend))
                .await
                .expect("roots were not invoked concurrently");
        assert_eq!(tally.unwrap().completed.len(), 3);
        assert!(position(&entries, Role::Creative) > position(&entries, Role::Risk));
        assert_eq!(backend.calls_for(Role::Strategy), 0);
    }
}
