//! Scripted backend for scheduler and controller tests.

use super::backend::{BackendError, ReportBackend, ReportRequest};
use crate::model::Role;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::{Barrier, Semaphore};

/// Answers `"<role>-OK"` unless told otherwise, and records every call.
#[derive(Default)]
pub(crate) struct StubBackend {
    failing: Vec<Role>,
    panicking: Vec<Role>,
    barrier: Option<(Vec<Role>, Arc<Barrier>)>,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<(Role, Vec<String>)>>,
}

impl StubBackend {
    pub(crate) fn ok() -> Self {
        Self::default()
    }

    pub(crate) fn failing(mut self, role: Role) -> Self {
        self.failing.push(role);
        self
    }

    pub(crate) fn panicking(mut self, role: Role) -> Self {
        self.panicking.push(role);
        self
    }

    /// Calls for `roles` wait on `barrier` before answering.
    pub(crate) fn with_barrier(mut self, roles: &[Role], barrier: Arc<Barrier>) -> Self {
        self.barrier = Some((roles.to_vec(), barrier));
        self
    }

    /// Every call holds one permit of `gate` before answering.
    pub(crate) fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn calls(&self) -> Vec<(Role, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_for(&self, role: Role) -> usize {
        self.calls().iter().filter(|(r, _)| *r == role).count()
    }
}

#[async_trait]
impl ReportBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, request: ReportRequest<'_>) -> Result<String, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.role, request.context.to_vec()));

        if let Some((roles, barrier)) = &self.barrier {
            if roles.contains(&request.role) {
                barrier.wait().await;
            }
        }
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        if self.panicking.contains(&request.role) {
            panic!("stub backend exploded for {}", request.role);
        }
        if self.failing.contains(&request.role) {
            return Err(BackendError::Unavailable("stub outage".into()));
        }
        Ok(format!("{}-OK", request.role))
    }
}
