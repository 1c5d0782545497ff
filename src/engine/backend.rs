use crate::matrix::{AudienceAvatar, NarrativeAngle, StrategyMatrix, ViralPayload};
use crate::model::Role;
use crate::subjects::Subject;
use async_trait::async_trait;
use thiserror::Error;

/// Everything a backend gets to write one role's report.
#[derive(Debug, Clone, Copy)]
pub struct ReportRequest<'a> {
    pub role: Role,
    pub subject: &'a Subject,
    pub command: &'a str,
    /// Reports of the role's dependencies, in declared order.
    pub context: &'a [String],
}

/// Failure of a single report call. The scheduler treats every variant the same way.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unreadable backend response: {0}")]
    Malformed(String),
    #[error("backend returned an empty response")]
    Empty,
}

#[async_trait]
pub trait ReportBackend: Send + Sync {
    /// Short label for logs and reports.
    fn name(&self) -> &str;

    async fn generate(&self, request: ReportRequest<'_>) -> Result<String, BackendError>;
}

/// Single-shot structured calls behind `--matrix`.
#[async_trait]
pub trait CampaignPlanner: Send + Sync {
    /// Short label for logs and reports.
    fn label(&self) -> &str;

    /// Audience avatars and narrative angles for a subject and campaign intent.
    /// A matrix missing either axis is `BackendError::Empty`.
    async fn strategy_matrix(
        &self,
        subject: &Subject,
        intent: &str,
    ) -> Result<StrategyMatrix, BackendError>;

    async fn viral_payloads(
        &self,
        subject: &Subject,
        avatar: &AudienceAvatar,
        angle: &NarrativeAngle,
    ) -> Result<Vec<ViralPayload>, BackendError>;
}
