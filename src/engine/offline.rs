use super::backend::{BackendError, CampaignPlanner, ReportBackend, ReportRequest};
use crate::matrix::{
    AudienceAvatar, NarrativeAngle, PayloadFormat, StrategyMatrix, ViralPayload, PAYLOADS_PER_CELL,
};
use crate::model::Role;
use crate::subjects::Subject;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Canned reports for demos and runs without network access.
pub struct OfflineBackend {
    latency: Duration,
    fail_roles: Vec<Role>,
}

impl OfflineBackend {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            fail_roles: Vec::new(),
        }
    }

    /// Make calls for these roles fail, to exercise partial-failure runs.
    pub fn with_failures(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.fail_roles.extend(roles);
        self
    }

    fn delay(&self) -> Duration {
        if self.latency.is_zero() {
            return Duration::ZERO;
        }
        let half = (self.latency.as_millis() as u64 / 2).max(1);
        let jitter = rand::thread_rng().gen_range(0..=half);
        self.latency + Duration::from_millis(jitter)
    }

    async fn pause(&self) {
        let delay = self.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn canned_report(request: &ReportRequest<'_>) -> String {
    let name = &request.subject.name;
    let body = match request.role {
        Role::Context => format!(
            "Profile of {name}: high openness, strong conscientiousness. \
             Resonates with present debates on memory and exile."
        ),
        Role::Strategy => format!(
            "Objective: visibility for {name}. Expected obstacle: audience fatigue. \
             Channels: long threads, visual essays, academic newsletters."
        ),
        Role::Creative => format!(
            "Hook: \"The story they left out.\" Visual: archival grain, cold blue palette. \
             Copy: three short pieces introducing {name} to new readers."
        ),
        Role::Risk => format!(
            "Controversy scan for {name}: political affiliations need context. \
             Protocol: publish sources up front, answer criticism with primary documents."
        ),
    };
    format!(
        "[{}] {body}\nCommand: {}\nBriefings received: {}",
        request.role.display_name(),
        request.command,
        request.context.len()
    )
}

#[async_trait]
impl ReportBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(&self, request: ReportRequest<'_>) -> Result<String, BackendError> {
        self.pause().await;
        if self.fail_roles.contains(&request.role) {
            return Err(BackendError::Unavailable(format!(
                "simulated outage for {}",
                request.role
            )));
        }
        Ok(canned_report(&request))
    }
}

const AVATARS: [(&str, &str, &str, &str); 5] = [
    (
        "Night-school teacher",
        "35-55, public education",
        "Wants material that makes students ask questions",
        "No time to research",
    ),
    (
        "Archive enthusiast",
        "25-40, urban, reads long-form",
        "Collects forgotten stories and shares them",
        "Tired of the same famous names",
    ),
    (
        "Regional pride keeper",
        "45-70, local associations",
        "Defends the memory of their region",
        "Feels ignored by national media",
    ),
    (
        "Activist student",
        "18-25, university",
        "Looks for historical allies for present causes",
        "Distrusts institutional storytelling",
    ),
    (
        "Visual scroller",
        "20-35, short-video platforms",
        "Stops only for striking images",
        "Attention span of a few seconds",
    ),
];

const ANGLES: [(&str, &str, &str, &str); 5] = [
    ("The witness", "sober", "first-hand documents", "They were there."),
    ("The rebel", "defiant", "conflict with the powers of the time", "They refused."),
    ("The mentor", "warm", "what they taught others", "Their lessons still work."),
    ("The mystery", "intriguing", "gaps in the record", "Why was this forgotten?"),
    ("The mirror", "reflective", "parallels with today", "Their problem is ours."),
];

fn canned_matrix() -> StrategyMatrix {
    StrategyMatrix {
        avatars: AVATARS
            .iter()
            .map(|(name, demographic, psychographic, pain)| AudienceAvatar {
                name: name.to_string(),
                demographic: demographic.to_string(),
                psychographic: psychographic.to_string(),
                pain_points: vec![pain.to_string()],
            })
            .collect(),
        angles: ANGLES
            .iter()
            .map(|(name, tone, focus, message)| NarrativeAngle {
                name: name.to_string(),
                tone: tone.to_string(),
                narrative_focus: focus.to_string(),
                key_message: message.to_string(),
            })
            .collect(),
    }
}

fn canned_payloads(
    subject: &Subject,
    avatar: &AudienceAvatar,
    angle: &NarrativeAngle,
) -> Vec<ViralPayload> {
    PayloadFormat::ALL
        .into_iter()
        .take(PAYLOADS_PER_CELL)
        .map(|format| ViralPayload {
            hook: format!("{}: {}", subject.name, angle.key_message),
            trigger: "curiosity gap".to_string(),
            visual_prompt: format!(
                "archival photograph of {}, {} mood, cold blue grade",
                subject.name, angle.tone
            ),
            format,
            caption: format!(
                "For the {}: {} ({}).",
                avatar.name.to_lowercase(),
                angle.narrative_focus,
                format.as_str()
            ),
        })
        .collect()
}

#[async_trait]
impl CampaignPlanner for OfflineBackend {
    fn label(&self) -> &str {
        "offline"
    }

    async fn strategy_matrix(
        &self,
        _subject: &Subject,
        _intent: &str,
    ) -> Result<StrategyMatrix, BackendError> {
        self.pause().await;
        Ok(canned_matrix())
    }

    async fn viral_payloads(
        &self,
        subject: &Subject,
        avatar: &AudienceAvatar,
        angle: &NarrativeAngle,
    ) -> Result<Vec<ViralPayload>, BackendError> {
        self.pause().await;
        Ok(canned_payloads(subject, avatar, angle))
    }
}
