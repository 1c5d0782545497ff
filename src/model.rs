use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Analyst roles that can take part in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Context,
    Strategy,
    Creative,
    Risk,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Context, Role::Strategy, Role::Creative, Role::Risk];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Context => "context",
            Role::Strategy => "strategy",
            Role::Creative => "creative",
            Role::Risk => "risk",
        }
    }

    /// Channel name shown next to every entry the role produces.
    pub fn display_name(self) -> &'static str {
        match self {
            Role::Context => "G2 - Context",
            Role::Strategy => "G3 - Strategy",
            Role::Creative => "G4 - Creative",
            Role::Risk => "G5 - Risk",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Role::Context => "Historical research, sociology and cultural resonance.",
            Role::Strategy => "Outreach strategy, educational impact and curation.",
            Role::Creative => "Cultural artifacts, aesthetics and storytelling.",
            Role::Risk => "Historical integrity, ethics of memory and academic review.",
        }
    }

    /// Text of the in-flight placeholder entry.
    pub fn placeholder_text(self) -> &'static str {
        match self {
            Role::Context => "Gathering intelligence...",
            Role::Strategy => "Simulating war games...",
            Role::Creative => "Fabricating viral payloads...",
            Role::Risk => "Scanning for risks...",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "context" | "g2" => Ok(Role::Context),
            "strategy" | "g3" => Ok(Role::Strategy),
            "creative" | "g4" => Ok(Role::Creative),
            "risk" | "g5" => Ok(Role::Risk),
            other => bail!("unknown role '{other}' (expected context, strategy, creative or risk)"),
        }
    }
}

/// Who an entry is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent(Role),
    /// Faults that cannot be pinned on a single stage.
    System,
}

impl Speaker {
    pub fn role(self) -> Option<Role> {
        match self {
            Speaker::Agent(role) => Some(role),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Speaker::User => "COMMAND",
            Speaker::Agent(role) => role.display_name(),
            Speaker::System => "SYSTEM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    UserCommand,
    Placeholder,
    Result,
    Error,
}

impl EntryKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, EntryKind::Result | EntryKind::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: EntryId,
    pub run: RunId,
    pub speaker: Speaker,
    pub kind: EntryKind,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Placeholder-to-completion time, set on terminal stage entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl LogEntry {
    pub fn role(&self) -> Option<Role> {
        self.speaker.role()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// Per-role outcome of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTally {
    pub completed: Vec<Role>,
    pub failed: Vec<Role>,
    /// Never started because a dependency failed.
    pub skipped: Vec<Role>,
}

/// Backend settings shared by every run of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub thinking_budget: u32,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub user_agent: String,
    pub offline: bool,
    #[serde(with = "humantime_serde")]
    pub offline_latency: Duration,
    #[serde(default)]
    pub offline_fail_roles: Vec<Role>,
}

/// Events emitted while a session runs; observers mirror the log from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    RunStarted {
        run: RunId,
        command: String,
        subject_id: String,
    },
    EntryAppended {
        entry: LogEntry,
    },
    /// A placeholder was removed and its terminal entry appended in one update.
    EntryReplaced {
        removed: EntryId,
        entry: LogEntry,
    },
    RunFinished {
        run: RunId,
        status: RunStatus,
    },
    Info(InfoEvent),
    RunCompleted {
        // Boxed: the report carries the whole transcript of the run.
        report: Box<RunReport>,
    },
}

/// Structured info events emitted by the core and consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    SubmissionRejected { reason: String },
    StageSkipped { role: Role },
    WaitingForRun { run: RunId },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::SubmissionRejected { reason } => format!("Command rejected: {reason}"),
            InfoEvent::StageSkipped { role } => {
                format!("{} skipped: a dependency failed", role.display_name())
            }
            InfoEvent::WaitingForRun { run } => {
                format!("Waiting for run {run} to finish…")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run: RunId,
    #[serde(default)]
    pub timestamp_utc: String,
    pub command: String,
    pub subject_id: String,
    pub subject_name: String,
    pub backend: String,
    pub status: RunStatus,
    #[serde(default)]
    pub tally: StageTally,
    pub entries: Vec<LogEntry>,
}
