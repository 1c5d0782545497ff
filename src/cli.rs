use crate::auth::{AccessGate, DEFAULT_ACCESS_KEY, DEFAULT_IDENTITY};
use crate::engine::{build_backend, build_planner, CampaignPlanner};
use crate::logging::{self, LogTarget};
use crate::matrix::{self, MatrixCell, MatrixReport, DEFAULT_INTENT};
use crate::model::{BackendConfig, EntryKind, InfoEvent, Role, RunReport, RunStatus, SessionEvent};
use crate::orchestrator::{run_controller, SessionController, UiCommand};
use crate::stages::{StageDefinition, Topology};
use crate::subjects::SubjectCatalog;
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TopologyArg {
    Reference,
    Linear,
    FanOut,
}

impl From<TopologyArg> for Topology {
    fn from(t: TopologyArg) -> Self {
        match t {
            TopologyArg::Reference => Topology::Reference,
            TopologyArg::Linear => Topology::Linear,
            TopologyArg::FanOut => Topology::FanOut,
        }
    }
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "lechuza",
    version,
    about = "Multi-agent narrative war room with optional TUI"
)]
pub struct Cli {
    /// Print the final run report as JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print progress and a text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// List the subject catalog and exit
    #[arg(long)]
    pub list_subjects: bool,

    /// Generate a strategy matrix (avatars x angles) for --subject and exit (no TUI)
    #[arg(long)]
    pub matrix: bool,

    /// Campaign intent for --matrix
    #[arg(long, default_value = DEFAULT_INTENT)]
    pub intent: String,

    /// Matrix cell to generate payloads for, 1-based
    #[arg(long, value_name = "AVATAR:ANGLE", requires = "matrix")]
    pub cell: Option<MatrixCell>,

    /// Subject id to target (text/JSON mode)
    #[arg(long)]
    pub subject: Option<String>,

    /// Command to run against the subject (text/JSON mode)
    #[arg(long)]
    pub command: Option<String>,

    /// Identity for the access gate (text/JSON mode)
    #[arg(long, env = "LECHUZA_IDENTITY")]
    pub identity: Option<String>,

    /// Access key for the access gate (text/JSON mode)
    #[arg(long, env = "LECHUZA_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Identity the gate accepts
    #[arg(long, env = "LECHUZA_GATE_IDENTITY", default_value = DEFAULT_IDENTITY)]
    pub gate_identity: String,

    /// Access key the gate accepts
    #[arg(
        long,
        env = "LECHUZA_GATE_KEY",
        default_value = DEFAULT_ACCESS_KEY,
        hide_env_values = true
    )]
    pub gate_key: String,

    /// Built-in stage topology
    #[arg(long, value_enum, default_value_t = TopologyArg::Reference)]
    pub topology: TopologyArg,

    /// JSON stage definition (overrides --topology)
    #[arg(long)]
    pub stages: Option<PathBuf>,

    /// JSON subject catalog (overrides the built-in one)
    #[arg(long)]
    pub subjects: Option<PathBuf>,

    /// Export the finished run as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Base URL of the Gemini API
    #[arg(
        long,
        env = "GEMINI_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com"
    )]
    pub base_url: String,

    /// Model used for every stage
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-3-pro-preview")]
    pub model: String,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    pub temperature: f32,

    /// Thinking token budget per stage
    #[arg(long, default_value_t = 1024)]
    pub thinking_budget: u32,

    /// Per-request timeout for the backend
    #[arg(long, default_value = "120s")]
    pub request_timeout: humantime::Duration,

    /// Use canned reports instead of the Gemini API
    #[arg(long)]
    pub offline: bool,

    /// Simulated latency per stage in offline mode
    #[arg(long, default_value = "1500ms")]
    pub offline_latency: humantime::Duration,

    /// Make a role fail in offline mode (repeatable)
    #[arg(long = "offline-fail", value_name = "ROLE")]
    pub offline_fail: Vec<Role>,

    /// Write diagnostics to this file (RUST_LOG sets the filter)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json && args.text {
        bail!("--json and --text are mutually exclusive");
    }

    if args.list_subjects {
        let catalog = load_subjects(&args)?;
        for s in catalog.iter() {
            println!(
                "{:<28} {:<32} {}",
                s.id,
                s.name,
                s.headline_tag().unwrap_or("-")
            );
        }
        return Ok(());
    }

    let headless = args.json || args.text || args.matrix;
    let target = match (&args.log_file, headless) {
        (Some(path), _) => LogTarget::File(path),
        (None, true) => LogTarget::Stderr,
        (None, false) => LogTarget::Off,
    };
    logging::init(target)?;

    if !headless {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            bail!("built without the terminal UI; use --text or --json");
        }
    }

    if args.matrix {
        return run_matrix(args).await;
    }
    run_headless(args).await
}

/// Build a `BackendConfig` from CLI arguments.
pub fn build_backend_config(args: &Cli) -> BackendConfig {
    BackendConfig {
        base_url: args.base_url.clone(),
        model: args.model.clone(),
        api_key: args.api_key.clone(),
        temperature: args.temperature,
        thinking_budget: args.thinking_budget,
        request_timeout: Duration::from(args.request_timeout),
        user_agent: format!("lechuza/{}", env!("CARGO_PKG_VERSION")),
        offline: args.offline,
        offline_latency: Duration::from(args.offline_latency),
        offline_fail_roles: args.offline_fail.clone(),
    }
}

pub fn build_gate(args: &Cli) -> AccessGate {
    AccessGate::new(args.gate_identity.clone(), args.gate_key.clone())
}

/// `<config dir>/lechuza/<name>`, if it exists.
fn config_file(name: &str) -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("lechuza").join(name))
        .filter(|path| path.is_file())
}

pub(crate) fn load_stages(args: &Cli) -> Result<StageDefinition> {
    if let Some(path) = args.stages.clone().or_else(|| config_file("stages.json")) {
        return StageDefinition::from_json_file(&path);
    }
    Ok(StageDefinition::builtin(args.topology.into()))
}

pub(crate) fn load_subjects(args: &Cli) -> Result<SubjectCatalog> {
    let catalog = match args.subjects.clone().or_else(|| config_file("subjects.json")) {
        Some(path) => SubjectCatalog::from_json_file(&path)?,
        None => SubjectCatalog::builtin(),
    };
    if catalog.is_empty() {
        bail!("subject catalog is empty");
    }
    Ok(catalog)
}

/// Roles in launch order, e.g. `context > strategy > risk > creative`.
pub(crate) fn stage_order_label(stages: &StageDefinition) -> String {
    stages
        .topo_order()
        .into_iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(" > ")
}

/// Build the session and spawn its controller task.
pub(crate) fn start_session(
    args: &Cli,
    stages: StageDefinition,
    catalog: SubjectCatalog,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
) -> Result<(
    mpsc::UnboundedSender<UiCommand>,
    tokio::task::JoinHandle<Result<()>>,
)> {
    tracing::debug!(
        stages = stages.len(),
        order = %stage_order_label(&stages),
        subjects = catalog.len(),
        "session configured"
    );
    let backend = build_backend(&build_backend_config(args))?;
    let session = SessionController::new(stages, backend, event_tx.clone());
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let export_json = args.export_json.clone();
    let handle = tokio::spawn(run_controller(session, catalog, export_json, event_tx, cmd_rx));
    Ok((cmd_tx, handle))
}

fn check_credentials(args: &Cli) -> Result<()> {
    build_gate(args)
        .check(
            args.identity.as_deref().unwrap_or_default(),
            args.access_key.as_deref().unwrap_or_default(),
        )
        .context("--identity/--access-key rejected")
}

/// Generate the matrix and, when `--cell` is given, the payloads for that cell.
pub(crate) async fn build_matrix_report(
    args: &Cli,
    planner: &dyn CampaignPlanner,
) -> Result<MatrixReport> {
    check_credentials(args)?;
    let subject_id = args
        .subject
        .as_deref()
        .context("--subject is required with --matrix (see --list-subjects)")?;
    let catalog = load_subjects(args)?;
    let subject = catalog
        .get(subject_id)
        .with_context(|| format!("unknown subject '{subject_id}'"))?;

    let matrix = planner
        .strategy_matrix(subject, &args.intent)
        .await
        .context("strategy matrix request failed")?;
    tracing::info!(
        subject = %subject.id,
        avatars = matrix.avatars.len(),
        angles = matrix.angles.len(),
        "strategy matrix ready"
    );

    let mut payloads = Vec::new();
    if let Some(cell) = args.cell {
        let Some((avatar, angle)) = matrix.cell(cell) else {
            bail!(
                "cell {cell} is outside the {}x{} matrix",
                matrix.avatars.len(),
                matrix.angles.len()
            );
        };
        payloads = planner
            .viral_payloads(subject, avatar, angle)
            .await
            .with_context(|| format!("payload request for cell {cell} failed"))?;
    }

    Ok(MatrixReport {
        subject_id: subject.id.clone(),
        subject_name: subject.name.clone(),
        intent: args.intent.clone(),
        backend: planner.label().to_string(),
        matrix,
        cell: args.cell.map(|c| c.to_string()),
        payloads,
    })
}

async fn run_matrix(args: Cli) -> Result<()> {
    let planner = build_planner(&build_backend_config(&args))?;
    let report = build_matrix_report(&args, planner.as_ref()).await?;

    let (out_tx, out_handle) = spawn_output_writer();
    if args.json {
        let out = serde_json::to_string_pretty(&report)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in matrix::render_report(&report) {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Run a single command in text or JSON mode.
async fn run_headless(args: Cli) -> Result<()> {
    check_credentials(&args)?;

    let subject_id = args
        .subject
        .clone()
        .context("--subject is required in text/JSON mode (see --list-subjects)")?;
    let command = args
        .command
        .clone()
        .context("--command is required in text/JSON mode")?;

    let catalog = load_subjects(&args)?;
    let stages = load_stages(&args)?;
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (cmd_tx, handle) = start_session(&args, stages, catalog, evt_tx)?;
    let _ = cmd_tx.send(UiCommand::Submit {
        command,
        subject_id: Some(subject_id),
    });
    let _ = cmd_tx.send(UiCommand::Quit);

    let (out_tx, out_handle) = spawn_output_writer();
    let progress = args.text;
    let mut report: Option<RunReport> = None;
    let mut rejection: Option<String> = None;

    while let Some(ev) = evt_rx.recv().await {
        match ev {
            SessionEvent::EntryAppended { entry } if progress => {
                let line = match entry.kind {
                    EntryKind::Placeholder => {
                        format!("… {}: {}", entry.speaker.label(), entry.text)
                    }
                    EntryKind::UserCommand => format!("> {}", entry.text),
                    EntryKind::Error => format!("✖ {}: {}", entry.speaker.label(), entry.text),
                    EntryKind::Result => format!("✔ {}", entry.speaker.label()),
                };
                let _ = out_tx.send(OutputLine::Stderr(line));
            }
            SessionEvent::EntryReplaced { entry, .. } if progress => {
                let elapsed = entry
                    .duration_ms
                    .map(|ms| format!(" ({:.1}s)", ms as f64 / 1000.0))
                    .unwrap_or_default();
                let line = match entry.kind {
                    EntryKind::Error => {
                        format!("✖ {}{elapsed}: {}", entry.speaker.label(), entry.text)
                    }
                    _ => format!("✔ {}{elapsed}", entry.speaker.label()),
                };
                let _ = out_tx.send(OutputLine::Stderr(line));
            }
            SessionEvent::Info(info) => {
                if let InfoEvent::SubmissionRejected { reason } = &info {
                    rejection = Some(reason.clone());
                }
                if progress {
                    let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
                }
            }
            SessionEvent::RunCompleted { report: r } => report = Some(*r),
            _ => {}
        }
    }

    handle.await.context("session controller task failed")??;

    let Some(report) = report else {
        drop(out_tx);
        let _ = out_handle.await;
        bail!(
            "command rejected: {}",
            rejection.unwrap_or_else(|| "no run was started".into())
        );
    };

    if args.json {
        let out = serde_json::to_string_pretty(&report)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in crate::text_summary::build_text_summary(&report).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;

    if report.status == RunStatus::Failed {
        bail!("run {} failed", report.run);
    }
    Ok(())
}
