mod export;
mod help;
mod state;
mod warroom;

use crate::auth::AccessGate;
use crate::cli::{self, Cli};
use crate::model::SessionEvent;
use crate::orchestrator::UiCommand;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use state::{LoginField, Screen, UiState};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// What the UI loop should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyOutcome {
    Continue,
    Quit,
}

pub async fn run(args: Cli) -> Result<()> {
    // Unbounded channels avoid backpressure and task switching in the hot path.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<SessionEvent>();

    let catalog = cli::load_subjects(&args)?;
    let mut state = UiState::new(catalog.as_slice().to_vec());
    state.backend_name = if args.offline {
        "offline".into()
    } else {
        args.model.clone()
    };
    let stages = cli::load_stages(&args)?;
    state.topology = cli::stage_order_label(&stages);
    state.utc_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);

    let (cmd_tx, controller) = cli::start_session(&args, stages, catalog, event_tx)?;
    let gate = cli::build_gate(&args);

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(state, gate, event_rx, cmd_tx));

    let res = controller
        .await
        .context("session controller task failed")
        .and_then(|r| r);

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut state: UiState,
    gate: AccessGate,
    mut event_rx: UnboundedReceiver<SessionEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            state.apply_event(ev);
        }

        if last_tick.elapsed() >= tick_rate {
            state.spinner = state.spinner.wrapping_add(1);
            terminal
                .draw(|f| warroom::draw(f.area(), f, &state))
                .ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if handle_key(&mut state, &gate, &cmd_tx, k) == KeyOutcome::Quit {
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn handle_key(
    state: &mut UiState,
    gate: &AccessGate,
    cmd_tx: &UnboundedSender<UiCommand>,
    k: KeyEvent,
) -> KeyOutcome {
    if matches!(
        (k.modifiers, k.code),
        (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Esc)
    ) {
        return KeyOutcome::Quit;
    }

    match state.screen {
        Screen::Login => handle_login_key(state, gate, k),
        Screen::WarRoom if state.tab == 0 => handle_war_room_key(state, cmd_tx, k),
        Screen::WarRoom => handle_help_key(state, k),
    }
}

fn active_login_field(state: &mut UiState) -> &mut String {
    match state.login_field {
        LoginField::Identity => &mut state.login_identity,
        LoginField::AccessKey => &mut state.login_key,
    }
}

fn handle_login_key(state: &mut UiState, gate: &AccessGate, k: KeyEvent) -> KeyOutcome {
    match k.code {
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
            state.login_field = match state.login_field {
                LoginField::Identity => LoginField::AccessKey,
                LoginField::AccessKey => LoginField::Identity,
            };
        }
        KeyCode::Backspace => {
            active_login_field(state).pop();
        }
        KeyCode::Char(c) if !k.modifiers.contains(KeyModifiers::CONTROL) => {
            active_login_field(state).push(c);
        }
        KeyCode::Enter => match gate.check(&state.login_identity, &state.login_key) {
            Ok(()) => {
                state.screen = Screen::WarRoom;
                state.login_error = None;
                state.login_key.clear();
                state.info = "ACCESS GRANTED".into();
            }
            Err(e) => {
                state.login_error = Some(e.to_string());
                state.login_key.clear();
                state.login_field = LoginField::AccessKey;
            }
        },
        _ => {}
    }
    KeyOutcome::Continue
}

fn handle_war_room_key(
    state: &mut UiState,
    cmd_tx: &UnboundedSender<UiCommand>,
    k: KeyEvent,
) -> KeyOutcome {
    match (k.modifiers, k.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('y')) => export::copy_last_result(state),
        (KeyModifiers::CONTROL, KeyCode::Char('s')) => export::export_and_show_path(state),
        (_, KeyCode::Tab) => state.tab = 1,
        (_, KeyCode::Up) => state.select_prev(),
        (_, KeyCode::Down) => state.select_next(),
        (_, KeyCode::PageUp) => state.scroll = state.scroll.saturating_add(5),
        (_, KeyCode::PageDown) => state.scroll = state.scroll.saturating_sub(5),
        (_, KeyCode::Backspace) => {
            state.input.pop();
        }
        (_, KeyCode::Enter) => {
            // The controller decides; a refusal comes back as an info event.
            let _ = cmd_tx.send(UiCommand::Submit {
                command: state.input.clone(),
                subject_id: state.selected_subject().map(|s| s.id.clone()),
            });
        }
        (m, KeyCode::Char(c)) if !m.contains(KeyModifiers::CONTROL) => state.input.push(c),
        _ => {}
    }
    KeyOutcome::Continue
}

fn handle_help_key(state: &mut UiState, k: KeyEvent) -> KeyOutcome {
    match k.code {
        KeyCode::Char('q') => return KeyOutcome::Quit,
        KeyCode::Char('y') => export::copy_last_result(state),
        KeyCode::Char('s') => export::export_and_show_path(state),
        KeyCode::Tab => state.tab = 0,
        _ => {}
    }
    KeyOutcome::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subjects::Subject;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(state: &mut UiState, gate: &AccessGate, tx: &UnboundedSender<UiCommand>, s: &str) {
        for c in s.chars() {
            handle_key(state, gate, tx, key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn login_gate_then_submit() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gate = AccessGate::default();
        let mut state = UiState::new(vec![Subject::new("a", "A", "bio", &[])]);

        type_text(&mut state, &gate, &tx, "LECHUZA");
        handle_key(&mut state, &gate, &tx, key(KeyCode::Tab));
        type_text(&mut state, &gate, &tx, "wrong");
        handle_key(&mut state, &gate, &tx, key(KeyCode::Enter));
        assert_eq!(state.screen, Screen::Login);
        assert_eq!(
            state.login_error.as_deref(),
            Some("ACCESS DENIED: INVALID CREDENTIALS")
        );
        assert!(state.login_key.is_empty());

        type_text(&mut state, &gate, &tx, "LECHUZA");
        handle_key(&mut state, &gate, &tx, key(KeyCode::Enter));
        assert_eq!(state.screen, Screen::WarRoom);

        // 'q' and 's' are ordinary characters in the command input.
        type_text(&mut state, &gate, &tx, "quiet spread");
        handle_key(&mut state, &gate, &tx, key(KeyCode::Enter));
        match rx.try_recv().unwrap() {
            UiCommand::Submit { command, subject_id } => {
                assert_eq!(command, "quiet spread");
                assert_eq!(subject_id.as_deref(), Some("a"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn quit_keys() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let gate = AccessGate::default();
        let mut state = UiState::new(Vec::new());
        state.screen = Screen::WarRoom;

        assert_eq!(
            handle_key(&mut state, &gate, &tx, key(KeyCode::Char('q'))),
            KeyOutcome::Continue
        );
        handle_key(&mut state, &gate, &tx, key(KeyCode::Tab));
        assert_eq!(state.tab, 1);
        assert_eq!(
            handle_key(&mut state, &gate, &tx, key(KeyCode::Char('q'))),
            KeyOutcome::Quit
        );
        assert_eq!(
            handle_key(
                &mut state,
                &gate,
                &tx,
                KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)
            ),
            KeyOutcome::Quit
        );
    }
}
