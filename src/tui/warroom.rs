use super::help::draw_help;
use super::state::{push_wrapped_status_kv, wrap_text, LoginField, Screen, UiState};
use crate::model::{EntryKind, LogEntry, Role, Speaker};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs},
    Frame,
};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

pub fn draw(area: Rect, f: &mut Frame, state: &UiState) {
    if state.screen == Screen::Login {
        return draw_login(area, f, state);
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("War room"), Line::from("Help")])
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title("LA LECHUZA"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_war_room(chunks[1], f, state),
        _ => draw_help(chunks[1], f),
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_login(area: Rect, f: &mut Frame, state: &UiState) {
    let field = |label: &'static str, value: String, active: bool| {
        let style = if active {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        };
        Line::from(vec![
            Span::styled(format!("{label:<12}"), style),
            Span::raw(value),
            Span::styled(if active { "_" } else { "" }, style),
        ])
    };

    let mut lines = vec![
        Line::from(Span::styled(
            "RESTRICTED ACCESS",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        field(
            "IDENTITY",
            state.login_identity.clone(),
            state.login_field == LoginField::Identity,
        ),
        field(
            "ACCESS KEY",
            "*".repeat(state.login_key.chars().count()),
            state.login_field == LoginField::AccessKey,
        ),
        Line::from(""),
    ];
    if let Some(err) = &state.login_error {
        lines.push(Line::from(Span::styled(
            err.clone(),
            Style::default().fg(Color::Red),
        )));
    } else {
        lines.push(Line::from(Span::styled(
            "Enter: authenticate  Tab: next field  Esc: quit",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let p = Paragraph::new(lines).alignment(Alignment::Left).block(
        Block::default()
            .borders(Borders::ALL)
            .title("LA LECHUZA // LOGIN"),
    );
    f.render_widget(p, centered(area, 56, 10));
}

fn draw_war_room(area: Rect, f: &mut Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(34), Constraint::Min(20)].as_ref())
        .split(area);
    draw_subjects(cols[0], f, state);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(3), Constraint::Length(6)].as_ref())
        .split(cols[1]);
    draw_log(rows[0], f, state);
    draw_input(rows[1], f, state);
    draw_status(rows[2], f, state);
}

fn draw_subjects(area: Rect, f: &mut Frame, state: &UiState) {
    let items: Vec<ListItem> = state
        .subjects
        .iter()
        .map(|s| {
            ListItem::new(vec![
                Line::from(s.name.clone()),
                Line::from(Span::styled(
                    format!("  {}", s.headline_tag().unwrap_or("")),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Targets"))
        .highlight_style(Style::default().fg(Color::Black).bg(Color::Yellow))
        .highlight_symbol("> ");
    let mut list_state = ListState::default();
    list_state.select(Some(state.selected));
    f.render_stateful_widget(list, area, &mut list_state);
}

fn speaker_color(speaker: Speaker) -> Color {
    match speaker {
        Speaker::User => Color::White,
        Speaker::System => Color::Red,
        Speaker::Agent(Role::Context) => Color::Cyan,
        Speaker::Agent(Role::Strategy) => Color::Green,
        Speaker::Agent(Role::Creative) => Color::Magenta,
        Speaker::Agent(Role::Risk) => Color::Yellow,
    }
}

fn entry_lines(entry: &LogEntry, state: &UiState, width: usize) -> Vec<Line<'static>> {
    let stamp = entry
        .created_at
        .to_offset(state.utc_offset)
        .format(time::macros::format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default();
    let color = speaker_color(entry.speaker);

    let mut header = vec![
        Span::styled(format!("[{stamp}] "), Style::default().fg(Color::DarkGray)),
        Span::styled(
            entry.speaker.label().to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
    ];
    if let Some(ms) = entry.duration_ms {
        header.push(Span::styled(
            format!(" ({:.1}s)", ms as f64 / 1000.0),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let body_style = match entry.kind {
        EntryKind::Placeholder => Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
        EntryKind::Error => Style::default().fg(Color::Red),
        EntryKind::UserCommand => Style::default().add_modifier(Modifier::BOLD),
        EntryKind::Result => Style::default(),
    };

    let mut lines = vec![Line::from(header)];
    if entry.kind == EntryKind::Placeholder {
        let frame = SPINNER[state.spinner % SPINNER.len()];
        lines.push(Line::from(Span::styled(
            format!("  {frame} {}", entry.text),
            body_style,
        )));
    } else {
        lines.extend(
            wrap_text(&entry.text, width.saturating_sub(2))
                .into_iter()
                .map(|l| Line::from(Span::styled(format!("  {l}"), body_style))),
        );
    }
    lines.push(Line::from(""));
    lines
}

fn draw_log(area: Rect, f: &mut Frame, state: &UiState) {
    let width = area.width.saturating_sub(2) as usize;
    let height = area.height.saturating_sub(2) as usize;

    let mut lines: Vec<Line> = state
        .log
        .entries()
        .flat_map(|e| entry_lines(e, state, width))
        .collect();
    if state.log.is_empty() {
        lines.push(Line::from(Span::styled(
            "Select a target, type a command and press Enter.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    // Bottom-anchored: scroll counts lines up from the newest entry.
    let max_scroll = lines.len().saturating_sub(height);
    let scroll = (state.scroll as usize).min(max_scroll);
    let start = max_scroll - scroll;
    let visible: Vec<Line> = lines.into_iter().skip(start).take(height).collect();

    let title = if scroll > 0 {
        format!("Operations log (+{scroll})")
    } else {
        "Operations log".to_string()
    };
    let p = Paragraph::new(visible).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn draw_input(area: Rect, f: &mut Frame, state: &UiState) {
    let (title, style) = if state.busy {
        ("Command (run in progress)", Style::default().fg(Color::DarkGray))
    } else {
        ("Command", Style::default().fg(Color::Yellow))
    };
    let p = Paragraph::new(Line::from(vec![
        Span::styled("> ", style),
        Span::raw(state.input.clone()),
        Span::styled("_", style),
    ]))
    .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn draw_status(area: Rect, f: &mut Frame, state: &UiState) {
    let mut lines = Vec::new();
    let status = if state.busy {
        format!("BUSY {}", SPINNER[state.spinner % SPINNER.len()])
    } else {
        "READY".to_string()
    };
    push_wrapped_status_kv(&mut lines, "Status", &status, area.width);
    if let Some(s) = state.selected_subject() {
        push_wrapped_status_kv(&mut lines, "Target", &s.name, area.width);
    }
    push_wrapped_status_kv(
        &mut lines,
        "Backend",
        &format!("{} / {}", state.backend_name, state.topology),
        area.width,
    );
    push_wrapped_status_kv(&mut lines, "Info", &state.info, area.width);

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, area);
}
