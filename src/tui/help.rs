use crate::model::Role;
use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn keybind(key: &'static str, pad: usize, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let mut lines = vec![
        Line::from("Keybinds:"),
        keybind("Enter", 9, "Send command for the selected target"),
        keybind("↑/↓", 11, "Select target"),
        keybind("PgUp/PgDn", 5, "Scroll the log"),
        keybind("Ctrl-Y", 8, "Copy the last report to the clipboard"),
        keybind("Ctrl-S", 8, "Export the last run as JSON"),
        keybind("tab", 11, "Switch tabs"),
        keybind("Esc", 11, "Quit (waits for the active run)"),
        keybind("Ctrl-C", 8, "Quit"),
        Line::from(""),
        Line::from("On this tab:"),
        keybind("y", 13, "Copy the last report"),
        keybind("s", 13, "Export the last run"),
        keybind("q", 13, "Quit"),
        Line::from(""),
        Line::from("Agents:"),
    ];
    for role in Role::ALL {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(role.display_name(), Style::default().fg(Color::Cyan)),
            Span::raw("  "),
            Span::raw(role.description()),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(
        "A command is refused while a run is in progress. Agents whose inputs failed are skipped.",
    ));

    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
