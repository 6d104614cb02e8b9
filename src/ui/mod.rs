use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;
use time::{macros::format_description, OffsetDateTime};

use crate::app::state::{AppState, OverlayState, SettingsOverlay};
use crate::app::KEY_BINDINGS;
use crate::classify::LanguageTag;
use crate::config::SettingKey;
use crate::editor::{EditorSession, Pane, SaveState};
use crate::format::{EngineState, FORMATTABLE_LANGUAGES};
use crate::notes::ContentMode;
use crate::shortcuts::ShortcutStatus;

const FORMAT_ERROR_CAUSES: [&str; 3] = [
    "Code complexity or length",
    "Unsupported language",
    "Syntax errors in your code",
];

pub fn draw_app(frame: &mut Frame, state: &mut AppState) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(4),
        ])
        .split(frame.size());

    frame.render_widget(build_header(state), vertical[0]);

    if state.session.tab_mode() {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(vertical[1]);
        render_pane(frame, &mut state.session, Pane::Primary, columns[0], state.overlay.is_none());
        render_pane(frame, &mut state.session, Pane::Secondary, columns[1], state.overlay.is_none());
    } else {
        render_pane(frame, &mut state.session, Pane::Primary, vertical[1], state.overlay.is_none());
    }

    let status = Paragraph::new(build_status_lines(state))
        .block(Block::default().borders(Borders::TOP))
        .wrap(Wrap { trim: true });
    frame.render_widget(status, vertical[2]);

    render_overlay(frame, state);
}

fn build_header(state: &AppState) -> Paragraph<'static> {
    let session = &state.session;
    let mut spans = Vec::new();
    for mode in [ContentMode::Plaintext, ContentMode::Code] {
        let style = if mode == session.mode() {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(format!(" {} ", mode.label()), style));
        spans.push(Span::raw(" "));
    }

    if session.mode() == ContentMode::Code {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            format!("[{}]", language_chip(session.detected_language())),
            Style::default().fg(Color::Yellow),
        ));
        spans.push(Span::raw("  "));
        let format_style = if session.can_format() {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::DIM)
        };
        spans.push(Span::styled("Format (Beta)", format_style));
        if let Some((mark, color)) = format_mark(session) {
            spans.push(Span::raw(" "));
            spans.push(Span::styled(
                mark,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ));
        }
    }

    if session.tab_mode() {
        spans.push(Span::styled(
            "  ⇆ tab mode",
            Style::default().fg(Color::Magenta),
        ));
    }
    if state.engine == EngineState::Failed {
        spans.push(Span::styled(
            "  formatter unavailable (ctrl+g to retry)",
            Style::default().fg(Color::Red),
        ));
    }

    let title = match (state.current_note(), state.note_position()) {
        (Some(note), Some(position)) => {
            format!("{} ({}/{})", note.name, position + 1, state.notes.len())
        }
        _ => "Flick".to_string(),
    };
    Paragraph::new(Line::from(spans)).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    )
}

fn language_chip(language: Option<LanguageTag>) -> &'static str {
    match language {
        Some(tag) if tag.is_generic() => "No syntax detected",
        Some(tag) => tag.label(),
        None => "No language detected",
    }
}

fn format_mark(session: &EditorSession) -> Option<(&'static str, Color)> {
    if session.is_formatting() {
        Some(("…", Color::Gray))
    } else if session.format_error().is_some() {
        Some(("!", Color::Red))
    } else if session.format_success() {
        Some(("✓", Color::Green))
    } else {
        None
    }
}

fn render_pane(
    frame: &mut Frame,
    session: &mut EditorSession,
    pane: Pane,
    area: Rect,
    show_cursor: bool,
) {
    let focused = session.focus() == pane;
    let mode = session.pane_mode(pane);
    let buffer = session.pane_mut(pane);
    let height = area.height.saturating_sub(2) as usize;
    let top = buffer.scroll_to_cursor(height);
    let gutter = gutter_width(buffer.line_count());

    let mut lines = Vec::with_capacity(height);
    for (index, line) in buffer.lines().enumerate().skip(top).take(height) {
        lines.push(Line::from(vec![
            Span::styled(
                format!("{:>width$} ", index + 1, width = gutter - 1),
                Style::default().fg(Color::DarkGray),
            ),
            Span::raw(line.replace('\t', " ")),
        ]));
    }

    let title = format!(
        "{} • {} lines • {} chars",
        mode.label(),
        buffer.line_count(),
        buffer.char_count()
    );
    let border_style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let paragraph = Paragraph::new(Text::from(lines)).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(border_style),
    );

    let cursor = if focused && show_cursor {
        let row = buffer.cursor_line().saturating_sub(top);
        let column = buffer.cursor_column();
        cursor_position(area, gutter, row, column)
    } else {
        None
    };

    frame.render_widget(paragraph, area);
    if let Some((x, y)) = cursor {
        frame.set_cursor(x, y);
    }
}

/// Columns taken by the line-number gutter, trailing space included.
fn gutter_width(line_count: usize) -> usize {
    line_count.max(1).to_string().len().max(2) + 1
}

fn cursor_position(area: Rect, gutter: usize, row: usize, column: usize) -> Option<(u16, u16)> {
    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;
    if inner_width <= gutter || inner_height == 0 {
        return None;
    }
    let column = (gutter + column).min(inner_width - 1);
    let row = row.min(inner_height - 1);
    Some((area.x + 1 + column as u16, area.y + 1 + row as u16))
}

fn save_state_icon(state: SaveState) -> (&'static str, Color) {
    match state {
        SaveState::Empty => ("○", Color::DarkGray),
        SaveState::Editing => ("✎", Color::Yellow),
        SaveState::Waiting => ("…", Color::Yellow),
        SaveState::Saving => ("⟳", Color::Cyan),
        SaveState::Saved => ("✓", Color::Green),
    }
}

fn format_last_edited(at: OffsetDateTime) -> String {
    at.format(&format_description!(
        "[month repr:long] [day padding:none], [year] [hour]:[minute]"
    ))
    .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

fn build_status_lines(state: &AppState) -> Text<'static> {
    let session = &state.session;
    let (icon, color) = save_state_icon(session.save_state());
    let mut spans = vec![
        Span::styled(
            format!("{icon} "),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::raw(session.save_state().description()),
        Span::raw(" | Last edited: "),
        Span::styled(
            format_last_edited(session.last_edited()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ];
    match &state.shortcut {
        ShortcutStatus::Active(accelerator) => {
            spans.push(Span::raw(" | New Flick: "));
            spans.push(Span::styled(
                accelerator.to_string(),
                Style::default().fg(Color::Cyan),
            ));
        }
        ShortcutStatus::Inactive { .. } => {
            spans.push(Span::styled(
                " | shortcut not active",
                Style::default().fg(Color::Red),
            ));
        }
    }
    if state.storage_error.is_some() {
        spans.push(Span::styled(
            " | not saved to disk",
            Style::default()
                .fg(Color::Red)
                .add_modifier(Modifier::BOLD),
        ));
    }

    let second = match &state.status_message {
        Some(message) => Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Yellow),
        )),
        None => Line::from(Span::styled(help_hint(), Style::default().fg(Color::Gray))),
    };
    Text::from(vec![Line::from(spans), second])
}

fn help_hint() -> String {
    let mut hints: Vec<String> = KEY_BINDINGS
        .iter()
        .filter(|(keys, _)| *keys != "ctrl+c")
        .map(|(keys, action)| format!("{keys} {action}"))
        .collect();
    hints.push("ctrl+pgup/pgdn switch flick".to_string());
    hints.join(" • ")
}

fn render_overlay(frame: &mut Frame, state: &AppState) {
    match state.overlay() {
        Some(OverlayState::Rename(draft)) => {
            let area = centered_rect(60, 30, frame.size());
            frame.render_widget(Clear, area);
            let mut name_display = draft.name.clone();
            name_display.push('▌');
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled(
                    "Rename Flick",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(name_display),
                Line::from(""),
                Line::from(Span::styled(
                    "Enter to save • Esc to cancel",
                    Style::default().fg(Color::Gray),
                )),
            ])
            .block(
                Block::default()
                    .title("Rename")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        Some(OverlayState::DeleteConfirm(draft)) => {
            let area = centered_rect(60, 30, frame.size());
            frame.render_widget(Clear, area);
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled(
                    "Delete Flick",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(format!(
                    "Delete \"{}\"? Both buffers are removed for good.",
                    draft.name
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Enter to confirm • Esc to cancel",
                    Style::default().fg(Color::Gray),
                )),
            ])
            .block(
                Block::default()
                    .title("Confirm Delete")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red)),
            )
            .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        Some(OverlayState::FormatErrorDetails { message }) => {
            let area = centered_rect(70, 60, frame.size());
            frame.render_widget(Clear, area);
            frame.render_widget(format_error_details(message), area);
        }
        Some(OverlayState::Settings(overlay)) => {
            let area = centered_rect(70, 70, frame.size());
            frame.render_widget(Clear, area);
            frame.render_widget(settings_panel(state, overlay), area);
        }
        None => {}
    }
}

fn format_error_details(message: &str) -> Paragraph<'static> {
    let mut lines = vec![
        Line::from(Span::styled(
            "Formatting failed",
            Style::default()
                .fg(Color::Red)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "This might be caused by:",
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];
    lines.extend(
        FORMAT_ERROR_CAUSES
            .iter()
            .map(|cause| Line::from(format!("  • {cause}"))),
    );
    lines.push(Line::from(""));
    let supported = FORMATTABLE_LANGUAGES
        .iter()
        .map(|language| language.label())
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(Line::from(format!("Supported languages: {supported}")));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Edit the code to clear the error • Esc to close",
        Style::default().fg(Color::Gray),
    )));
    Paragraph::new(lines)
        .block(
            Block::default()
                .title("Format Error")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        )
        .wrap(Wrap { trim: false })
}

fn settings_panel(state: &AppState, overlay: &SettingsOverlay) -> Paragraph<'static> {
    let mut lines = Vec::new();
    for (index, key) in SettingsOverlay::keys().enumerate() {
        let selected = index == overlay.selected;
        let value = match (selected, overlay.input.as_ref()) {
            (true, Some(input)) => format!("{input}▌"),
            _ => setting_display(state, key),
        };
        let marker = if selected { "▸ " } else { "  " };
        let style = if selected {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Blue)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{marker}{:<22}", key.label()), style),
            Span::raw(" "),
            Span::raw(value),
        ]));
    }
    lines.push(Line::from(""));
    match &state.shortcut {
        ShortcutStatus::Active(accelerator) => lines.push(Line::from(Span::styled(
            format!("Shortcut {accelerator} is active"),
            Style::default().fg(Color::Green),
        ))),
        ShortcutStatus::Inactive { reason } => lines.push(Line::from(Span::styled(
            format!("Shortcut is not active: {reason}"),
            Style::default().fg(Color::Red),
        ))),
    }
    if let Some(error) = &overlay.error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    }
    lines.push(Line::from(Span::styled(
        "↑/↓ select • ←/→ change • Enter edit text • Esc close",
        Style::default().fg(Color::Gray),
    )));
    Paragraph::new(lines)
        .block(
            Block::default()
                .title("Settings")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false })
}

fn setting_display(state: &AppState, key: SettingKey) -> String {
    match key {
        SettingKey::CloseBehavior => state.settings.close_behavior.label().to_string(),
        SettingKey::DefaultLanguage => state.settings.default_language.label().to_string(),
        SettingKey::AutoLaunch => {
            if state.settings.auto_launch { "on" } else { "off" }.to_string()
        }
        other => other.value(&state.settings),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(vertical[1])[1]
}
