use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use wayfare_core::view;
use wayfare_core::{KeyValueStore, Role};

use crate::app::{App, FocusPane, InputMode};

pub fn render<S: KeyValueStore>(app: &mut App<S>, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_body(app, frame, body_area);
    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if app.confirm.is_some() {
        render_confirm(app, frame, area);
    } else if app.show_api_key_input {
        render_api_key_input(app, frame, area);
    }
}

fn render_header<S: KeyValueStore>(app: &App<S>, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Wayfare Travel Assistant ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!(" {} ", app.client.model()),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer<S: KeyValueStore>(app: &App<S>, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " SESSIONS ",
        InputMode::Editing => " CHAT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match app.input_mode {
        InputMode::Normal => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" nav ", label_style),
            Span::styled(" Enter ", key_style),
            Span::styled(" open ", label_style),
            Span::styled(" n ", key_style),
            Span::styled(" new ", label_style),
            Span::styled(" d ", key_style),
            Span::styled(" delete ", label_style),
            Span::styled(" C ", key_style),
            Span::styled(" clear all ", label_style),
            Span::styled(" K ", key_style),
            Span::styled(" reset key ", label_style),
            Span::styled(" i ", key_style),
            Span::styled(" type ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        InputMode::Editing => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" PgUp/PgDn ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" sessions ", label_style),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style)];
    spans.push(Span::styled(
        format!(" {} ", view::status_line(&app.manager)),
        Style::default().fg(Color::DarkGray),
    ));
    spans.extend(hints);

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_body<S: KeyValueStore>(app: &mut App<S>, frame: &mut Frame, area: Rect) {
    // Split into session list (left) and chat (right)
    let [sessions_area, chat_area] = Layout::horizontal([
        Constraint::Length(34),
        Constraint::Min(0),
    ])
    .areas(area);

    let [transcript_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(chat_area);

    // Store areas for mouse hit-testing
    app.sessions_area = Some(sessions_area);
    app.transcript_area = Some(transcript_area);

    render_sessions(app, frame, sessions_area);
    render_transcript(app, frame, transcript_area);
    render_input(app, frame, input_area);
}

fn render_sessions<S: KeyValueStore>(app: &mut App<S>, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Sessions && app.input_mode == InputMode::Normal;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Conversations ");

    let items: Vec<ListItem> = app
        .session_items()
        .into_iter()
        .map(|item| {
            let style = if item.active {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let marker = if item.active { "● " } else { "  " };
            ListItem::new(Line::from(vec![
                Span::styled(marker, style),
                Span::styled(item.label, style),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.session_state);
}

fn render_transcript<S: KeyValueStore>(app: &mut App<S>, frame: &mut Frame, area: Rect) {
    // Store transcript dimensions for scroll calculations (inner size minus borders)
    app.transcript_height = area.height.saturating_sub(2);
    app.transcript_width = area.width.saturating_sub(2);

    let message_count = app.manager.active_session().map(|s| s.len()).unwrap_or(0);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" Chat ({} messages) ", message_count));

    let pending = app.manager.is_pending();
    let entries = app
        .manager
        .active_session()
        .map(view::transcript)
        .unwrap_or_default();

    let text = if entries.is_empty() && !pending {
        Text::from(vec![
            Line::from(Span::styled(
                "Where to next?",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                "Ask about destinations, itineraries, visas, or what to pack.",
                Style::default().fg(Color::DarkGray),
            )),
        ])
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for entry in entries {
            let (label, color) = match entry.role {
                Role::User => ("You", Color::Cyan),
                Role::Assistant => ("Assistant", Color::Yellow),
            };
            lines.push(Line::from(vec![
                Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::styled(format!("  {}", entry.time_label), Style::default().fg(Color::DarkGray)),
            ]));
            // Content is shown verbatim, never parsed for markup
            for line in entry.lines {
                lines.push(Line::from(Span::raw(line)));
            }
            lines.push(Line::default());
        }

        if pending {
            lines.push(Line::from(Span::styled(
                "Assistant",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let transcript = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.transcript_scroll, 0));

    frame.render_widget(transcript, area);
}

fn render_input<S: KeyValueStore>(app: &App<S>, frame: &mut Frame, area: Rect) {
    let enabled = app.manager.input_enabled();
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if !enabled {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else {
        Color::Gray
    };

    let title = if app.manager.awaiting_credential() {
        " Enter an API key to start chatting (i) "
    } else if app.manager.is_pending() {
        " Waiting for the assistant... "
    } else {
        " Message (Enter to send) "
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let text_style = if enabled {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let input = Paragraph::new(visible_text)
        .style(text_style)
        .block(block);

    frame.render_widget(input, area);

    // Show cursor when editing and no popup has the keyboard
    if editing && enabled && app.confirm.is_none() && !app.show_api_key_input {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

/// Centered popup rectangle, clamped to the screen
fn popup_rect(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height);
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

fn render_confirm<S: KeyValueStore>(app: &App<S>, frame: &mut Frame, area: Rect) {
    let Some(confirm) = &app.confirm else {
        return;
    };

    let popup_area = popup_rect(area, 64, 5);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Confirm ");

    let text = Text::from(vec![
        Line::from(confirm.prompt()),
        Line::default(),
        Line::from(vec![
            Span::styled(" y ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(" yes  "),
            Span::styled(" n ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(" no"),
        ]),
    ]);

    let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, popup_area);
}

fn render_api_key_input<S: KeyValueStore>(app: &App<S>, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_area = popup_rect(area, 60, 7);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Enter your OpenRouter API Key ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);
    if inner.height < 5 {
        return;
    }

    // Instructions
    let instructions = Paragraph::new("Paste your API key below. Press Enter to save, Esc to skip.")
        .style(Style::default().fg(Color::DarkGray));

    let instructions_area = Rect::new(inner.x, inner.y, inner.width, 1);
    frame.render_widget(instructions, instructions_area);

    // Input field
    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);

    // Mask the key with asterisks (show last 4 chars)
    let char_count = app.api_key_input.chars().count();
    let display_text = if char_count == 0 {
        String::new()
    } else if char_count <= 4 {
        "*".repeat(char_count)
    } else {
        let masked_len = char_count - 4;
        let last_four: String = app.api_key_input.chars().skip(masked_len).collect();
        format!("{}...{}", "*".repeat(masked_len.min(20)), last_four)
    };

    let input = Paragraph::new(display_text)
        .style(Style::default().fg(Color::Cyan));

    frame.render_widget(input, input_area);

    // Show cursor
    let cursor_x = app.api_key_input_cursor.min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    // Status line
    let status = Paragraph::new(format!("{} characters", char_count))
        .style(Style::default().fg(Color::DarkGray));

    let status_area = Rect::new(inner.x, inner.y + 4, inner.width, 1);
    frame.render_widget(status, status_area);
}
