use std::sync::atomic::Ordering;

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Tabs},
};
use talkama_core::{ChatRole, DisplayState};
use crate::app::{App, InputMode, Screen};

/// Wrap text to fit within a given width, returning multiple lines
/// Uses word boundaries for wrapping (doesn't break mid-word)
fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if current_len == 0 {
            // First word on line
            current_line = word.to_string();
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            // Word fits on current line
            current_line.push(' ');
            current_line.push_str(word);
            current_len += 1 + word_len;
        } else {
            // Word doesn't fit, start new line
            lines.push(std::mem::take(&mut current_line));
            current_line = word.to_string();
            current_len = word_len;
        }
    }

    if !current_line.is_empty() || lines.is_empty() {
        lines.push(current_line);
    }

    lines
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{} KB", bytes.div_ceil(1024))
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Chat => render_chat_screen(app, frame, body_area),
        Screen::Models => render_models_screen(app, frame, body_area),
        Screen::Host => render_host_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.show_attach_prompt {
        render_attach_prompt(app, frame, body_area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let titles: Vec<String> = Screen::all()
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{} {}", i + 1, s.title()))
        .collect();
    let selected = Screen::all().iter().position(|s| *s == app.screen).unwrap_or(0);

    let model = app.directory.current_model().unwrap_or("no model");
    let host = app.directory.current_host().unwrap_or("no host");

    let tabs = Tabs::new(titles)
        .select(selected)
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Talkama ")
                .title_bottom(Line::from(format!(" {} @ {} ", model, host)).right_aligned()),
        );
    frame.render_widget(tabs, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let hints = if app.show_attach_prompt {
        "Enter attach · Esc cancel"
    } else {
        match (app.screen, app.input_mode) {
            (Screen::Chat, InputMode::Editing) => "Enter send · Ctrl+O attach · Ctrl+X remove image · Esc normal · Tab screens",
            (Screen::Chat, InputMode::Normal) => "i type · a attach · x remove image · j/k scroll · q quit",
            (Screen::Models, _) => "j/k move · Enter select · r refresh · Tab screens · q quit",
            (Screen::Host, InputMode::Editing) => "Enter test host · Esc normal · Tab screens",
            (Screen::Host, InputMode::Normal) => "i edit host · Tab screens · q quit",
        }
    };

    let line = match &app.status {
        Some(status) => Line::from(vec![
            Span::styled(status.as_str(), Style::default().fg(Color::Yellow)),
            Span::raw("  "),
            Span::styled(hints, Style::default().fg(Color::DarkGray)),
        ]),
        None => Line::from(Span::styled(hints, Style::default().fg(Color::DarkGray))),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, attachment_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(if app.session.draft_image().is_some() { 1 } else { 0 }),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    let wrap_width = chat_area.width.saturating_sub(2) as usize;

    let mut lines: Vec<Line> = Vec::new();
    for msg in app.session.log() {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                if let Some(image) = &msg.image {
                    lines.push(Line::from(Span::styled(
                        format!("[image, {}]", format_size(image.decoded_len())),
                        Style::default().fg(Color::Magenta),
                    )));
                }
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "AI:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
            }
        }
        for line in msg.content.lines() {
            for wrapped in wrap_text_to_width(line, wrap_width) {
                lines.push(Line::from(wrapped));
            }
        }
        lines.push(Line::default());
    }

    if app.session.display_state() == DisplayState::Loading {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let max_scroll = to_u16(lines.len()).saturating_sub(app.chat_height);
    if app.follow_tail.swap(false, Ordering::Relaxed) {
        app.chat_scroll = max_scroll;
    }
    app.chat_scroll = app.chat_scroll.min(max_scroll);

    let chat_text = if lines.is_empty() {
        Text::from(Span::styled(
            "Type a message, or drop an image onto the terminal...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(Block::default().borders(Borders::ALL).title(" Chat "))
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    if let Some(image) = app.session.draft_image() {
        let preview = Line::from(vec![
            Span::styled(" 📎 ", Style::default().fg(Color::Magenta)),
            Span::raw(format!("image attached ({})", format_size(image.decoded_len()))),
        ]);
        frame.render_widget(Paragraph::new(preview), attachment_area);
    }

    let editing = app.input_mode == InputMode::Editing && !app.show_attach_prompt;
    let (title, border) = match (app.session.display_state(), editing) {
        (DisplayState::Loading, _) => (" Sending... ", Color::DarkGray),
        (DisplayState::Idle, true) => (" Message ", Color::Cyan),
        (DisplayState::Idle, false) => (" Message ", Color::DarkGray),
    };
    let input = Paragraph::new(app.session.draft_text()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(title),
    );
    frame.render_widget(input, input_area);

    if editing {
        let before_cursor = app.draft_cursor.min(app.session.draft_text().chars().count());
        frame.set_cursor_position(cursor_in(input_area, before_cursor));
    }
}

fn render_models_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let current = app.directory.current_model().map(str::to_string);
    let items: Vec<ListItem> = app
        .directory
        .available_models()
        .iter()
        .map(|name| {
            let marker = if current.as_deref() == Some(name.as_str()) { "● " } else { "  " };
            ListItem::new(format!("{}{}", marker, name))
        })
        .collect();

    let title = format!(" Models · selected: {} ", current.as_deref().unwrap_or("none"));
    let block = Block::default().borders(Borders::ALL).title(title);

    if items.is_empty() {
        let empty = Paragraph::new("No models loaded. Press r to refresh or set a host in the Host screen.")
            .fg(Color::DarkGray)
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().fg(Color::Black).bg(Color::Cyan));
    frame.render_stateful_widget(list, area, &mut app.model_state);
}

fn render_host_screen(app: &App, frame: &mut Frame, area: Rect) {
    let [input_area, models_area] = Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(area);

    let editing = app.input_mode == InputMode::Editing && !app.show_attach_prompt;
    let border = if editing { Color::Cyan } else { Color::DarkGray };
    let input = Paragraph::new(app.host_input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(" Host (e.g. http://localhost:11434) "),
    );
    frame.render_widget(input, input_area);

    if editing {
        frame.set_cursor_position(cursor_in(input_area, app.host_input.chars().count()));
    }

    let items: Vec<ListItem> = app
        .directory
        .available_models()
        .iter()
        .map(|name| ListItem::new(name.as_str()))
        .collect();
    let models = List::new(items).block(Block::default().borders(Borders::ALL).title(" Available models "));
    frame.render_widget(models, models_area);
}

fn render_attach_prompt(app: &App, frame: &mut Frame, area: Rect) {
    let width = area.width.saturating_sub(4).min(70);
    let popup = Rect {
        x: area.x.saturating_add(area.width.saturating_sub(width) / 2),
        y: area.y.saturating_add(area.height.saturating_sub(3) / 2),
        width,
        height: 3,
    };

    frame.render_widget(Clear, popup);
    let prompt = Paragraph::new(app.attach_input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta))
            .title(" Image path "),
    );
    frame.render_widget(prompt, popup);
    frame.set_cursor_position(cursor_in(popup, app.attach_input.chars().count()));
}

fn to_u16(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

/// Cursor position after `chars` characters on the first line inside a bordered box.
fn cursor_in(area: Rect, chars: usize) -> (u16, u16) {
    (
        area.x.saturating_add(1).saturating_add(to_u16(chars)),
        area.y.saturating_add(1),
    )
}
