use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use riley_core::ChatRole;

use crate::app::{App, InputMode, Notice};

const CAPTION: &str = "How Can I Help You Today?";
const INPUT_PLACEHOLDER: &str =
    "Ask Me Rainbow Riley Questions Relating to fun ingredients and yummy recipes.";

/// One colour per food group, used for the title banner.
const RAINBOW: [Color; 5] = [
    Color::Red,
    Color::Yellow,
    Color::White,
    Color::Green,
    Color::Magenta,
];

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c != '*' || chars.peek() != Some(&'*') {
            current_text.push(c);
            continue;
        }
        chars.next(); // second *

        // Find closing **
        let mut bold_text = String::new();
        let mut found_close = false;
        while let Some(c) = chars.next() {
            if c == '*' && chars.peek() == Some(&'*') {
                chars.next();
                found_close = true;
                break;
            }
            bold_text.push(c);
        }

        if found_close && !bold_text.is_empty() {
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }
            spans.push(Span::styled(
                bold_text,
                Style::default().add_modifier(Modifier::BOLD),
            ));
        } else {
            // No closing **, treat as literal
            current_text.push_str("**");
            current_text.push_str(&bold_text);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, caption_area, chat_area, notice_area, input_area, footer_area] =
        Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(area);

    render_header(frame, header_area);
    frame.render_widget(
        Paragraph::new(CAPTION)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray)),
        caption_area,
    );
    render_chat(app, frame, chat_area);
    render_notice(app, frame, notice_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(frame: &mut Frame, area: Rect) {
    let title = "Chat with Rainbow Riley";
    let mut spans: Vec<Span> = title
        .split(' ')
        .enumerate()
        .flat_map(|(i, word)| {
            [
                Span::styled(word, Style::default().fg(RAINBOW[i % RAINBOW.len()]).bold()),
                Span::raw(" "),
            ]
        })
        .collect();
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(
        Paragraph::new(Line::from(spans)).alignment(Alignment::Center),
        area,
    );
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size minus borders, for scroll calculations
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} ", app.model_name));

    let mut lines: Vec<Line> = Vec::new();
    for msg in app.session.renderable_transcript() {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(msg.content.clone()));
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "Riley:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
        }
        lines.push(Line::default());
    }

    if app.is_dispatching() {
        lines.push(Line::from(Span::styled(
            "Riley:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Calculating{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.scroll, 0));
    frame.render_widget(chat, area);
}

fn render_notice(app: &App, frame: &mut Frame, area: Rect) {
    let line = match &app.notice {
        Some(Notice::Failure(msg)) => Line::from(Span::styled(
            format!(" ✗ {}", msg),
            Style::default().fg(Color::Red),
        )),
        Some(Notice::Info(msg)) => Line::from(Span::styled(
            format!(" {}", msg),
            Style::default().fg(Color::Yellow),
        )),
        None => Line::default(),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Ask ");

    // Horizontal scrolling keeps the cursor inside the box
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 || app.cursor < inner_width {
        0
    } else {
        app.cursor - inner_width + 1
    };

    let input = if app.input.is_empty() && !editing {
        Paragraph::new(INPUT_PLACEHOLDER).style(Style::default().fg(Color::DarkGray))
    } else {
        let visible: String = app
            .input
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan))
    };
    frame.render_widget(input.block(block), area);

    if editing {
        let cursor_x = (app.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" EDIT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().fg(Color::Gray);

    let failed_turn = app.session.awaiting_response() && !app.is_dispatching();
    let hints: &[(&str, &str)] = match app.input_mode {
        InputMode::Editing if failed_turn => &[
            ("Enter", "retry (empty) / replace"),
            ("Esc", "normal"),
            ("PgUp/PgDn", "scroll"),
        ],
        InputMode::Editing => &[("Enter", "send"), ("Esc", "normal"), ("PgUp/PgDn", "scroll")],
        InputMode::Normal if failed_turn => {
            &[("r", "retry"), ("i", "edit"), ("j/k", "scroll"), ("q", "quit")]
        }
        InputMode::Normal => &[("i", "edit"), ("j/k", "scroll"), ("g/G", "top/bottom"), ("q", "quit")],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {}  ", label), label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
