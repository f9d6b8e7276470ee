use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph, Wrap},
};
use isupplier_core::{classify_chips, DisplayMessage, Lang, Origin, Priority};

use crate::app::{quick_actions, App, FocusPane, InputMode, Popup, QuickAction};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

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
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
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

/// Centered popup area, clamped to the frame
fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [actions_area, chat_area, progress_area] = Layout::horizontal([
        Constraint::Length(30),
        Constraint::Min(30),
        Constraint::Length(32),
    ])
    .areas(body_area);

    render_actions(app, frame, actions_area);
    render_chat(app, frame, chat_area);
    render_progress(app, frame, progress_area);
    render_footer(app, frame, footer_area);

    match app.popup.clone() {
        Some(Popup::Help) => render_help(app.lang(), frame, area),
        Some(Popup::Settings) => render_settings(app, frame, area),
        Some(Popup::Screenshot(url)) => render_screenshot(app.lang(), &url, frame, area),
        None => {}
    }
    if app.input_mode == InputMode::AttachPath {
        render_attach_input(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let lang = app.lang();
    let title = Line::from(vec![
        Span::styled(" iSupplier Assistant ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            lang.pick("Supplier portal guide ", "Guide du portail fournisseur "),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(format!("[{}] ", lang.as_str()), Style::default().fg(Color::Yellow).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_actions(app: &mut App, frame: &mut Frame, area: Rect) {
    let lang = app.lang();
    let focused = app.focus == FocusPane::Actions;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(lang.pick(" Quick actions ", " Actions rapides "));

    let items: Vec<ListItem> = quick_actions()
        .into_iter()
        .map(|action| match action {
            QuickAction::Start(flow) => {
                let style = match flow.priority() {
                    Priority::Primary => Style::default().fg(Color::White).bold(),
                    Priority::Secondary => Style::default().fg(Color::Gray),
                };
                ListItem::new(format!(" {} ", flow.label(lang))).style(style)
            }
            QuickAction::Exit => ListItem::new(lang.pick(" EXIT FLOW ", " QUITTER LE FLUX "))
                .style(Style::default().fg(Color::Red).bold()),
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

    frame.render_stateful_widget(list, area, &mut app.actions_state);
}

fn message_lines(msg: &DisplayMessage, lang: Lang, lines: &mut Vec<Line<'static>>) {
    match msg.origin {
        Origin::User => {
            lines.push(Line::from(Span::styled(
                lang.pick("You:", "Vous :"),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
            for line in msg.text.as_deref().unwrap_or_default().lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        Origin::Assistant => {
            let label = match msg.step_index {
                Some(step) => format!("Assistant ({} {}):", lang.pick("step", "étape"), step + 1),
                None => lang.pick("Assistant:", "Assistant :").to_string(),
            };
            lines.push(Line::from(Span::styled(
                label,
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));

            let text = msg.text.as_deref().unwrap_or_default();
            for line in text.lines() {
                lines.push(parse_markdown_line(line));
            }

            let mut extras: Vec<Span<'static>> = classify_chips(text)
                .into_iter()
                .flat_map(|tag| {
                    [
                        Span::styled(
                            format!(" {} ", tag.label(lang)),
                            Style::default().bg(Color::Magenta).fg(Color::White),
                        ),
                        Span::raw(" "),
                    ]
                })
                .collect();
            if msg.image_ref.is_some() {
                extras.push(Span::styled(
                    lang.pick("[screenshot: press s]", "[capture : touche s]"),
                    Style::default().fg(Color::Green).add_modifier(Modifier::ITALIC),
                ));
            }
            if !extras.is_empty() {
                lines.push(Line::from(extras));
            }
        }
    }
    lines.push(Line::default());
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let lang = app.lang();
    let show_steps = app.controller.progress().has_flow();

    let [history_area, steps_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(if show_steps { 1 } else { 0 }),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = history_area.height.saturating_sub(2);
    app.chat_width = history_area.width.saturating_sub(2);

    let focused = app.focus == FocusPane::Chat;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(lang.pick(" Conversation ", " Conversation "));

    let mut lines: Vec<Line<'static>> = Vec::new();
    for msg in app.controller.messages() {
        message_lines(msg, lang, &mut lines);
    }

    if app.controller.is_thinking() {
        lines.push(Line::from(Span::styled(
            lang.pick("Assistant:", "Assistant :"),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("{}{}", lang.pick("Thinking", "Réflexion"), dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, history_area);

    if show_steps {
        let hint = Line::from(vec![
            Span::styled(" p ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(lang.pick(" previous step  ", " étape précédente  ")),
            Span::styled(" n ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(lang.pick(" next step  ", " étape suivante  ")),
            Span::styled(" x ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(lang.pick(" exit flow", " quitter le flux")),
        ]);
        frame.render_widget(Paragraph::new(hint), steps_area);
    }

    render_input(app, frame, input_area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let lang = app.lang();
    let editing = app.input_mode == InputMode::Editing;
    let listening = app.voice.is_active();

    let border_color = if listening {
        Color::Red
    } else if editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let title = if listening {
        lang.pick(" Listening... (v to stop) ", " Écoute... (v pour arrêter) ")
    } else {
        lang.pick(" Message (i to type, Enter to send) ", " Message (i pour écrire, Entrée pour envoyer) ")
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Interim transcripts preview in place of typed text
    let (source, cursor_pos) = if listening && !app.voice.preview().is_empty() {
        (app.voice.preview(), app.voice.preview().chars().count())
    } else {
        (app.input.as_str(), app.input_cursor)
    };

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = source.chars().skip(scroll_offset).take(inner_width).collect();

    let style = if listening {
        Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC)
    } else {
        Style::default().fg(Color::Cyan)
    };
    frame.render_widget(Paragraph::new(visible_text).style(style).block(input_block), area);

    if editing && !listening {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_progress(app: &App, frame: &mut Frame, area: Rect) {
    let lang = app.lang();
    let progress = app.controller.progress();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(lang.pick(" Progress ", " Progression "));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [gauge_area, details_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(inner);

    let pct = progress.percentage();
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
        .percent(u16::from(pct))
        .label(format!("{}%", pct));
    frame.render_widget(gauge, gauge_area);

    let mut lines: Vec<Line> = vec![Line::default()];
    if progress.has_flow() {
        lines.push(Line::from(Span::styled(
            format!(
                "{} {}/{}",
                lang.pick("Step", "Étape"),
                progress.current_step + 1,
                progress.total_steps
            ),
            Style::default().fg(Color::White).bold(),
        )));
    } else {
        lines.push(Line::from(Span::styled(
            lang.pick("No active workflow", "Aucun workflow actif"),
            Style::default().fg(Color::DarkGray),
        )));
    }
    if let Some(title) = &progress.flow_title {
        lines.push(Line::from(vec![
            Span::styled(lang.pick("Flow: ", "Flux : "), Style::default().fg(Color::DarkGray)),
            Span::raw(title.clone()),
        ]));
    }

    lines.push(Line::default());
    lines.push(Line::from(vec![
        Span::styled(lang.pick("Session: ", "Session : "), Style::default().fg(Color::DarkGray)),
        Span::styled(app.session_id.short(), Style::default().fg(Color::Cyan)),
    ]));
    if app.controller.session_degraded() {
        lines.push(Line::from(Span::styled(
            lang.pick("(not saved, storage unavailable)", "(non enregistrée, stockage indisponible)"),
            Style::default().fg(Color::Red).add_modifier(Modifier::ITALIC),
        )));
    }

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), details_area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let lang = app.lang();
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
        InputMode::AttachPath => (" ATTACH ", Style::default().bg(Color::Magenta).fg(Color::White)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];

    if let Some(flash) = &app.flash {
        spans.push(Span::styled(format!(" {} ", flash), Style::default().fg(Color::Green).bold()));
    } else {
        let hints: &[(&str, &str, &str)] = match app.input_mode {
            InputMode::Normal => &[
                ("Tab", "focus", "focus"),
                ("Enter", "run", "lancer"),
                ("i", "type", "écrire"),
                ("a", "attach", "joindre"),
                ("v", "voice", "voix"),
                ("L", "EN/FR", "EN/FR"),
                ("?", "help", "aide"),
                ("q", "quit", "quitter"),
            ],
            InputMode::Editing => &[("Enter", "send", "envoyer"), ("Esc", "done", "terminer")],
            InputMode::AttachPath => &[("Enter", "attach", "joindre"), ("Esc", "cancel", "annuler")],
        };
        for (key, en, fr) in hints {
            spans.push(Span::styled(format!(" {} ", key), key_style));
            spans.push(Span::styled(format!(" {} ", lang.pick(en, fr)), label_style));
        }
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_help(lang: Lang, frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(area, 56, 20);
    frame.render_widget(Clear, popup_area);

    let rows: &[(&str, &str, &str)] = &[
        ("Tab", "switch pane", "changer de panneau"),
        ("j/k", "move / scroll", "naviguer / défiler"),
        ("Enter", "run quick action", "lancer l'action"),
        ("i, /", "type a message", "écrire un message"),
        ("n / p", "next / previous step", "étape suivante / précédente"),
        ("x", "exit the current flow", "quitter le flux"),
        ("a", "attach a file", "joindre un fichier"),
        ("v", "start / stop voice input", "démarrer / arrêter la voix"),
        ("s", "show latest screenshot", "voir la dernière capture"),
        ("L", "switch language", "changer de langue"),
        ("c", "copy session id", "copier l'identifiant"),
        ("r", "start a new session", "nouvelle session"),
        (",", "settings", "paramètres"),
        ("q", "quit", "quitter"),
    ];

    let key_style = Style::default().fg(Color::Yellow).bold();
    let lines: Vec<Line> = rows
        .iter()
        .map(|(key, en, fr)| {
            Line::from(vec![
                Span::styled(format!(" {:<8}", key), key_style),
                Span::raw(lang.pick(en, fr).to_string()),
            ])
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(lang.pick(" Keys (Esc to close) ", " Touches (Échap pour fermer) "));

    frame.render_widget(Paragraph::new(lines).block(block), popup_area);
}

fn render_settings(app: &App, frame: &mut Frame, area: Rect) {
    let lang = app.lang();
    let popup_area = centered_rect(area, 64, 10);
    frame.render_widget(Clear, popup_area);

    let label = Style::default().fg(Color::DarkGray);
    let lines = vec![
        Line::from(vec![
            Span::styled(lang.pick(" Language:  ", " Langue :   "), label),
            Span::styled(lang.as_str(), Style::default().fg(Color::Yellow).bold()),
            Span::styled(lang.pick("   (l to switch)", "   (l pour changer)"), label),
        ]),
        Line::from(vec![
            Span::styled(" Session:   ", label),
            Span::styled(app.session_id.as_str().to_string(), Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![
            Span::styled(" Endpoint:  ", label),
            Span::raw(app.endpoint.clone()),
        ]),
        Line::default(),
        Line::from(Span::styled(
            lang.pick(" r: start a new session", " r : nouvelle session"),
            label,
        )),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(lang.pick(" Settings ", " Paramètres "));

    frame.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: false }), popup_area);
}

fn render_screenshot(lang: Lang, url: &str, frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(area, 72, 8);
    frame.render_widget(Clear, popup_area);

    let lines = vec![
        Line::from(Span::styled(url.to_string(), Style::default().fg(Color::Cyan).underlined())),
        Line::default(),
        Line::from(Span::styled(
            lang.pick(
                "o: open in browser   c: copy link   Esc: close",
                "o : ouvrir   c : copier le lien   Échap : fermer",
            ),
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green))
        .title(lang.pick(" Screenshot ", " Capture d'écran "));

    frame.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: true }), popup_area);
}

fn render_attach_input(app: &App, frame: &mut Frame, area: Rect) {
    let lang = app.lang();
    let popup_area = centered_rect(area, 64, 6);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(lang.pick(" Attach a file ", " Joindre un fichier "));

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new(lang.pick(
        "File path. Enter to send, Esc to cancel.",
        "Chemin du fichier. Entrée pour envoyer, Échap pour annuler.",
    ))
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let width = input_area.width as usize;
    let count = app.attach_input.chars().count();
    let offset = count.saturating_sub(width.saturating_sub(1));
    let visible: String = app.attach_input.chars().skip(offset).collect();
    frame.render_widget(Paragraph::new(visible).style(Style::default().fg(Color::Cyan)), input_area);

    let cursor_x = (count - offset) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_markdown_bold() {
        let line = parse_markdown_line("Click **Submit** now");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "Submit");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_parse_markdown_unclosed() {
        let line = parse_markdown_line("a **b");
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line.spans[0].content, "a **b");
    }

    #[test]
    fn test_centered_rect_clamps() {
        let area = Rect::new(0, 0, 40, 10);
        let r = centered_rect(area, 100, 100);
        assert_eq!(r, Rect::new(2, 2, 36, 6));
    }

    #[test]
    fn test_assistant_lines_include_chips_and_step() {
        let msg = DisplayMessage::assistant("Click Next to continue").with_step(Some(1));
        let mut lines = Vec::new();
        message_lines(&msg, Lang::En, &mut lines);

        assert_eq!(lines[0].spans[0].content, "Assistant (step 2):");
        let chips: Vec<String> = lines[2].spans.iter().map(|s| s.content.trim().to_string()).collect();
        assert!(chips.contains(&"Click".to_string()));
        assert!(chips.contains(&"Next".to_string()));
        assert!(lines.last().is_some_and(|l| l.spans.is_empty()));
    }
}
