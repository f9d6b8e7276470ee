use std::env;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::app::{App, FocusPane, InputMode, Popup};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Resize(_, _) => app.scroll_chat_to_bottom(),
        AppEvent::Tick => app.tick_animation(),
        AppEvent::TurnFinished(pending, result) => app.finish_turn(pending, result),
        AppEvent::Speech(generation, event) => app.handle_speech(generation, event),
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    if app.popup.is_some() {
        handle_popup(app, key);
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
        InputMode::AttachPath => handle_attach_mode(app, key).await,
    }

    Ok(())
}

fn handle_popup(app: &mut App, key: KeyEvent) {
    match (app.popup.clone(), key.code) {
        (_, KeyCode::Esc) | (_, KeyCode::Char('q')) => app.popup = None,
        (Some(Popup::Settings), KeyCode::Char('l')) => app.toggle_language(),
        (Some(Popup::Settings), KeyCode::Char('r')) => app.reset_session(),
        (Some(Popup::Screenshot(url)), KeyCode::Char('c')) => copy_to_clipboard(&url),
        (Some(Popup::Screenshot(url)), KeyCode::Char('o')) => open_external(&url),
        _ => {}
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    app.flash = None;

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Tab => {
            app.focus = match app.focus {
                FocusPane::Actions => FocusPane::Chat,
                FocusPane::Chat => FocusPane::Actions,
            };
        }

        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            FocusPane::Actions => app.actions_nav_down(),
            FocusPane::Chat => app.scroll_down(),
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            FocusPane::Actions => app.actions_nav_up(),
            FocusPane::Chat => app.scroll_up(),
        },
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        KeyCode::Enter => {
            if app.focus == FocusPane::Actions {
                if let Some(action) = app.selected_action() {
                    app.run_quick_action(action);
                }
            } else {
                app.input_mode = InputMode::Editing;
            }
        }

        KeyCode::Char('i') | KeyCode::Char('/') => {
            app.focus = FocusPane::Chat;
            app.input_mode = InputMode::Editing;
            app.input_cursor = app.input.chars().count();
        }

        // Step controls
        KeyCode::Char('n') | KeyCode::Right => app.next_step(),
        KeyCode::Char('p') | KeyCode::Left => app.previous_step(),
        KeyCode::Char('x') => app.run_quick_action(crate::app::QuickAction::Exit),

        KeyCode::Char('a') => {
            app.attach_input.clear();
            app.input_mode = InputMode::AttachPath;
        }
        KeyCode::Char('v') => app.toggle_voice(),
        KeyCode::Char('L') => app.toggle_language(),

        KeyCode::Char('c') => app.copy_session(),
        KeyCode::Char('r') => app.reset_session(),
        KeyCode::Char('s') => {
            if let Some(url) = app.latest_screenshot() {
                app.popup = Some(Popup::Screenshot(url));
            }
        }

        KeyCode::Char('?') => app.popup = Some(Popup::Help),
        KeyCode::Char(',') => app.popup = Some(Popup::Settings),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.submit_input();
        }
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

async fn handle_attach_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.attach_input.clear();
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            let raw = std::mem::take(&mut app.attach_input);
            app.input_mode = InputMode::Normal;
            if let Some(path) = expand_path(raw.trim()) {
                app.attach_file(&path).await;
            }
        }
        KeyCode::Backspace => {
            app.attach_input.pop();
        }
        KeyCode::Char(c) => {
            app.attach_input.push(c);
        }
        _ => {}
    }
}

/// `~/` expands to the home directory; blank input means no file
fn expand_path(raw: &str) -> Option<PathBuf> {
    if raw.is_empty() {
        return None;
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return Some(home.join(rest));
        }
    }
    Some(PathBuf::from(raw))
}

const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[
    ("pbcopy", &[]),
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
];

const OPEN_COMMANDS: &[(&str, &[&str])] = &[("open", &[]), ("xdg-open", &[])];

static CLIPBOARD: OnceLock<Option<DesktopCommand>> = OnceLock::new();
static OPENER: OnceLock<Option<DesktopCommand>> = OnceLock::new();

/// Helper program found on PATH, with its fixed arguments
#[derive(Debug, Clone, PartialEq, Eq)]
struct DesktopCommand {
    program: PathBuf,
    args: Vec<String>,
}

fn first_available(candidates: &[(&str, &[&str])], path_var: Option<&OsStr>) -> Option<DesktopCommand> {
    let path_var = path_var?;
    candidates.iter().find_map(|(cmd, args)| {
        env::split_paths(path_var)
            .map(|dir| dir.join(cmd))
            .find(|candidate| candidate.is_file())
            .map(|program| DesktopCommand {
                program,
                args: args.iter().map(|a| a.to_string()).collect(),
            })
    })
}

/// Look up clipboard and opener helpers once, before the UI starts
pub fn resolve_desktop_commands() {
    let path_var = env::var_os("PATH");
    let clipboard = CLIPBOARD.get_or_init(|| first_available(CLIPBOARD_COMMANDS, path_var.as_deref()));
    let opener = OPENER.get_or_init(|| first_available(OPEN_COMMANDS, path_var.as_deref()));
    tracing::debug!(?clipboard, ?opener, "desktop helpers resolved");
}

pub fn copy_to_clipboard(text: &str) {
    resolve_desktop_commands();
    let Some(Some(command)) = CLIPBOARD.get() else {
        tracing::debug!("no clipboard command found");
        return;
    };

    let child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match child {
        Ok(mut child) => {
            let payload = text.as_bytes().to_vec();
            tokio::spawn(async move {
                if let Some(mut stdin) = child.stdin.take() {
                    let _ = stdin.write_all(&payload).await;
                }
                // stdin is closed here so the helper can exit
                let _ = child.wait().await;
            });
        }
        Err(e) => tracing::warn!(error = %e, "clipboard command failed"),
    }
}

/// Open a screenshot URL with the desktop's default handler
fn open_external(target: &str) {
    resolve_desktop_commands();
    let Some(Some(command)) = OPENER.get() else {
        return;
    };

    match Command::new(&command.program)
        .args(&command.args)
        .arg(target)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(mut child) => {
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }
        Err(e) => tracing::warn!(error = %e, "open command failed"),
    }
}
