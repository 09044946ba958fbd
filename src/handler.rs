use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;

use crate::app::{App, Focus, ATTACHMENT_ERROR_TEXT};
use crate::tui::AppEvent;
use math_tutor::controller::{settle, spawn_solve};
use math_tutor::SolutionTab;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent, tx: &UnboundedSender<AppEvent>) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key, tx).await?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::Solved(outcome) => app.finish_solve(outcome),
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.quit();
        return Ok(());
    }

    // Any key dismisses the alert
    if app.alert.is_some() {
        app.alert = None;
        return Ok(());
    }

    if app.attach_input.is_some() {
        handle_attach_prompt(app, key);
        return Ok(());
    }

    match app.focus {
        Focus::Input => handle_input(app, key, tx).await?,
        Focus::Transcript => handle_transcript(app, key),
    }
    Ok(())
}

async fn handle_input(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) -> Result<()> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => insert_char(app, '\n'),
        KeyCode::Char('j') if ctrl => insert_char(app, '\n'),
        KeyCode::Enter => submit(app, tx).await,
        KeyCode::Char('o') if ctrl => {
            app.attach_input = Some(String::new());
            app.attach_cursor = 0;
        }
        KeyCode::Char('x') if ctrl => app.controller.clear_file(),
        KeyCode::F(n @ 1..=2) if app.controller.transcript().is_empty() => {
            app.use_example(n as usize - 1);
        }
        KeyCode::Tab | KeyCode::BackTab => app.focus_transcript(),
        KeyCode::PageUp => app.scroll_up(app.half_page()),
        KeyCode::PageDown => app.scroll_down(app.half_page()),
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let draft = app.controller.draft_mut();
                let byte_pos = char_to_byte_index(draft, app.cursor);
                draft.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let draft = app.controller.draft_mut();
            if app.cursor < draft.chars().count() {
                let byte_pos = char_to_byte_index(draft, app.cursor);
                draft.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.controller.draft().chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.controller.draft().chars().count();
        }
        KeyCode::Char(c) if !ctrl => insert_char(app, c),
        _ => {}
    }
    Ok(())
}

fn insert_char(app: &mut App, c: char) {
    let draft = app.controller.draft_mut();
    let byte_pos = char_to_byte_index(draft, app.cursor);
    draft.insert(byte_pos, c);
    app.cursor += 1;
}

fn handle_transcript(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('i') => app.focus = Focus::Input,
        KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => app.next_tab(),
        KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => app.prev_tab(),
        KeyCode::Char(c @ '1'..='3') => {
            if let Some(tab) = c.to_digit(10).and_then(SolutionTab::from_number) {
                app.select_tab(tab);
            }
        }
        KeyCode::Char('[') => app.move_bubble_focus(-1),
        KeyCode::Char(']') => app.move_bubble_focus(1),
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::PageDown => app.scroll_down(app.half_page()),
        KeyCode::PageUp => app.scroll_up(app.half_page()),
        KeyCode::Char('g') => app.scroll = 0,
        KeyCode::Char('G') => app.scroll_to_bottom(),
        _ => {}
    }
}

fn handle_attach_prompt(app: &mut App, key: KeyEvent) {
    let Some(input) = app.attach_input.as_mut() else {
        return;
    };

    match key.code {
        KeyCode::Esc => {
            app.attach_input = None;
        }
        KeyCode::Enter => {
            let path = parse_path(input);
            app.attach_input = None;
            match path {
                Some(path) if path.is_file() => app.controller.select_file(path),
                Some(path) => {
                    app.alert = Some(format!("Không tìm thấy file: {}", path.display()));
                }
                None => {}
            }
        }
        KeyCode::Backspace => {
            if app.attach_cursor > 0 {
                app.attach_cursor -= 1;
                let byte_pos = char_to_byte_index(input, app.attach_cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.attach_cursor = app.attach_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            app.attach_cursor = (app.attach_cursor + 1).min(input.chars().count());
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(input, app.attach_cursor);
            input.insert(byte_pos, c);
            app.attach_cursor += 1;
        }
        _ => {}
    }
}

/// Clean up a typed or dropped path: trims quotes and expands `~/`.
fn parse_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim().trim_matches(|c| c == '\'' || c == '"');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.strip_prefix("~/").zip(dirs::home_dir()) {
        Some((rest, home)) => Some(home.join(rest)),
        None => Some(PathBuf::from(trimmed)),
    }
}

fn handle_paste(app: &mut App, text: &str) {
    if let Some(input) = app.attach_input.as_mut() {
        let byte_pos = char_to_byte_index(input, app.attach_cursor);
        let line = text.lines().next().unwrap_or_default();
        input.insert_str(byte_pos, line);
        app.attach_cursor += line.chars().count();
        return;
    }

    if app.focus == Focus::Input {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let draft = app.controller.draft_mut();
        let byte_pos = char_to_byte_index(draft, app.cursor);
        draft.insert_str(byte_pos, &text);
        app.cursor += text.chars().count();
    }
}

/// Append the user message, then run the solve call off the event loop.
async fn submit(app: &mut App, tx: &UnboundedSender<AppEvent>) {
    let request = match app.controller.begin_submit().await {
        Ok(Some(request)) => request,
        Ok(None) => return,
        Err(err) => {
            tracing::warn!(error = %err, "could not read attachment");
            app.alert = Some(ATTACHMENT_ERROR_TEXT.to_string());
            return;
        }
    };

    app.cursor = 0;
    // Scroll to bottom so "Đang suy nghĩ..." is visible
    app.scroll_to_bottom();

    let task = spawn_solve(app.controller.solver(), request);
    app.solve_task = Some(task.abort_handle());

    let tx = tx.clone();
    tokio::spawn(async move {
        let _ = tx.send(AppEvent::Solved(settle(task).await));
    });
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}
