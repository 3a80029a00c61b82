use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use wayfare_core::KeyValueStore;

use crate::app::{App, Confirm, FocusPane, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event<S: KeyValueStore>(app: &mut App<S>, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::Completion { session_id, outcome } => app.on_completion(&session_id, outcome),
    }
    Ok(())
}

fn handle_key<S: KeyValueStore>(app: &mut App<S>, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Popups take the keyboard first
    if app.confirm.is_some() {
        handle_confirm(app, key);
        return;
    }
    if app.show_api_key_input {
        handle_api_key_input(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_confirm<S: KeyValueStore>(app: &mut App<S>, key: KeyEvent) {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => app.accept_confirm(),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.cancel_confirm(),
        _ => {}
    }
}

fn handle_api_key_input<S: KeyValueStore>(app: &mut App<S>, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.dismiss_api_key_input();
        }
        KeyCode::Enter => {
            app.submit_api_key();
        }
        KeyCode::Backspace => {
            if app.api_key_input_cursor > 0 {
                app.api_key_input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.api_key_input, app.api_key_input_cursor);
                app.api_key_input.remove(byte_pos);
            }
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.api_key_input, app.api_key_input_cursor);
            app.api_key_input.insert(byte_pos, c);
            app.api_key_input_cursor += 1;
        }
        KeyCode::Left => {
            app.api_key_input_cursor = app.api_key_input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.api_key_input.chars().count();
            app.api_key_input_cursor = (app.api_key_input_cursor + 1).min(char_count);
        }
        _ => {}
    }
}

fn handle_normal_mode<S: KeyValueStore>(app: &mut App<S>, key: KeyEvent) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Session list navigation
        KeyCode::Char('j') | KeyCode::Down => {
            app.focus = FocusPane::Sessions;
            app.session_nav_down();
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.focus = FocusPane::Sessions;
            app.session_nav_up();
        }
        KeyCode::Char('g') => app.session_nav_first(),
        KeyCode::Char('G') => app.session_nav_last(),
        KeyCode::Enter | KeyCode::Char('l') => app.open_highlighted_session(),

        // Transcript scroll
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_down(app.transcript_height / 2);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_up(app.transcript_height / 2);
        }
        KeyCode::PageDown => app.scroll_down(app.transcript_height),
        KeyCode::PageUp => app.scroll_up(app.transcript_height),

        // Session actions
        KeyCode::Char('n') => app.request_confirm(Confirm::NewSession),
        KeyCode::Char('d') => {
            if let Some(id) = app.highlighted_session_id() {
                app.request_confirm(Confirm::DeleteSession(id));
            }
        }
        KeyCode::Char('C') => app.request_confirm(Confirm::ClearHistory),
        KeyCode::Char('K') => app.request_confirm(Confirm::ResetKey),

        // Back to the message box
        KeyCode::Char('i') | KeyCode::Tab => {
            if app.manager.awaiting_credential() {
                app.open_api_key_input();
            } else {
                app.focus = FocusPane::Input;
                app.input_mode = InputMode::Editing;
                app.input_cursor = app.input.chars().count();
            }
        }

        _ => {}
    }
}

fn handle_editing_mode<S: KeyValueStore>(app: &mut App<S>, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
            app.focus = FocusPane::Sessions;
        }
        KeyCode::Enter => {
            // Input stays locked while a reply is pending
            if app.manager.input_enabled() {
                app.submit_input();
            }
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
        KeyCode::PageDown => app.scroll_down(app.transcript_height),
        KeyCode::PageUp => app.scroll_up(app.transcript_height),
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse<S: KeyValueStore>(app: &mut App<S>, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_sessions = app.sessions_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_transcript = app.transcript_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_sessions {
                app.session_nav_down();
            } else if in_transcript {
                app.scroll_down(3);
            }
        }
        MouseEventKind::ScrollUp => {
            if in_sessions {
                app.session_nav_up();
            } else if in_transcript {
                app.scroll_up(3);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use wayfare_core::store::{CREDENTIAL_KEY, SESSIONS_KEY};
    use wayfare_core::{CompletionClient, MemoryStore, SessionManager, SessionStore};

    fn app_with(key: Option<&str>, sessions: Option<&str>) -> App<MemoryStore> {
        let mut backend = MemoryStore::new();
        if let Some(key) = key {
            backend.set(CREDENTIAL_KEY, key).unwrap();
        }
        if let Some(raw) = sessions {
            backend.set(SESSIONS_KEY, raw).unwrap();
        }
        let manager = SessionManager::open(SessionStore::new(backend), None);
        let client = CompletionClient::new("http://127.0.0.1:9/", "test-model", "Be brief.");
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(manager, client, tx)
    }

    fn press(app: &mut App<MemoryStore>, code: KeyCode) {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_text(app: &mut App<MemoryStore>, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn test_char_to_byte_index() {
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("abc", 10), 3);
    }

    #[test]
    fn test_ctrl_c_quits_from_anywhere() {
        let mut app = app_with(None, None);
        handle_key(&mut app, KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
    }

    #[test]
    fn test_api_key_entry() {
        let mut app = app_with(None, None);
        type_text(&mut app, "sk-or-typed");
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Char('x'));
        press(&mut app, KeyCode::Enter);

        assert!(!app.show_api_key_input);
        assert_eq!(
            app.manager.registry().store().load_credential().as_deref(),
            Some("sk-or-typex")
        );
        assert_eq!(app.input_mode, InputMode::Editing);
    }

    #[test]
    fn test_dismissed_key_prompt_keeps_input_disabled() {
        let mut app = app_with(None, None);
        press(&mut app, KeyCode::Esc);
        assert!(!app.show_api_key_input);
        assert!(!app.manager.input_enabled());

        // Trying to type reopens the prompt instead
        press(&mut app, KeyCode::Char('i'));
        assert!(app.show_api_key_input);
    }

    #[test]
    fn test_editing_with_cursor() {
        let mut app = app_with(Some("sk-test"), None);
        type_text(&mut app, "Lisbn");
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Char('o'));
        assert_eq!(app.input, "Lisbon");
        press(&mut app, KeyCode::Home);
        press(&mut app, KeyCode::Delete);
        assert_eq!(app.input, "isbon");
    }

    #[test]
    fn test_enter_on_blank_input_sends_nothing() {
        let mut app = app_with(Some("sk-test"), None);
        type_text(&mut app, "   ");
        press(&mut app, KeyCode::Enter);
        assert!(!app.manager.is_pending());
        assert!(app.manager.active_session().unwrap().is_empty());
    }

    #[test]
    fn test_delete_key_asks_first() {
        let sessions = r#"{
            "session_x": [{"role": "user", "content": "Rome?", "time": "2024-01-10T08:00:00Z"}],
            "session_y": [{"role": "user", "content": "Kyoto?", "time": "2024-02-01T12:00:00Z"}]
        }"#;
        let mut app = app_with(Some("sk-test"), Some(sessions));
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.confirm, Some(Confirm::DeleteSession("session_x".to_string())));

        // Other keys are swallowed by the popup
        press(&mut app, KeyCode::Char('q'));
        assert!(!app.should_quit);

        press(&mut app, KeyCode::Char('y'));
        assert!(!app.manager.registry().contains("session_x"));
        assert_eq!(app.manager.active_id(), Some("session_y"));
    }

    #[test]
    fn test_new_session_key() {
        let mut app = app_with(Some("sk-test"), None);
        let first = app.manager.active_id().unwrap().to_string();
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('n'));
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.manager.registry().len(), 2);
        assert_ne!(app.manager.active_id(), Some(first.as_str()));
    }
}
