use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc;
use tracing::debug;
use wayfare_core::view::{self, SessionListItem};
use wayfare_core::{CompletionClient, CompletionError, KeyValueStore, SessionManager};

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Sessions,
    Input,
}

/// Destructive actions wait for a y/n answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirm {
    NewSession,
    DeleteSession(String),
    ClearHistory,
    ResetKey,
}

impl Confirm {
    pub fn prompt(&self) -> &'static str {
        match self {
            Confirm::NewSession => "Start a new conversation? Current conversation will be saved.",
            Confirm::DeleteSession(_) => "Delete this conversation?",
            Confirm::ClearHistory => "Clear all conversation history? This cannot be undone.",
            Confirm::ResetKey => "Reset API Key? You will need to enter a new API Key.",
        }
    }
}

pub struct App<S> {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Sessions and the completion endpoint
    pub manager: SessionManager<S>,
    pub client: CompletionClient,
    pub events: mpsc::UnboundedSender<AppEvent>,

    // Session list state
    pub session_state: ListState,

    // Message input
    pub input: String,
    pub input_cursor: usize, // cursor position in input (chars)

    // Transcript scroll
    pub transcript_scroll: u16,
    pub transcript_height: u16, // Inner height of transcript area
    pub transcript_width: u16,  // Inner width of transcript area

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // API key input state
    pub show_api_key_input: bool,
    pub api_key_input: String,
    pub api_key_input_cursor: usize,

    // Pending confirmation popup
    pub confirm: Option<Confirm>,

    // Panel areas for mouse hit-testing (updated during render)
    pub sessions_area: Option<Rect>,
    pub transcript_area: Option<Rect>,
}

impl<S: KeyValueStore> App<S> {
    pub fn new(
        manager: SessionManager<S>,
        client: CompletionClient,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let show_api_key_input = manager.awaiting_credential();
        let mut app = Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            focus: FocusPane::Input,

            manager,
            client,
            events,

            session_state: ListState::default(),

            input: String::new(),
            input_cursor: 0,

            transcript_scroll: 0,
            transcript_height: 0,
            transcript_width: 0,

            animation_frame: 0,

            show_api_key_input,
            api_key_input: String::new(),
            api_key_input_cursor: 0,

            confirm: None,

            sessions_area: None,
            transcript_area: None,
        };
        if app.manager.input_enabled() {
            app.input_mode = InputMode::Editing;
        }
        app.sync_session_selection();
        app.scroll_transcript_to_bottom();
        app
    }

    pub fn session_items(&self) -> Vec<SessionListItem> {
        view::session_list(self.manager.registry())
    }

    /// Point the list highlight at the active session
    pub fn sync_session_selection(&mut self) {
        let items = self.session_items();
        let active = items.iter().position(|item| item.active);
        self.session_state.select(active.or(if items.is_empty() { None } else { Some(0) }));
    }

    pub fn highlighted_session_id(&self) -> Option<String> {
        let items = self.session_items();
        self.session_state
            .selected()
            .and_then(|i| items.get(i))
            .map(|item| item.id.clone())
    }

    pub fn session_nav_down(&mut self) {
        let len = self.manager.registry().len();
        if len == 0 {
            return;
        }
        let i = match self.session_state.selected() {
            Some(i) => (i + 1).min(len - 1),
            None => 0,
        };
        self.session_state.select(Some(i));
    }

    pub fn session_nav_up(&mut self) {
        let i = self.session_state.selected().map(|i| i.saturating_sub(1)).unwrap_or(0);
        self.session_state.select(Some(i));
    }

    pub fn session_nav_first(&mut self) {
        self.session_state.select(Some(0));
    }

    pub fn session_nav_last(&mut self) {
        let len = self.manager.registry().len();
        self.session_state.select(Some(len.saturating_sub(1)));
    }

    /// Activate the highlighted session in the list
    pub fn open_highlighted_session(&mut self) {
        if let Some(id) = self.highlighted_session_id() {
            if self.manager.select_session(&id) {
                self.after_session_change();
            }
        }
    }

    pub fn request_confirm(&mut self, confirm: Confirm) {
        if self.manager.is_pending() && confirm != Confirm::ResetKey {
            debug!(?confirm, "ignored while a reply is pending");
            return;
        }
        self.confirm = Some(confirm);
    }

    /// Carry out the confirmed action
    pub fn accept_confirm(&mut self) {
        let Some(confirm) = self.confirm.take() else {
            return;
        };
        match confirm {
            Confirm::NewSession => {
                self.manager.new_session();
            }
            Confirm::DeleteSession(id) => {
                self.manager.delete_session(&id);
            }
            Confirm::ClearHistory => {
                self.manager.clear_history();
            }
            Confirm::ResetKey => {
                self.manager.reset_credential();
                self.open_api_key_input();
            }
        }
        self.after_session_change();
    }

    pub fn cancel_confirm(&mut self) {
        self.confirm = None;
    }

    pub fn open_api_key_input(&mut self) {
        self.show_api_key_input = true;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
        self.input_mode = InputMode::Normal;
    }

    /// Hand the typed key to the manager. Blank input keeps the popup open.
    pub fn submit_api_key(&mut self) {
        if self.manager.provide_credential(&self.api_key_input) {
            self.show_api_key_input = false;
            self.api_key_input.clear();
            self.api_key_input_cursor = 0;
            self.focus = FocusPane::Input;
            self.input_mode = InputMode::Editing;
        }
    }

    pub fn dismiss_api_key_input(&mut self) {
        self.show_api_key_input = false;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
    }

    /// Send the typed message and start the completion in the background
    pub fn submit_input(&mut self) {
        let turn = match self.manager.submit(&self.input) {
            Ok(turn) => turn,
            Err(e) => {
                debug!(error = %e, "message not sent");
                return;
            }
        };

        self.input.clear();
        self.input_cursor = 0;
        self.sync_session_selection();
        self.scroll_transcript_to_bottom();

        let client = self.client.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = client
                .complete(&turn.credential, &turn.history, &turn.user_turn)
                .await;
            let _ = events.send(AppEvent::Completion {
                session_id: turn.session_id,
                outcome,
            });
        });
    }

    /// Called on the event loop when a completion finishes
    pub fn on_completion(&mut self, session_id: &str, outcome: Result<String, CompletionError>) {
        self.manager.complete(session_id, outcome);
        self.animation_frame = 0;
        self.sync_session_selection();
        self.scroll_transcript_to_bottom();
    }

    fn after_session_change(&mut self) {
        self.sync_session_selection();
        self.transcript_scroll = 0;
        self.scroll_transcript_to_bottom();
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.manager.is_pending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.transcript_scroll = self.transcript_scroll.saturating_add(lines);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.transcript_scroll = self.transcript_scroll.saturating_sub(lines);
    }

    /// Scroll transcript to bottom so the newest turn is visible
    pub fn scroll_transcript_to_bottom(&mut self) {
        // Use actual transcript width for wrap calculation, default to 50 if not set
        let wrap_width = if self.transcript_width > 0 {
            self.transcript_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        if let Some(session) = self.manager.active_session() {
            for entry in view::transcript(session) {
                total_lines = total_lines.saturating_add(1); // Role line
                for line in &entry.lines {
                    // Use character count, not byte length, for proper UTF-8 handling
                    let char_count = line.chars().count();
                    let wrapped = u16::try_from(char_count / wrap_width + 1).unwrap_or(u16::MAX);
                    total_lines = total_lines.saturating_add(wrapped);
                }
                total_lines = total_lines.saturating_add(1); // Blank line after message
            }
        }

        if self.manager.is_pending() {
            total_lines = total_lines.saturating_add(2); // Role line + "Thinking..."
        }

        let visible_height = if self.transcript_height > 0 {
            self.transcript_height
        } else {
            20
        };

        self.transcript_scroll = total_lines.saturating_sub(visible_height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfare_core::store::{CREDENTIAL_KEY, SESSIONS_KEY};
    use wayfare_core::{MemoryStore, Role, SessionStore};

    const TWO_SESSIONS: &str = r#"{
        "session_x": [{"role": "user", "content": "Rome in winter?", "time": "2024-01-10T08:00:00Z"}],
        "session_y": [{"role": "user", "content": "Kyoto temples", "time": "2024-02-01T12:00:00Z"}]
    }"#;

    fn app_with(key: Option<&str>, sessions: Option<&str>) -> (App<MemoryStore>, mpsc::UnboundedReceiver<AppEvent>) {
        let mut backend = MemoryStore::new();
        if let Some(key) = key {
            backend.set(CREDENTIAL_KEY, key).unwrap();
        }
        if let Some(raw) = sessions {
            backend.set(SESSIONS_KEY, raw).unwrap();
        }
        let manager = SessionManager::open(SessionStore::new(backend), None);

        // Nothing listens on port 9 locally, so requests fail fast
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        let client = CompletionClient::new("http://127.0.0.1:9/v1/chat/completions", "test-model", "Be brief.")
            .with_http_client(http);
        let (tx, rx) = mpsc::unbounded_channel();
        (App::new(manager, client, tx), rx)
    }

    #[test]
    fn test_starts_with_key_prompt_when_missing() {
        let (app, _rx) = app_with(None, None);
        assert!(app.show_api_key_input);
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn test_starts_editing_when_key_present() {
        let (app, _rx) = app_with(Some("sk-test"), None);
        assert!(!app.show_api_key_input);
        assert_eq!(app.input_mode, InputMode::Editing);
    }

    #[test]
    fn test_selection_follows_active_session() {
        let (mut app, _rx) = app_with(Some("sk-test"), Some(TWO_SESSIONS));
        assert_eq!(app.highlighted_session_id().as_deref(), Some("session_y"));

        app.session_nav_down();
        assert_eq!(app.highlighted_session_id().as_deref(), Some("session_x"));
        app.open_highlighted_session();
        assert_eq!(app.manager.active_id(), Some("session_x"));

        // Opening only changes the active pointer, not the order
        assert_eq!(app.highlighted_session_id().as_deref(), Some("session_x"));
        assert_eq!(app.session_state.selected(), Some(1));
    }

    #[test]
    fn test_scroll_estimate_saturates_on_huge_transcripts() {
        let (mut app, _rx) = app_with(Some("sk-test"), None);
        app.manager.submit(&"day trip\n".repeat(70_000)).unwrap();
        app.scroll_transcript_to_bottom();
        assert_eq!(app.transcript_scroll, u16::MAX - 20);

        let (mut app, _rx) = app_with(Some("sk-test"), None);
        app.manager.submit(&"a".repeat(3_400_000)).unwrap();
        app.scroll_transcript_to_bottom();
        assert_eq!(app.transcript_scroll, u16::MAX - 20);
    }

    #[test]
    fn test_confirm_delete_active() {
        let (mut app, _rx) = app_with(Some("sk-test"), Some(TWO_SESSIONS));
        app.request_confirm(Confirm::DeleteSession("session_y".to_string()));
        app.accept_confirm();

        assert!(app.confirm.is_none());
        assert!(!app.manager.registry().contains("session_y"));
        assert_eq!(app.manager.registry().len(), 2);
        let active = app.manager.active_id().unwrap().to_string();
        assert_eq!(app.highlighted_session_id(), Some(active));
    }

    #[test]
    fn test_cancel_confirm_changes_nothing() {
        let (mut app, _rx) = app_with(Some("sk-test"), Some(TWO_SESSIONS));
        app.request_confirm(Confirm::ClearHistory);
        app.cancel_confirm();
        app.accept_confirm();
        assert_eq!(app.manager.registry().len(), 2);
    }

    #[test]
    fn test_reset_key_reopens_prompt() {
        let (mut app, _rx) = app_with(Some("sk-test"), None);
        app.request_confirm(Confirm::ResetKey);
        app.accept_confirm();
        assert!(app.manager.awaiting_credential());
        assert!(app.show_api_key_input);

        app.api_key_input = "sk-new".to_string();
        app.submit_api_key();
        assert!(!app.show_api_key_input);
        assert!(app.manager.input_enabled());
    }

    #[tokio::test]
    async fn test_failed_completion_lands_in_transcript() {
        let (mut app, mut rx) = app_with(Some("sk-test"), None);
        app.input = "Paris hotels?".to_string();
        app.submit_input();

        assert!(app.input.is_empty());
        assert!(app.manager.is_pending());
        assert!(!app.manager.input_enabled());

        let asking = app.manager.active_id().unwrap().to_string();
        let event = rx.recv().await.unwrap();
        let AppEvent::Completion { session_id, outcome } = event else {
            panic!("expected a completion event");
        };
        assert_eq!(session_id, asking);
        app.on_completion(&session_id, outcome);

        let session = app.manager.active_session().unwrap();
        assert_eq!(session.len(), 2);
        assert_eq!(session.messages[0].content, "Paris hotels?");
        assert_eq!(session.messages[1].role, Role::Assistant);
        assert!(session.messages[1].content.starts_with("⚠️ Sorry, I encountered an error."));
        assert!(app.manager.input_enabled());
    }
}
