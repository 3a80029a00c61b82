//! Read-only projections of session state for display
//!
//! Front ends render what these functions return and keep nothing else. All
//! message text passes through [`escape_control`] so stored content can never
//! move the cursor, recolor the screen, or otherwise drive the terminal.

use chrono::{DateTime, Local, Utc};

use crate::manager::SessionManager;
use crate::registry::{order_sessions, SessionRegistry};
use crate::state::{Role, Session, SessionMap};
use crate::store::KeyValueStore;

pub const SESSION_LABEL_MAX: usize = 30;
pub const EMPTY_SESSION_LABEL: &str = "New conversation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionListItem {
    pub id: String,
    pub label: String,
    pub message_count: usize,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub lines: Vec<String>,
    pub time_label: String,
}

/// Cut `text` to `max` characters, ending in an ellipsis when shortened
pub fn truncate_label(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut label: String = text.chars().take(max.saturating_sub(1)).collect();
    label.push('…');
    label
}

/// Unicode format characters (general category Cf). Bidi overrides and
/// isolates among them can reorder a terminal line. The zero-width joiners
/// U+200C/U+200D are left out: scripts and emoji sequences need them.
const FORMAT_CHARS: &[(char, char)] = &[
    ('\u{00AD}', '\u{00AD}'),
    ('\u{0600}', '\u{0605}'),
    ('\u{061C}', '\u{061C}'),
    ('\u{06DD}', '\u{06DD}'),
    ('\u{070F}', '\u{070F}'),
    ('\u{0890}', '\u{0891}'),
    ('\u{08E2}', '\u{08E2}'),
    ('\u{180E}', '\u{180E}'),
    ('\u{200B}', '\u{200B}'),
    ('\u{200E}', '\u{200F}'),
    ('\u{202A}', '\u{202E}'),
    ('\u{2060}', '\u{2064}'),
    ('\u{2066}', '\u{206F}'),
    ('\u{FEFF}', '\u{FEFF}'),
    ('\u{FFF9}', '\u{FFFB}'),
    ('\u{110BD}', '\u{110BD}'),
    ('\u{110CD}', '\u{110CD}'),
    ('\u{13430}', '\u{1343F}'),
    ('\u{1BCA0}', '\u{1BCA3}'),
    ('\u{1D173}', '\u{1D17A}'),
    ('\u{E0001}', '\u{E0001}'),
    ('\u{E0020}', '\u{E007F}'),
];

fn is_format_char(c: char) -> bool {
    FORMAT_CHARS.iter().any(|&(lo, hi)| (lo..=hi).contains(&c))
}

/// Render control and format characters as visible `\u{..}` escapes.
/// Newlines and tabs are left for the caller to lay out.
pub fn escape_control(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if (c.is_control() && c != '\n' && c != '\t') || is_format_char(c) {
            escaped.push_str(&format!("\\u{{{:04x}}}", c as u32));
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Local `HH:MM` for a message timestamp
pub fn time_of_day(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%H:%M").to_string()
}

fn session_label(session: &Session) -> String {
    match session.first() {
        // Labels are one line, so flatten newlines before escaping
        Some(message) => {
            let flat = message.content.replace(['\n', '\r', '\t'], " ");
            truncate_label(&escape_control(&flat), SESSION_LABEL_MAX)
        }
        None => EMPTY_SESSION_LABEL.to_string(),
    }
}

/// Sessions in display order; the active entry is matched by id
pub fn session_list<S: KeyValueStore>(registry: &SessionRegistry<S>) -> Vec<SessionListItem> {
    session_entries(registry.ordered_sessions(), registry.active_id())
}

/// List entries for stored sessions without opening a registry
pub fn stored_session_list(sessions: &SessionMap) -> Vec<SessionListItem> {
    session_entries(order_sessions(sessions), None)
}

fn session_entries(ordered: Vec<(&str, &Session)>, active: Option<&str>) -> Vec<SessionListItem> {
    ordered
        .into_iter()
        .map(|(id, session)| SessionListItem {
            id: id.to_string(),
            label: session_label(session),
            message_count: session.len(),
            active: Some(id) == active,
        })
        .collect()
}

pub fn transcript(session: &Session) -> Vec<TranscriptEntry> {
    session
        .messages
        .iter()
        .map(|message| TranscriptEntry {
            role: message.role,
            lines: message
                .content
                .split('\n')
                .map(|line| escape_control(line.strip_suffix('\r').unwrap_or(line)).replace('\t', "    "))
                .collect(),
            time_label: time_of_day(&message.time),
        })
        .collect()
}

/// Footer text derived from the manager's current state
pub fn status_line<S: KeyValueStore>(manager: &SessionManager<S>) -> String {
    if manager.awaiting_credential() {
        return "No API key provided. Chatbot disabled.".to_string();
    }
    if manager.is_pending() {
        return "The assistant is responding...".to_string();
    }
    match manager.active_session() {
        Some(session) if !session.is_empty() => {
            format!("Chat session with {} messages.", session.len())
        }
        _ => "Start chatting by entering a message.".to_string(),
    }
}
