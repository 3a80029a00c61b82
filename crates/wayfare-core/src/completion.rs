use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::state::Message;

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-r1-0528:free";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, friendly Travel Assistant. Answer travel-related questions only. If asked something unrelated, respond: 'I'm just a travel assistant bot.'";
pub const EMPTY_REPLY: &str = "⚠️ No response from the assistant.";
const ERROR_PREFIX: &str = "⚠️ Sorry, I encountered an error. ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

impl From<&Message> for ChatTurn {
    fn from(message: &Message) -> Self {
        Self::new(message.role.as_str(), &message.content)
    }
}

#[derive(Debug, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
}

impl CompletionRequest {
    /// System prompt, then prior history, then the new user turn
    pub fn new(model: &str, system_prompt: &str, history: &[ChatTurn], user_turn: &str) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatTurn::new("system", system_prompt));
        messages.extend(history.iter().cloned());
        messages.push(ChatTurn::new("user", user_turn));

        Self {
            model: model.to_string(),
            messages,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl CompletionResponse {
    fn into_reply(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .unwrap_or_else(|| EMPTY_REPLY.to_string())
    }
}

/// How a failed completion should be explained to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ModelUnavailable,
    ServiceUnavailable,
    Unauthorized,
    Other,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion API error {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl CompletionError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            CompletionError::Status { status, .. } => Some(*status),
            CompletionError::Transport(e) => e.status(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self.status().map(|s| s.as_u16()) {
            Some(404) => FailureKind::ModelUnavailable,
            Some(503) => FailureKind::ServiceUnavailable,
            Some(401) | Some(403) => FailureKind::Unauthorized,
            _ => FailureKind::Other,
        }
    }

    /// Text appended to the transcript in place of a reply
    pub fn user_message(&self) -> String {
        let detail = match self.kind() {
            FailureKind::ModelUnavailable => "The model might not be available.".to_string(),
            FailureKind::ServiceUnavailable => {
                "The service is temporarily unavailable.".to_string()
            }
            FailureKind::Unauthorized => "Please check your API key.".to_string(),
            FailureKind::Other => self.to_string(),
        };
        format!("{}{}", ERROR_PREFIX, detail)
    }
}

#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    endpoint: String,
    model: String,
    system_prompt: String,
}

impl CompletionClient {
    pub fn new(endpoint: &str, model: &str, system_prompt: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
        }
    }

    /// Swap the underlying HTTP client, e.g. to change proxy settings
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn request(&self, history: &[ChatTurn], user_turn: &str) -> CompletionRequest {
        CompletionRequest::new(&self.model, &self.system_prompt, history, user_turn)
    }

    /// One request/response exchange. No retry, no timeout.
    pub async fn complete(
        &self,
        credential: &str,
        history: &[ChatTurn],
        user_turn: &str,
    ) -> Result<String, CompletionError> {
        let request = self.request(history, user_turn);
        debug!(model = %self.model, turns = request.messages.len(), "sending completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", credential))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "completion request rejected");
            return Err(CompletionError::Status { status, body });
        }

        let completion: CompletionResponse = response.json().await?;
        Ok(completion.into_reply())
    }
}
