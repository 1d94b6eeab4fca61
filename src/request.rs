use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use serde::Serialize;

use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::events::ConversationEntry;
use crate::session::Session;

/// Wire body of a completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub intent: bool,
    pub model: String,
    pub n: u32,
    pub stream: bool,
    pub temperature: f32,
    pub top_p: u32,
    pub messages: Vec<ConversationEntry>,
    pub max_tokens: u32,
}

/// Assembles completion requests from the conversation history.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    model: String,
    temperature: f32,
    top_p: u32,
    max_tokens: u32,
}

impl RequestBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        }
    }

    /// Full history goes out as context, untouched.
    pub fn build(&self, history: &[ConversationEntry]) -> CompletionRequest {
        CompletionRequest {
            intent: true,
            model: self.model.clone(),
            n: 1,
            stream: true,
            temperature: self.temperature,
            top_p: self.top_p,
            messages: history.to_vec(),
            max_tokens: self.max_tokens,
        }
    }

    /// Authorization, session and client identification headers.
    pub fn headers(&self, session: &Session) -> Result<HeaderMap> {
        let dynamic = [
            ("authorization", format!("Bearer {}", session.bearer_token)),
            ("vscode-sessionid", session.ids.session_id.clone()),
            ("x-request-id", session.ids.request_id.clone()),
            ("vscode-machineid", session.ids.machine_id.clone()),
        ];
        let fixed = [
            ("content-type", "application/json"),
            ("openai-intent", "conversation-panel"),
            ("openai-organization", "github-copilot"),
            ("user-agent", "GitHubCopilotChat/0.14.2024032901"),
            ("editor-version", "vscode/1.88.0"),
            ("editor-plugin-version", "copilot-chat/0.14.2024032901"),
            ("x-github-api-version", "2023-07-07"),
            ("copilot-integration-id", "vscode-chat"),
            ("accept", "*/*"),
        ];

        let mut headers = HeaderMap::new();
        for (name, value) in dynamic {
            let value = HeaderValue::from_str(&value).map_err(|e| invalid_header(name, e))?;
            headers.insert(HeaderName::from_static(name), value);
        }
        for (name, value) in fixed {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }

        Ok(headers)
    }
}

fn invalid_header(name: &str, err: InvalidHeaderValue) -> ChatError {
    ChatError::Auth(format!("unusable value for header {}: {}", name, err))
}
