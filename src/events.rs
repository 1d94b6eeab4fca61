use serde::{Deserialize, Serialize};

/// Events delivered to the owning loop.
///
/// Worker events carry the generation (or session epoch) they were produced
/// for so the loop can drop anything that belongs to a cleared conversation
/// or a reloaded session.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// User submitted composer text
    Submit(String),

    /// Partial reply; `text` is everything received so far
    StreamProgress { generation: u64, text: String },

    /// Final event of a turn
    StreamDone {
        generation: u64,
        text: String,
        is_error: bool,
    },

    /// Turn failed before any reply could be streamed
    TurnFailed { generation: u64, message: String },

    /// Worker obtained a fresh bearer token for this session epoch
    TokenRenewed { epoch: u64, token: String },

    /// Terminal resize
    Resize { width: u16, height: u16 },

    /// Key binding or slash command
    Action(KeyAction),
}

/// Actions bound to keys or typed as slash commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Clear,
    Reload,
    Help,
    ScrollUp,
    ScrollDown,
    Quit,
}

/// Role in conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "You",
            Role::Assistant => "GitHub Copilot",
        }
    }
}

/// Individual conversation entry, serialized verbatim into the request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
}

impl ConversationEntry {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One decode step of a completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub text: String,
    pub done: bool,
    pub is_error: bool,
}

impl StreamEvent {
    pub fn progress(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
            is_error: false,
        }
    }

    pub fn finished(text: impl Into<String>, is_error: bool) -> Self {
        Self {
            text: text.into(),
            done: true,
            is_error,
        }
    }

    /// Tag this event with the turn it belongs to.
    pub fn into_app_event(self, generation: u64) -> AppEvent {
        if self.done {
            AppEvent::StreamDone {
                generation,
                text: self.text,
                is_error: self.is_error,
            }
        } else {
            AppEvent::StreamProgress {
                generation,
                text: self.text,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serializes_lowercase_role() {
        let json = serde_json::to_string(&ConversationEntry::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_stream_event_tagging() {
        let progress = StreamEvent::progress("he").into_app_event(3);
        assert_eq!(
            progress,
            AppEvent::StreamProgress {
                generation: 3,
                text: "he".into()
            }
        );

        let done = StreamEvent::finished("boom", true).into_app_event(3);
        assert_eq!(
            done,
            AppEvent::StreamDone {
                generation: 3,
                text: "boom".into(),
                is_error: true
            }
        );
    }
}
