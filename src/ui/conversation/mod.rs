//! Conversation UI components for chat interface

pub mod commands;
pub mod composer;
pub mod history;
pub mod manager;

pub use commands::{get_help_text, SlashCommand};
pub use composer::{ConversationComposer, ConversationResult};
pub use history::ConversationHistory;
pub use manager::{ConversationController, TurnState};
