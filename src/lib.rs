//! Terminal chat client for GitHub Copilot.

pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod prompts;
pub mod request;
pub mod session;
pub mod streaming;
pub mod token;
pub mod ui;

pub use config::Config;
pub use error::{ChatError, Result};
