use std::str::FromStr;

use crate::events::KeyAction;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Clear the conversation
    Clear,
    /// Regenerate session identifiers and renew the token
    Reload,
    /// Show help
    Help,
    /// Exit the application
    Bye,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

pub fn command_entries() -> Vec<CommandEntry> {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::Clear => "clear chat history",
            SlashCommand::Reload => "(debug) reload copilot token and session",
            SlashCommand::Help => "show available commands",
            SlashCommand::Bye => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }

    pub fn action(self) -> KeyAction {
        match self {
            SlashCommand::Clear => KeyAction::Clear,
            SlashCommand::Reload => KeyAction::Reload,
            SlashCommand::Help => KeyAction::Help,
            SlashCommand::Bye => KeyAction::Quit,
        }
    }
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let rest = input.trim().strip_prefix('/')?;
    let head = rest.split_whitespace().next()?;

    SlashCommand::from_str(head)
        .ok()
        .or_else(|| match head.to_lowercase().as_str() {
            "q" | "quit" | "exit" => Some(SlashCommand::Bye),
            "c" | "cls" => Some(SlashCommand::Clear),
            "h" | "?" => Some(SlashCommand::Help),
            _ => None,
        })
}

/// Global key bindings, checked before the composer sees the key.
pub fn key_action(key: &KeyEvent) -> Option<KeyAction> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Char('c') if ctrl => Some(KeyAction::Quit),
        KeyCode::Char('l') if ctrl => Some(KeyAction::Clear),
        KeyCode::Char('r') if ctrl => Some(KeyAction::Reload),
        KeyCode::Char('p') if ctrl => Some(KeyAction::ScrollUp),
        KeyCode::Char('n') if ctrl => Some(KeyAction::ScrollDown),
        KeyCode::PageUp => Some(KeyAction::ScrollUp),
        KeyCode::PageDown => Some(KeyAction::ScrollDown),
        KeyCode::F(1) => Some(KeyAction::Help),
        _ => None,
    }
}

/// One-line summary shown under the composer
pub fn short_help() -> &'static str {
    "enter send · alt+enter newline · ctrl+p/n scroll · ctrl+l clear · ctrl+r reload · ctrl+c quit · /help"
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Key bindings:\n\n");
    help.push_str("  enter          send message\n");
    help.push_str("  alt/shift+enter  insert newline\n");
    help.push_str("  ctrl+p, pgup   scroll up\n");
    help.push_str("  ctrl+n, pgdown scroll down\n");
    help.push_str("  ctrl+l         clear chat history\n");
    help.push_str("  ctrl+r         (debug) reload copilot token\n");
    help.push_str("  ctrl+c         quit\n");
    help.push_str("\nCommands:\n\n");
    for entry in command_entries() {
        help.push_str(&format!("  /{:<8} {}\n", entry.keyword, entry.description));
    }
    help.push_str("\nAliases: /q, /quit, /exit for /bye; /c for /clear; /h for /help");

    help
}
