use crate::ui::conversation::commands::{
    command_entries, parse_slash_command, CommandEntry, SlashCommand,
};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Result returned when the user interacts with the conversation composer
#[derive(Debug, PartialEq)]
pub enum ConversationResult {
    /// Enter pressed on non-empty text. The text stays in the composer until
    /// the caller accepts it and calls [`ConversationComposer::clear`].
    Submitted(String),
    Command(SlashCommand),
    None,
}

/// State for the text area within the composer
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    /// Cursor position counted in characters, not bytes
    pub cursor: usize,
}

impl TextAreaState {
    fn byte_index(&self) -> usize {
        self.content
            .char_indices()
            .nth(self.cursor)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len())
    }

    fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    fn insert_char(&mut self, c: char) {
        let at = self.byte_index();
        self.content.insert(at, c);
        self.cursor += 1;
    }

    /// Delete character before cursor
    fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        let at = self.byte_index();
        self.content.remove(at);
        true
    }

    /// Delete character at cursor
    fn delete(&mut self) -> bool {
        if self.cursor >= self.char_count() {
            return false;
        }
        let at = self.byte_index();
        self.content.remove(at);
        true
    }
}

/// Multi-line input area with a slash-command palette
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    has_focus: bool,
    waiting: bool,
    command_entries: Vec<CommandEntry>,
    filtered_commands: Vec<CommandEntry>,
    show_command_palette: bool,
    selected_command: Option<usize>,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            has_focus: true,
            waiting: false,
            command_entries: command_entries(),
            filtered_commands: Vec::new(),
            show_command_palette: false,
            selected_command: None,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationResult {
        if key.kind != KeyEventKind::Press {
            return ConversationResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key
                    .modifiers
                    .intersects(KeyModifiers::SHIFT | KeyModifiers::ALT)
                {
                    self.state.insert_char('\n');
                    self.sync_command_palette();
                    return ConversationResult::None;
                }
                if self.show_command_palette {
                    self.apply_selected_command();
                }
                if !self.state.content.trim().is_empty() {
                    if let Some(command) = parse_slash_command(&self.state.content) {
                        self.clear();
                        return ConversationResult::Command(command);
                    }
                    return ConversationResult::Submitted(self.state.content.clone());
                }
            }
            KeyCode::Up if self.show_command_palette => self.move_command_selection(-1),
            KeyCode::Down if self.show_command_palette => self.move_command_selection(1),
            KeyCode::Esc if self.show_command_palette => self.close_command_palette(),
            KeyCode::Tab if self.show_command_palette => self.apply_selected_command(),
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.state.insert_char(c);
                self.sync_command_palette();
            }
            KeyCode::Backspace => {
                if self.state.backspace() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Delete => {
                if self.state.delete() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Left => self.state.cursor = self.state.cursor.saturating_sub(1),
            KeyCode::Right => {
                self.state.cursor = (self.state.cursor + 1).min(self.state.char_count());
            }
            KeyCode::Home => self.state.cursor = 0,
            KeyCode::End => self.state.cursor = self.state.char_count(),
            _ => {}
        }

        ConversationResult::None
    }

    /// The palette is open while the content is a bare `/word` prefix.
    fn sync_command_palette(&mut self) {
        let content = &self.state.content;
        let typing_command = content.starts_with('/') && !content.contains(char::is_whitespace);

        if !typing_command {
            self.close_command_palette();
            return;
        }
        if !self.show_command_palette {
            self.show_command_palette = true;
            self.selected_command = Some(0);
        }
        self.refresh_command_palette();
    }

    fn close_command_palette(&mut self) {
        self.show_command_palette = false;
        self.filtered_commands.clear();
        self.selected_command = None;
    }

    fn refresh_command_palette(&mut self) {
        let query = self.state.content.trim_start_matches('/').to_lowercase();
        self.filtered_commands = self
            .command_entries
            .iter()
            .filter(|entry| entry.keyword.starts_with(&query))
            .copied()
            .collect();

        self.selected_command = match self.filtered_commands.len() {
            0 => None,
            len => Some(self.selected_command.unwrap_or(0).min(len - 1)),
        };
    }

    fn move_command_selection(&mut self, delta: isize) {
        let len = self.filtered_commands.len() as isize;
        if len == 0 {
            self.selected_command = None;
            return;
        }

        let current = self.selected_command.unwrap_or(0) as isize;
        self.selected_command = Some((current + delta).rem_euclid(len) as usize);
    }

    fn apply_selected_command(&mut self) {
        let Some(entry) = self
            .selected_command
            .and_then(|index| self.filtered_commands.get(index))
            .copied()
        else {
            self.close_command_palette();
            return;
        };

        self.state.content = format!("/{}", entry.keyword);
        self.state.cursor = self.state.char_count();
        self.close_command_palette();
    }

    /// Set focus state
    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    /// Show the waiting notice instead of the placeholder while a reply streams
    pub fn set_waiting(&mut self, waiting: bool) {
        self.waiting = waiting;
    }

    pub fn content(&self) -> &str {
        &self.state.content
    }

    pub fn is_palette_open(&self) -> bool {
        self.show_command_palette
    }

    /// Clear content
    pub fn clear(&mut self) {
        self.state = TextAreaState::default();
        self.close_command_palette();
    }

    /// Rows needed to show the content, borders included
    pub fn desired_height(&self, max: u16) -> u16 {
        let lines = self.state.content.split('\n').count().max(1) as u16;
        (lines + 2).min(max)
    }
}

impl Widget for &ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let title = if self.waiting {
            "Waiting for reply…"
        } else {
            "Message"
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(if self.has_focus && !self.waiting {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.state.content.is_empty() {
            let placeholder_line = Line::from(vec![Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
        } else {
            let mut content = self.state.content.clone();
            if self.has_focus {
                content.insert(self.state.byte_index(), '▌');
            }

            // Keep the cursor line visible when the text outgrows the box.
            let lines: Vec<&str> = content.split('\n').collect();
            let skip = lines.len().saturating_sub(inner_area.height as usize);
            for (i, line_text) in lines.iter().skip(skip).enumerate() {
                let line = Line::from(vec![Span::raw(*line_text)]);
                buf.set_line(inner_area.x, inner_area.y + i as u16, &line, inner_area.width);
            }
        }

        if self.show_command_palette && !self.filtered_commands.is_empty() {
            let palette_height = (self.filtered_commands.len().min(5) + 2) as u16;
            let palette_area = Rect {
                x: inner_area.x,
                y: area.y.saturating_sub(palette_height),
                width: inner_area.width,
                height: palette_height.min(area.y),
            };

            let block = Block::default()
                .borders(Borders::ALL)
                .title("Commands")
                .style(Style::default().fg(Color::Blue));
            let inner = block.inner(palette_area);
            block.render(palette_area, buf);

            for (index, entry) in self.filtered_commands.iter().enumerate() {
                if index >= inner.height as usize {
                    break;
                }

                let style = if self.selected_command == Some(index) {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };

                let line = Line::from(vec![
                    Span::styled(format!("/{}", entry.keyword), style),
                    Span::styled("  ", Style::default()),
                    Span::styled(entry.description, Style::default().fg(Color::Gray)),
                ]);

                buf.set_line(inner.x, inner.y + index as u16, &line, inner.width);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(composer: &mut ConversationComposer, text: &str) {
        for c in text.chars() {
            composer.handle_key(press(KeyCode::Char(c)));
        }
    }

    #[test]
    fn test_enter_submits_without_clearing() {
        let mut composer = ConversationComposer::new("Ask Copilot");
        type_text(&mut composer, "hello");

        let result = composer.handle_key(press(KeyCode::Enter));

        assert_eq!(result, ConversationResult::Submitted("hello".into()));
        assert_eq!(composer.content(), "hello");
    }

    #[test]
    fn test_blank_input_is_not_submitted() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "   ");

        assert_eq!(composer.handle_key(press(KeyCode::Enter)), ConversationResult::None);
    }

    #[test]
    fn test_alt_enter_inserts_newline() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "a");
        composer.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::ALT));
        type_text(&mut composer, "b");

        assert_eq!(composer.content(), "a\nb");
        assert_eq!(composer.desired_height(10), 4);
    }

    #[test]
    fn test_editing_multibyte_text() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "héllo");
        composer.handle_key(press(KeyCode::Left));
        composer.handle_key(press(KeyCode::Left));
        composer.handle_key(press(KeyCode::Left));
        composer.handle_key(press(KeyCode::Backspace));
        composer.handle_key(press(KeyCode::Home));
        composer.handle_key(press(KeyCode::Delete));

        assert_eq!(composer.content(), "llo");
    }

    #[test]
    fn test_slash_command_via_palette() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "/cl");
        assert!(composer.is_palette_open());

        composer.handle_key(press(KeyCode::Tab));
        assert_eq!(composer.content(), "/clear");
        assert!(!composer.is_palette_open());

        let result = composer.handle_key(press(KeyCode::Enter));
        assert_eq!(result, ConversationResult::Command(SlashCommand::Clear));
        assert_eq!(composer.content(), "");
    }

    #[test]
    fn test_enter_completes_partial_command() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "/by");

        let result = composer.handle_key(press(KeyCode::Enter));
        assert_eq!(result, ConversationResult::Command(SlashCommand::Bye));
    }

    #[test]
    fn test_palette_closes_on_plain_text() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "/");
        assert!(composer.is_palette_open());
        composer.handle_key(press(KeyCode::Backspace));
        assert!(!composer.is_palette_open());
        type_text(&mut composer, "/help me");
        assert!(!composer.is_palette_open());
    }

    #[test]
    fn test_control_chars_are_not_inserted() {
        let mut composer = ConversationComposer::new("");
        composer.handle_key(KeyEvent::new(KeyCode::Char('l'), KeyModifiers::CONTROL));
        assert_eq!(composer.content(), "");
    }
}
