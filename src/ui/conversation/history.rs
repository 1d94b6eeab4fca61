//! Conversation history display component

use crate::events::{ConversationEntry, Role};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Renders the visible conversation, newest at the bottom.
///
/// `scroll` counts lines up from the bottom; it is clamped when rendering.
pub struct ConversationHistory<'a> {
    messages: &'a [ConversationEntry],
    scroll: usize,
}

impl<'a> ConversationHistory<'a> {
    pub fn new(messages: &'a [ConversationEntry], scroll: usize) -> Self {
        Self { messages, scroll }
    }

    /// Every line the messages occupy at the given inner width
    pub fn lines(&self, width: u16) -> Vec<Line<'static>> {
        let mut all_lines = Vec::new();
        for message in self.messages {
            all_lines.extend(render_message(message, width));
            all_lines.push(Line::default());
        }
        all_lines.pop();
        all_lines
    }

    /// Largest useful scroll offset for a viewport of `height` lines
    pub fn max_scroll(&self, width: u16, height: u16) -> usize {
        self.lines(width).len().saturating_sub(height as usize)
    }
}

impl Widget for ConversationHistory<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("GitHub Copilot Chat");

        let inner_area = block.inner(area);
        block.render(area, buf);

        let all_lines = self.lines(inner_area.width);
        let height = inner_area.height as usize;
        let total = all_lines.len();
        let scroll = self.scroll.min(total.saturating_sub(height));
        let end = total - scroll;
        let start = end.saturating_sub(height);

        for (i, line) in all_lines[start..end].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

/// Render a single message into lines
fn render_message(message: &ConversationEntry, width: u16) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![Span::styled(
        message.role.display_name(),
        label_style(message.role),
    )])];

    for content_line in wrap_text(&message.content, width.saturating_sub(2) as usize) {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(content_line, content_style(message.role)),
        ]));
    }

    lines
}

/// Wrap text to fit within the given width, keeping explicit line breaks
/// and indentation. Widths are counted in characters.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return text.split('\n').map(str::to_string).collect();
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let indent: String = paragraph.chars().take_while(|c| *c == ' ').collect();
        let mut current_line = indent.clone();
        let mut current_len = indent.chars().count();
        let mut has_word = false;

        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            let needed = if has_word { word_len + 1 } else { word_len };

            if has_word && current_len + needed > width {
                lines.push(std::mem::take(&mut current_line));
                current_len = 0;
                has_word = false;
            }

            if has_word {
                current_line.push(' ');
                current_len += 1;
            }

            // Words longer than the line are hard-split.
            let mut rest: Vec<char> = word.chars().collect();
            while current_len + rest.len() > width && !rest.is_empty() {
                let room = width.saturating_sub(current_len).max(1);
                let head: String = rest.drain(..room.min(rest.len())).collect();
                current_line.push_str(&head);
                lines.push(std::mem::take(&mut current_line));
                current_len = 0;
            }
            current_len += rest.len();
            current_line.extend(rest);
            has_word = current_len > 0;
        }

        if has_word || paragraph.trim().is_empty() {
            lines.push(current_line);
        }
    }

    lines
}

fn label_style(role: Role) -> Style {
    let color = match role {
        Role::User => Color::Blue,
        Role::Assistant => Color::Green,
        Role::System => Color::Yellow,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

/// Get content style based on role
fn content_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::White),
        Role::Assistant => Style::default(),
        Role::System => Style::default().fg(Color::Yellow),
    }
}
