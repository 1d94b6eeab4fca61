use std::io::{self, Stdout};

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use futures::StreamExt;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::Config;
use crate::events::{AppEvent, KeyAction};
use crate::llm::{CopilotClient, TurnDispatcher};
use crate::ui::conversation::commands::{get_help_text, key_action, short_help};
use crate::ui::conversation::{
    ConversationComposer, ConversationController, ConversationHistory, ConversationResult,
};

const COMPOSER_MAX_HEIGHT: u16 = 10;

/// Terminal state plus the conversation it shows.
///
/// Everything here is touched only by the owning loop.
pub struct App<D: TurnDispatcher> {
    controller: ConversationController<D>,
    composer: ConversationComposer,
    /// Lines scrolled up from the bottom of the history
    scroll: usize,
    /// Inner size of the history pane at the last draw
    history_area: Rect,
    show_help: bool,
    should_quit: bool,
}

impl<D: TurnDispatcher> App<D> {
    pub fn new(controller: ConversationController<D>) -> Self {
        Self {
            controller,
            composer: ConversationComposer::new("Ask GitHub Copilot (/help for commands)"),
            scroll: 0,
            history_area: Rect::default(),
            show_help: false,
            should_quit: false,
        }
    }

    pub fn controller(&self) -> &ConversationController<D> {
        &self.controller
    }

    pub fn composer(&self) -> &ConversationComposer {
        &self.composer
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    /// Translate a key press into an event, or edit the composer in place.
    pub fn map_key(&mut self, key: KeyEvent) -> Option<AppEvent> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        if let Some(action) = key_action(&key) {
            return Some(AppEvent::Action(action));
        }
        // Any other key dismisses the help overlay first.
        if self.show_help {
            self.show_help = false;
            return None;
        }

        match self.composer.handle_key(key) {
            ConversationResult::Submitted(text) => Some(AppEvent::Submit(text)),
            ConversationResult::Command(command) => Some(AppEvent::Action(command.action())),
            ConversationResult::None => None,
        }
    }

    /// Apply one event. Returns whether the screen needs a redraw.
    pub fn handle_event(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Submit(text) => self.on_submit(text),
            AppEvent::Action(action) => self.on_action(action),
            AppEvent::Resize { width, height } => self.on_resize(width, height),
            event => {
                let changed = self.controller.handle_event(event);
                if changed {
                    self.scroll = 0;
                    self.composer.set_waiting(self.controller.is_answering());
                }
                changed
            }
        }
    }

    fn on_submit(&mut self, text: String) -> bool {
        if !self.controller.submit(text) {
            return false;
        }
        self.composer.clear();
        self.composer.set_waiting(true);
        self.scroll = 0;
        true
    }

    fn on_action(&mut self, action: KeyAction) -> bool {
        debug!(?action, "Key action");
        match action {
            KeyAction::Clear => {
                self.controller.clear();
                self.composer.set_waiting(false);
                self.scroll = 0;
            }
            KeyAction::Reload => self.controller.reload(),
            KeyAction::Help => self.show_help = !self.show_help,
            KeyAction::ScrollUp => {
                let max = ConversationHistory::new(self.controller.messages(), 0)
                    .max_scroll(self.history_area.width, self.history_area.height);
                self.scroll = (self.scroll + self.page()).min(max);
            }
            KeyAction::ScrollDown => self.scroll = self.scroll.saturating_sub(self.page()),
            KeyAction::Quit => self.should_quit = true,
        }
        true
    }

    fn on_resize(&mut self, width: u16, height: u16) -> bool {
        debug!(width, height, "Terminal resized");
        true
    }

    fn page(&self) -> usize {
        (self.history_area.height as usize / 2).max(1)
    }

    pub fn shutdown(&mut self) {
        self.controller.shutdown();
    }

    pub fn draw(&mut self, frame: &mut Frame) {
        let area = frame.size();
        let composer_height = self.composer.desired_height(COMPOSER_MAX_HEIGHT);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(composer_height),
                Constraint::Length(1),
            ])
            .split(area);

        self.history_area = Block::default().borders(Borders::ALL).inner(chunks[0]);
        let history = ConversationHistory::new(self.controller.messages(), self.scroll);
        self.scroll = self
            .scroll
            .min(history.max_scroll(self.history_area.width, self.history_area.height));
        frame.render_widget(
            ConversationHistory::new(self.controller.messages(), self.scroll),
            chunks[0],
        );
        frame.render_widget(&self.composer, chunks[1]);
        frame.render_widget(
            Paragraph::new(short_help()).style(Style::default().fg(Color::DarkGray)),
            chunks[2],
        );

        if self.show_help {
            let popup = centered(area, 70, 22);
            frame.render_widget(Clear, popup);
            frame.render_widget(
                Paragraph::new(get_help_text())
                    .wrap(Wrap { trim: false })
                    .block(Block::default().borders(Borders::ALL).title("Help")),
                popup,
            );
        }
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

/// Raw-mode alternate screen, restored on drop
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Tui {
    pub fn init() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        stdout.execute(EnterAlternateScreen)?;

        let hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            restore_terminal();
            hook(info);
        }));

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }

    pub fn draw<D: TurnDispatcher>(&mut self, app: &mut App<D>) -> io::Result<()> {
        self.terminal.draw(|frame| app.draw(frame))?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        let _ = self.terminal.show_cursor();
        restore_terminal();
    }
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = io::stdout().execute(LeaveAlternateScreen);
}

/// Owning loop: terminal input and worker events are handled one at a time.
pub async fn run(config: Config) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = CopilotClient::new(&config, tx)?;
    let mut app = App::new(ConversationController::new(client));

    info!(model = %config.model, "Starting chat");
    let mut tui = Tui::init()?;
    let mut input = EventStream::new();
    tui.draw(&mut app)?;

    while !app.should_quit() {
        let event = tokio::select! {
            Some(event) = rx.recv() => event,
            maybe = input.next() => match maybe {
                Some(Ok(Event::Key(key))) => match app.map_key(key) {
                    Some(event) => event,
                    None => {
                        tui.draw(&mut app)?;
                        continue;
                    }
                },
                Some(Ok(Event::Resize(width, height))) => AppEvent::Resize { width, height },
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        };

        if app.handle_event(event) {
            tui.draw(&mut app)?;
        }
    }

    app.shutdown();
    info!("Chat closed");
    Ok(())
}
