use crate::events::{AppEvent, ConversationEntry, Role};
use crate::llm::{Turn, TurnDispatcher};
use crate::prompts::{GREETING, SYSTEM_PROMPT, THINKING};
use crate::session::Session;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-turn state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    /// Dispatched, nothing received yet
    Submitted,
    /// At least one delta received
    Streaming,
}

/// Owns the conversation and the session.
///
/// All mutation happens here, in response to user actions or to events the
/// worker sends back. Worker events tagged with an old generation (the
/// conversation was cleared since) or an old epoch (the session was
/// reloaded since) are dropped.
pub struct ConversationController<D: TurnDispatcher> {
    history: Vec<ConversationEntry>,
    messages: Vec<ConversationEntry>,
    session: Session,
    epoch: u64,
    generation: u64,
    state: TurnState,
    in_flight: Option<CancellationToken>,
    dispatcher: D,
}

impl<D: TurnDispatcher> ConversationController<D> {
    pub fn new(dispatcher: D) -> Self {
        Self {
            history: vec![ConversationEntry::system(SYSTEM_PROMPT)],
            messages: vec![ConversationEntry::assistant(GREETING)],
            session: Session::new(),
            epoch: 0,
            generation: 0,
            state: TurnState::Idle,
            in_flight: None,
            dispatcher,
        }
    }

    /// Context sent to the model, system directive first
    pub fn history(&self) -> &[ConversationEntry] {
        &self.history
    }

    /// What the shell renders, greeting first
    pub fn messages(&self) -> &[ConversationEntry] {
        &self.messages
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn is_answering(&self) -> bool {
        self.state != TurnState::Idle
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a turn. Ignored while another turn is in flight.
    ///
    /// Returns whether anything changed.
    pub fn submit(&mut self, text: String) -> bool {
        if self.is_answering() {
            debug!("Submit ignored, a turn is in flight");
            return false;
        }
        if text.trim().is_empty() {
            return false;
        }

        self.history.push(ConversationEntry::user(text.clone()));
        self.messages.push(ConversationEntry::user(text));
        self.messages.push(ConversationEntry::assistant(THINKING));
        self.state = TurnState::Submitted;

        let turn = Turn {
            generation: self.generation,
            epoch: self.epoch,
            session: self.session.clone(),
            history: self.history.clone(),
        };
        info!(generation = self.generation, "Dispatching turn");
        self.in_flight = Some(self.dispatcher.dispatch(turn));
        true
    }

    /// Apply a worker or user event. Returns whether the UI should re-render.
    pub fn handle_event(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Submit(text) => self.submit(text),
            AppEvent::StreamProgress { generation, text } => self.on_progress(generation, text),
            AppEvent::StreamDone {
                generation,
                text,
                is_error,
            } => self.on_done(generation, text, is_error),
            AppEvent::TurnFailed {
                generation,
                message,
            } => self.on_turn_failed(generation, message),
            AppEvent::TokenRenewed { epoch, token } => self.on_token_renewed(epoch, token),
            AppEvent::Resize { .. } | AppEvent::Action(_) => false,
        }
    }

    fn on_progress(&mut self, generation: u64, text: String) -> bool {
        if !self.accepts(generation) {
            return false;
        }
        self.state = TurnState::Streaming;
        self.set_placeholder(text);
        true
    }

    fn on_done(&mut self, generation: u64, text: String, is_error: bool) -> bool {
        if !self.accepts(generation) {
            return false;
        }
        if is_error {
            warn!(generation, "Turn ended with an error reply");
        } else if !text.is_empty() {
            self.history.push(ConversationEntry::assistant(text.clone()));
        }
        self.set_placeholder(text);
        self.finish_turn();
        true
    }

    fn on_turn_failed(&mut self, generation: u64, message: String) -> bool {
        if !self.accepts(generation) {
            return false;
        }
        self.set_placeholder(format!("Error: {}", message));
        self.finish_turn();
        true
    }

    fn on_token_renewed(&mut self, epoch: u64, token: String) -> bool {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "Dropping token for reloaded session");
            return false;
        }
        self.session.bearer_token = token;
        false
    }

    /// Back to the system directive and the greeting; any in-flight turn is
    /// cancelled and its late events are ignored.
    pub fn clear(&mut self) {
        self.history.truncate(1);
        self.messages.truncate(1);
        self.generation += 1;
        self.cancel_in_flight();
        self.state = TurnState::Idle;
        info!(generation = self.generation, "Conversation cleared");
    }

    /// New session identifiers; the next turn fetches a new token.
    pub fn reload(&mut self) {
        self.session.reload();
        self.epoch += 1;
        info!(epoch = self.epoch, "Session reloaded");
    }

    /// Cancel whatever is still running before the loop exits.
    pub fn shutdown(&mut self) {
        self.cancel_in_flight();
    }

    fn accepts(&self, generation: u64) -> bool {
        if generation != self.generation || !self.is_answering() {
            debug!(generation, current = self.generation, "Dropping stale turn event");
            return false;
        }
        true
    }

    fn set_placeholder(&mut self, text: String) {
        match self.messages.last_mut() {
            Some(entry) if entry.role == Role::Assistant => entry.content = text,
            _ => self.messages.push(ConversationEntry::assistant(text)),
        }
    }

    fn finish_turn(&mut self) {
        self.state = TurnState::Idle;
        self.in_flight = None;
    }

    fn cancel_in_flight(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
    }
}
