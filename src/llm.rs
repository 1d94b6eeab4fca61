use reqwest::StatusCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::events::{AppEvent, ConversationEntry, StreamEvent};
use crate::request::{CompletionRequest, RequestBuilder};
use crate::session::Session;
use crate::streaming::{DecoderState, StreamDecoder, decode_stream};
use crate::token::TokenManager;

/// Everything a worker needs for one turn, snapshotted at dispatch time
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    /// Conversation generation; stale once the conversation is cleared
    pub generation: u64,
    /// Session epoch; stale once the session is reloaded
    pub epoch: u64,
    pub session: Session,
    pub history: Vec<ConversationEntry>,
}

/// Starts turns off the owning loop.
///
/// The returned token cancels the turn; a cancelled turn sends nothing more.
pub trait TurnDispatcher {
    fn dispatch(&mut self, turn: Turn) -> CancellationToken;
}

/// Network worker talking to the Copilot endpoints.
///
/// Results flow back exclusively as [`AppEvent`]s on one channel, so the
/// events of a turn arrive in the order they were produced.
#[derive(Clone)]
pub struct CopilotClient {
    client: reqwest::Client,
    tokens: TokenManager,
    requests: RequestBuilder,
    completion_url: String,
    read_timeout: Duration,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl CopilotClient {
    pub fn new(config: &Config, events: mpsc::UnboundedSender<AppEvent>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ChatError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            tokens: TokenManager::new(client.clone(), config),
            requests: RequestBuilder::new(config),
            completion_url: config.completion_url.clone(),
            read_timeout: config.read_timeout(),
            client,
            events,
        })
    }

    /// Run one turn to completion, reporting every outcome as an event.
    pub async fn run_turn(&self, turn: Turn) {
        let Turn {
            generation,
            epoch,
            mut session,
            history,
        } = turn;

        info!(generation, messages = history.len(), "Starting turn");
        if let Err(e) = self
            .stream_turn(generation, epoch, &mut session, &history)
            .await
        {
            error!(generation, error = %e, retryable = e.is_retryable(), "Turn failed");
            self.send(AppEvent::TurnFailed {
                generation,
                message: e.to_string(),
            });
        }
    }

    async fn stream_turn(
        &self,
        generation: u64,
        epoch: u64,
        session: &mut Session,
        history: &[ConversationEntry],
    ) -> Result<()> {
        if self.tokens.ensure_fresh(session).await? {
            self.propose_token(epoch, session);
        }

        let body = self.requests.build(history);
        let mut response = self.post(session, &body).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(generation, "Bearer token rejected, refreshing once");
            self.tokens.force_refresh(session).await?;
            self.propose_token(epoch, session);
            response = self.post(session, &body).await?;
        }

        let status = response.status();
        let events = self.events.clone();
        let on_event = move |event: StreamEvent| {
            let _ = events.send(event.into_app_event(generation));
        };

        if status.is_success() {
            let reply = decode_stream(response.bytes_stream(), Some(self.read_timeout), on_event).await;
            debug!(generation, reply_len = reply.len(), "Turn complete");
        } else {
            let text = response.text().await.unwrap_or_default();
            warn!(generation, %status, "Completion request rejected");
            report_rejection(status, &text, on_event);
        }

        Ok(())
    }

    async fn post(&self, session: &Session, body: &CompletionRequest) -> Result<reqwest::Response> {
        let headers = self.requests.headers(session)?;

        debug!(url = %self.completion_url, "Posting completion request");
        let request = self
            .client
            .post(&self.completion_url)
            .headers(headers)
            .json(body)
            .send();

        // Only the wait for response headers is bounded here; the body is
        // bounded per chunk by the decoder.
        let response = tokio::time::timeout(self.read_timeout, request)
            .await
            .map_err(|_| {
                warn!(timeout_secs = self.read_timeout.as_secs(), "Completion request timed out");
                ChatError::Transport(format!(
                    "no response within {} seconds",
                    self.read_timeout.as_secs()
                ))
            })??;

        Ok(response)
    }

    fn propose_token(&self, epoch: u64, session: &Session) {
        self.send(AppEvent::TokenRenewed {
            epoch,
            token: session.bearer_token.clone(),
        });
    }

    fn send(&self, event: AppEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

impl TurnDispatcher for CopilotClient {
    fn dispatch(&mut self, turn: Turn) -> CancellationToken {
        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();
        let worker = self.clone();
        let generation = turn.generation;

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => debug!(generation, "Turn cancelled"),
                _ = worker.run_turn(turn) => {}
            }
        });

        cancel
    }
}

/// Turn a non-success response into the final event of the turn.
///
/// A structured error envelope in the body supplies the text; anything else
/// is reported with the status line.
fn report_rejection<F>(status: StatusCode, body: &str, mut on_event: F)
where
    F: FnMut(StreamEvent),
{
    let mut decoder = StreamDecoder::new();
    for line in body.lines() {
        decoder.push_line(line);
        if decoder.is_finished() {
            break;
        }
    }

    let text = if decoder.state() == DecoderState::ErrorDetected {
        decoder.finish().text
    } else {
        format!("HTTP {}: {}", status, body.trim())
    };

    on_event(StreamEvent::finished(text, true));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection(status: StatusCode, body: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        report_rejection(status, body, |e| events.push(e));
        events
    }

    #[test]
    fn test_rejection_with_envelope_uses_message() {
        let events = rejection(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":"invalid","message":"messages too long","param":null,"type":"invalid_request_error"}}"#,
        );
        assert_eq!(events, vec![StreamEvent::finished("messages too long", true)]);
    }

    #[test]
    fn test_rejection_without_envelope_reports_status() {
        let events = rejection(StatusCode::FORBIDDEN, "  no copilot seat\n");
        assert_eq!(
            events,
            vec![StreamEvent::finished("HTTP 403 Forbidden: no copilot seat", true)]
        );
    }

    #[test]
    fn test_rejection_ignores_content_frames() {
        let events = rejection(
            StatusCode::INTERNAL_SERVER_ERROR,
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}",
        );
        assert_eq!(events.len(), 1);
        assert!(events[0].done && events[0].is_error);
    }

    #[tokio::test]
    async fn test_unreadable_credentials_become_turn_failed() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            credentials_path: dir.path().join("hosts.json"),
            ..Config::default()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = CopilotClient::new(&config, tx).unwrap();

        client
            .run_turn(Turn {
                generation: 7,
                epoch: 0,
                session: Session::new(),
                history: vec![ConversationEntry::user("hi")],
            })
            .await;

        match rx.recv().await.unwrap() {
            AppEvent::TurnFailed { generation, message } => {
                assert_eq!(generation, 7);
                assert!(message.starts_with("Configuration error"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancelled_turn_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            credentials_path: dir.path().join("hosts.json"),
            ..Config::default()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut client = CopilotClient::new(&config, tx).unwrap();

        let turn = Turn {
            generation: 1,
            epoch: 0,
            session: Session::new(),
            history: Vec::new(),
        };
        // Cancel before the spawned task gets polled.
        let handle = client.dispatch(turn);
        handle.cancel();
        drop(client);

        // The sender lives in the spawned task only; once it exits the
        // channel closes without any event.
        assert!(rx.recv().await.is_none());
    }
}
