//! Session orchestrator
//!
//! Owns one conversation's transcript and mediates exactly one model call per
//! user turn. Submitting a message and dispatching it are separate steps so a
//! front-end can redraw the updated transcript before blocking on the network.

use tracing::{debug, info, warn};

use crate::engine::ChatEngine;
use crate::error::ChatError;
use crate::state::{ChatMessage, ChatResponse, ChatRole};

/// Seed message every session starts with.
pub const GREETING: &str =
    "Ask Me Rainbow Riley Questions Relating to fun ingredients and yummy recipes.😊";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// No user turn is waiting for a reply.
    Idle,
    /// A user message was appended and its query is waiting to be sent
    /// (or re-sent after a failure).
    PendingDispatch,
}

/// Per-session conversation state.
///
/// Invariants, held after every operation:
/// - `messages` is never empty.
/// - the last message is from the assistant iff `awaiting_response` is false.
/// - `pending_query` is set iff `awaiting_response` is true.
#[derive(Debug, Clone)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    awaiting_response: bool,
    pending_query: Option<String>,
    attempts: u32,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::with_greeting(GREETING)
    }

    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::assistant(greeting)],
            awaiting_response: false,
            pending_query: None,
            attempts: 0,
        }
    }

    /// Append a user turn and build the query that will be sent for it.
    ///
    /// Blank text is rejected without touching the session. So is a new
    /// message while the previous one still has no reply; that turn has to be
    /// retried through [`dispatch_if_pending`](Self::dispatch_if_pending) or
    /// swapped out with [`replace_pending_message`](Self::replace_pending_message).
    pub fn submit_user_message(&mut self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }
        if self.awaiting_response {
            return Err(ChatError::ResponsePending);
        }

        self.messages.push(ChatMessage::user(text));
        let query = build_composite_query(&self.messages, text);
        debug!(
            messages = self.messages.len(),
            query_chars = query.chars().count(),
            "user turn submitted"
        );

        self.pending_query = Some(query);
        self.awaiting_response = true;
        self.attempts = 0;
        Ok(())
    }

    /// Swap the unanswered user turn for `text` and rebuild the query from
    /// there. With no turn pending this is the same as
    /// [`submit_user_message`](Self::submit_user_message).
    pub fn replace_pending_message(&mut self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }
        if !self.awaiting_response {
            return self.submit_user_message(text);
        }

        // The last message is the unanswered user turn while awaiting.
        self.messages.pop();
        debug!(attempts = self.attempts, "replacing unanswered user turn");
        self.awaiting_response = false;
        self.pending_query = None;
        self.submit_user_message(text)
    }

    /// Send the pending query, if any, and record the reply.
    ///
    /// Returns `Ok(None)` without calling the engine when no turn is pending.
    /// On failure the pending query is kept as-is so the caller can retry.
    pub async fn dispatch_if_pending<E>(
        &mut self,
        engine: &E,
    ) -> Result<Option<ChatResponse>, ChatError>
    where
        E: ChatEngine + ?Sized,
    {
        if !self.awaiting_response {
            return Ok(None);
        }
        let Some(query) = self.pending_query.as_deref() else {
            return Ok(None);
        };

        self.attempts += 1;
        debug!(attempt = self.attempts, "dispatching pending query");

        match engine.chat(query).await {
            Ok(response) => {
                info!(
                    attempt = self.attempts,
                    sources = response.sources.len(),
                    reply_chars = response.text.chars().count(),
                    "assistant replied"
                );
                self.messages.push(ChatMessage::assistant(response.text.clone()));
                self.awaiting_response = false;
                self.pending_query = None;
                self.attempts = 0;
                Ok(Some(response))
            }
            Err(err) => {
                warn!(attempt = self.attempts, error = %err, "dispatch failed, turn kept for retry");
                Err(err)
            }
        }
    }

    /// The transcript in conversation order.
    pub fn renderable_transcript(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub fn pending_query(&self) -> Option<&str> {
        self.pending_query.as_deref()
    }

    pub fn turn_state(&self) -> TurnState {
        if self.awaiting_response {
            TurnState::PendingDispatch
        } else {
            TurnState::Idle
        }
    }

    /// Dispatch attempts made for the current pending turn.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Number of user turns that have received a reply.
    pub fn completed_turns(&self) -> usize {
        let users = self
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .count();
        if self.awaiting_response {
            users - 1
        } else {
            users
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Join every message's content with single spaces, then repeat the latest
/// user text once more at the end.
pub fn build_composite_query(messages: &[ChatMessage], latest: &str) -> String {
    let history = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} {}", history, latest)
}
