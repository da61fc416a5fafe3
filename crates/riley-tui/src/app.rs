use std::sync::Arc;

use riley_core::{ChatEngine, ChatError, ChatSession};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// One-line status shown under the transcript. Never part of the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Failure(String),
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Conversation
    pub session: ChatSession,
    engine: Arc<dyn ChatEngine>,
    pub model_name: String,
    /// Set when the pending turn should be sent on the next loop pass.
    pub dispatch_requested: bool,
    pub notice: Option<Notice>,

    // Input box
    pub input: String,
    pub cursor: usize, // cursor position in chars

    // Transcript viewport
    pub scroll: u16,
    pub chat_height: u16, // inner height, updated during render
    pub chat_width: u16,  // inner width, updated during render

    // Animation state
    pub animation_frame: u8,
}

impl App {
    pub fn new(engine: Arc<dyn ChatEngine>, model_name: impl Into<String>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            session: ChatSession::new(),
            engine,
            model_name: model_name.into(),
            dispatch_requested: false,
            notice: None,

            input: String::new(),
            cursor: 0,

            scroll: 0,
            chat_height: 0,
            chat_width: 0,

            animation_frame: 0,
        }
    }

    /// Submit the input box as a new user turn. While a failed turn is
    /// waiting, blank input retries it and new text replaces it.
    pub fn submit_input(&mut self) {
        let failed_turn = self.session.awaiting_response() && self.session.attempts() > 0;
        if self.input.trim().is_empty() && failed_turn {
            self.request_retry();
            return;
        }

        let submitted = if failed_turn {
            self.session.replace_pending_message(&self.input)
        } else {
            self.session.submit_user_message(&self.input)
        };

        match submitted {
            Ok(()) => {
                self.input.clear();
                self.cursor = 0;
                self.notice = None;
                self.dispatch_requested = true;
                self.scroll_to_bottom();
            }
            Err(ChatError::EmptyInput) => {
                self.notice = Some(Notice::Info("Type a question first.".to_string()));
            }
            Err(ChatError::ResponsePending) => {
                self.notice = Some(Notice::Info(
                    "Riley hasn't answered the last question yet.".to_string(),
                ));
            }
            Err(err) => {
                self.notice = Some(Notice::Failure(err.to_string()));
            }
        }
    }

    pub fn request_retry(&mut self) {
        if self.session.awaiting_response() {
            self.notice = None;
            self.dispatch_requested = true;
        }
    }

    /// Whether the "Calculating..." indicator should be showing.
    pub fn is_dispatching(&self) -> bool {
        self.dispatch_requested && self.session.awaiting_response()
    }

    /// Send the pending turn and wait for the reply. Failures become an inline
    /// notice; the turn stays pending.
    pub async fn dispatch(&mut self) {
        self.dispatch_requested = false;
        let engine = Arc::clone(&self.engine);

        match self.session.dispatch_if_pending(engine.as_ref()).await {
            Ok(Some(response)) => {
                info!(sources = response.sources.len(), "reply shown");
                self.notice = None;
                self.scroll_to_bottom();
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, retryable = err.is_retryable(), "turn failed");
                let hint = if err.is_retryable() {
                    "Enter retries, or type a new question."
                } else {
                    "Type a new question."
                };
                self.notice = Some(Notice::Failure(format!(
                    "{} Attempt {} failed: {}",
                    hint,
                    self.session.attempts(),
                    err
                )));
            }
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_dispatching() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_by(&mut self, delta: i16) {
        if delta < 0 {
            self.scroll = self.scroll.saturating_sub(delta.unsigned_abs());
        } else {
            self.scroll = self.scroll.saturating_add(delta as u16).min(self.max_scroll());
        }
    }

    pub fn scroll_page(&mut self, down: bool) {
        let page = (self.chat_height.max(2) / 2) as i16;
        self.scroll_by(if down { page } else { -page });
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.transcript_lines().saturating_sub(visible_height)
    }

    /// Rendered line count of the transcript plus the indicator, wrapped to
    /// the chat width.
    fn transcript_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };

        let mut total_lines: u16 = 0;
        for msg in self.session.renderable_transcript() {
            total_lines = total_lines.saturating_add(1); // role line
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                let wrapped = char_count.div_ceil(wrap_width).max(1);
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // blank line after message
        }

        if self.session.awaiting_response() {
            total_lines = total_lines.saturating_add(2);
        }
        total_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use riley_core::{ChatResponse, ChatRole};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedEngine(Mutex<VecDeque<Result<ChatResponse, ChatError>>>);

    #[async_trait]
    impl ChatEngine for ScriptedEngine {
        async fn chat(&self, _query: &str) -> Result<ChatResponse, ChatError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatResponse::new("fallback")))
        }
    }

    fn app_with(replies: Vec<Result<ChatResponse, ChatError>>) -> App {
        App::new(Arc::new(ScriptedEngine(Mutex::new(replies.into()))), "test-model")
    }

    #[tokio::test]
    async fn test_submit_then_dispatch() {
        let mut app = app_with(vec![Ok(ChatResponse::new("Blueberries!"))]);
        app.input = "Something purple?".to_string();
        app.cursor = app.input.chars().count();

        app.submit_input();
        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);
        assert!(app.is_dispatching());
        assert_eq!(app.session.renderable_transcript().len(), 2);

        app.dispatch().await;
        assert!(!app.is_dispatching());
        assert!(app.notice.is_none());
        let last = app.session.renderable_transcript().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, "Blueberries!");
    }

    #[test]
    fn test_blank_submit_shows_notice() {
        let mut app = app_with(vec![]);
        app.input = "   ".to_string();
        app.submit_input();

        assert!(matches!(app.notice, Some(Notice::Info(_))));
        assert!(!app.dispatch_requested);
        assert_eq!(app.session.renderable_transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_notice_and_retry() {
        let mut app = app_with(vec![
            Err(ChatError::ModelRequest("rate limited".into())),
            Ok(ChatResponse::new("Eat a banana.")),
        ]);
        app.input = "Something yellow?".to_string();
        app.submit_input();
        app.dispatch().await;

        match &app.notice {
            Some(Notice::Failure(msg)) => {
                assert!(msg.starts_with("Enter retries"));
                assert!(msg.contains("rate limited"));
            }
            other => panic!("expected failure notice, got {other:?}"),
        }
        assert!(app.session.awaiting_response());
        assert!(!app.dispatch_requested);

        app.request_retry();
        assert!(app.is_dispatching());
        app.dispatch().await;
        assert!(app.notice.is_none());
        assert_eq!(app.session.renderable_transcript().len(), 3);
    }

    #[tokio::test]
    async fn test_blank_submit_retries_failed_turn() {
        let mut app = app_with(vec![Err(ChatError::ModelResponse("empty".into()))]);
        app.input = "Orange?".to_string();
        app.submit_input();
        app.dispatch().await;
        assert!(!app.dispatch_requested);

        app.submit_input();
        assert!(app.dispatch_requested);
    }

    #[tokio::test]
    async fn test_new_question_replaces_rejected_turn() {
        let mut app = app_with(vec![
            Err(ChatError::ModelStatus {
                status: 400,
                body: "context_length_exceeded".into(),
            }),
            Ok(ChatResponse::new("Roast some beets.")),
        ]);
        app.input = "Tell me everything about every vegetable".to_string();
        app.submit_input();
        app.dispatch().await;

        match &app.notice {
            Some(Notice::Failure(msg)) => {
                assert!(msg.starts_with("Type a new question."));
                assert!(!msg.contains("Enter retries"));
            }
            other => panic!("expected failure notice, got {other:?}"),
        }

        app.input = "Something red?".to_string();
        app.submit_input();
        assert!(app.is_dispatching());
        assert!(app.input.is_empty());
        let transcript = app.session.renderable_transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].content, "Something red?");

        app.dispatch().await;
        assert!(app.notice.is_none());
        assert_eq!(app.session.renderable_transcript().len(), 3);
    }

    #[test]
    fn test_retry_is_ignored_when_idle() {
        let mut app = app_with(vec![]);
        app.request_retry();
        assert!(!app.dispatch_requested);
    }

    #[test]
    fn test_scroll_is_clamped() {
        let mut app = app_with(vec![]);
        app.chat_height = 5;
        app.chat_width = 20;
        app.scroll_by(-10);
        assert_eq!(app.scroll, 0);

        app.scroll_by(1000);
        assert_eq!(app.scroll, app.max_scroll());
    }

    #[test]
    fn test_line_of_exactly_wrap_width_takes_one_row() {
        let mut app = app_with(vec![]);
        app.chat_width = 10;
        // greeting: role line + wrapped content + blank line
        let base = app.transcript_lines();

        app.session.submit_user_message("abcdefghij").unwrap();
        // role line + one row + blank line + the two indicator rows
        assert_eq!(app.transcript_lines(), base + 3 + 2);
    }
}
