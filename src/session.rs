//! Chat transcript and the `NoIndex`/`Ready` turn protocol.

use std::panic::{self, AssertUnwindSafe};

use chrono::{Local, Timelike};
use serde::Serialize;
use tracing::error;

use crate::chain::{ConversationalRagChain, APOLOGY_MESSAGE};

/// Reply given while no documents are indexed.
pub const NO_INDEX_MESSAGE: &str =
    "Please upload documents first to enable AI-powered responses based on your content.";

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking.
    User,
    /// The bot.
    Assistant,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Author.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// 12-hour wall clock time, e.g. `3:07 PM`.
    pub timestamp: String,
}

/// Whether questions can be answered from documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// No chain attached; questions get [`NO_INDEX_MESSAGE`].
    NoIndex,
    /// A chain is attached.
    Ready,
}

/// Formats a wall-clock time as `H:MM AM|PM` without a leading zero.
pub fn format_timestamp<T: Timelike>(time: &T) -> String {
    let (is_pm, hour) = time.hour12();
    format!(
        "{}:{:02} {}",
        hour,
        time.minute(),
        if is_pm { "PM" } else { "AM" }
    )
}

fn now_timestamp() -> String {
    format_timestamp(&Local::now())
}

/// Display transcript plus the optional active chain.
#[derive(Debug, Default)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    chain: Option<ConversationalRagChain>,
}

impl ChatSession {
    /// Empty session in `NoIndex`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        if self.chain.is_some() {
            SessionState::Ready
        } else {
            SessionState::NoIndex
        }
    }

    /// True when a chain is attached.
    pub fn is_ready(&self) -> bool {
        self.chain.is_some()
    }

    /// Full transcript, oldest first.
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Active chain, if any.
    pub fn chain(&self) -> Option<&ConversationalRagChain> {
        self.chain.as_ref()
    }

    /// Installs `chain` and moves to `Ready`, replacing any previous chain.
    pub fn attach_chain(&mut self, chain: ConversationalRagChain) {
        self.chain = Some(chain);
    }

    /// Drops the chain and returns to `NoIndex`; the transcript is kept.
    pub fn reset(&mut self) {
        self.chain = None;
    }

    /// Runs one turn and returns the updated transcript.
    pub fn ask(&mut self, question: &str) -> &[ChatMessage] {
        self.push(Role::User, question.to_string());
        let answer = match self.chain.as_mut() {
            Some(chain) => {
                match panic::catch_unwind(AssertUnwindSafe(|| chain.respond(question))) {
                    Ok(response) => response.answer,
                    Err(_) => {
                        error!("chain panicked while answering");
                        APOLOGY_MESSAGE.to_string()
                    }
                }
            }
            None => NO_INDEX_MESSAGE.to_string(),
        };
        self.push(Role::Assistant, answer);
        &self.messages
    }

    /// Empties the transcript and the chain memory; state is unchanged.
    pub fn clear(&mut self) {
        self.messages.clear();
        if let Some(chain) = self.chain.as_mut() {
            chain.clear_memory();
        }
    }

    fn push(&mut self, role: Role, content: String) {
        self.messages.push(ChatMessage {
            role,
            content,
            timestamp: now_timestamp(),
        });
    }
}
