//! Conversation state: an ordered, append-only log of question/answer turns.
//!
//! The log is bounded: when the number of retained turns reaches the
//! configured depth, the oldest turn is dropped on append. Dropped turns are
//! gone, not summarized; the trade keeps the prompt transcript bounded.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One question/answer exchange. Immutable once appended.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

/// Bounded, ordered conversation log.
#[derive(Debug, Clone)]
pub struct ConversationLog {
    turns: VecDeque<Turn>,
    depth: usize,
}

impl ConversationLog {
    /// Create a log retaining at most `depth` turns (minimum 1).
    pub fn new(depth: usize) -> Self {
        ConversationLog {
            turns: VecDeque::new(),
            depth: depth.max(1),
        }
    }

    /// Append a turn, dropping the oldest when the depth cap is reached.
    pub fn append(&mut self, question: &str, answer: &str) {
        if self.turns.len() == self.depth {
            self.turns.pop_front();
        }
        self.turns.push_back(Turn {
            question: question.to_string(),
            answer: answer.to_string(),
            asked_at: Utc::now(),
        });
    }

    /// Retained turns in insertion order, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Clear all turns. Idempotent.
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    /// Prompt-ready transcript of the retained turns.
    ///
    /// Empty string when there is no history, so callers can splice it into
    /// a prompt unconditionally.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("User: {}\nAssistant: {}", turn.question, turn.answer));
        }
        out
    }

    /// Short human-readable summary of the conversation so far.
    pub fn summary(&self) -> String {
        match (self.turns.front(), self.turns.back()) {
            (Some(first), Some(last)) => format!(
                "{} turn{}, started {}, last activity {}",
                self.turns.len(),
                if self.turns.len() == 1 { "" } else { "s" },
                first.asked_at.format("%Y-%m-%d %H:%M:%S"),
                last.asked_at.format("%Y-%m-%d %H:%M:%S"),
            ),
            _ => "no conversation yet".to_string(),
        }
    }
}
