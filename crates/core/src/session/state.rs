//! Per-chat conversation state.

use serde::{Deserialize, Serialize};

use crate::source::{is_set_link, parse_set_name};

/// Where a chat stands in the download conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing in progress.
    #[default]
    Idle,
    /// The user asked for a conversion and the next message should be a link.
    AwaitingSetLink,
    /// A pipeline run for `set_name` is in flight.
    Processing { set_name: String },
}

/// Something that happened in a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The user picked "convert a sticker set".
    ConversionRequested,
    /// The user sent a valid set link.
    LinkReceived { set_name: String },
    /// The user sent text that is not a set link.
    InvalidInput,
    /// The pipeline run for this chat finished, successfully or not.
    ProcessingFinished,
    /// `/start` or `/end`: go back to the menu.
    Reset,
}

impl SessionEvent {
    /// Classifies a plain chat message.
    pub fn from_message(text: &str) -> Self {
        let text = text.trim();
        if matches!(text.to_lowercase().as_str(), "/start" | "/end") {
            return Self::Reset;
        }
        if is_set_link(text) {
            if let Some(set_name) = parse_set_name(text) {
                return Self::LinkReceived { set_name };
            }
        }
        Self::InvalidInput
    }
}

impl SessionState {
    /// Returns the state after `event`. Events that make no sense in the
    /// current state leave it unchanged.
    pub fn on_event(self, event: SessionEvent) -> SessionState {
        match (self, event) {
            (_, SessionEvent::Reset) => SessionState::Idle,

            (SessionState::Processing { .. }, SessionEvent::ProcessingFinished) => {
                SessionState::Idle
            }
            // One run per chat at a time.
            (state @ SessionState::Processing { .. }, _) => state,

            (_, SessionEvent::ConversionRequested) => SessionState::AwaitingSetLink,
            (SessionState::AwaitingSetLink, SessionEvent::LinkReceived { set_name }) => {
                SessionState::Processing { set_name }
            }
            // A wrong answer ends the prompt; the user has to ask again.
            (SessionState::AwaitingSetLink, SessionEvent::InvalidInput) => SessionState::Idle,

            (state, _) => state,
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, SessionState::Processing { .. })
    }
}
