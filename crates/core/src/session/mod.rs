//! Conversation state for chat front ends.
//!
//! Each chat is an explicit [`SessionState`] machine. State lives in a
//! [`SessionStore`] owned by the caller, never in globals.

mod state;
mod store;

pub use state::{SessionEvent, SessionState};
pub use store::{ChatId, InMemorySessionStore, SessionStore, SessionTransition};
