//! Storage for per-chat session state.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::state::{SessionEvent, SessionState};

/// Chat identifier, as issued by Telegram.
pub type ChatId = i64;

/// Holds the [`SessionState`] of every chat.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current state of `chat`; [`SessionState::Idle`] when unknown.
    async fn get(&self, chat: ChatId) -> SessionState;

    async fn set(&self, chat: ChatId, state: SessionState);

    async fn clear(&self, chat: ChatId);

    /// Applies `event` to the chat's state and stores the result.
    ///
    /// Implementations must read, transition and store as one atomic step:
    /// two events racing for the same chat see each other's result, so only
    /// one of them can start a run.
    async fn apply(&self, chat: ChatId, event: SessionEvent) -> SessionTransition;
}

/// Outcome of [`SessionStore::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTransition {
    pub previous: SessionState,
    pub next: SessionState,
}

impl SessionTransition {
    /// True when this event moved the chat into [`SessionState::Processing`].
    /// The caller that sees this owns the pipeline run.
    pub fn started_processing(&self) -> bool {
        !self.previous.is_processing() && self.next.is_processing()
    }
}

/// In-process session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<ChatId, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chats not in [`SessionState::Idle`].
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, chat: ChatId) -> SessionState {
        self.sessions
            .read()
            .await
            .get(&chat)
            .cloned()
            .unwrap_or_default()
    }

    async fn set(&self, chat: ChatId, state: SessionState) {
        debug!(chat, ?state, "Session state changed");
        if state == SessionState::Idle {
            self.sessions.write().await.remove(&chat);
        } else {
            self.sessions.write().await.insert(chat, state);
        }
    }

    async fn clear(&self, chat: ChatId) {
        self.sessions.write().await.remove(&chat);
    }

    async fn apply(&self, chat: ChatId, event: SessionEvent) -> SessionTransition {
        let mut sessions = self.sessions.write().await;
        let previous = sessions.get(&chat).cloned().unwrap_or_default();
        let next = previous.clone().on_event(event);
        if next == SessionState::Idle {
            sessions.remove(&chat);
        } else {
            sessions.insert(chat, next.clone());
        }
        if next != previous {
            debug!(chat, ?previous, ?next, "Session state changed");
        }
        SessionTransition { previous, next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unknown_chat_is_idle() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.get(42).await, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_apply_walks_the_conversation() {
        let store = InMemorySessionStore::new();

        store.apply(1, SessionEvent::ConversionRequested).await;
        assert_eq!(store.get(1).await, SessionState::AwaitingSetLink);

        let transition = store
            .apply(1, SessionEvent::from_message("https://t.me/addstickers/foo"))
            .await;
        assert_eq!(transition.previous, SessionState::AwaitingSetLink);
        assert!(transition.next.is_processing());
        assert!(transition.started_processing());
        assert_eq!(store.active_count().await, 1);

        store.apply(1, SessionEvent::ProcessingFinished).await;
        assert_eq!(store.get(1).await, SessionState::Idle);
        assert_eq!(store.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_chats_are_independent() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut handles = Vec::new();
        for chat in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.apply(chat, SessionEvent::ConversionRequested).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        store.clear(7).await;
        assert_eq!(store.active_count().await, 31);
        assert_eq!(store.get(7).await, SessionState::Idle);
        assert_eq!(store.get(8).await, SessionState::AwaitingSetLink);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_links_start_one_run() {
        for _ in 0..20 {
            let store = Arc::new(InMemorySessionStore::new());
            store.apply(5, SessionEvent::ConversionRequested).await;

            let mut handles = Vec::new();
            for i in 0..16 {
                let store = Arc::clone(&store);
                handles.push(tokio::spawn(async move {
                    let event = SessionEvent::LinkReceived {
                        set_name: format!("set_{}", i),
                    };
                    store.apply(5, event).await
                }));
            }

            let mut started = 0;
            for handle in handles {
                if handle.await.unwrap().started_processing() {
                    started += 1;
                }
            }
            assert_eq!(started, 1);
            assert!(store.get(5).await.is_processing());
        }
    }
}
