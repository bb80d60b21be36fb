// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Rendezvous handles for one in-flight chat turn.
///
/// `input_tx` delivers the user's answer to a blocked `AskUserQuestion`;
/// `permission_tx` delivers approve/deny decisions.  Both are consumed by
/// the permission handler running on the subprocess reader task.
#[derive(Debug)]
pub struct LiveSession {
    pub input_tx: mpsc::Sender<String>,
    pub permission_tx: mpsc::Sender<bool>,
    pub cancel: CancellationToken,
}

/// Process-wide map of chat id → live turn.
///
/// The invariant callers rely on: at most one live session per chat at any
/// instant — a second concurrent message request is refused with a
/// conflict.
#[derive(Default)]
pub struct LiveRegistry {
    sessions: DashMap<Uuid, LiveSession>,
}

impl LiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new live turn.  `Err` when the chat already has one.
    pub fn insert(&self, chat_id: Uuid, session: LiveSession) -> Result<(), LiveSession> {
        match self.sessions.entry(chat_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(session),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(session);
                Ok(())
            }
        }
    }

    pub fn remove(&self, chat_id: Uuid) {
        self.sessions.remove(&chat_id);
    }

    /// Deliver a user answer; `false` when no session is awaiting one.
    pub fn send_input(&self, chat_id: Uuid, answer: String) -> bool {
        match self.sessions.get(&chat_id) {
            Some(session) => session.input_tx.try_send(answer).is_ok(),
            None => false,
        }
    }

    /// Deliver a permission decision; `false` when no session is awaiting.
    pub fn send_permission(&self, chat_id: Uuid, allow: bool) -> bool {
        match self.sessions.get(&chat_id) {
            Some(session) => session.permission_tx.try_send(allow).is_ok(),
            None => false,
        }
    }

    pub fn contains(&self, chat_id: Uuid) -> bool {
        self.sessions.contains_key(&chat_id)
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (LiveSession, mpsc::Receiver<String>, mpsc::Receiver<bool>) {
        let (input_tx, input_rx) = mpsc::channel(4);
        let (permission_tx, permission_rx) = mpsc::channel(4);
        (
            LiveSession {
                input_tx,
                permission_tx,
                cancel: CancellationToken::new(),
            },
            input_rx,
            permission_rx,
        )
    }

    #[tokio::test]
    async fn at_most_one_live_session_per_chat() {
        let registry = LiveRegistry::new();
        let id = Uuid::new_v4();
        let (first, _input, _perm) = session();
        let (second, _input2, _perm2) = session();

        assert!(registry.insert(id, first).is_ok());
        assert!(registry.insert(id, second).is_err(), "second must be refused");

        registry.remove(id);
        let (third, _input3, _perm3) = session();
        assert!(registry.insert(id, third).is_ok());
    }

    #[tokio::test]
    async fn input_reaches_the_receiver() {
        let registry = LiveRegistry::new();
        let id = Uuid::new_v4();
        let (live, mut input_rx, _perm) = session();
        registry.insert(id, live).unwrap();

        assert!(registry.send_input(id, "the answer".to_string()));
        assert_eq!(input_rx.recv().await.unwrap(), "the answer");

        assert!(!registry.send_input(Uuid::new_v4(), "nobody".to_string()));
    }

    #[tokio::test]
    async fn permission_reaches_the_receiver() {
        let registry = LiveRegistry::new();
        let id = Uuid::new_v4();
        let (live, _input, mut permission_rx) = session();
        registry.insert(id, live).unwrap();

        assert!(registry.send_permission(id, true));
        assert!(permission_rx.recv().await.unwrap());
        registry.remove(id);
        assert!(!registry.send_permission(id, false));
    }
}
