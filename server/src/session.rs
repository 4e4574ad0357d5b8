//! Per-client session state and the long-poll wait/wake protocol.
//!
//! Each session has two locks. The state mutex guards the open-channel set,
//! the mailbox, the activity timestamp and the parked waiter slot; it is only
//! ever held for short synchronous sections. The listen lock admits one
//! parked `/listen` at a time, so a second concurrent poll from the same
//! client queues behind the first instead of racing it for the wake signal.
//!
//! Parking a waiter and checking the mailbox happen under the state mutex,
//! and the dispatcher only hands off to a waiter it finds in that slot while
//! holding the same mutex. A message is therefore either seen by the
//! re-check before parking or delivered through the wake signal.

use greennet_shared::{DeliveredMessage, Position};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::RelayError;
use crate::token::Token;

type Waiter = oneshot::Sender<Vec<DeliveredMessage>>;

/// A registered client.
#[derive(Debug)]
pub struct Session {
    token: Token,
    /// Fixed at registration, so readable without the state lock.
    position: Position,
    state: Mutex<SessionState>,
    listen_lock: tokio::sync::Mutex<()>,
}

/// Mutable part of a session, guarded by [`Session::lock_state`].
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) open_channels: BTreeSet<u16>,
    pub(crate) mailbox: Vec<DeliveredMessage>,
    pub(crate) last_activity: Instant,
    waiter: Option<Waiter>,
}

impl SessionState {
    /// Hand the whole mailbox to a parked listener, if there is one.
    ///
    /// Returns true when a listener took the messages. If the listener went
    /// away without withdrawing (its request future was dropped) the
    /// messages go back into the mailbox for the next poll.
    pub(crate) fn hand_off(&mut self) -> bool {
        if self.mailbox.is_empty() {
            return false;
        }
        let Some(waiter) = self.waiter.take() else {
            return false;
        };
        match waiter.send(std::mem::take(&mut self.mailbox)) {
            Ok(()) => true,
            Err(messages) => {
                self.mailbox = messages;
                false
            }
        }
    }
}

impl Session {
    pub fn new(token: Token, position: Position) -> Self {
        Self {
            token,
            position,
            state: Mutex::new(SessionState {
                open_channels: BTreeSet::new(),
                mailbox: Vec::new(),
                last_activity: Instant::now(),
                waiter: None,
            }),
            listen_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn position(&self) -> Position {
        self.position
    }

    // No critical section can leave the state half-updated, so a poisoned
    // lock still holds consistent data.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the open-channel set wholesale.
    ///
    /// More than `max` entries is rejected and the previous set is kept.
    /// Duplicates collapse, so each message reaches a session at most once.
    /// Returns the size of the stored set.
    pub fn set_open_channels(&self, channels: &[u16], max: usize) -> Result<usize, RelayError> {
        if channels.len() > max {
            return Err(RelayError::InvalidInput(format!(
                "{} channels requested, at most {} may be open",
                channels.len(),
                max
            )));
        }
        let channels: BTreeSet<u16> = channels.iter().copied().collect();
        let stored = channels.len();
        self.lock_state().open_channels = channels;
        Ok(stored)
    }

    pub fn open_channels(&self) -> Vec<u16> {
        self.lock_state().open_channels.iter().copied().collect()
    }

    pub fn pending(&self) -> usize {
        self.lock_state().mailbox.len()
    }

    pub fn touch(&self) {
        self.lock_state().last_activity = Instant::now();
    }

    pub fn is_idle(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.lock_state().last_activity) > threshold
    }

    /// Whether a listener is currently parked on this session.
    pub fn has_waiter(&self) -> bool {
        self.lock_state()
            .waiter
            .as_ref()
            .is_some_and(|w| !w.is_closed())
    }

    /// Drop the wake signal so a parked listener returns empty right away.
    pub(crate) fn release_waiter(&self) {
        self.lock_state().waiter = None;
    }

    /// Take everything in the mailbox, refreshing activity. `None` if empty.
    fn drain(&self) -> Option<Vec<DeliveredMessage>> {
        let mut state = self.lock_state();
        state.last_activity = Instant::now();
        if state.mailbox.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut state.mailbox))
        }
    }

    /// Long-poll for messages.
    ///
    /// Returns immediately when the mailbox has messages. Otherwise parks
    /// until the dispatcher hands messages off or `poll_timeout` elapses; a
    /// timeout yields an empty list, not an error.
    pub async fn listen(&self, poll_timeout: Duration) -> Vec<DeliveredMessage> {
        if let Some(messages) = self.drain() {
            return messages;
        }

        let _parked = self.listen_lock.lock().await;

        let mut rx = {
            let mut state = self.lock_state();
            state.last_activity = Instant::now();
            if !state.mailbox.is_empty() {
                return std::mem::take(&mut state.mailbox);
            }
            let (tx, rx) = oneshot::channel();
            state.waiter = Some(tx);
            rx
        };

        let messages = match tokio::time::timeout(poll_timeout, &mut rx).await {
            Ok(Ok(messages)) => messages,
            // Sender dropped: the session was evicted while parked.
            Ok(Err(_)) => Vec::new(),
            Err(_) => {
                // Withdraw under the state lock. A handoff that won the race
                // has already put its messages in the channel.
                {
                    let mut state = self.lock_state();
                    state.waiter = None;
                }
                rx.try_recv().unwrap_or_default()
            }
        };

        self.touch();
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greennet_shared::OutboundMessage;
    use std::sync::Arc;

    const POLL: Duration = Duration::from_secs(20);

    fn test_session() -> Arc<Session> {
        Arc::new(Session::new(
            Token::generate().unwrap(),
            Position::new(0, 64, 0),
        ))
    }

    fn push(session: &Session, payload: &str) -> bool {
        let mut state = session.lock_state();
        state
            .mailbox
            .push(OutboundMessage::new(1, 0, payload).deliver(1.0));
        state.hand_off()
    }

    async fn wait_until_parked(session: &Session) {
        while !session.has_waiter() {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn open_rejects_more_than_max_and_keeps_previous_set() {
        let session = test_session();
        session.set_open_channels(&[1, 2, 3], 255).unwrap();

        let too_many: Vec<u16> = (0..256).collect();
        let err = session.set_open_channels(&too_many, 255).unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(_)));
        assert_eq!(session.open_channels(), vec![1, 2, 3]);
    }

    #[test]
    fn open_accepts_exactly_max() {
        let session = test_session();
        let channels: Vec<u16> = (0..255).collect();
        session.set_open_channels(&channels, 255).unwrap();
        assert_eq!(session.open_channels().len(), 255);
    }

    #[test]
    fn open_replaces_wholesale_and_dedups() {
        let session = test_session();
        session.set_open_channels(&[9, 8], 255).unwrap();
        assert_eq!(session.set_open_channels(&[5, 5, 3], 255).unwrap(), 2);
        assert_eq!(session.open_channels(), vec![3, 5]);

        session.set_open_channels(&[], 255).unwrap();
        assert!(session.open_channels().is_empty());
    }

    #[test]
    fn hand_off_without_waiter_keeps_messages_queued() {
        let session = test_session();
        assert!(!push(&session, "a"));
        assert_eq!(session.pending(), 1);
    }

    #[tokio::test]
    async fn queued_messages_return_immediately_and_drain_once() {
        let session = test_session();
        push(&session, "a");
        push(&session, "b");

        let got = session.listen(POLL).await;
        let payloads: Vec<&str> = got.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(payloads, vec!["a", "b"]);
        assert_eq!(session.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_listen_times_out_with_empty_list() {
        let session = test_session();
        let start = Instant::now();
        let got = session.listen(POLL).await;
        assert!(got.is_empty());
        assert!(start.elapsed() >= POLL);
        assert!(!session.has_waiter());
    }

    #[tokio::test(start_paused = true)]
    async fn parked_listener_is_woken_by_hand_off() {
        let session = test_session();
        let start = Instant::now();

        let listener = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.listen(POLL).await })
        };
        wait_until_parked(&session).await;

        assert!(push(&session, "wake"));
        let got = listener.await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].message, "wake");
        assert!(start.elapsed() < POLL);
        assert_eq!(session.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_listener_queues_behind_first() {
        let session = test_session();

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.listen(POLL).await })
        };
        wait_until_parked(&session).await;

        let second = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.listen(POLL).await })
        };
        // Let the second call reach the listen lock.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(push(&session, "one"));
        assert_eq!(first.await.unwrap()[0].message, "one");

        wait_until_parked(&session).await;
        assert!(push(&session, "two"));
        assert_eq!(second.await.unwrap()[0].message, "two");
    }

    #[tokio::test(start_paused = true)]
    async fn releasing_waiter_returns_empty_immediately() {
        let session = test_session();
        let start = Instant::now();

        let listener = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.listen(POLL).await })
        };
        wait_until_parked(&session).await;

        session.release_waiter();
        assert!(listener.await.unwrap().is_empty());
        assert!(start.elapsed() < POLL);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_listener_leaves_messages_queued() {
        let session = test_session();

        let listener = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.listen(POLL).await })
        };
        wait_until_parked(&session).await;
        listener.abort();
        let _ = listener.await;

        assert!(!push(&session, "late"));
        assert_eq!(session.pending(), 1);

        let got = session.listen(POLL).await;
        assert_eq!(got[0].message, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn listen_refreshes_activity() {
        let session = test_session();
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(session.is_idle(Instant::now(), Duration::from_secs(30)));

        push(&session, "x");
        session.listen(POLL).await;
        assert!(!session.is_idle(Instant::now(), Duration::from_secs(30)));
    }
}
