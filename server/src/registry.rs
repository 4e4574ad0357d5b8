//! Directory of live sessions.
//!
//! The registry only guards the token → session mapping. Sessions are shared
//! as `Arc<Session>` and mutated in place under their own lock, so a caller
//! holding a handle never writes a stale copy back.

use greennet_shared::Position;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::RelayError;
use crate::session::Session;
use crate::token::Token;

pub struct Registry {
    sessions: RwLock<HashMap<Token, Arc<Session>>>,
    /// Position source. Not used for tokens.
    rng: Mutex<ChaCha8Rng>,
}

impl Registry {
    pub fn new(position_seed: Option<u64>) -> Self {
        use rand::SeedableRng;
        let seed = position_seed.unwrap_or_else(rand::random);
        Self {
            sessions: RwLock::new(HashMap::new()),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    fn random_position(&self) -> Position {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Position::new(
            rng.gen_range(Position::MIN_XZ..=Position::MAX_XZ),
            rng.gen_range(Position::MIN_Y..=Position::MAX_Y),
            rng.gen_range(Position::MIN_XZ..=Position::MAX_XZ),
        )
    }

    /// Register a new session with a fresh token and a random position.
    pub fn create(&self) -> Result<Arc<Session>, RelayError> {
        let position = self.random_position();
        loop {
            let token = Token::generate()?;
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            // 256 random bits make a collision practically impossible; still
            // never hand out a token that is in use.
            if sessions.contains_key(&token) {
                continue;
            }
            let session = Arc::new(Session::new(token.clone(), position));
            sessions.insert(token, Arc::clone(&session));
            return Ok(session);
        }
    }

    pub fn lookup(&self, token: &str) -> Result<Arc<Session>, RelayError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
            .ok_or(RelayError::UnknownSession)
    }

    /// Handles to every session live at the moment of the call.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn remove(&self, token: &str) -> Option<Arc<Session>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every session idle for longer than `threshold` at `now`.
    ///
    /// Candidates are found from a snapshot without the write lock, then
    /// re-checked under it so a session that polled in between survives.
    /// Parked listeners of evicted sessions are released.
    pub fn evict_idle(&self, now: Instant, threshold: Duration) -> Vec<Arc<Session>> {
        let candidates: Vec<Arc<Session>> = self
            .snapshot()
            .into_iter()
            .filter(|s| s.is_idle(now, threshold))
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut evicted = Vec::with_capacity(candidates.len());
        {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            for session in candidates {
                if session.is_idle(now, threshold) {
                    if let Some(removed) = sessions.remove(session.token().as_str()) {
                        evicted.push(removed);
                    }
                }
            }
        }

        for session in &evicted {
            session.release_waiter();
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_lookup() {
        let registry = Registry::new(Some(7));
        let session = registry.create().unwrap();
        let found = registry.lookup(session.token().as_str()).unwrap();
        assert!(Arc::ptr_eq(&session, &found));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_unknown_token_fails() {
        let registry = Registry::new(Some(7));
        assert!(matches!(
            registry.lookup("not-a-token"),
            Err(RelayError::UnknownSession)
        ));
    }

    #[test]
    fn remove_session() {
        let registry = Registry::new(Some(7));
        let session = registry.create().unwrap();
        let token = session.token().clone();

        assert!(registry.remove(token.as_str()).is_some());
        assert!(registry.lookup(token.as_str()).is_err());
        assert!(registry.remove(token.as_str()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn positions_are_in_bounds() {
        let registry = Registry::new(Some(99));
        for _ in 0..200 {
            let session = registry.create().unwrap();
            assert!(session.position().in_bounds());
        }
    }

    #[test]
    fn seeded_positions_are_reproducible() {
        let a = Registry::new(Some(1234));
        let b = Registry::new(Some(1234));
        for _ in 0..5 {
            assert_eq!(
                a.create().unwrap().position(),
                b.create().unwrap().position()
            );
        }
    }

    #[test]
    fn snapshot_holds_all_sessions() {
        let registry = Registry::new(Some(3));
        for _ in 0..4 {
            registry.create().unwrap();
        }
        assert_eq!(registry.snapshot().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn evict_idle_keeps_recently_active() {
        let registry = Registry::new(Some(5));
        let stale = registry.create().unwrap();
        let active = registry.create().unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        active.touch();

        let evicted = registry.evict_idle(Instant::now(), Duration::from_secs(60));
        assert_eq!(evicted.len(), 1);
        assert!(Arc::ptr_eq(&evicted[0], &stale));
        assert!(registry.lookup(stale.token().as_str()).is_err());
        assert!(registry.lookup(active.token().as_str()).is_ok());
    }
}
