use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::EngineError;
use crate::model::RequestParams;

/// Parameter naming the request parameter that carries the form token.
pub const TOKEN_NAME_PARAM: &str = "_token_name_";

pub const DEFAULT_SESSION_LIMIT: usize = 10_000;
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);

type Slot = Arc<Mutex<Option<String>>>;

#[derive(Debug)]
struct SessionEntry {
    slot: Slot,
    touched_at: Instant,
    /// Registry tick of the last access; orders eviction deterministically.
    tick: u64,
}

#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<String, SessionEntry>,
    clock: u64,
}

/// Rejects replayed form submissions.
///
/// Each session owns one token slot behind its own mutex. The registry lock
/// is held only long enough to find or create that slot, so sessions never
/// wait on each other while a token is compared and recorded.
///
/// The registry is keyed by a client-supplied session id and holds at most
/// `session_limit` slots. Admitting a new session at the limit first drops
/// sessions idle for longer than `idle`, then the least recently used one.
#[derive(Debug)]
pub struct TokenGuard {
    registry: Mutex<Registry>,
    session_limit: usize,
    idle: Duration,
}

impl Default for TokenGuard {
    fn default() -> Self {
        Self::with_limits(DEFAULT_SESSION_LIMIT, DEFAULT_SESSION_IDLE)
    }
}

impl TokenGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(session_limit: usize, idle: Duration) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            session_limit: session_limit.max(1),
            idle,
        }
    }

    /// Number of sessions currently holding a slot.
    pub fn session_count(&self) -> usize {
        self.registry.lock().sessions.len()
    }

    fn slot(&self, session: &str) -> Slot {
        let mut registry = self.registry.lock();
        registry.clock += 1;
        let tick = registry.clock;
        let now = Instant::now();

        if let Some(entry) = registry.sessions.get_mut(session) {
            entry.touched_at = now;
            entry.tick = tick;
            return entry.slot.clone();
        }

        if registry.sessions.len() >= self.session_limit {
            self.evict(&mut registry, now);
        }
        let slot = Slot::default();
        registry.sessions.insert(
            session.to_string(),
            SessionEntry {
                slot: slot.clone(),
                touched_at: now,
                tick,
            },
        );
        slot
    }

    fn evict(&self, registry: &mut Registry, now: Instant) {
        let before = registry.sessions.len();
        registry
            .sessions
            .retain(|_, entry| now.duration_since(entry.touched_at) < self.idle);

        while registry.sessions.len() >= self.session_limit {
            let oldest = registry
                .sessions
                .iter()
                .min_by_key(|(_, entry)| entry.tick)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    registry.sessions.remove(&key);
                }
                None => break,
            }
        }
        debug!(
            "Token registry evicted {} session(s)",
            before - registry.sessions.len()
        );
    }

    /// Compare `token` with the last one this session submitted, then record it.
    pub fn check_and_record(&self, session: &str, token: &str) -> Result<(), EngineError> {
        let slot = self.slot(session);
        let mut last = slot.lock();
        if last.as_deref() == Some(token) {
            warn!("Duplicate submission of token '{}' in session '{}'", token, session);
            return Err(EngineError::DuplicateSubmission);
        }
        *last = Some(token.to_string());
        Ok(())
    }

    /// Mutation requests without a token name, or with a blank token, pass unchecked.
    pub fn verify(&self, session: &str, params: &RequestParams) -> Result<(), EngineError> {
        let Some(token_name) = params.get_non_blank(TOKEN_NAME_PARAM) else {
            return Ok(());
        };
        let Some(token) = params.get_non_blank(token_name) else {
            return Ok(());
        };
        self.check_and_record(session, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Verb;

    fn form(token: &str) -> RequestParams {
        RequestParams::new(Verb::Mutation, Vec::new())
            .with(TOKEN_NAME_PARAM, "form_token")
            .with("form_token", token)
    }

    #[test]
    fn replay_in_same_session_is_rejected() {
        let guard = TokenGuard::new();
        guard.verify("s1", &form("t-1")).unwrap();
        let err = guard.verify("s1", &form("t-1")).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSubmission));
    }

    #[test]
    fn same_token_in_other_session_passes() {
        let guard = TokenGuard::new();
        guard.verify("s1", &form("t-1")).unwrap();
        guard.verify("s2", &form("t-1")).unwrap();
    }

    #[test]
    fn fresh_token_replaces_the_slot() {
        let guard = TokenGuard::new();
        guard.verify("s1", &form("t-1")).unwrap();
        guard.verify("s1", &form("t-2")).unwrap();
        guard.verify("s1", &form("t-1")).unwrap();
    }

    #[test]
    fn missing_or_blank_token_is_lenient() {
        let guard = TokenGuard::new();
        let bare = RequestParams::new(Verb::Mutation, Vec::new());
        guard.verify("s1", &bare).unwrap();
        guard.verify("s1", &bare).unwrap();
        guard.verify("s1", &form("  ")).unwrap();
        guard.verify("s1", &form("  ")).unwrap();
    }

    #[test]
    fn concurrent_replays_admit_exactly_one() {
        let guard = TokenGuard::new();
        let accepted = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| guard.check_and_record("s1", "same").is_ok()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });
        assert_eq!(accepted, 1);
    }

    #[test]
    fn registry_never_exceeds_session_limit() {
        let guard = TokenGuard::with_limits(3, DEFAULT_SESSION_IDLE);
        for i in 0..50 {
            guard.verify(&format!("rotated-{}", i), &form("t-1")).unwrap();
        }
        assert_eq!(guard.session_count(), 3);
    }

    #[test]
    fn least_recently_used_session_is_evicted_first() {
        let guard = TokenGuard::with_limits(2, DEFAULT_SESSION_IDLE);
        guard.verify("s1", &form("t-1")).unwrap();
        guard.verify("s2", &form("t-2")).unwrap();
        assert!(guard.verify("s1", &form("t-1")).is_err());

        guard.verify("s3", &form("t-3")).unwrap();
        assert_eq!(guard.session_count(), 2);
        assert!(guard.verify("s1", &form("t-1")).is_err());
        guard.verify("s2", &form("t-2")).unwrap();
    }

    #[test]
    fn idle_sessions_are_dropped_at_the_limit() {
        let guard = TokenGuard::with_limits(2, Duration::ZERO);
        guard.verify("s1", &form("t-1")).unwrap();
        guard.verify("s2", &form("t-2")).unwrap();
        guard.verify("s3", &form("t-3")).unwrap();
        assert_eq!(guard.session_count(), 1);
    }
}
