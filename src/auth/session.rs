//! Session token lifecycle
//!
//! [`TokenManager`] owns the in-memory bearer token and its expiry, and is
//! the only writer of the persisted record. Persistence is delegated to the
//! active [`TokenStore`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::claims::parse_expiry;
use super::tokens::{migrate_store, unix_now, StoreKind, StoreLocations, TokenStore};
use crate::storage::StoreError;

/// Whether the in-memory token is known to be durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// No token held.
    Empty,
    /// The last write to the store succeeded.
    Confirmed,
    /// The last write failed; the token lives only in memory.
    Unconfirmed,
}

struct SessionState {
    token: Option<String>,
    /// Absolute expiry in Unix seconds, 0 when unknown.
    expires_at: i64,
    /// Advisory lifetime reported at issue time.
    expires_in: i64,
    persistence: Persistence,
    store: Box<dyn TokenStore>,
}

impl SessionState {
    fn reset(&mut self) {
        self.token = None;
        self.expires_at = 0;
        self.expires_in = 0;
        self.persistence = Persistence::Empty;
    }
}

/// Point-in-time view of the session, for status output and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDiagnostics {
    pub has_token: bool,
    pub token_preview: Option<String>,
    pub expires_at: Option<i64>,
    pub expires_in: Option<i64>,
    pub seconds_remaining: Option<i64>,
    pub store: StoreKind,
    pub persistence: Persistence,
    pub generation: u64,
}

pub struct TokenManager {
    state: Mutex<SessionState>,
    /// Bumped whenever the token is replaced or cleared.
    generation: AtomicU64,
    locations: StoreLocations,
    clock: fn() -> i64,
}

impl TokenManager {
    pub fn new(locations: StoreLocations, kind: StoreKind) -> Self {
        let store = locations.open(kind);
        Self {
            state: Mutex::new(SessionState {
                token: None,
                expires_at: 0,
                expires_in: 0,
                persistence: Persistence::Empty,
                store,
            }),
            generation: AtomicU64::new(0),
            locations,
            clock: unix_now,
        }
    }

    /// Replace the wall clock used for claim expiry checks.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Changes every time the session token is replaced or cleared.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store a token whose expiry must be read from its own claims.
    pub fn set_token(&self, token: &str) {
        let expires_at = parse_expiry(token).unwrap_or(0);
        let expires_in = if expires_at > 0 {
            (expires_at - (self.clock)()).max(0)
        } else {
            0
        };
        self.install(token, expires_at, expires_in);
    }

    /// Store a token with the expiry reported alongside it by the server.
    pub fn set_token_with_expiry(&self, token: &str, expires_at: i64, expires_in: i64) {
        self.install(token, expires_at.max(0), expires_in.max(0));
    }

    fn install(&self, token: &str, expires_at: i64, expires_in: i64) {
        if token.is_empty() {
            tracing::warn!("Ignoring empty session token");
            return;
        }

        let mut st = self.lock();
        st.token = Some(token.to_string());
        st.expires_at = expires_at;
        st.expires_in = expires_in;
        st.persistence = match st.store.save_token(token) {
            Ok(()) => Persistence::Confirmed,
            Err(e) => {
                tracing::warn!("Session token kept in memory only: {}", e);
                Persistence::Unconfirmed
            }
        };
        self.bump();
        tracing::info!(
            "Session token set (expires_at={}, persistence={:?})",
            st.expires_at,
            st.persistence
        );
        tracing::debug!("{:?}", self.snapshot(&st));
    }

    /// Current token, loading it from the store on first use.
    pub fn get_token(&self) -> Option<String> {
        let mut st = self.lock();
        self.ensure_loaded(&mut st);
        st.token.clone()
    }

    fn ensure_loaded(&self, st: &mut SessionState) {
        if st.token.is_some() {
            return;
        }
        if let Some(token) = st.store.get_token() {
            st.expires_at = parse_expiry(&token).unwrap_or(0);
            st.expires_in = if st.expires_at > 0 {
                (st.expires_at - (self.clock)()).max(0)
            } else {
                0
            };
            st.token = Some(token);
            st.persistence = Persistence::Confirmed;
            tracing::debug!("Session token loaded from {} store", st.store.kind());
        }
    }

    /// Forget the token in memory and in the store.
    pub fn clear_token(&self) {
        let mut st = self.lock();
        st.reset();
        st.store.clear_token();
        self.bump();
        tracing::info!("Session token cleared");
    }

    /// True if the stored record is fresh and, when an expiry is known, the
    /// token has not passed it. A token past its own expiry is cleared.
    pub fn has_valid_token(&self) -> bool {
        let mut st = self.lock();

        if st.persistence == Persistence::Unconfirmed {
            if st.token.is_none() {
                return false;
            }
        } else if !st.store.has_token() {
            if st.token.is_some() {
                tracing::info!("Stored session record is gone, dropping in-memory token");
                st.reset();
                self.bump();
            }
            return false;
        }

        self.ensure_loaded(&mut st);
        if st.token.is_none() {
            return false;
        }

        if st.expires_at > 0 && (self.clock)() >= st.expires_at {
            tracing::info!("Session token passed its expiry ({})", st.expires_at);
            st.reset();
            st.store.clear_token();
            self.bump();
            return false;
        }
        true
    }

    /// Absolute expiry, if known.
    pub fn expires_at(&self) -> Option<i64> {
        let st = self.lock();
        (st.expires_at > 0).then_some(st.expires_at)
    }

    /// Seconds until the known expiry, clamped at zero.
    pub fn seconds_remaining(&self) -> Option<i64> {
        let st = self.lock();
        self.remaining(&st)
    }

    fn remaining(&self, st: &SessionState) -> Option<i64> {
        (st.expires_at > 0).then(|| (st.expires_at - (self.clock)()).max(0))
    }

    pub fn store_kind(&self) -> StoreKind {
        self.lock().store.kind()
    }

    /// Move the persisted token into a store of `kind`.
    ///
    /// Returns whether a token was carried over.
    pub fn switch_store(&self, kind: StoreKind) -> Result<bool, StoreError> {
        let mut st = self.lock();
        if st.store.kind() == kind {
            return Ok(false);
        }

        let migrated = migrate_store(st.store.as_ref(), kind, &self.locations);
        st.store = migrated.store;
        tracing::info!("Token store switched to {}", kind);

        match migrated.carried {
            Ok(true) => {
                st.persistence = Persistence::Confirmed;
                Ok(true)
            }
            Ok(false) => {
                // A memory-only token gets another chance at durability.
                if let (Persistence::Unconfirmed, Some(token)) = (st.persistence, st.token.clone())
                {
                    st.store.save_token(&token)?;
                    st.persistence = Persistence::Confirmed;
                    return Ok(true);
                }
                Ok(false)
            }
            Err(e) => {
                if st.token.is_some() {
                    st.persistence = Persistence::Unconfirmed;
                }
                Err(e)
            }
        }
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        let mut st = self.lock();
        self.ensure_loaded(&mut st);
        self.snapshot(&st)
    }

    fn snapshot(&self, st: &SessionState) -> SessionDiagnostics {
        SessionDiagnostics {
            has_token: st.token.is_some(),
            token_preview: st
                .token
                .as_deref()
                .map(|t| format!("{}...", t.chars().take(8).collect::<String>())),
            expires_at: (st.expires_at > 0).then_some(st.expires_at),
            expires_in: (st.expires_in > 0).then_some(st.expires_in),
            seconds_remaining: self.remaining(st),
            store: st.store.kind(),
            persistence: st.persistence,
            generation: self.generation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tokens::{RETENTION_WINDOW_SECS, TIMESTAMP_KEY, TOKEN_KEY};
    use crate::storage::PrefsFile;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use std::sync::Arc;

    fn locations(dir: &tempfile::TempDir) -> StoreLocations {
        StoreLocations::new(
            Arc::new(PrefsFile::new(dir.path().join("prefs.toml"))),
            dir.path().join("session"),
        )
    }

    fn jwt(exp: i64) -> String {
        format!(
            "h.{}.s",
            URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"7","exp":{}}}"#, exp))
        )
    }

    #[test]
    fn test_set_token_parses_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = TokenManager::new(locations(&dir), StoreKind::Prefs);
        let exp = unix_now() + 3600;

        mgr.set_token(&jwt(exp));
        assert_eq!(mgr.expires_at(), Some(exp));
        let remaining = mgr.seconds_remaining().unwrap();
        assert!(remaining > 3500 && remaining <= 3600);
        assert!(mgr.has_valid_token());
    }

    #[test]
    fn test_opaque_token_has_no_expiry_but_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = TokenManager::new(locations(&dir), StoreKind::File);
        mgr.set_token("opaque");
        assert_eq!(mgr.expires_at(), None);
        assert!(mgr.has_valid_token());
        assert_eq!(mgr.get_token().as_deref(), Some("opaque"));
    }

    #[test]
    fn test_lazy_load_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let exp = unix_now() + 600;
        TokenManager::new(locations(&dir), StoreKind::Prefs).set_token_with_expiry(
            &jwt(exp),
            exp,
            600,
        );

        // Fresh manager, as after an app restart.
        let mgr = TokenManager::new(locations(&dir), StoreKind::Prefs);
        assert_eq!(mgr.expires_at(), None);
        assert_eq!(mgr.get_token(), Some(jwt(exp)));
        assert_eq!(mgr.expires_at(), Some(exp));
    }

    #[test]
    fn test_clear_token() {
        let dir = tempfile::tempdir().unwrap();
        let locs = locations(&dir);
        let mgr = TokenManager::new(locs.clone(), StoreKind::Prefs);
        mgr.set_token("A.B.C");
        let before = mgr.generation();

        mgr.clear_token();
        assert!(!mgr.has_valid_token());
        assert_eq!(mgr.get_token(), None);
        assert!(mgr.generation() > before);
        assert_eq!(locs.prefs.get(TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_claim_expiry_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = TokenManager::new(locations(&dir), StoreKind::Prefs);
        let past = unix_now() - 10;
        mgr.set_token_with_expiry("A.B.C", past, 0);

        assert!(!mgr.has_valid_token());
        assert_eq!(mgr.get_token(), None);
    }

    #[test]
    fn test_retention_window_invalidates_in_memory_token() {
        let dir = tempfile::tempdir().unwrap();
        let locs = locations(&dir);
        let mgr = TokenManager::new(locs.clone(), StoreKind::Prefs);
        mgr.set_token_with_expiry("A.B.C", unix_now() + 86400, 86400);
        assert!(mgr.has_valid_token());

        let stale = unix_now() - RETENTION_WINDOW_SECS - 5;
        locs.prefs.set(TIMESTAMP_KEY, &stale.to_string()).unwrap();

        assert!(!mgr.has_valid_token());
        assert_eq!(mgr.get_token(), None);
        assert_eq!(locs.prefs.get(TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_unconfirmed_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("session");
        std::fs::write(&blocker, "file in the way").unwrap();
        let locs = locations(&dir);

        let mgr = TokenManager::new(locs, StoreKind::File);
        mgr.set_token("A.B.C");

        let diag = mgr.diagnostics();
        assert_eq!(diag.persistence, Persistence::Unconfirmed);
        assert!(diag.has_token);
        assert!(mgr.has_valid_token());

        // Switching to a working store makes it durable.
        assert!(matches!(mgr.switch_store(StoreKind::Prefs), Ok(true)));
        assert_eq!(mgr.diagnostics().persistence, Persistence::Confirmed);
    }

    #[test]
    fn test_switch_store_preserves_token() {
        let dir = tempfile::tempdir().unwrap();
        let locs = locations(&dir);
        let mgr = TokenManager::new(locs.clone(), StoreKind::Prefs);
        mgr.set_token("A.B.C");

        assert!(matches!(mgr.switch_store(StoreKind::File), Ok(true)));
        assert_eq!(mgr.store_kind(), StoreKind::File);
        assert!(mgr.has_valid_token());
        assert!(!locs.open(StoreKind::Prefs).has_token());
        assert_eq!(
            locs.open(StoreKind::File).get_token().as_deref(),
            Some("A.B.C")
        );

        // Same kind is a no-op.
        assert!(matches!(mgr.switch_store(StoreKind::File), Ok(false)));
    }

    #[test]
    fn test_diagnostics_preview_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = TokenManager::new(locations(&dir), StoreKind::Prefs);
        mgr.set_token_with_expiry("abcdefghijklmnop", 0, 0);
        let diag = mgr.diagnostics();
        assert_eq!(diag.token_preview.as_deref(), Some("abcdefgh..."));
        assert_eq!(diag.expires_at, None);
        assert_eq!(diag.store, StoreKind::Prefs);
    }

    #[test]
    fn test_claim_checked_against_manager_clock() {
        fn much_later() -> i64 {
            unix_now() + 10 * 24 * 60 * 60
        }
        let dir = tempfile::tempdir().unwrap();
        let mgr = TokenManager::new(locations(&dir), StoreKind::Prefs).with_clock(much_later);
        mgr.set_token(&jwt(unix_now() + 3600));
        assert_eq!(mgr.seconds_remaining(), Some(0));
        assert!(!mgr.has_valid_token());
    }

    #[test]
    fn test_empty_token_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = TokenManager::new(locations(&dir), StoreKind::Prefs);
        mgr.set_token("");
        assert!(!mgr.has_valid_token());
        assert_eq!(mgr.generation(), 0);
    }
}
