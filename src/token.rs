//! Cached bearer token and the decision of when to refresh it.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::auth::Authenticator;
use crate::context::{CallContext, SLEEP_SLICE};
use crate::error::Result;

/// Lifetime of a token issued by the identity endpoint.
pub(crate) const TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Tokens this close to expiry are refreshed before use.
pub(crate) const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub(crate) struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    pub(crate) fn new(value: String, expires_at: Instant) -> Self {
        Self { value, expires_at }
    }

    pub(crate) fn value(&self) -> &str {
        &self.value
    }

    fn is_usable(&self, now: Instant) -> bool {
        !self.value.is_empty() && is_fresh(self.expires_at, now, TOKEN_REFRESH_BUFFER)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A token expiring at `expires_at` may still be used at `now` when
/// `now + buffer < expires_at`.
pub(crate) fn is_fresh(expires_at: Instant, now: Instant, buffer: Duration) -> bool {
    match now.checked_add(buffer) {
        Some(horizon) => horizon < expires_at,
        None => false,
    }
}

/// Owns the cached token.
///
/// One caller at a time runs the exchange. Others that find the token stale
/// wait for its outcome, but keep honouring their own context while they wait.
#[derive(Debug)]
pub(crate) struct TokenManager {
    authenticator: Option<Authenticator>,
    state: Mutex<TokenState>,
    settled: Condvar,
}

#[derive(Debug, Default)]
struct TokenState {
    cached: Option<AccessToken>,
    refreshing: bool,
}

impl TokenManager {
    /// `None` means no credentials: requests go out unauthenticated.
    pub(crate) fn new(authenticator: Option<Authenticator>) -> Self {
        Self {
            authenticator,
            state: Mutex::new(TokenState::default()),
            settled: Condvar::new(),
        }
    }

    /// Returns a usable bearer token, authenticating first if needed.
    ///
    /// A failed exchange leaves the previously cached state untouched.
    pub(crate) fn ensure_valid_token(&self, ctx: &CallContext) -> Result<Option<String>> {
        let mut state = self.lock();
        loop {
            if let Some(token) = state.cached.as_ref().filter(|t| t.is_usable(Instant::now())) {
                return Ok(Some(token.value().to_string()));
            }
            if !state.refreshing {
                break;
            }
            ctx.check()?;
            state = self
                .settled
                .wait_timeout(state, SLEEP_SLICE)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        let Some(authenticator) = &self.authenticator else {
            return Ok(None);
        };

        debug!(
            had_token = state.cached.is_some(),
            "access token missing or near expiry, authenticating"
        );
        state.refreshing = true;
        drop(state);
        let _flight = Flight(self);

        let fresh = authenticator.authenticate(ctx)?;
        let value = fresh.value().to_string();
        self.lock().cached = Some(fresh);
        Ok(Some(value))
    }

    /// Drops the cached token if it is still the one a failed request used,
    /// so the next request re-authenticates. A token refreshed meanwhile by
    /// another caller is kept.
    pub(crate) fn invalidate(&self, used: &str) {
        let mut state = self.lock();
        if state.cached.as_ref().is_some_and(|t| t.value() == used) {
            state.cached = None;
            debug!("cached access token invalidated");
        }
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn seed(&self, token: AccessToken) {
        self.lock().cached = Some(token);
    }

    #[cfg(test)]
    pub(crate) fn cached(&self) -> Option<AccessToken> {
        self.lock().cached.clone()
    }
}

/// Clears the in-flight mark and wakes waiters when the exchange ends,
/// whichever way it ends.
struct Flight<'a>(&'a TokenManager);

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.0.lock().refreshing = false;
        self.0.settled.notify_all();
    }
}
