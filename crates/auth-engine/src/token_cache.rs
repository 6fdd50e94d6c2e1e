//! Single-flight, time-bounded token cache.
//!
//! A token is served from cache for a fixed window after it was acquired.
//! When no fresh token is available the first caller starts a fetch; every
//! caller arriving while that fetch runs awaits the same shared future and
//! receives the same result, success or failure. A failed round is not
//! cached, so the next caller starts a new one.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// A token together with the moment it was acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub value: String,
    pub acquired_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, window: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.acquired_at) < window
    }
}

type Round<E> = Shared<BoxFuture<'static, Result<String, E>>>;

struct CacheState<E> {
    cached: Option<CachedToken>,
    in_flight: Option<(u64, Round<E>)>,
    next_round: u64,
}

/// Token cache with at most one acquisition in flight.
pub struct TokenCache<E> {
    window: Duration,
    state: Arc<Mutex<CacheState<E>>>,
}

impl<E> TokenCache<E>
where
    E: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(CacheState {
                cached: None,
                in_flight: None,
                next_round: 0,
            })),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// The cached token if it is still inside the window.
    pub fn peek(&self) -> Option<CachedToken> {
        let state = self.state.lock();
        state
            .cached
            .as_ref()
            .filter(|token| token.is_fresh(self.window, Instant::now()))
            .cloned()
    }

    pub fn is_acquiring(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// Drop the cached token and detach any running round from the cache.
    ///
    /// Callers already waiting on a detached round still get its result, but
    /// the result is not stored.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.cached = None;
        state.in_flight = None;
        debug!("Token cache invalidated");
    }

    /// Return a fresh cached token or join/start the acquisition round.
    ///
    /// `fetch` is only called when this caller starts a new round.
    pub async fn acquire<F, Fut>(&self, fetch: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>> + Send + 'static,
    {
        let round = {
            let mut state = self.state.lock();

            match &state.cached {
                Some(token) if token.is_fresh(self.window, Instant::now()) => {
                    trace!("Serving token from cache");
                    return Ok(token.value.clone());
                }
                Some(_) => {
                    debug!("Cached token expired");
                    state.cached = None;
                }
                None => {}
            }

            match &state.in_flight {
                Some((id, round)) => {
                    trace!(round = id, "Joining in-flight token acquisition");
                    round.clone()
                }
                None => {
                    let id = state.next_round;
                    state.next_round += 1;
                    debug!(round = id, "Starting token acquisition");

                    let round = Self::make_round(Arc::clone(&self.state), id, fetch());
                    state.in_flight = Some((id, round.clone()));
                    round
                }
            }
        };

        round.await
    }

    fn make_round<Fut>(state: Arc<Mutex<CacheState<E>>>, id: u64, fetch: Fut) -> Round<E>
    where
        Fut: Future<Output = Result<String, E>> + Send + 'static,
    {
        async move {
            let result = fetch.await;

            let mut state = state.lock();
            let current = matches!(&state.in_flight, Some((in_flight, _)) if *in_flight == id);
            if current {
                state.in_flight = None;
                if let Ok(value) = &result {
                    state.cached = Some(CachedToken {
                        value: value.clone(),
                        acquired_at: Instant::now(),
                    });
                }
            }
            result
        }
        .boxed()
        .shared()
    }
}

impl<E> std::fmt::Debug for TokenCache<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TokenCache")
            .field("window", &self.window)
            .field("cached", &state.cached.is_some())
            .field("in_flight", &state.in_flight.is_some())
            .finish()
    }
}
