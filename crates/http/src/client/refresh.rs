//! Single-flight access token refresh
//!
//! When a request comes back `401 Unauthorized` the coordinator exchanges the
//! stored refresh token for a new access token. However many requests fail
//! at the same time, only one refresh call is made: the first failure moves
//! the coordinator from [`RefreshState::Idle`] to [`RefreshState::Refreshing`]
//! and every later failure is parked in a [`PendingQueue`] until that refresh
//! settles. On success each parked request is handed back with the new bearer
//! credential; on failure all of them are rejected with the same
//! [`RefreshError`], both tokens are cleared and a
//! [`SessionEvent::Invalidated`] is broadcast.
//!
//! The transition out of `Idle` happens under a synchronous lock that is
//! never held across an `.await`, so the decision "start a refresh or wait
//! for one" is atomic with respect to every other request.

use super::authenticator::set_bearer;
use super::error::{ClientError, RefreshError};
use super::token_store::{AccessToken, RefreshToken, TokenStore};
use crate::types::RefreshResponse;
use async_trait::async_trait;
use reqwest::Request;
use reqwest::header::AUTHORIZATION;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

/// Capacity of the session event channel
const EVENT_CAPACITY: usize = 16;

/// Exchanges a refresh token for new tokens.
///
/// Implementations must not route the call through the authenticated
/// pipeline, otherwise a rejected refresh would recurse into another refresh.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshResponse, RefreshError>;
}

/// Session-wide notifications emitted by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session could not be recovered and its tokens were cleared
    Invalidated { reason: RefreshError },
}

type Reply = oneshot::Sender<Result<Request, RefreshError>>;

/// A request that failed authentication and waits for the refresh outcome
pub struct PendingRequest {
    request: Request,
    reply: Reply,
}

impl PendingRequest {
    fn new(request: Request) -> (Self, oneshot::Receiver<Result<Request, RefreshError>>) {
        let (reply, receiver) = oneshot::channel();
        (Self { request, reply }, receiver)
    }

    /// Hand the request back carrying `token`, ready to be reissued
    fn resolve(self, token: &AccessToken) {
        let Self { mut request, reply } = self;
        set_bearer(&mut request, token);
        // The caller may have given up waiting; nothing to do then
        let _ = reply.send(Ok(request));
    }

    fn reject(self, reason: RefreshError) {
        let _ = self.reply.send(Err(reason));
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("method", self.request.method())
            .field("url", &self.request.url().as_str())
            .finish_non_exhaustive()
    }
}

/// Requests parked behind an in-flight refresh, in arrival order
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: Vec<PendingRequest>,
}

impl PendingQueue {
    fn push(&mut self, pending: PendingRequest) {
        self.entries.push(pending);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for PendingQueue {
    type Item = PendingRequest;
    type IntoIter = std::vec::IntoIter<PendingRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Whether a refresh is in flight
#[derive(Debug, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    Refreshing(PendingQueue),
}

/// What a failed request should do, decided atomically under the state lock
enum Admission {
    /// Start the refresh; this request is the one that triggered it
    Lead(PendingRequest),
    /// A refresh is already running; wait for it
    Queued,
    /// The token was refreshed since this request was sent; replay right away
    Stale(Request, AccessToken),
    /// The session this request was sent in was cleared or replaced
    Ended,
}

/// Coordinates access token refreshes across concurrent requests.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<RefreshState>,
    tokens: TokenStore,
    refresher: Arc<dyn TokenRefresher>,
    events: broadcast::Sender<SessionEvent>,
    refreshes: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(tokens: TokenStore, refresher: Arc<dyn TokenRefresher>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RefreshState::Idle),
                tokens,
                refresher,
                events,
                refreshes: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), RefreshState::Refreshing(_))
    }

    /// Number of requests parked behind the current refresh
    pub fn queued(&self) -> usize {
        match &*self.lock_state() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing(queue) => queue.len(),
        }
    }

    /// Number of refresh calls issued since construction
    pub fn refresh_count(&self) -> u64 {
        self.inner.refreshes.load(Ordering::SeqCst)
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// Recover a request that was rejected with `401 Unauthorized`.
    ///
    /// `epoch` is the session epoch the request was authorized in (see
    /// [`RequestAuthenticator::authorize`](super::RequestAuthenticator::authorize)).
    /// A request from a session that has since been cleared or replaced is
    /// never given the new session's credential.
    ///
    /// Resolves to the same request carrying a fresh bearer credential, to be
    /// dispatched once more by the caller. The caller is responsible for not
    /// calling this again for the replayed request.
    pub async fn recover(&self, request: Request, epoch: u64) -> Result<Request, ClientError> {
        let (pending, receiver) = PendingRequest::new(request);

        match self.admit(pending, epoch) {
            Admission::Stale(mut request, token) => {
                debug!("credential rotated while request was in flight, replaying");
                set_bearer(&mut request, &token);
                return Ok(request);
            }
            Admission::Lead(original) => {
                let this = self.clone();
                // Runs detached so a caller dropping its future cannot leave
                // the coordinator stuck in `Refreshing`
                tokio::spawn(async move { this.drive(original, epoch).await });
            }
            Admission::Queued => {}
            Admission::Ended => {
                debug!("session ended while request was in flight");
                return Err(ClientError::RefreshFailed(RefreshError::Superseded));
            }
        }

        match receiver.await {
            Ok(result) => result.map_err(ClientError::from),
            Err(_) => Err(ClientError::RefreshFailed(RefreshError::Transport(
                "refresh task ended without a result".into(),
            ))),
        }
    }

    fn admit(&self, pending: PendingRequest, epoch: u64) -> Admission {
        let mut state = self.lock_state();
        if epoch != self.inner.tokens.epoch() {
            return Admission::Ended;
        }
        match &mut *state {
            RefreshState::Refreshing(queue) => {
                queue.push(pending);
                debug!(queued = queue.len(), "refresh in flight, request queued");
                Admission::Queued
            }
            RefreshState::Idle => {
                if let Some(current) = self.inner.tokens.access()
                    && sent_bearer(&pending.request) != Some(current.as_str())
                {
                    let PendingRequest { request, reply } = pending;
                    drop(reply);
                    return Admission::Stale(request, current);
                }
                *state = RefreshState::Refreshing(PendingQueue::default());
                Admission::Lead(pending)
            }
        }
    }

    async fn drive(self, original: PendingRequest, epoch: u64) {
        let mut guard = ReleaseOnUnwind {
            coordinator: &self,
            armed: true,
        };
        let outcome = self.run_refresh(epoch).await;

        // Tokens are settled before leaving `Refreshing`, so a request
        // failing right after this point sees the final state.
        if let Err(reason) = &outcome {
            self.invalidate(reason, epoch).await;
        }

        guard.armed = false;
        let queue = self.take_queue();

        match outcome {
            Ok(token) => {
                info!(replayed = queue.len() + 1, "access token refreshed");
                original.resolve(&token);
                for pending in queue {
                    pending.resolve(&token);
                }
            }
            Err(reason) => {
                original.reject(reason.clone());
                for pending in queue {
                    pending.reject(reason.clone());
                }
            }
        }
    }

    async fn run_refresh(&self, epoch: u64) -> Result<AccessToken, RefreshError> {
        let tokens = &self.inner.tokens;
        let refresh_token = tokens
            .refresh()
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?
            .ok_or(RefreshError::MissingRefreshToken)?;

        self.inner.refreshes.fetch_add(1, Ordering::SeqCst);
        debug!("requesting new access token");
        let response = self.inner.refresher.refresh(&refresh_token).await?;

        let access = response
            .access_token
            .filter(|token| !token.is_empty())
            .map(AccessToken::from)
            .ok_or_else(|| RefreshError::Malformed("response carried no access token".into()))?;
        // Endpoints that do not rotate omit the field; keep the stored token then
        let rotated = response
            .refresh_token
            .filter(|token| !token.is_empty())
            .map(RefreshToken::from);

        let applied = tokens
            .apply_refresh(epoch, access.clone(), rotated)
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?;
        if applied {
            Ok(access)
        } else {
            Err(RefreshError::Superseded)
        }
    }

    /// Tear the session down after a failed refresh, unless it was already
    /// replaced by a logout or a new login.
    async fn invalidate(&self, reason: &RefreshError, epoch: u64) {
        if *reason == RefreshError::Superseded {
            debug!("refresh outlived its session, nothing to invalidate");
            return;
        }

        match self.inner.tokens.clear_if_epoch(epoch).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("session changed during refresh, leaving it alone");
                return;
            }
            Err(e) => warn!(error = %e, "failed to clear persisted tokens"),
        }

        warn!(reason = %reason, "session invalidated");
        // No subscribers is fine
        let _ = self.inner.events.send(SessionEvent::Invalidated {
            reason: reason.clone(),
        });
    }

    /// Leave `Refreshing`, returning whoever was waiting
    fn take_queue(&self) -> PendingQueue {
        match std::mem::take(&mut *self.lock_state()) {
            RefreshState::Refreshing(queue) => queue,
            RefreshState::Idle => PendingQueue::default(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("state", &*self.lock_state())
            .field("refreshes", &self.refresh_count())
            .finish_non_exhaustive()
    }
}

/// Returns the coordinator to `Idle` if the refresh task unwinds, rejecting
/// every parked request. The leader's own request is dropped with the task and
/// its caller sees the reply channel close.
struct ReleaseOnUnwind<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl Drop for ReleaseOnUnwind<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let queue = self.coordinator.take_queue();
        warn!(queued = queue.len(), "refresh task aborted");
        for pending in queue {
            pending.reject(RefreshError::Transport("refresh task aborted".into()));
        }
    }
}

/// Bearer token the request was sent with, if any
fn sent_bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}
