//! Session lifecycle: login, logout, bootstrap and the current user

use super::refresh::SessionEvent;
use super::token_store::{AccessToken, RefreshToken};
use super::{AuthClient, ClientError};
use crate::types::{Credentials, RegisterResponse, UserProfile};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What dependents of the session observe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<UserProfile>,
    /// `true` until the first bootstrap/login attempt settles
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }
}

impl SessionState {
    pub const fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Owns the current user and drives the token lifecycle around it.
///
/// Must be created inside a tokio runtime: it spawns a listener that clears
/// the user when the refresh coordinator invalidates the session. The
/// listener stops when the controller is dropped.
pub struct SessionController {
    client: AuthClient,
    state: Arc<watch::Sender<SessionState>>,
    listener: JoinHandle<()>,
}

impl SessionController {
    pub fn new(client: AuthClient) -> Self {
        let state = Arc::new(watch::Sender::new(SessionState::default()));
        let listener = tokio::spawn(watch_invalidation(client.subscribe(), state.clone()));
        Self {
            client,
            state,
            listener,
        }
    }

    pub const fn client(&self) -> &AuthClient {
        &self.client
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Log in and load the user's profile.
    ///
    /// The new tokens are installed only once their profile loads, so on
    /// failure the previous session is untouched and the error is returned.
    pub async fn login(&self, credentials: &Credentials) -> Result<UserProfile, ClientError> {
        credentials.validate_login()?;
        self.set_loading(true);

        match self.establish(credentials).await {
            Ok(user) => {
                info!(email = %user.email, "logged in");
                self.state.send_modify(|state| {
                    state.user = Some(user.clone());
                    state.loading = false;
                });
                Ok(user)
            }
            Err(e) => {
                self.set_loading(false);
                Err(e)
            }
        }
    }

    async fn establish(&self, credentials: &Credentials) -> Result<UserProfile, ClientError> {
        let public = self.client.public();
        let response = public.login(credentials).await?;
        let access = AccessToken::from(response.access_token);

        // Fetched outside the refresh pipeline: a rejection belongs to the
        // new tokens and must not end the session currently installed
        let user = public.profile(&access).await.inspect_err(|e| {
            debug!(error = %e, "profile fetch after login failed");
        })?;

        self.client
            .tokens()
            .set_both(
                Some(access),
                Some(RefreshToken::from(response.refresh_token)),
            )
            .await?;
        Ok(user)
    }

    /// Clear both tokens and the current user
    pub async fn logout(&self) -> Result<(), ClientError> {
        let cleared = self.client.tokens().clear().await;
        self.state.send_replace(SessionState {
            user: None,
            loading: false,
        });
        info!("logged out");
        Ok(cleared?)
    }

    /// Resume a persisted session, if there is one.
    ///
    /// Without a stored refresh token no request is made. A failed profile
    /// fetch is logged and leaves the user signed out.
    pub async fn bootstrap(&self) -> Option<UserProfile> {
        self.set_loading(true);

        let user = match self.client.tokens().refresh().await {
            Ok(Some(_)) => match self.client.profile().await {
                Ok(user) => {
                    info!(email = %user.email, "resumed session");
                    Some(user)
                }
                Err(e) => {
                    warn!(error = %e, "could not resume session");
                    None
                }
            },
            Ok(None) => {
                debug!("no stored session");
                None
            }
            Err(e) => {
                warn!(error = %e, "could not read stored session");
                None
            }
        };

        self.state.send_replace(SessionState {
            user: user.clone(),
            loading: false,
        });
        user
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, credentials: &Credentials) -> Result<RegisterResponse, ClientError> {
        credentials.validate()?;
        self.client.public().register(credentials).await
    }

    fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.loading != loading;
            state.loading = loading;
            changed
        });
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

async fn watch_invalidation(
    mut events: broadcast::Receiver<SessionEvent>,
    state: Arc<watch::Sender<SessionState>>,
) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Invalidated { reason }) => {
                info!(reason = %reason, "session invalidated, signing out");
            }
            // Invalidation is the only event, so a missed one still means sign out
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!(missed, "session events lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
        state.send_replace(SessionState {
            user: None,
            loading: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::error::RefreshError;
    use crate::client::refresh::TokenRefresher;
    use crate::types::RefreshResponse;
    use async_trait::async_trait;
    use reqwest::Method;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct RejectingRefresher;

    #[async_trait]
    impl TokenRefresher for RejectingRefresher {
        async fn refresh(&self, _: &RefreshToken) -> Result<RefreshResponse, RefreshError> {
            Err(RefreshError::Rejected {
                status: 401,
                message: "expired".into(),
            })
        }
    }

    fn user() -> UserProfile {
        UserProfile {
            id: Some("1".into()),
            email: "ada@example.com".into(),
            name: Some("Ada".into()),
        }
    }

    #[tokio::test]
    async fn test_starts_loading_and_signed_out() {
        let controller = SessionController::new(AuthClient::new("http://localhost:1").unwrap());
        assert!(controller.is_loading());
        assert!(!controller.is_authenticated());
        assert_eq!(controller.current_user(), None);
    }

    #[tokio::test]
    async fn test_bootstrap_without_refresh_token_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/profile"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let controller = SessionController::new(AuthClient::new(server.uri()).unwrap());
        assert_eq!(controller.bootstrap().await, None);
        assert!(!controller.is_loading());
        assert!(!controller.is_authenticated());
    }

    #[tokio::test]
    async fn test_invalidation_clears_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .and(header("authorization", "Bearer AT1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = AuthClient::builder()
            .base_url(server.uri())
            .refresher(Arc::new(RejectingRefresher))
            .build()
            .unwrap();
        client
            .tokens()
            .set_both(Some("AT1".into()), Some("RT1".into()))
            .await
            .unwrap();

        let controller = SessionController::new(client.clone());
        controller.state.send_replace(SessionState {
            user: Some(user()),
            loading: false,
        });
        let mut states = controller.subscribe();

        let result = client.send(client.request(Method::GET, "/data")).await;
        assert!(matches!(result, Err(ClientError::RefreshFailed(_))));

        states
            .wait_for(|state| state.user.is_none())
            .await
            .unwrap();
        assert!(!controller.is_authenticated());
        assert_eq!(client.tokens().access(), None);
    }

    #[tokio::test]
    async fn test_logout_clears_tokens_and_user() {
        let client = AuthClient::new("http://localhost:1").unwrap();
        client
            .tokens()
            .set_both(Some("AT1".into()), Some("RT1".into()))
            .await
            .unwrap();
        let controller = SessionController::new(client.clone());
        controller.state.send_replace(SessionState {
            user: Some(user()),
            loading: false,
        });

        controller.logout().await.unwrap();

        assert_eq!(controller.current_user(), None);
        assert_eq!(client.tokens().access(), None);
        assert_eq!(client.tokens().refresh().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_leaves_email_format_to_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let controller = SessionController::new(AuthClient::new(server.uri()).unwrap());
        let err = controller
            .login(&Credentials::new("ada", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthenticationFailed(_)));
        assert!(!controller.is_loading());

        let err = controller
            .login(&Credentials::new("ada", "short"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn test_register_validates_before_calling_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/register"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let controller = SessionController::new(AuthClient::new(server.uri()).unwrap());
        let err = controller
            .register(&Credentials::new("not-an-email", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }
}
