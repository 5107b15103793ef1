//! Latch HTTP client
//!
//! [`AuthClient`] is the authenticated request pipeline: every request gets
//! the current bearer credential attached before dispatch, and a
//! `401 Unauthorized` answer is recovered once through the shared
//! [`RefreshCoordinator`] before it reaches the caller.

pub mod auth;
pub mod authenticator;
pub mod config;
pub mod error;
pub mod public;
pub mod refresh;
pub mod session;
pub mod token_store;

pub use authenticator::RequestAuthenticator;
pub use config::ClientConfig;
pub use error::{ClientError, RefreshError};
pub use public::PublicClient;
pub use refresh::{
    PendingQueue, PendingRequest, RefreshCoordinator, RefreshState, SessionEvent, TokenRefresher,
};
pub use session::{SessionController, SessionState};
pub use token_store::{AccessToken, REFRESH_TOKEN_KEY, RefreshToken, TokenPair, TokenStore};

use latch_core::{FileStore, KeyValueStore};
use reqwest::{Client, ClientBuilder, Request, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Response status that triggers a refresh
pub const AUTH_FAILURE_STATUS: StatusCode = StatusCode::UNAUTHORIZED;

/// Authenticated API client
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
    public: PublicClient,
    tokens: TokenStore,
    authenticator: RequestAuthenticator,
    coordinator: RefreshCoordinator,
}

impl AuthClient {
    /// Create a new client with default configuration and in-memory storage
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> AuthClientBuilder {
        AuthClientBuilder::default()
    }

    /// Create a client from configuration, persisting the refresh token in
    /// the configured state directory
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        config
            .validate()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        let storage = FileStore::new(config.state_dir().credentials_dir());
        let mut builder = Self::builder()
            .base_url(&config.base_url)
            .user_agent(&config.user_agent)
            .storage(Arc::new(storage));
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The credential-free client sharing this client's connection pool
    pub const fn public(&self) -> &PublicClient {
        &self.public
    }

    pub const fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub const fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Subscribe to session events such as invalidation after a failed refresh
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.coordinator.subscribe()
    }

    /// Create a request builder. The bearer credential is attached when the
    /// request is sent, not here.
    pub fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, url)
    }

    /// Send a request through the authenticated pipeline.
    ///
    /// A `401` answer is recovered at most once: the request is replayed with
    /// a refreshed credential, and if the replay is rejected too that response
    /// is returned as-is.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let mut request = request.build()?;
        let epoch = self.authenticator.authorize(&mut request);

        let replay = request.try_clone();
        let response = self.dispatch(request).await?;
        if response.status() != AUTH_FAILURE_STATUS {
            return Ok(response);
        }

        let Some(replay) = replay else {
            debug!("request body cannot be replayed, returning 401");
            return Ok(response);
        };

        let retried = self.coordinator.recover(replay, epoch).await?;
        let response = self.dispatch(retried).await?;
        if response.status() == AUTH_FAILURE_STATUS {
            debug!("replayed request rejected again, giving up");
        }
        Ok(response)
    }

    /// Execute a request and handle common errors
    pub async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = self.send(request).await?;
        let status = response.status();

        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let message = public::error_message(response).await;
            Err(ClientError::from_status(status, message))
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response, ClientError> {
        debug!(method = %request.method(), url = %request.url(), "dispatching request");
        Ok(self.client.execute(request).await?)
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.base_url)
            .field("tokens", &self.tokens)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

/// Builder for AuthClient
#[derive(Default)]
pub struct AuthClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    storage: Option<Arc<dyn KeyValueStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl AuthClientBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the transport timeout; a refresh that times out ends the session
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Set where the refresh token is persisted (in memory by default)
    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Replace the refresh transport (the public client by default)
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<AuthClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        url::Url::parse(&base_url)
            .map_err(|e| ClientError::Configuration(format!("invalid base_url: {e}")))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut client_builder = ClientBuilder::new();

        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        client_builder = client_builder.user_agent(
            self.user_agent
                .unwrap_or_else(|| concat!("latch/", env!("CARGO_PKG_VERSION")).to_string()),
        );

        let client = client_builder.build()?;

        let tokens = self
            .storage
            .map_or_else(TokenStore::in_memory, TokenStore::new);
        let public = PublicClient::from_parts(client.clone(), base_url.clone());
        let refresher = self
            .refresher
            .unwrap_or_else(|| Arc::new(public.clone()));
        let coordinator = RefreshCoordinator::new(tokens.clone(), refresher);

        Ok(AuthClient {
            client,
            base_url,
            public,
            authenticator: RequestAuthenticator::new(tokens.clone()),
            tokens,
            coordinator,
        })
    }
}
