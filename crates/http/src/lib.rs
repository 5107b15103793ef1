//! Latch HTTP client
//!
//! Attaches bearer credentials to outgoing requests, recovers from expired
//! access tokens with a single coordinated refresh, and tracks the signed-in
//! user.

pub mod client;
pub mod types;

pub use client::{
    AuthClient, AuthClientBuilder, ClientConfig, ClientError, PublicClient, RefreshCoordinator,
    RefreshError, RequestAuthenticator, SessionController, SessionEvent, SessionState, TokenStore,
};
pub use reqwest::Method;
pub use types::{Credentials, UserProfile};
