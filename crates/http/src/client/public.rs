//! Credential-free client for the endpoints that establish a session

use super::auth::{LOGIN_PATH, PROFILE_PATH, REFRESH_PATH, REGISTER_PATH};
use super::error::{ClientError, RefreshError};
use super::refresh::TokenRefresher;
use super::token_store::{AccessToken, RefreshToken};
use crate::types::{
    Credentials, ErrorBody, LoginResponse, RefreshRequest, RefreshResponse, RegisterResponse,
    UserProfile,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::debug;

/// Fallback shown when registration fails without a server message
pub const REGISTRATION_FAILED: &str = "Registration failed";

/// Client for public endpoints that never carry a bearer credential.
///
/// The refresh call goes through this client so that a rejected refresh can
/// never trigger another refresh.
#[derive(Debug, Clone)]
pub struct PublicClient {
    client: Client,
    base_url: String,
}

impl PublicClient {
    pub(crate) const fn from_parts(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a request builder without authentication
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, url)
    }

    /// Exchange credentials for a token pair
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ClientError> {
        let request = self.request(Method::POST, LOGIN_PATH).json(credentials);
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let message = error_message(response).await;
            Err(ClientError::from_status(status, message))
        }
    }

    /// Fetch the profile belonging to an access token that is not installed
    /// yet. A rejection here is final; it never goes through a refresh.
    pub async fn profile(&self, access: &AccessToken) -> Result<UserProfile, ClientError> {
        let response = self
            .request(Method::GET, PROFILE_PATH)
            .bearer_auth(access.as_str())
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let message = error_message(response).await;
            Err(ClientError::from_status(status, message))
        }
    }

    /// Create an account. Server-side rejections carry a user-facing message.
    pub async fn register(
        &self,
        credentials: &Credentials,
    ) -> Result<RegisterResponse, ClientError> {
        let request = self.request(Method::POST, REGISTER_PATH).json(credentials);
        let response = request.send().await?;

        if response.status().is_success() {
            let body = response.bytes().await?;
            if body.is_empty() {
                return Ok(RegisterResponse::Null);
            }
            Ok(serde_json::from_slice(&body)?)
        } else {
            let message = server_message(response)
                .await
                .unwrap_or_else(|| REGISTRATION_FAILED.to_string());
            Err(ClientError::Validation(message))
        }
    }
}

#[async_trait]
impl TokenRefresher for PublicClient {
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshResponse, RefreshError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.as_str().to_string(),
        };
        let response = self
            .request(Method::POST, REFRESH_PATH)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        debug!(status = status.as_u16(), "refresh endpoint answered");

        if !status.is_success() {
            let message = error_message(response).await;
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| RefreshError::Malformed(e.to_string()))
    }
}

/// The `message` field of a JSON error body, if the server sent one
async fn server_message(response: Response) -> Option<String> {
    let text = response.text().await.ok()?;
    serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message)
        .filter(|message| !message.is_empty())
}

/// Best available description of an error response
pub(crate) async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(text) if !text.is_empty() => serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.message)
            .unwrap_or(text),
        _ => status.to_string(),
    }
}
