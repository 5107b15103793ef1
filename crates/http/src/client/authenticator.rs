//! Request-phase bearer credential injection

use super::token_store::{AccessToken, TokenStore};
use reqwest::Request;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use tracing::warn;

/// Attaches the current access token to outgoing requests.
#[derive(Debug, Clone)]
pub struct RequestAuthenticator {
    tokens: TokenStore,
}

impl RequestAuthenticator {
    pub const fn new(tokens: TokenStore) -> Self {
        Self { tokens }
    }

    /// Set `Authorization: Bearer <token>` if an access token is held.
    ///
    /// Requests are left untouched when there is no token. Returns the
    /// session epoch the request was authorized in, which a later 401
    /// recovery is checked against.
    pub fn authorize(&self, request: &mut Request) -> u64 {
        let (token, epoch) = self.tokens.access_with_epoch();
        if let Some(token) = token {
            set_bearer(request, &token);
        }
        epoch
    }
}

/// Overwrite the request's authorization header with `token`
pub(crate) fn set_bearer(request: &mut Request, token: &AccessToken) {
    match HeaderValue::try_from(format!("Bearer {}", token.as_str())) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Err(_) => {
            warn!("access token contains characters not allowed in a header, sending without it");
        }
    }
}
