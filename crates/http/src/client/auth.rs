//! Authentication API client methods

use super::{AuthClient, ClientError};
use crate::types::UserProfile;
use reqwest::Method;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const PROFILE_PATH: &str = "/auth/profile";
pub const REGISTER_PATH: &str = "/user/register";

impl AuthClient {
    /// Fetch the authenticated user's profile
    pub async fn profile(&self) -> Result<UserProfile, ClientError> {
        let request = self.request(Method::GET, PROFILE_PATH);
        self.execute(request).await
    }
}
