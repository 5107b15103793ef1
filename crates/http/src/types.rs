//! Wire types for the authentication endpoints
//!
//! Only the fields the client consumes are modelled; anything else the
//! server sends is ignored.

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value as JsonValue;

pub use latch_core::Credentials;

/// `POST /auth/login` response
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// `POST /auth/refresh` request
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// `POST /auth/refresh` response; either field may be absent
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// `GET /auth/profile` response: the authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Identifiers arrive as strings or numbers depending on the backend
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<JsonValue>::deserialize(deserializer)? {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(id)) => Ok(Some(id)),
        Some(JsonValue::Number(id)) => Ok(Some(id.to_string())),
        Some(other) => Err(de::Error::invalid_type(
            de::Unexpected::Other(&other.to_string()),
            &"a string or number id",
        )),
    }
}

/// `POST /user/register` response; the payload is opaque to the client
pub type RegisterResponse = JsonValue;

/// Error body returned by the backend
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

impl std::fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginResponse").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RefreshResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshResponse")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_refresh_response_fields_are_optional() {
        let only_access: RefreshResponse =
            serde_json::from_value(json!({"accessToken": "AT2"})).unwrap();
        assert_eq!(only_access.access_token.as_deref(), Some("AT2"));
        assert!(only_access.refresh_token.is_none());

        let empty: RefreshResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.access_token.is_none());
    }

    #[test]
    fn test_refresh_request_uses_camel_case() {
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: "RT1".into(),
        })
        .unwrap();
        assert_eq!(body, json!({"refreshToken": "RT1"}));
    }

    #[test]
    fn test_profile_tolerates_missing_optional_fields() {
        let profile: UserProfile = serde_json::from_value(json!({"email": "a@b.com"})).unwrap();
        assert_eq!(profile.email, "a@b.com");
        assert!(profile.id.is_none());
        assert!(profile.name.is_none());
    }

    #[test]
    fn test_profile_accepts_numeric_id() {
        let numeric: UserProfile =
            serde_json::from_value(json!({"id": 42, "email": "a@b.com"})).unwrap();
        assert_eq!(numeric.id.as_deref(), Some("42"));

        let text: UserProfile =
            serde_json::from_value(json!({"id": "u-1", "email": "a@b.com"})).unwrap();
        assert_eq!(text.id.as_deref(), Some("u-1"));

        let null: UserProfile =
            serde_json::from_value(json!({"id": null, "email": "a@b.com"})).unwrap();
        assert!(null.id.is_none());

        assert!(serde_json::from_value::<UserProfile>(json!({"id": [1], "email": "a@b.com"})).is_err());
    }

    #[test]
    fn test_debug_never_prints_tokens() {
        let login = LoginResponse {
            access_token: "AT1".into(),
            refresh_token: "RT1".into(),
        };
        let rendered = format!("{login:?} {:?}", RefreshResponse::default());
        assert!(!rendered.contains("AT1"));
        assert!(!rendered.contains("RT1"));
    }
}
