//! OAuth2 token model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A token issued by the authorization server.
///
/// Carries the fields every provider returns (`access_token`,
/// `token_type`), the standard optional fields, and any extra
/// provider-specific fields verbatim. Tokens are replaced wholesale on
/// refresh, never partially mutated.
///
/// Expiry is stored as an absolute Unix timestamp so a persisted token
/// stays meaningful across processes; provider responses carrying a
/// relative `expires_in` are converted at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The access token.
    pub access_token: String,
    /// The token type, usually `Bearer`.
    pub token_type: String,
    /// Refresh token, if the provider issued one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry time as a Unix timestamp in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Scopes granted, if the provider reported them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Vec<String>>,
    /// Any additional fields from the provider response.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Token {
    /// Create a minimal token.
    pub fn new(access_token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Parse a token endpoint response body.
    ///
    /// `access_token` is required; `token_type` defaults to `Bearer`.
    /// A relative `expires_in` becomes an absolute `expires_at`, and a
    /// space-delimited `scope` string becomes a list.
    pub fn from_response(body: Value) -> Result<Self, String> {
        let mut fields = match body {
            Value::Object(map) => map,
            other => return Err(format!("expected JSON object, got {other}")),
        };

        let access_token = match fields.remove("access_token") {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => return Err("missing access_token".to_string()),
        };
        let token_type = match fields.remove("token_type") {
            Some(Value::String(s)) => s,
            _ => "Bearer".to_string(),
        };
        let refresh_token = match fields.remove("refresh_token") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        let expires_at = match fields.remove("expires_in") {
            Some(v) => v.as_u64().map(|secs| unix_now() + secs),
            None => fields.remove("expires_at").and_then(|v| v.as_u64()),
        };
        let scope = match fields.remove("scope") {
            Some(Value::String(s)) => Some(s.split(' ').map(String::from).collect()),
            Some(Value::Array(items)) => Some(
                items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
            ),
            _ => None,
        };

        Ok(Self {
            access_token,
            token_type,
            refresh_token,
            expires_at,
            scope,
            extra: fields,
        })
    }

    /// Whether the token has passed its expiry time.
    ///
    /// A token with no expiry never expires.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => unix_now() >= expires_at,
            None => false,
        }
    }

    /// Time remaining until expiry, if an expiry is set and in the future.
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_at
            .and_then(|exp| exp.checked_sub(unix_now()))
            .map(Duration::from_secs)
    }

    /// The `Authorization` header value for this token.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Keep the previous refresh token when a refresh response omits one.
    ///
    /// Providers commonly return a new access token without re-issuing
    /// the refresh token; the old one remains valid and must be retained.
    pub fn carry_refresh_token(&mut self, previous: &Token) {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.refresh_token.clone();
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
