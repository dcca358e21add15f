//! Error types for the OAuth2 consumer.

use thiserror::Error;

/// Errors raised while building or validating flow configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A URL could not be parsed.
    #[error("invalid URL `{url}`: {source}")]
    InvalidUrl {
        /// The offending URL string.
        url: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// A relative URL was given without a base URL to resolve it against.
    #[error("relative URL `{0}` requires a base_url")]
    RelativeUrlWithoutBase(String),

    /// The client ID is missing or empty.
    #[error("missing client_id")]
    MissingClientId,

    /// The client secret is missing or empty.
    #[error("missing client_secret")]
    MissingClientSecret,

    /// A required provider endpoint was not configured.
    #[error("missing {0} URL")]
    MissingEndpoint(&'static str),

    /// A required environment variable was not set.
    #[error("missing environment variable `{0}`")]
    MissingEnvVar(String),
}

/// CSRF state validation failures during the `authorized` callback.
#[derive(Debug, Error)]
pub enum CsrfError {
    /// No stored state exists for this flow. The callback is forged,
    /// replayed, or arrived without a preceding `login`.
    #[error("no stored CSRF state for this flow")]
    MissingState,

    /// The callback's `state` parameter does not match the stored value.
    #[error("CSRF state mismatch")]
    StateMismatch,
}

/// An error reported by the authorization server on the callback,
/// per RFC 6749 section 4.1.2.1.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider authorization error: {error}")]
pub struct ProviderError {
    /// The `error` code from the provider.
    pub error: String,
    /// Optional human-readable description.
    pub error_description: Option<String>,
    /// Optional URI with more information.
    pub error_uri: Option<String>,
}

/// Errors raised while exchanging an authorization code for a token.
#[derive(Debug, Error)]
pub enum TokenExchangeError {
    /// The HTTP request to the token endpoint failed.
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider rejected the exchange.
    #[error("provider rejected token exchange: {0}")]
    Provider(ProviderError),

    /// The authorization response carried no `code` parameter.
    #[error("authorization response has no code parameter")]
    MissingCode,

    /// The state echoed in the authorization response does not match
    /// the expected value.
    #[error("authorization response state mismatch")]
    StateMismatch,

    /// The token endpoint returned a body we could not interpret.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

/// Errors raised while refreshing an access token.
#[derive(Debug, Error)]
pub enum TokenRefreshError {
    /// The HTTP request to the refresh endpoint failed.
    #[error("refresh request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider rejected the refresh.
    #[error("provider rejected token refresh: {0}")]
    Provider(ProviderError),

    /// The token is expired and no refresh token or refresh endpoint
    /// is available.
    #[error("token expired and refresh is not configured")]
    Expired,

    /// The refresh endpoint returned a body we could not interpret.
    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    /// Persisting the refreshed token failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised by a token storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend failed to load or persist a token.
    #[error("token storage error: {0}")]
    Backend(String),
}

/// Errors raised by [`AuthSession`](crate::AuthSession) when sending
/// API requests.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request URL was relative and no base URL is configured, or
    /// it could not be parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The underlying HTTP request failed.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The token needed refreshing and the refresh failed; the original
    /// request was not attempted.
    #[error(transparent)]
    Refresh(#[from] TokenRefreshError),
}

/// Umbrella error for the `login` and `authorized` flow operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Flow or endpoint configuration is invalid.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// CSRF state validation failed; no token exchange was attempted.
    #[error(transparent)]
    Csrf(#[from] CsrfError),

    /// The code-for-token exchange failed.
    #[error(transparent)]
    TokenExchange(#[from] TokenExchangeError),

    /// Token persistence failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
