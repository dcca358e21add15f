//! Flow configuration: credentials, provider endpoints, and routing.

use crate::error::ConfigError;
use url::Url;

/// OAuth2 client credentials.
///
/// One `Credentials` value is shared between the flow controller and its
/// [`AuthSession`](crate::AuthSession), so updating `client_id` on the
/// flow is immediately visible to in-flight request construction.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Client ID issued by the provider.
    pub client_id: String,
    /// Client secret issued by the provider, required for code exchange.
    pub client_secret: String,
    /// Scopes to request, in order.
    pub scope: Vec<String>,
}

impl Credentials {
    /// Create credentials with no scopes.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: Vec::new(),
        }
    }

    /// Load credentials from `{PREFIX}_OAUTH_CLIENT_ID` and
    /// `{PREFIX}_OAUTH_CLIENT_SECRET` environment variables.
    ///
    /// The prefix is upper-cased, so a flow named `github` reads
    /// `GITHUB_OAUTH_CLIENT_ID` and `GITHUB_OAUTH_CLIENT_SECRET`.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let id_var = format!("{prefix}_OAUTH_CLIENT_ID");
        let secret_var = format!("{prefix}_OAUTH_CLIENT_SECRET");
        let client_id =
            std::env::var(&id_var).map_err(|_| ConfigError::MissingEnvVar(id_var))?;
        let client_secret =
            std::env::var(&secret_var).map_err(|_| ConfigError::MissingEnvVar(secret_var))?;
        Ok(Self::new(client_id, client_secret))
    }

    /// The scopes joined into the space-delimited form the
    /// authorization request expects, or `None` when no scopes are set.
    pub fn scope_param(&self) -> Option<String> {
        if self.scope.is_empty() {
            None
        } else {
            Some(self.scope.join(" "))
        }
    }
}

/// Where the authorization server lives.
///
/// `authorization_url` and `token_url` may be fully-qualified or paths
/// resolved against `base_url`. Extra per-endpoint query parameters are
/// merged into the respective requests.
#[derive(Debug, Clone, Default)]
pub struct ProviderEndpoints {
    /// Base URL for resolving relative endpoint and API URLs.
    pub base_url: Option<Url>,
    /// Authorization endpoint (full URL or path).
    pub authorization_url: Option<String>,
    /// Token endpoint (full URL or path).
    pub token_url: Option<String>,
    /// Refresh endpoint (full URL or path). Often the token endpoint.
    pub auto_refresh_url: Option<String>,
    /// Extra query parameters for the authorization request.
    pub authorization_url_params: Vec<(String, String)>,
    /// Extra parameters for the token request.
    pub token_url_params: Vec<(String, String)>,
}

impl ProviderEndpoints {
    /// The fully-resolved authorization endpoint.
    pub fn authorization_endpoint(&self) -> Result<Url, ConfigError> {
        let raw = self
            .authorization_url
            .as_deref()
            .ok_or(ConfigError::MissingEndpoint("authorization"))?;
        resolve_url(self.base_url.as_ref(), raw)
    }

    /// The fully-resolved token endpoint.
    pub fn token_endpoint(&self) -> Result<Url, ConfigError> {
        let raw = self
            .token_url
            .as_deref()
            .ok_or(ConfigError::MissingEndpoint("token"))?;
        resolve_url(self.base_url.as_ref(), raw)
    }

    /// The fully-resolved refresh endpoint, if one is configured.
    pub fn refresh_endpoint(&self) -> Result<Option<Url>, ConfigError> {
        match self.auto_refresh_url.as_deref() {
            Some(raw) => resolve_url(self.base_url.as_ref(), raw).map(Some),
            None => Ok(None),
        }
    }
}

/// Resolve `raw` against an optional base URL.
///
/// Absolute URLs pass through unchanged; relative URLs require a base.
pub fn resolve_url(base: Option<&Url>, raw: &str) -> Result<Url, ConfigError> {
    match Url::parse(raw) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(raw).map_err(|source| ConfigError::InvalidUrl {
                url: raw.to_string(),
                source,
            }),
            None => Err(ConfigError::RelativeUrlWithoutBase(raw.to_string())),
        },
        Err(source) => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            source,
        }),
    }
}

/// Post-dance destination for the user's browser.
///
/// At most one of a static URL or a named endpoint can be configured;
/// the enum makes the exclusivity structural. An explicit `next` query
/// parameter on the login request overrides either.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RedirectTarget {
    /// Redirect to a fixed URL.
    Url(String),
    /// Redirect to a named application endpoint, resolved through the
    /// web layer at callback time.
    Endpoint(String),
    /// Redirect to the root path.
    #[default]
    Root,
}

/// Routing configuration for a flow.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Path that begins the dance. Defaults to `/{name}`.
    pub login_path: String,
    /// Path the provider redirects back to. Defaults to `/{name}/authorized`.
    pub callback_path: String,
    /// Where to send the user once the dance completes.
    pub redirect: RedirectTarget,
}

impl FlowConfig {
    /// Default routing derived from the flow name.
    pub fn for_flow(name: &str) -> Self {
        Self {
            login_path: format!("/{name}"),
            callback_path: format!("/{name}/authorized"),
            redirect: RedirectTarget::Root,
        }
    }
}
