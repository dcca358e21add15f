//! The authorization flow controller.

use crate::config::{Credentials, FlowConfig, ProviderEndpoints, RedirectTarget};
use crate::error::{ConfigError, CsrfError, FlowError, ProviderError, StorageError};
use crate::events::{FlowListener, Listeners};
use crate::session::{read, write, AuthSession, TokenHooks};
use crate::state::CsrfState;
use crate::storage::{MemoryStorage, TokenStorage};
use crate::token::Token;
use crate::web::{Redirect, WebContext};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use url::Url;

/// Drives the OAuth2 Authorization Code Grant for one provider.
///
/// The flow owns the credentials, provider endpoints, and CSRF state
/// lifecycle; it persists tokens through a pluggable
/// [`TokenStorage`] and notifies [`FlowListener`]s of outcomes. It holds
/// no per-attempt state of its own: authorization status is simply
/// whether storage currently holds a token for the principal.
///
/// # Example
///
/// ```ignore
/// use oauth_dance::OAuth2Flow;
///
/// let flow = OAuth2Flow::builder("github")
///     .client_id("my-client-id")
///     .client_secret("my-client-secret")
///     .scope(["read:user"])
///     .base_url("https://api.github.com/")
///     .authorization_url("https://github.com/login/oauth/authorize")
///     .token_url("https://github.com/login/oauth/access_token")
///     .build()?;
///
/// // GET /github          -> flow.login(&mut ctx)
/// // GET /github/authorized -> flow.authorized(&mut ctx).await
/// // API calls            -> flow.session().get("user").await
/// # Ok::<(), oauth_dance::ConfigError>(())
/// ```
pub struct OAuth2Flow {
    name: String,
    credentials: Arc<RwLock<Credentials>>,
    endpoints: ProviderEndpoints,
    config: FlowConfig,
    session: AuthSession,
    storage: Arc<dyn TokenStorage>,
    listeners: Listeners,
    principal: Arc<RwLock<Option<String>>>,
}

impl OAuth2Flow {
    /// Start building a flow named `name`.
    ///
    /// The name namespaces the default routes (`/{name}`,
    /// `/{name}/authorized`) and the CSRF state key, so flows for
    /// different providers can coexist in one application.
    pub fn builder(name: impl Into<String>) -> OAuth2FlowBuilder {
        OAuth2FlowBuilder::new(name)
    }

    /// The flow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path that begins the dance; wire it to [`login`](Self::login).
    pub fn login_path(&self) -> &str {
        &self.config.login_path
    }

    /// Path the provider redirects back to; wire it to
    /// [`authorized`](Self::authorized).
    pub fn callback_path(&self) -> &str {
        &self.config.callback_path
    }

    /// The token-bound HTTP session for API calls on the user's behalf.
    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// The current client ID.
    pub fn client_id(&self) -> String {
        read(&self.credentials).client_id.clone()
    }

    /// Update the client ID.
    ///
    /// The credentials are shared with the session, so requests built
    /// after this call use the new value.
    pub fn set_client_id(&self, client_id: impl Into<String>) {
        write(&self.credentials).client_id = client_id.into();
    }

    /// Set the principal whose token this flow reads and writes.
    pub fn set_principal(&self, principal: Option<String>) {
        *write(&self.principal) = principal;
    }

    /// The current principal, if one is set.
    pub fn principal(&self) -> Option<String> {
        read(&self.principal).clone()
    }

    fn state_key(&self) -> String {
        format!("{}_oauth_state", self.name)
    }

    /// Begin the dance: store fresh CSRF state and redirect the user to
    /// the provider's authorization endpoint, per RFC 6749 section
    /// 4.1.1.
    ///
    /// An optional `next` query parameter on the inbound request is
    /// carried through the redirect round-trip and overrides the
    /// configured post-dance destination.
    pub fn login(&self, ctx: &mut dyn WebContext) -> Result<Redirect, FlowError> {
        // Services commonly sit behind a TLS-terminating proxy, so the
        // forwarded protocol counts as much as the connection itself.
        let secure = ctx.is_secure()
            || ctx.header("x-forwarded-proto").as_deref() == Some("https");
        let scheme = if secure { "https" } else { "http" };

        let callback = format!("{scheme}://{}{}", ctx.host(), self.config.callback_path);
        let mut callback = Url::parse(&callback).map_err(|source| ConfigError::InvalidUrl {
            url: callback.clone(),
            source,
        })?;
        if let Some(next) = ctx.query_param("next") {
            callback.query_pairs_mut().append_pair("next", &next);
        }

        let state = CsrfState::generate();
        ctx.session_set(&self.state_key(), state.secret().to_string());

        let mut authorization_url = self.endpoints.authorization_endpoint()?;
        {
            let credentials = read(&self.credentials);
            let mut query = authorization_url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &credentials.client_id);
            query.append_pair("redirect_uri", callback.as_str());
            if let Some(scope) = credentials.scope_param() {
                query.append_pair("scope", &scope);
            }
            query.append_pair("state", state.secret());
            for (key, value) in &self.endpoints.authorization_url_params {
                query.append_pair(key, value);
            }
        }

        tracing::debug!(flow = %self.name, "redirecting to authorization endpoint");
        Ok(Redirect::to(String::from(authorization_url)))
    }

    /// Complete the dance when the provider redirects back.
    ///
    /// Validates the CSRF state (consumed exactly once), exchanges the
    /// authorization code for a token, runs the granted-token listeners,
    /// and persists the token unless a listener vetoed it. A
    /// provider-reported `error` parameter skips the exchange entirely
    /// and is reported through the error event. All outcomes except
    /// exchange and validation failures end in a redirect to the
    /// resolved next URL.
    pub async fn authorized(&self, ctx: &mut dyn WebContext) -> Result<Redirect, FlowError> {
        // Resolved up front so the error branch still lands somewhere sane.
        let next_url = self.next_url(ctx);

        if let Some(error) = ctx.query_param("error") {
            let error = ProviderError {
                error,
                error_description: ctx.query_param("error_description"),
                error_uri: ctx.query_param("error_uri"),
            };
            tracing::warn!(
                flow = %self.name,
                error = %error.error,
                description = ?error.error_description,
                uri = ?error.error_uri,
                "authorization error reported by provider",
            );
            self.listeners.authorization_error(&self.name, &error).await;
            return Ok(Redirect::to(next_url));
        }

        // The stored state is valid for exactly one callback: take it
        // out of the session before comparing, and fail closed when it
        // is absent.
        let stored = ctx
            .session_remove(&self.state_key())
            .ok_or(CsrfError::MissingState)?;
        let state = CsrfState::new(stored);
        match ctx.query_param("state") {
            Some(echoed) if state.matches(&echoed) => {}
            _ => return Err(CsrfError::StateMismatch.into()),
        }

        let raw_url = ctx.url();
        let mut authorization_response =
            Url::parse(&raw_url).map_err(|source| ConfigError::InvalidUrl {
                url: raw_url,
                source,
            })?;
        // Mirror the scheme normalization from `login`, or the
        // reconstructed URL will not match the registered redirect_uri.
        if ctx.header("x-forwarded-proto").as_deref() == Some("https") {
            let _ = authorization_response.set_scheme("https");
        }

        let token_url = self.endpoints.token_endpoint()?;
        let client_secret = read(&self.credentials).client_secret.clone();
        let token = self
            .session
            .fetch_token(
                &token_url,
                &authorization_response,
                &state,
                &client_secret,
                &self.endpoints.token_url_params,
            )
            .await?;

        let verdicts = self.listeners.authorization_granted(&self.name, &token).await;
        if verdicts.iter().any(|verdict| verdict.is_veto()) {
            tracing::debug!(flow = %self.name, "granted token vetoed by listener, not persisting");
        } else {
            self.set_token(token).await?;
        }

        Ok(Redirect::to(next_url))
    }

    /// Resolve the post-dance destination. Precedence is strict:
    /// `next` parameter, then static URL, then named endpoint, then `/`.
    fn next_url(&self, ctx: &dyn WebContext) -> String {
        if let Some(next) = ctx.query_param("next") {
            return next;
        }
        match &self.config.redirect {
            RedirectTarget::Url(url) => url.clone(),
            RedirectTarget::Endpoint(endpoint) => match ctx.endpoint_url(endpoint) {
                Some(url) => url,
                None => {
                    tracing::warn!(
                        flow = %self.name,
                        endpoint,
                        "redirect endpoint did not resolve, falling back to /",
                    );
                    "/".to_string()
                }
            },
            RedirectTarget::Root => "/".to_string(),
        }
    }

    /// Load the principal's token from storage into the session, so
    /// in-flight requests use it immediately.
    pub async fn load_token(&self) -> Result<Option<Token>, StorageError> {
        let principal = self.principal();
        let token = self.storage.get(principal.as_deref()).await?;
        self.session.load_token(token.clone());
        Ok(token)
    }

    /// Write a token through to storage for the current principal and
    /// make it the session's current token.
    pub async fn set_token(&self, token: Token) -> Result<(), StorageError> {
        let principal = self.principal();
        self.storage.set(principal.as_deref(), token.clone()).await?;
        self.session.load_token(Some(token));
        Ok(())
    }

    /// The principal's stored token, if any.
    pub async fn token(&self) -> Result<Option<Token>, StorageError> {
        let principal = self.principal();
        self.storage.get(principal.as_deref()).await
    }

    /// Remove the principal's token from storage and the session.
    pub async fn delete_token(&self) -> Result<(), StorageError> {
        let principal = self.principal();
        self.storage.delete(principal.as_deref()).await?;
        self.session.load_token(None);
        Ok(())
    }
}

impl std::fmt::Debug for OAuth2Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Flow")
            .field("name", &self.name)
            .field("endpoints", &self.endpoints)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Bridges the session's token hooks to the flow's storage, keyed by
/// the flow's current principal.
struct StorageHooks {
    storage: Arc<dyn TokenStorage>,
    principal: Arc<RwLock<Option<String>>>,
}

#[async_trait]
impl TokenHooks for StorageHooks {
    async fn on_token_updated(&self, token: &Token) -> Result<(), StorageError> {
        let principal = read(&self.principal).clone();
        self.storage.set(principal.as_deref(), token.clone()).await
    }

    async fn on_token_requested(&self) -> Option<Token> {
        let principal = read(&self.principal).clone();
        match self.storage.get(principal.as_deref()).await {
            Ok(token) => token,
            Err(error) => {
                tracing::warn!(%error, "token storage lookup failed");
                None
            }
        }
    }
}

/// Builder for [`OAuth2Flow`].
///
/// Credential and endpoint validation happens in
/// [`build`](Self::build), which fails with a [`ConfigError`] on
/// missing credentials or malformed URLs.
pub struct OAuth2FlowBuilder {
    name: String,
    credentials: Credentials,
    base_url: Option<String>,
    authorization_url: Option<String>,
    token_url: Option<String>,
    auto_refresh_url: Option<String>,
    authorization_url_params: Vec<(String, String)>,
    token_url_params: Vec<(String, String)>,
    config: FlowConfig,
    storage: Option<Arc<dyn TokenStorage>>,
    listeners: Listeners,
    http: Option<reqwest::Client>,
}

impl OAuth2FlowBuilder {
    fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let config = FlowConfig::for_flow(&name);
        Self {
            name,
            credentials: Credentials::new("", ""),
            base_url: None,
            authorization_url: None,
            token_url: None,
            auto_refresh_url: None,
            authorization_url_params: Vec::new(),
            token_url_params: Vec::new(),
            config,
            storage: None,
            listeners: Listeners::default(),
            http: None,
        }
    }

    /// Set the OAuth2 client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.credentials.client_id = client_id.into();
        self
    }

    /// Set the OAuth2 client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.credentials.client_secret = client_secret.into();
        self
    }

    /// Replace the credentials wholesale, e.g. with
    /// [`Credentials::from_env`].
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the scopes to request, in order.
    pub fn scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.credentials.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    /// Set the provider base URL, used to resolve relative endpoint and
    /// API URLs.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the authorization endpoint (full URL or path).
    pub fn authorization_url(mut self, url: impl Into<String>) -> Self {
        self.authorization_url = Some(url.into());
        self
    }

    /// Set the token endpoint (full URL or path).
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    /// Set the endpoint used for automatic token refresh. Providers
    /// usually refresh at the token endpoint.
    pub fn auto_refresh_url(mut self, url: impl Into<String>) -> Self {
        self.auto_refresh_url = Some(url.into());
        self
    }

    /// Add an extra query parameter to the authorization request.
    pub fn authorization_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.authorization_url_params
            .push((key.into(), value.into()));
        self
    }

    /// Add an extra parameter to the token request.
    pub fn token_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.token_url_params.push((key.into(), value.into()));
        self
    }

    /// Override the login path (default `/{name}`).
    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.config.login_path = path.into();
        self
    }

    /// Override the callback path (default `/{name}/authorized`).
    pub fn callback_path(mut self, path: impl Into<String>) -> Self {
        self.config.callback_path = path.into();
        self
    }

    /// Redirect to a fixed URL when the dance completes. Mutually
    /// exclusive with [`redirect_endpoint`](Self::redirect_endpoint);
    /// the last one set wins.
    pub fn redirect_url(mut self, url: impl Into<String>) -> Self {
        self.config.redirect = RedirectTarget::Url(url.into());
        self
    }

    /// Redirect to a named application endpoint when the dance
    /// completes. Mutually exclusive with
    /// [`redirect_url`](Self::redirect_url); the last one set wins.
    pub fn redirect_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.redirect = RedirectTarget::Endpoint(endpoint.into());
        self
    }

    /// Use the given storage backend. Defaults to [`MemoryStorage`].
    pub fn storage(mut self, storage: Arc<dyn TokenStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Register a listener for authorization outcomes.
    pub fn listener(mut self, listener: Arc<dyn FlowListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Use the given HTTP client instead of a default one.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Validate the configuration and build the flow.
    pub fn build(self) -> Result<OAuth2Flow, ConfigError> {
        if self.credentials.client_id.is_empty() {
            return Err(ConfigError::MissingClientId);
        }
        if self.credentials.client_secret.is_empty() {
            return Err(ConfigError::MissingClientSecret);
        }

        let base_url = match self.base_url {
            Some(raw) => Some(Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl {
                url: raw,
                source,
            })?),
            None => None,
        };

        let endpoints = ProviderEndpoints {
            base_url,
            authorization_url: self.authorization_url,
            token_url: self.token_url,
            auto_refresh_url: self.auto_refresh_url,
            authorization_url_params: self.authorization_url_params,
            token_url_params: self.token_url_params,
        };
        // Fail at setup, not mid-dance.
        endpoints.authorization_endpoint()?;
        endpoints.token_endpoint()?;
        let refresh_url = endpoints.refresh_endpoint()?;

        let credentials = Arc::new(RwLock::new(self.credentials));
        let principal: Arc<RwLock<Option<String>>> = Arc::new(RwLock::new(None));
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let hooks = Arc::new(StorageHooks {
            storage: Arc::clone(&storage),
            principal: Arc::clone(&principal),
        });
        let http = self.http.unwrap_or_default();

        let session = AuthSession::new(
            http,
            endpoints.base_url.clone(),
            refresh_url,
            Arc::clone(&credentials),
            hooks,
        );

        Ok(OAuth2Flow {
            name: self.name,
            credentials,
            endpoints,
            config: self.config,
            session,
            storage,
            listeners: self.listeners,
            principal,
        })
    }
}
