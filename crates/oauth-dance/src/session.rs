//! Token-bound HTTP session.

use crate::config::{resolve_url, Credentials};
use crate::error::{
    ProviderError, SessionError, StorageError, TokenExchangeError, TokenRefreshError,
};
use crate::state::CsrfState;
use crate::token::Token;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, Response};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;

/// Token lifecycle hooks injected into an [`AuthSession`] at
/// construction.
///
/// The session never touches token storage directly; it reports token
/// changes through [`on_token_updated`](Self::on_token_updated) and asks
/// for the current token through
/// [`on_token_requested`](Self::on_token_requested). The flow controller
/// supplies an implementation that bridges to its
/// [`TokenStorage`](crate::TokenStorage) under the current principal.
#[async_trait]
pub trait TokenHooks: Send + Sync {
    /// Called after the session replaces its token on a refresh.
    /// Responsible for persistence.
    async fn on_token_updated(&self, token: &Token) -> Result<(), StorageError>;

    /// Called when the session needs a token and none is loaded.
    /// Responsible for retrieval.
    async fn on_token_requested(&self) -> Option<Token>;
}

/// An HTTP client bound to one provider and one set of OAuth2
/// credentials.
///
/// Layered on a plain [`reqwest::Client`]:
///
/// - relative request URLs resolve against the provider base URL;
/// - the stored bearer token is attached to every outbound request;
/// - an expired token is refreshed before the request proceeds, and the
///   refreshed token is pushed through [`TokenHooks::on_token_updated`].
pub struct AuthSession {
    http: Client,
    base_url: Option<Url>,
    refresh_url: Option<Url>,
    credentials: Arc<RwLock<Credentials>>,
    token: RwLock<Option<Token>>,
    hooks: Arc<dyn TokenHooks>,
}

impl AuthSession {
    pub(crate) fn new(
        http: Client,
        base_url: Option<Url>,
        refresh_url: Option<Url>,
        credentials: Arc<RwLock<Credentials>>,
        hooks: Arc<dyn TokenHooks>,
    ) -> Self {
        Self {
            http,
            base_url,
            refresh_url,
            credentials,
            token: RwLock::new(None),
            hooks,
        }
    }

    pub(crate) fn credentials(&self) -> &Arc<RwLock<Credentials>> {
        &self.credentials
    }

    /// Whether a non-empty token is currently loaded.
    pub fn authorized(&self) -> bool {
        read(&self.token)
            .as_ref()
            .is_some_and(|token| !token.access_token.is_empty())
    }

    /// The currently loaded token, if any.
    pub fn token(&self) -> Option<Token> {
        read(&self.token).clone()
    }

    /// Replace the session's token state.
    ///
    /// This is the explicit-load path used by the flow controller after
    /// reading storage; it does not fire
    /// [`TokenHooks::on_token_updated`], which would echo the value
    /// straight back into storage.
    pub fn load_token(&self, token: Option<Token>) {
        *write(&self.token) = token;
    }

    /// Build an authenticated request to `url`.
    ///
    /// Relative URLs resolve against the configured base URL. If the
    /// loaded token is expired, a refresh is performed first; a refresh
    /// failure aborts the request.
    pub async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, SessionError> {
        let url = resolve_url(self.base_url.as_ref(), url)?;
        let token = self.fresh_token().await?;

        let mut request = self.http.request(method, url);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, token.authorization_header());
        }
        Ok(request)
    }

    /// Send an authenticated GET request.
    pub async fn get(&self, url: &str) -> Result<Response, SessionError> {
        Ok(self.request(Method::GET, url).await?.send().await?)
    }

    /// Send an authenticated POST request.
    pub async fn post(&self, url: &str) -> Result<Response, SessionError> {
        Ok(self.request(Method::POST, url).await?.send().await?)
    }

    /// The current token, loaded through the hooks if necessary and
    /// refreshed if expired.
    async fn fresh_token(&self) -> Result<Option<Token>, TokenRefreshError> {
        let mut token = read(&self.token).clone();
        if token.is_none() {
            token = self.hooks.on_token_requested().await;
            if let Some(loaded) = &token {
                *write(&self.token) = Some(loaded.clone());
            }
        }

        match token {
            Some(token) if token.is_expired() => self.refresh(token).await.map(Some),
            other => Ok(other),
        }
    }

    /// Exchange an expired token's refresh token for a new one.
    async fn refresh(&self, expired: Token) -> Result<Token, TokenRefreshError> {
        let refresh_url = self.refresh_url.as_ref().ok_or(TokenRefreshError::Expired)?;
        let refresh_token = expired
            .refresh_token
            .as_deref()
            .ok_or(TokenRefreshError::Expired)?;

        let (client_id, client_secret) = {
            let credentials = read(&self.credentials);
            (
                credentials.client_id.clone(),
                credentials.client_secret.clone(),
            )
        };
        let form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
            ("client_id".to_string(), client_id),
            ("client_secret".to_string(), client_secret),
        ];

        tracing::debug!(url = %refresh_url, "refreshing expired access token");
        let response = self.http.post(refresh_url.clone()).form(&form).send().await?;
        let mut token = match read_token_response(response).await {
            Ok(token) => token,
            Err(ResponseError::Provider(error)) => return Err(TokenRefreshError::Provider(error)),
            Err(ResponseError::Invalid(message)) => {
                return Err(TokenRefreshError::InvalidResponse(message))
            }
            Err(ResponseError::Transport(source)) => return Err(source.into()),
        };
        token.carry_refresh_token(&expired);

        *write(&self.token) = Some(token.clone());
        self.hooks.on_token_updated(&token).await?;
        Ok(token)
    }

    /// Exchange an authorization code for a token, per RFC 6749
    /// sections 4.1.3 and 4.1.4.
    ///
    /// `authorization_response` is the full callback URL the provider
    /// redirected to; the `code` is taken from it and the echoed `state`
    /// is cross-checked against `state`. The obtained token becomes the
    /// session's current token but is not pushed through the update
    /// hook: persisting it is the caller's decision.
    pub(crate) async fn fetch_token(
        &self,
        token_url: &Url,
        authorization_response: &Url,
        state: &CsrfState,
        client_secret: &str,
        extra_params: &[(String, String)],
    ) -> Result<Token, TokenExchangeError> {
        let mut code = None;
        let mut echoed_state = None;
        for (key, value) in authorization_response.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => echoed_state = Some(value.into_owned()),
                _ => {}
            }
        }
        let code = code.ok_or(TokenExchangeError::MissingCode)?;
        match echoed_state {
            Some(echoed) if state.matches(&echoed) => {}
            _ => return Err(TokenExchangeError::StateMismatch),
        }

        // The registered redirect_uri is the callback URL without the
        // parameters the provider appended.
        let mut redirect_uri = authorization_response.clone();
        let retained: Vec<(String, String)> = authorization_response
            .query_pairs()
            .filter(|(key, _)| key != "code" && key != "state")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        redirect_uri.set_query(None);
        if !retained.is_empty() {
            redirect_uri.query_pairs_mut().extend_pairs(retained);
        }

        let client_id = read(&self.credentials).client_id.clone();
        let mut form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code),
            ("redirect_uri".to_string(), redirect_uri.to_string()),
            ("client_id".to_string(), client_id),
            ("client_secret".to_string(), client_secret.to_string()),
        ];
        form.extend(extra_params.iter().cloned());

        tracing::debug!(url = %token_url, "exchanging authorization code for token");
        let response = self.http.post(token_url.clone()).form(&form).send().await?;
        let token = match read_token_response(response).await {
            Ok(token) => token,
            Err(ResponseError::Provider(error)) => return Err(TokenExchangeError::Provider(error)),
            Err(ResponseError::Invalid(message)) => {
                return Err(TokenExchangeError::InvalidResponse(message))
            }
            Err(ResponseError::Transport(source)) => return Err(source.into()),
        };

        *write(&self.token) = Some(token.clone());
        Ok(token)
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("base_url", &self.base_url)
            .field("refresh_url", &self.refresh_url)
            .field("authorized", &self.authorized())
            .finish_non_exhaustive()
    }
}

enum ResponseError {
    Provider(ProviderError),
    Invalid(String),
    Transport(reqwest::Error),
}

/// Interpret a token endpoint response: a token on success, the
/// provider's RFC 6749 section 5.2 error payload on rejection.
async fn read_token_response(response: Response) -> Result<Token, ResponseError> {
    let status = response.status();
    let body = response.text().await.map_err(ResponseError::Transport)?;
    let json: Result<serde_json::Value, _> = serde_json::from_str(&body);

    if !status.is_success() {
        if let Ok(value) = &json {
            if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
                return Err(ResponseError::Provider(ProviderError {
                    error: error.to_string(),
                    error_description: value
                        .get("error_description")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    error_uri: value
                        .get("error_uri")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                }));
            }
        }
        return Err(ResponseError::Invalid(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let value = json.map_err(|e| ResponseError::Invalid(e.to_string()))?;
    Token::from_response(value).map_err(ResponseError::Invalid)
}

/// Lock helpers that recover from poisoning instead of panicking; the
/// guarded values are plain data and stay consistent.
pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
