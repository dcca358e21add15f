//! Minimal capabilities the flow needs from the hosting web layer.
//!
//! The flow does not depend on any particular web framework. Route
//! dispatch stays with the application: wire `GET {login_path}` to
//! [`OAuth2Flow::login`](crate::OAuth2Flow::login) and
//! `GET {callback_path}` to
//! [`OAuth2Flow::authorized`](crate::OAuth2Flow::authorized), passing an
//! adapter that implements [`WebContext`] over the framework's request
//! and session types.

/// The view of one inbound request/response cycle the flow operates on.
///
/// The session methods must be backed by a per-user store (a signed
/// cookie session or server-side session table) that survives exactly
/// across the authorization redirect round-trip. CSRF state lives there
/// keyed by flow name, so concurrent flows for different providers do
/// not collide.
pub trait WebContext {
    /// A query parameter from the request URL, decoded.
    fn query_param(&self, name: &str) -> Option<String>;

    /// A request header value. Lookup is case-insensitive.
    fn header(&self, name: &str) -> Option<String>;

    /// Whether the connection itself is TLS. Deployments behind a
    /// TLS-terminating proxy also signal via `X-Forwarded-Proto`.
    fn is_secure(&self) -> bool;

    /// The host (authority) the request was addressed to, e.g.
    /// `app.example.com` or `localhost:8000`.
    fn host(&self) -> String;

    /// The full URL of the request as received, including query string.
    fn url(&self) -> String;

    /// Read a value from the user's session.
    fn session_get(&self, key: &str) -> Option<String>;

    /// Write a value into the user's session.
    fn session_set(&mut self, key: &str, value: String);

    /// Remove and return a value from the user's session.
    fn session_remove(&mut self, key: &str) -> Option<String>;

    /// Resolve a named application endpoint to a URL, if the hosting
    /// framework supports named routes.
    fn endpoint_url(&self, endpoint: &str) -> Option<String>;
}

/// An HTTP redirect response produced by the flow operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    location: String,
}

impl Redirect {
    /// Redirect to the given location.
    pub fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    /// The `Location` header value.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The response status code (302 Found).
    pub fn status(&self) -> u16 {
        302
    }
}
