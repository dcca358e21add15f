//! # oauth-dance
//!
//! A reusable OAuth 2.0 Authorization Code Grant consumer: it drives a
//! user through the redirect dance with a provider, validates the
//! callback, exchanges the authorization code for a token, and keeps
//! that token attached and refreshed on subsequent API calls made on
//! the user's behalf.
//!
//! The crate is framework-agnostic. The hosting application supplies:
//!
//! - route dispatch and a per-user session, through the [`WebContext`]
//!   trait;
//! - token persistence, through the [`TokenStorage`] trait
//!   ([`MemoryStorage`] and [`NullStorage`] ship here, a SQLx backend
//!   lives in `oauth-dance-sqlx`);
//! - outcome handling, through [`FlowListener`] — including the option
//!   to veto persistence of a token that fails application checks.
//!
//! # Example
//!
//! ```ignore
//! use oauth_dance::OAuth2Flow;
//!
//! let flow = OAuth2Flow::builder("github")
//!     .client_id("my-client-id")
//!     .client_secret("my-client-secret")
//!     .scope(["read:user"])
//!     .base_url("https://api.github.com/")
//!     .authorization_url("https://github.com/login/oauth/authorize")
//!     .token_url("https://github.com/login/oauth/access_token")
//!     .build()?;
//!
//! // In the route handlers (ctx adapts the framework's request/session):
//! let redirect = flow.login(&mut ctx)?;                 // GET /github
//! let redirect = flow.authorized(&mut ctx).await?;      // GET /github/authorized
//!
//! // Anywhere else, call the provider's API with the stored token:
//! let me = flow.session().get("user").await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod config;
mod error;
mod events;
mod flow;
mod session;
mod state;
mod storage;
mod token;
mod web;

pub use config::{resolve_url, Credentials, FlowConfig, ProviderEndpoints, RedirectTarget};
pub use error::{
    ConfigError, CsrfError, FlowError, ProviderError, SessionError, StorageError,
    TokenExchangeError, TokenRefreshError,
};
pub use events::{FlowListener, Verdict};
pub use flow::{OAuth2Flow, OAuth2FlowBuilder};
pub use session::{AuthSession, TokenHooks};
pub use state::CsrfState;
pub use storage::{MemoryStorage, NullStorage, TokenStorage};
pub use token::Token;
pub use web::{Redirect, WebContext};

// Re-exported so applications can name the request method type without
// depending on reqwest directly.
pub use reqwest::Method;
