//! Fan-out notification of authorization outcomes.

use crate::error::ProviderError;
use crate::token::Token;
use async_trait::async_trait;
use std::sync::Arc;

/// A listener's decision about a freshly granted token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Allow the token to be persisted.
    Approve,
    /// Withhold persistence. Not a failure: the flow still completes
    /// with a redirect, but the token is discarded.
    Veto,
}

impl Verdict {
    /// Whether this verdict is a veto.
    pub fn is_veto(self) -> bool {
        matches!(self, Verdict::Veto)
    }
}

/// Application hooks into the authorization flow.
///
/// Both methods have default implementations, so listeners implement
/// only what they care about. A listener that does not override
/// [`authorization_granted`](Self::authorization_granted) approves: only
/// a deliberate [`Verdict::Veto`] withholds persistence.
#[async_trait]
pub trait FlowListener: Send + Sync {
    /// Called with the token obtained from a successful exchange,
    /// before it is persisted. Returning [`Verdict::Veto`] prevents
    /// persistence, e.g. when a required scope is missing.
    async fn authorization_granted(&self, flow: &str, token: &Token) -> Verdict {
        let _ = (flow, token);
        Verdict::Approve
    }

    /// Called when the provider reports an error on the callback.
    async fn authorization_error(&self, flow: &str, error: &ProviderError) {
        let _ = (flow, error);
    }
}

/// Registered listeners for one flow.
#[derive(Default, Clone)]
pub(crate) struct Listeners {
    listeners: Vec<Arc<dyn FlowListener>>,
}

impl Listeners {
    pub(crate) fn push(&mut self, listener: Arc<dyn FlowListener>) {
        self.listeners.push(listener);
    }

    /// Notify all listeners of a granted token, collecting verdicts.
    pub(crate) async fn authorization_granted(&self, flow: &str, token: &Token) -> Vec<Verdict> {
        let mut verdicts = Vec::with_capacity(self.listeners.len());
        for listener in &self.listeners {
            verdicts.push(listener.authorization_granted(flow, token).await);
        }
        verdicts
    }

    /// Notify all listeners of a provider-reported error.
    pub(crate) async fn authorization_error(&self, flow: &str, error: &ProviderError) {
        for listener in &self.listeners {
            listener.authorization_error(flow, error).await;
        }
    }
}
