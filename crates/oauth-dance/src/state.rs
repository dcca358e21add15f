//! Anti-forgery state for the authorization redirect.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use std::fmt;

/// An opaque anti-forgery value bound to one authorization attempt.
///
/// Generated at `login` time, stored server-side under a key namespaced
/// by the flow name, and consumed exactly once by the `authorized`
/// callback. A state value that is absent or reused fails validation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CsrfState(String);

impl CsrfState {
    /// Generate a fresh state from 32 bytes of OS randomness.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wrap an existing state value, e.g. one read back from a session.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The state value as sent in the authorization request.
    pub fn secret(&self) -> &str {
        &self.0
    }

    /// Compare against a value echoed back by the provider.
    pub fn matches(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl fmt::Debug for CsrfState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CsrfState").field(&"***").finish()
    }
}

impl fmt::Display for CsrfState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_states_are_unique() {
        let a = CsrfState::generate();
        let b = CsrfState::generate();
        assert_ne!(a, b);
        assert!(!a.secret().is_empty());
    }

    #[test]
    fn test_matches() {
        let state = CsrfState::generate();
        assert!(state.matches(state.secret()));
        assert!(!state.matches("forged"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let state = CsrfState::generate();
        let debug = format!("{:?}", state);
        assert!(!debug.contains(state.secret()));
    }
}
