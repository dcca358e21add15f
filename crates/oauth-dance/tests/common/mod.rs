//! Shared test harness: a fake web layer, a recording listener, and a
//! call-counting storage wrapper.

#![allow(dead_code)]

use async_trait::async_trait;
use oauth_dance::{
    FlowListener, MemoryStorage, ProviderError, StorageError, Token, TokenStorage, Verdict,
    WebContext,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

/// An in-memory stand-in for the hosting framework's request, session,
/// and route table.
pub struct FakeContext {
    url: Url,
    headers: HashMap<String, String>,
    secure: bool,
    pub session: HashMap<String, String>,
    endpoints: HashMap<String, String>,
}

impl FakeContext {
    pub fn get(url: &str) -> Self {
        Self {
            url: Url::parse(url).expect("test URL must parse"),
            headers: HashMap::new(),
            secure: false,
            session: HashMap::new(),
            endpoints: HashMap::new(),
        }
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn with_endpoint(mut self, name: &str, url: &str) -> Self {
        self.endpoints.insert(name.to_string(), url.to_string());
        self
    }

    pub fn with_session(mut self, session: HashMap<String, String>) -> Self {
        self.session = session;
        self
    }
}

impl WebContext for FakeContext {
    fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers.get(&name.to_lowercase()).cloned()
    }

    fn is_secure(&self) -> bool {
        self.secure
    }

    fn host(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn url(&self) -> String {
        self.url.to_string()
    }

    fn session_get(&self, key: &str) -> Option<String> {
        self.session.get(key).cloned()
    }

    fn session_set(&mut self, key: &str, value: String) {
        self.session.insert(key.to_string(), value);
    }

    fn session_remove(&mut self, key: &str) -> Option<String> {
        self.session.remove(key)
    }

    fn endpoint_url(&self, endpoint: &str) -> Option<String> {
        self.endpoints.get(endpoint).cloned()
    }
}

/// Records every event it sees and answers granted-token events with a
/// fixed verdict.
pub struct RecordingListener {
    verdict: Verdict,
    pub granted: Mutex<Vec<Token>>,
    pub errors: Mutex<Vec<ProviderError>>,
}

impl RecordingListener {
    pub fn approving() -> Arc<Self> {
        Arc::new(Self {
            verdict: Verdict::Approve,
            granted: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        })
    }

    pub fn vetoing() -> Arc<Self> {
        Arc::new(Self {
            verdict: Verdict::Veto,
            granted: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl FlowListener for RecordingListener {
    async fn authorization_granted(&self, _flow: &str, token: &Token) -> Verdict {
        self.granted.lock().unwrap().push(token.clone());
        self.verdict
    }

    async fn authorization_error(&self, _flow: &str, error: &ProviderError) {
        self.errors.lock().unwrap().push(error.clone());
    }
}

/// Counts `set` calls while delegating to an in-memory store.
#[derive(Default)]
pub struct CountingStorage {
    inner: MemoryStorage,
    pub sets: AtomicUsize,
}

impl CountingStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStorage for CountingStorage {
    async fn get(&self, principal: Option<&str>) -> Result<Option<Token>, StorageError> {
        self.inner.get(principal).await
    }

    async fn set(&self, principal: Option<&str>, token: Token) -> Result<(), StorageError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(principal, token).await
    }

    async fn delete(&self, principal: Option<&str>) -> Result<(), StorageError> {
        self.inner.delete(principal).await
    }
}
