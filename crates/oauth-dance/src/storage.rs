//! Token persistence contract and in-memory backends.

use crate::error::StorageError;
use crate::token::Token;
use async_trait::async_trait;
use dashmap::DashMap;

/// Persists and retrieves the current token for a principal.
///
/// Implementations must key strictly by principal and be safe for
/// concurrent use by independent principals; the flow performs no
/// locking of its own. `None` is the anonymous principal, used by
/// single-user deployments.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Load the token for a principal, if one is stored.
    async fn get(&self, principal: Option<&str>) -> Result<Option<Token>, StorageError>;

    /// Store the token for a principal, replacing any existing one.
    async fn set(&self, principal: Option<&str>, token: Token) -> Result<(), StorageError>;

    /// Remove the stored token for a principal.
    async fn delete(&self, principal: Option<&str>) -> Result<(), StorageError>;
}

/// Keeps tokens in process memory. Suitable for tests and single-user
/// tools; tokens are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tokens: DashMap<String, Token>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(principal: Option<&str>) -> String {
        principal.unwrap_or_default().to_string()
    }
}

#[async_trait]
impl TokenStorage for MemoryStorage {
    async fn get(&self, principal: Option<&str>) -> Result<Option<Token>, StorageError> {
        Ok(self
            .tokens
            .get(&Self::key(principal))
            .map(|entry| entry.value().clone()))
    }

    async fn set(&self, principal: Option<&str>, token: Token) -> Result<(), StorageError> {
        self.tokens.insert(Self::key(principal), token);
        Ok(())
    }

    async fn delete(&self, principal: Option<&str>) -> Result<(), StorageError> {
        self.tokens.remove(&Self::key(principal));
        Ok(())
    }
}

/// Stores nothing. Every load comes back empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStorage;

#[async_trait]
impl TokenStorage for NullStorage {
    async fn get(&self, _principal: Option<&str>) -> Result<Option<Token>, StorageError> {
        Ok(None)
    }

    async fn set(&self, _principal: Option<&str>, _token: Token) -> Result<(), StorageError> {
        Ok(())
    }

    async fn delete(&self, _principal: Option<&str>) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert!(storage.get(None).await.unwrap().is_none());

        let token = Token::new("abc", "Bearer");
        storage.set(None, token.clone()).await.unwrap();
        assert_eq!(storage.get(None).await.unwrap(), Some(token));

        storage.delete(None).await.unwrap();
        assert!(storage.get(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_storage_keys_by_principal() {
        let storage = MemoryStorage::new();
        storage
            .set(Some("alice"), Token::new("a", "Bearer"))
            .await
            .unwrap();
        storage
            .set(Some("bob"), Token::new("b", "Bearer"))
            .await
            .unwrap();

        let alice = storage.get(Some("alice")).await.unwrap().unwrap();
        let bob = storage.get(Some("bob")).await.unwrap().unwrap();
        assert_eq!(alice.access_token, "a");
        assert_eq!(bob.access_token, "b");
        assert!(storage.get(None).await.unwrap().is_none());

        storage.delete(Some("alice")).await.unwrap();
        assert!(storage.get(Some("alice")).await.unwrap().is_none());
        assert!(storage.get(Some("bob")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_null_storage_stores_nothing() {
        let storage = NullStorage;
        storage.set(None, Token::new("abc", "Bearer")).await.unwrap();
        assert!(storage.get(None).await.unwrap().is_none());
    }
}
