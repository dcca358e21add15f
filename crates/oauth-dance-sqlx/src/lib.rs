//! # oauth-dance-sqlx
//!
//! A SQLite-backed [`TokenStorage`] for the `oauth-dance` OAuth2
//! consumer. Tokens are stored as JSON, keyed by (provider, principal),
//! so several flows and several users share one table.
//!
//! # Example
//!
//! ```ignore
//! use oauth_dance_sqlx::SqlxStorage;
//! use sqlx::SqlitePool;
//! use std::sync::Arc;
//!
//! let pool = SqlitePool::connect("sqlite:tokens.db").await?;
//! let storage = SqlxStorage::new(pool, "github");
//! storage.migrate().await?;
//!
//! let flow = oauth_dance::OAuth2Flow::builder("github")
//!     // ...
//!     .storage(Arc::new(storage))
//!     .build()?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use async_trait::async_trait;
use oauth_dance::{StorageError, Token, TokenStorage};
use sqlx::{Row, SqlitePool};

const CREATE_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS oauth_tokens (
    provider   TEXT NOT NULL,
    principal  TEXT NOT NULL DEFAULT '',
    token      TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (provider, principal)
)";

/// Token storage over a SQLite connection pool.
///
/// One value serves one flow: rows are scoped to the `provider` name
/// given at construction, which should match the flow name. Concurrent
/// access for distinct principals is safe; the (provider, principal)
/// primary key makes `set` an atomic upsert.
#[derive(Debug, Clone)]
pub struct SqlxStorage {
    pool: SqlitePool,
    provider: String,
}

impl SqlxStorage {
    /// Create a storage backend scoped to `provider`.
    pub fn new(pool: SqlitePool, provider: impl Into<String>) -> Self {
        Self {
            pool,
            provider: provider.into(),
        }
    }

    /// Create the backing table if it does not exist.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}

#[async_trait]
impl TokenStorage for SqlxStorage {
    async fn get(&self, principal: Option<&str>) -> Result<Option<Token>, StorageError> {
        let row = sqlx::query(
            "SELECT token FROM oauth_tokens WHERE provider = ?1 AND principal = ?2",
        )
        .bind(&self.provider)
        .bind(principal.unwrap_or_default())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("token").map_err(backend_error)?;
                let token = serde_json::from_str(&raw)
                    .map_err(|e| StorageError::Backend(format!("stored token is invalid: {e}")))?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, principal: Option<&str>, token: Token) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&token)
            .map_err(|e| StorageError::Backend(format!("token is not serializable: {e}")))?;
        sqlx::query(
            "INSERT INTO oauth_tokens (provider, principal, token) VALUES (?1, ?2, ?3) \
             ON CONFLICT (provider, principal) \
             DO UPDATE SET token = excluded.token, created_at = CURRENT_TIMESTAMP",
        )
        .bind(&self.provider)
        .bind(principal.unwrap_or_default())
        .bind(raw)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;
        tracing::debug!(provider = %self.provider, "token persisted");
        Ok(())
    }

    async fn delete(&self, principal: Option<&str>) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM oauth_tokens WHERE provider = ?1 AND principal = ?2")
            .bind(&self.provider)
            .bind(principal.unwrap_or_default())
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}

fn backend_error(error: sqlx::Error) -> StorageError {
    StorageError::Backend(error.to_string())
}
