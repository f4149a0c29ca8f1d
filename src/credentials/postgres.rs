//! PostgreSQL credential repository.
//!
//! Queries are runtime-checked so builds do not need a live database.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::str::FromStr;

use super::repository::{CredentialRepository, StoreError, StoreResult};
use crate::config::DatabaseConfig;
use crate::identity::Identity;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    user_id UUID NOT NULL,
    app_id UUID NOT NULL,
    password_hash TEXT NOT NULL,
    PRIMARY KEY (user_id, app_id)
)
"#;

fn db_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
        _ => StoreError::Backend(e.to_string()),
    }
}

/// Credential repository backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgCredentialRepository {
    pool: PgPool,
}

impl PgCredentialRepository {
    /// Wrap an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the SSL mode is unknown or the
    /// database is unreachable.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let ssl_mode = PgSslMode::from_str(&config.sslmode)
            .map_err(|e| StoreError::Backend(format!("sslmode: {e}")))?;
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.dbname)
            .ssl_mode(ssl_mode);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(db_err)?;
        Ok(Self::new(pool))
    }

    /// Create the credentials table if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on DDL failure.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialRepository for PgCredentialRepository {
    async fn insert(&self, identity: &Identity, password_hash: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO credentials (user_id, app_id, password_hash) VALUES ($1, $2, $3)")
            .bind(identity.user_id)
            .bind(identity.app_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_hash(&self, identity: &Identity) -> StoreResult<Option<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT password_hash FROM credentials WHERE user_id = $1 AND app_id = $2",
        )
        .bind(identity.user_id)
        .bind(identity.app_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn update_hash(&self, identity: &Identity, password_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE credentials SET password_hash = $3 WHERE user_id = $1 AND app_id = $2",
        )
        .bind(identity.user_id)
        .bind(identity.app_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, identity: &Identity) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE user_id = $1 AND app_id = $2")
            .bind(identity.user_id)
            .bind(identity.app_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM credentials")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
