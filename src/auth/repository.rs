//! Persistence for API keys.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// One row of `api_keys`. `key_hash` is the SHA-256 of the raw key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    pub account_id: Uuid,
    pub key_hash: String,
    pub prefix: String,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

pub struct ApiKeyRepository;

impl ApiKeyRepository {
    /// Store a key hash for a merchant account.
    pub async fn create(
        pool: &PgPool,
        account_id: Uuid,
        key_hash: &str,
        prefix: &str,
    ) -> Result<ApiKey, sqlx::Error> {
        sqlx::query_as(
            r#"INSERT INTO api_keys (account_id, key_hash, prefix)
               VALUES ($1, $2, $3)
               RETURNING id, account_id, key_hash, prefix, created_at, revoked_at"#,
        )
        .bind(account_id)
        .bind(key_hash)
        .bind(prefix)
        .fetch_one(pool)
        .await
    }

    /// Look up an unrevoked key by its hash.
    pub async fn find_active_by_hash(
        pool: &PgPool,
        key_hash: &str,
    ) -> Result<Option<ApiKey>, sqlx::Error> {
        sqlx::query_as(
            r#"SELECT id, account_id, key_hash, prefix, created_at, revoked_at
               FROM api_keys
               WHERE key_hash = $1 AND revoked_at IS NULL"#,
        )
        .bind(key_hash)
        .fetch_optional(pool)
        .await
    }

    pub async fn revoke(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE api_keys SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{generate_api_key, hash_api_key};
    use crate::config::DatabaseConfig;
    use crate::db::Database;
    use crate::ledger::AccountStore;

    async fn test_db() -> Database {
        let config = DatabaseConfig::default();
        let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| config.url.clone());
        let db = Database::connect(&url, &config)
            .await
            .expect("Failed to connect");
        db.ensure_schema().await.expect("Failed to ensure schema");
        db
    }

    #[tokio::test]
    #[ignore] // Requires PostgreSQL
    async fn test_create_and_find_by_hash() {
        let db = test_db().await;
        let merchant = AccountStore::create(db.pool(), "key_test_merchant", "USD", false)
            .await
            .expect("Should create account");

        let (raw_key, prefix) = generate_api_key();
        let hash = hash_api_key(&raw_key);
        ApiKeyRepository::create(db.pool(), merchant.id, &hash, &prefix)
            .await
            .expect("Should store key");

        let found = ApiKeyRepository::find_active_by_hash(db.pool(), &hash)
            .await
            .expect("Should query")
            .expect("Key should exist");
        assert_eq!(found.account_id, merchant.id);
        assert_eq!(found.prefix, prefix);
    }

    #[tokio::test]
    #[ignore]
    async fn test_revoked_key_not_found() {
        let db = test_db().await;
        let merchant = AccountStore::create(db.pool(), "key_revoke_merchant", "USD", false)
            .await
            .expect("Should create account");

        let (raw_key, prefix) = generate_api_key();
        let hash = hash_api_key(&raw_key);
        let key = ApiKeyRepository::create(db.pool(), merchant.id, &hash, &prefix)
            .await
            .expect("Should store key");

        assert!(ApiKeyRepository::revoke(db.pool(), key.id)
            .await
            .expect("Should revoke"));
        // Second revoke is a no-op.
        assert!(!ApiKeyRepository::revoke(db.pool(), key.id)
            .await
            .expect("Should run"));

        let found = ApiKeyRepository::find_active_by_hash(db.pool(), &hash)
            .await
            .expect("Should query");
        assert!(found.is_none());
    }
}
