use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;

use crate::cache::{CacheError, KvStore};

/// `kv_cache`-table backed store shared by the API and worker processes.
#[derive(Clone)]
pub struct PgKvStore {
    pool: PgPool,
}

impl PgKvStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Drops rows whose TTL has elapsed. Reads already ignore them; this only
    /// keeps the table small.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM kv_cache WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl KvStore for PgKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let value: Option<Value> = sqlx::query_scalar(
            "SELECT value FROM kv_cache WHERE key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);

        sqlx::query(
            r#"
            INSERT INTO kv_cache (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
              SET value      = EXCLUDED.value,
                  expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let removed: Option<bool> = sqlx::query_scalar(
            "DELETE FROM kv_cache WHERE key = $1 RETURNING expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(removed.unwrap_or(false))
    }

    async fn delete_if(&self, key: &str, expected: &Value) -> Result<bool, CacheError> {
        let removed = sqlx::query(
            "DELETE FROM kv_cache WHERE key = $1 AND value = $2 AND expires_at > now()",
        )
        .bind(key)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(removed.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        sqlx::query("SELECT 1 FROM kv_cache LIMIT 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn setup_test_db() -> Option<PgPool> {
        // Skip tests if TEST_DATABASE_URL is not set
        let database_url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("Skipping database tests: TEST_DATABASE_URL not set");
                return None;
            }
        };

        let pool = PgPool::connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        Some(pool)
    }

    #[tokio::test]
    async fn test_round_trip_and_expiry() {
        let Some(pool) = setup_test_db().await else {
            return;
        };
        let store = PgKvStore::new(pool);
        let key = format!("test:{}", uuid::Uuid::new_v4());

        store
            .set_ex(&key, json!({"status": "pending"}), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get(&key).await.unwrap(),
            Some(json!({"status": "pending"}))
        );

        store
            .set_ex(&key, json!({"status": "done"}), Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert!(!store.delete(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_compares_value() {
        let Some(pool) = setup_test_db().await else {
            return;
        };
        let store = PgKvStore::new(pool);
        let key = format!("test:{}", uuid::Uuid::new_v4());

        store
            .set_ex(&key, json!("run-b"), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!store.delete_if(&key, &json!("run-a")).await.unwrap());
        assert!(store.delete_if(&key, &json!("run-b")).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), None);
    }
}
