use deadpool_redis::Pool;
use redis::AsyncCommands;
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Expiry for cached list/detail/stats entries.
pub const ENTRY_TTL_SECS: u64 = 300;
/// Revoked access tokens are kept for the maximum token lifetime.
pub const REVOKED_TOKEN_TTL_SECS: u64 = 3600;
/// One-time verification/reset codes.
pub const CODE_TTL_SECS: u64 = 900;

pub const REVOKED_MARKER: &str = "revoked";

pub fn list_key(entity: &str, page: u64, per_page: u64, sort: &str, dir: &str, filter: &str) -> String {
    format!("{entity}:page={page}:size={per_page}:sort={sort}:{dir}:filter={filter}")
}

pub fn detail_key(entity: &str, id: Uuid) -> String {
    format!("{entity}:{id}")
}

pub fn stats_key(user_id: Uuid, metric: &str) -> String {
    format!("stats:user:{user_id}:{metric}")
}

fn code_key(email: &str) -> String {
    format!("verify:{email}")
}

/// Shared key-value store: read-through cache for list/detail queries, the
/// revoked-access-token ledger, and the one-time-code store.
#[derive(Clone)]
pub struct Cache {
    pool: Pool,
}

impl Cache {
    pub fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let pool = deadpool_redis::Config::from_url(redis_url)
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> AppResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::CacheError(e.to_string()))
    }

    /// Read-through lookup. Any failure here degrades to a cache miss; the
    /// cache is never the source of truth.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = match self.conn().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(error = %err, key, "cache get degraded to miss");
                return None;
            }
        };
        let raw: Option<String> = match conn.get(key).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, key, "cache get degraded to miss");
                return None;
            }
        };
        raw.and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Store a computed result with the standard entry expiry. Best effort.
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, key, "cache serialize failed");
                return;
            }
        };
        if let Err(err) = self.set_ex(key, &raw, ENTRY_TTL_SECS).await {
            tracing::warn!(error = %err, key, "cache put failed");
        }
    }

    /// Drop every key under `<prefix>:*`. A write to an entity clears all of
    /// its cached pages rather than tracking which page a row lands on.
    /// Failures are logged and never fail the mutation that triggered the
    /// invalidation.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        let result = async {
            let mut conn = self.conn().await?;
            let pattern = format!("{prefix}:*");
            let keys: Vec<String> = conn
                .keys(&pattern)
                .await
                .map_err(|e| AppError::CacheError(e.to_string()))?;
            if keys.is_empty() {
                return Ok::<_, AppError>(());
            }
            let _: () = conn
                .del(keys)
                .await
                .map_err(|e| AppError::CacheError(e.to_string()))?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            tracing::warn!(error = %err, prefix, "cache invalidation failed");
        }
    }

    pub async fn invalidate_prefixes(&self, prefixes: &[&str]) {
        for prefix in prefixes {
            self.invalidate_prefix(prefix).await;
        }
    }

    // The revocation ledger and one-time codes are authoritative state, not a
    // cache of the database; their failures propagate.

    pub async fn revoke_token(&self, token: &str) -> AppResult<()> {
        self.set_ex(token, REVOKED_MARKER, REVOKED_TOKEN_TTL_SECS)
            .await
    }

    pub async fn is_token_revoked(&self, token: &str) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let marker: Option<String> = conn
            .get(token)
            .await
            .map_err(|e| AppError::CacheError(e.to_string()))?;
        Ok(marker.as_deref() == Some(REVOKED_MARKER))
    }

    pub async fn put_code(&self, email: &str, code: &str) -> AppResult<()> {
        self.set_ex(&code_key(email), code, CODE_TTL_SECS).await
    }

    pub async fn get_code(&self, email: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get(code_key(email))
            .await
            .map_err(|e| AppError::CacheError(e.to_string()))
    }

    pub async fn delete_code(&self, email: &str) -> AppResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .del(code_key(email))
            .await
            .map_err(|e| AppError::CacheError(e.to_string()))?;
        Ok(())
    }

    pub async fn ttl(&self, key: &str) -> AppResult<i64> {
        let mut conn = self.conn().await?;
        conn.ttl(key)
            .await
            .map_err(|e| AppError::CacheError(e.to_string()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(|e| AppError::CacheError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_key_format() {
        let key = list_key("orders", 1, 20, "created_at", "desc", r#"{"status":"NEW"}"#);
        assert_eq!(
            key,
            r#"orders:page=1:size=20:sort=created_at:desc:filter={"status":"NEW"}"#
        );
    }

    #[test]
    fn detail_key_format() {
        let id = Uuid::nil();
        assert_eq!(
            detail_key("order", id),
            "order:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn stats_key_format() {
        let id = Uuid::nil();
        assert_eq!(
            stats_key(id, "income"),
            "stats:user:00000000-0000-0000-0000-000000000000:income"
        );
    }
}
