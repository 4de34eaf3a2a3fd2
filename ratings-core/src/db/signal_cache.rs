//! Provider-response cache (§4.3, §6): avoids re-fetching a signal
//! that was already pulled within `freshness_days`.

use chrono::{DateTime, Duration, Utc};
use ratings_common::Result;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{Row, SqlitePool};

pub async fn get<T: DeserializeOwned>(pool: &SqlitePool, cache_key: &str, now: DateTime<Utc>) -> Result<Option<T>> {
    let row = sqlx::query("SELECT payload, expires_at FROM signal_cache WHERE cache_key = ?")
        .bind(cache_key)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else { return Ok(None) };
    let expires_at: DateTime<Utc> = row.get("expires_at");
    if expires_at <= now {
        return Ok(None);
    }

    let payload: String = row.get("payload");
    Ok(serde_json::from_str(&payload).ok())
}

pub async fn put<T: Serialize>(
    pool: &SqlitePool,
    cache_key: &str,
    value: &T,
    now: DateTime<Utc>,
    freshness_days: i64,
) -> Result<()> {
    let payload = serde_json::to_string(value)
        .map_err(|e| ratings_common::Error::Internal(format!("signal cache serialize: {e}")))?;
    let expires_at = now + Duration::days(freshness_days);

    sqlx::query(
        r#"
        INSERT INTO signal_cache (cache_key, payload, fetched_at, expires_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(cache_key) DO UPDATE SET
            payload = excluded.payload,
            fetched_at = excluded.fetched_at,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(cache_key)
    .bind(payload)
    .bind(now)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        value: u32,
    }

    async fn setup() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn put_then_get_round_trips_within_ttl() {
        let pool = setup().await;
        let now = Utc::now();
        put(&pool, "k1", &Payload { value: 42 }, now, 7).await.unwrap();
        let got: Option<Payload> = get(&pool, "k1", now + Duration::days(1)).await.unwrap();
        assert_eq!(got, Some(Payload { value: 42 }));
    }

    #[tokio::test]
    async fn get_after_expiry_is_none() {
        let pool = setup().await;
        let now = Utc::now();
        put(&pool, "k1", &Payload { value: 42 }, now, 7).await.unwrap();
        let got: Option<Payload> = get(&pool, "k1", now + Duration::days(8)).await.unwrap();
        assert_eq!(got, None);
    }
}
