// Retention: the policy chosen when a collection is created, the cap applied after raw
// inserts and the TTL prune run by the retention worker.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::catalog::{Collection, CollectionKind};
use crate::config::TruncationConfig;
use crate::error::StoreResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetentionPolicy {
    #[default]
    None,
    /// Keep the newest documents within `size` bytes and (when non-zero) `max` documents.
    Capped { size: u64, max: u64 },
    /// Documents expire `expire_after_secs` after their time field.
    Ttl { expire_after_secs: u64 },
}

impl RetentionPolicy {
    /// Policy for a collection created with truncation requested. Aggregated
    /// collections are never capped; capped raw collections get no TTL.
    pub fn for_collection(truncation: &TruncationConfig, aggregated: bool) -> Self {
        if !aggregated && truncation.size > 0 {
            RetentionPolicy::Capped {
                size: truncation.size,
                max: truncation.max,
            }
        } else if truncation.expire_after_seconds > 0 {
            RetentionPolicy::Ttl {
                expire_after_secs: truncation.expire_after_seconds,
            }
        } else {
            RetentionPolicy::None
        }
    }

    pub(crate) fn to_columns(self) -> (i64, i64, i64) {
        match self {
            RetentionPolicy::None => (0, 0, 0),
            RetentionPolicy::Capped { size, max } => (size as i64, max as i64, 0),
            RetentionPolicy::Ttl { expire_after_secs } => (0, 0, expire_after_secs as i64),
        }
    }

    pub(crate) fn from_columns(capped_size: i64, capped_max: i64, expire_after_secs: i64) -> Self {
        if capped_size > 0 {
            RetentionPolicy::Capped {
                size: capped_size as u64,
                max: capped_max.max(0) as u64,
            }
        } else if expire_after_secs > 0 {
            RetentionPolicy::Ttl {
                expire_after_secs: expire_after_secs as u64,
            }
        } else {
            RetentionPolicy::None
        }
    }
}

/// Time column TTL applies to.
fn ttl_column(kind: CollectionKind) -> Option<&'static str> {
    match kind {
        CollectionKind::Raw => Some("recv_time"),
        CollectionKind::Aggregated => Some("origin"),
        CollectionKind::Registry => None,
    }
}

/// Drops the oldest raw documents beyond the cap. The newest document is always kept.
pub async fn enforce_cap(pool: &SqlitePool, collection: &Collection) -> StoreResult<u64> {
    let RetentionPolicy::Capped { size, max } = collection.retention else {
        return Ok(0);
    };
    let result = sqlx::query(&format!(
        r#"
        DELETE FROM {table} WHERE id IN (
            SELECT id FROM (
                SELECT id,
                    ROW_NUMBER() OVER (ORDER BY id DESC) AS rn,
                    SUM(doc_size) OVER (ORDER BY id DESC ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) AS running
                FROM {table}
            )
            WHERE rn > 1 AND (($1 > 0 AND rn > $1) OR running > $2)
        )
        "#,
        table = collection.table()
    ))
    .bind(max as i64)
    .bind(size as i64)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Deletes the documents of a TTL collection that expired at `now`.
pub async fn prune_collection(
    pool: &SqlitePool,
    collection: &Collection,
    now: DateTime<Utc>,
) -> StoreResult<u64> {
    let RetentionPolicy::Ttl { expire_after_secs } = collection.retention else {
        return Ok(0);
    };
    let Some(column) = ttl_column(collection.kind) else {
        return Ok(0);
    };
    let cutoff = now.timestamp_millis() - (expire_after_secs as i64) * 1000;
    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE {} < $1",
        collection.table(),
        column
    ))
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
