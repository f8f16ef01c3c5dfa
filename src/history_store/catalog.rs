// Catalog of created collections: one row per table, with its kind and retention policy.
// Creating a collection and recording it happen in one transaction.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::naming;
use super::retention::RetentionPolicy;
use crate::error::StoreResult;

pub const CATALOG_TABLE: &str = "__collections";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Raw,
    Aggregated,
    Registry,
}

impl CollectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Raw => "raw",
            CollectionKind::Aggregated => "aggregated",
            CollectionKind::Registry => "registry",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "aggregated" => CollectionKind::Aggregated,
            "registry" => CollectionKind::Registry,
            _ => CollectionKind::Raw,
        }
    }
}

/// Handle to a physical collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub database: String,
    pub name: String,
    pub kind: CollectionKind,
    pub retention: RetentionPolicy,
}

impl Collection {
    pub fn new(
        database: impl Into<String>,
        name: impl Into<String>,
        kind: CollectionKind,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
            kind,
            retention,
        }
    }

    pub fn namespace(&self) -> String {
        naming::namespace(&self.database, &self.name)
    }

    /// Quoted table identifier for this collection.
    pub fn table(&self) -> String {
        quote_ident(&self.namespace())
    }

    /// Quoted identifier for an index on this collection.
    pub fn index(&self, column: &str) -> String {
        quote_ident(&format!("{}${}", self.namespace(), column))
    }
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub async fn init_catalog(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            namespace TEXT PRIMARY KEY,
            database_name TEXT NOT NULL,
            collection_name TEXT NOT NULL,
            kind TEXT NOT NULL,
            capped_size INTEGER NOT NULL DEFAULT 0,
            capped_max INTEGER NOT NULL DEFAULT 0,
            expire_after_secs INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
        CATALOG_TABLE
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_collections_database ON {}(database_name)",
        CATALOG_TABLE
    ))
    .execute(pool)
    .await?;

    Ok(())
}

fn parse_row(row: &SqliteRow) -> StoreResult<Collection> {
    let kind: String = row.try_get("kind")?;
    let capped_size: i64 = row.try_get("capped_size")?;
    let capped_max: i64 = row.try_get("capped_max")?;
    let expire_after_secs: i64 = row.try_get("expire_after_secs")?;
    Ok(Collection {
        database: row.try_get("database_name")?,
        name: row.try_get("collection_name")?,
        kind: CollectionKind::parse(&kind),
        retention: RetentionPolicy::from_columns(capped_size, capped_max, expire_after_secs),
    })
}

pub async fn find(pool: &SqlitePool, namespace: &str) -> StoreResult<Option<Collection>> {
    let row = sqlx::query(&format!(
        "SELECT database_name, collection_name, kind, capped_size, capped_max, expire_after_secs
         FROM {} WHERE namespace = $1",
        CATALOG_TABLE
    ))
    .bind(namespace)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(parse_row).transpose()
}

/// Runs `ddl` and records the collection. Returns true when this call created it.
pub async fn create(
    pool: &SqlitePool,
    collection: &Collection,
    ddl: &[String],
) -> StoreResult<bool> {
    let (capped_size, capped_max, expire_after_secs) = collection.retention.to_columns();
    let mut tx = pool.begin().await?;
    for statement in ddl {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    let result = sqlx::query(&format!(
        "INSERT OR IGNORE INTO {} (namespace, database_name, collection_name, kind, capped_size, capped_max, expire_after_secs, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        CATALOG_TABLE
    ))
    .bind(collection.namespace())
    .bind(&collection.database)
    .bind(&collection.name)
    .bind(collection.kind.as_str())
    .bind(capped_size)
    .bind(capped_max)
    .bind(expire_after_secs)
    .bind(Utc::now().timestamp_millis())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(result.rows_affected() == 1)
}

/// Collections of one database, by name.
pub async fn list(pool: &SqlitePool, database: &str) -> StoreResult<Vec<Collection>> {
    let rows = sqlx::query(&format!(
        "SELECT database_name, collection_name, kind, capped_size, capped_max, expire_after_secs
         FROM {} WHERE database_name = $1 ORDER BY collection_name ASC",
        CATALOG_TABLE
    ))
    .bind(database)
    .fetch_all(pool)
    .await?;
    rows.iter().map(parse_row).collect()
}

/// Collections with a TTL policy, across all databases.
pub async fn list_expiring(pool: &SqlitePool) -> StoreResult<Vec<Collection>> {
    let rows = sqlx::query(&format!(
        "SELECT database_name, collection_name, kind, capped_size, capped_max, expire_after_secs
         FROM {} WHERE expire_after_secs > 0",
        CATALOG_TABLE
    ))
    .fetch_all(pool)
    .await?;
    rows.iter().map(parse_row).collect()
}

pub async fn drop(pool: &SqlitePool, collection: &Collection) -> StoreResult<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", collection.table()))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("DELETE FROM {} WHERE namespace = $1", CATALOG_TABLE))
        .bind(collection.namespace())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
