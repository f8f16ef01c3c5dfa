// Hash registry: maps hashed collection names back to the identity they encode.
// One registry collection per database, created on first use.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::warn;

use super::catalog::Collection;
use crate::error::{StoreError, StoreResult};
use crate::models::{CollectionNameEntry, DataModel, IdentityFields, RemovalScope};

pub fn registry_ddl(collection: &Collection) -> Vec<String> {
    vec![format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            hash TEXT PRIMARY KEY,
            data_model TEXT NOT NULL,
            is_aggregated INTEGER NOT NULL,
            service TEXT NOT NULL,
            service_path TEXT NOT NULL,
            entity_id TEXT,
            entity_type TEXT,
            attr_name TEXT
        )
        "#,
        collection.table()
    )]
}

fn parse_row(row: &SqliteRow) -> StoreResult<CollectionNameEntry> {
    let data_model: String = row.try_get("data_model")?;
    let data_model = data_model
        .parse::<DataModel>()
        .map_err(|e| StoreError::Database(sqlx::Error::Decode(e.into())))?;
    Ok(CollectionNameEntry {
        hash: row.try_get("hash")?,
        data_model,
        is_aggregated: row.try_get("is_aggregated")?,
        service: row.try_get("service")?,
        service_path: row.try_get("service_path")?,
        identity: IdentityFields {
            entity_id: row.try_get("entity_id")?,
            entity_type: row.try_get("entity_type")?,
            attr_name: row.try_get("attr_name")?,
        },
    })
}

pub async fn lookup(
    pool: &SqlitePool,
    registry: &Collection,
    hash: &str,
) -> StoreResult<Option<CollectionNameEntry>> {
    let row = sqlx::query(&format!(
        "SELECT hash, data_model, is_aggregated, service, service_path, entity_id, entity_type, attr_name
         FROM {} WHERE hash = $1",
        registry.table()
    ))
    .bind(hash)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(parse_row).transpose()
}

/// Stores `entry`. An entry already present for the same identity is accepted; one for
/// a different identity is a hash collision.
pub async fn register(
    pool: &SqlitePool,
    registry: &Collection,
    entry: &CollectionNameEntry,
) -> StoreResult<()> {
    let result = sqlx::query(&format!(
        "INSERT OR IGNORE INTO {} (hash, data_model, is_aggregated, service, service_path, entity_id, entity_type, attr_name)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        registry.table()
    ))
    .bind(&entry.hash)
    .bind(entry.data_model.as_str())
    .bind(entry.is_aggregated)
    .bind(&entry.service)
    .bind(&entry.service_path)
    .bind(&entry.identity.entity_id)
    .bind(&entry.identity.entity_type)
    .bind(&entry.identity.attr_name)
    .execute(pool)
    .await?;
    if result.rows_affected() == 1 {
        return Ok(());
    }

    match lookup(pool, registry, &entry.hash).await? {
        Some(existing) if existing.same_identity(entry) => Ok(()),
        _ => {
            warn!(hash = %entry.hash, service = %entry.service, service_path = %entry.service_path,
                "collection name hash collision");
            Err(StoreError::HashCollision {
                hash: entry.hash.clone(),
            })
        }
    }
}

/// Entries of collections that fall inside `scope`, raw or aggregated.
pub async fn entries_in_scope(
    pool: &SqlitePool,
    registry: &Collection,
    scope: &RemovalScope,
    aggregated: bool,
) -> StoreResult<Vec<CollectionNameEntry>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT hash, data_model, is_aggregated, service, service_path, entity_id, entity_type, attr_name FROM {} WHERE is_aggregated = ",
        registry.table()
    ));
    qb.push_bind(aggregated);
    qb.push(" AND service = ").push_bind(&scope.service);
    qb.push(" AND service_path = ").push_bind(&scope.service_path);
    if let Some(entity_id) = &scope.entity_id {
        qb.push(" AND entity_id = ").push_bind(entity_id);
        qb.push(" AND entity_type IS ").push_bind(&scope.entity_type);
    }
    if let Some(attr_name) = &scope.attr_name {
        qb.push(" AND attr_name = ").push_bind(attr_name);
    }
    qb.push(" ORDER BY hash ASC");

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(parse_row).collect()
}

pub async fn remove(pool: &SqlitePool, registry: &Collection, hash: &str) -> StoreResult<()> {
    sqlx::query(&format!("DELETE FROM {} WHERE hash = $1", registry.table()))
        .bind(hash)
        .execute(pool)
        .await?;
    Ok(())
}
