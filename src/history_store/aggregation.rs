// Aggregated history: bucket rows keyed by (identity, resolution, origin), points stored as
// a JSON array. Each event is folded in with an insert-if-absent followed by one atomic
// positional update per resolution.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, warn};

use super::bucket::{self, from_millis, to_millis};
use super::catalog::Collection;
use super::naming::DocumentFilter;
use crate::error::StoreResult;
use crate::models::{AggregationBucket, AttrValue, BucketId, IdentityFields, Resolution};

/// Magnitude every stored statistic saturates at. Reals beyond it (including overflow to
/// infinity) do not round-trip through the points JSON.
pub const STAT_LIMIT: f64 = 1e308;

pub fn aggregated_ddl(collection: &Collection) -> Vec<String> {
    vec![
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                entity_id TEXT NOT NULL DEFAULT '',
                entity_type TEXT NOT NULL DEFAULT '',
                attr_name TEXT NOT NULL DEFAULT '',
                resolution TEXT NOT NULL,
                origin INTEGER NOT NULL,
                attr_type TEXT NOT NULL,
                points TEXT NOT NULL,
                PRIMARY KEY (entity_id, entity_type, attr_name, resolution, origin)
            )
            "#,
            collection.table()
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}(origin)",
            collection.index("origin"),
            collection.table()
        ),
    ]
}

/// Key columns of the buckets for one set of document identity fields. Absent fields
/// are stored as empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BucketKey<'a> {
    entity_id: &'a str,
    entity_type: &'a str,
    attr_name: &'a str,
}

impl<'a> BucketKey<'a> {
    fn new(fields: &'a IdentityFields) -> Self {
        Self {
            entity_id: fields.entity_id.as_deref().unwrap_or_default(),
            entity_type: fields.entity_type.as_deref().unwrap_or_default(),
            attr_name: fields.attr_name.as_deref().unwrap_or_default(),
        }
    }
}

fn not_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Creates the bucket with all points prepopulated unless it already exists.
async fn ensure_bucket(
    pool: &SqlitePool,
    collection: &Collection,
    key: &BucketKey<'_>,
    resolution: Resolution,
    origin: DateTime<Utc>,
    attr_type: &str,
) -> StoreResult<bool> {
    let points = serde_json::to_string(&bucket::prepopulate(resolution))?;
    let result = sqlx::query(&format!(
        "INSERT INTO {} (entity_id, entity_type, attr_name, resolution, origin, attr_type, points)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (entity_id, entity_type, attr_name, resolution, origin) DO NOTHING",
        collection.table()
    ))
    .bind(key.entity_id)
    .bind(key.entity_type)
    .bind(key.attr_name)
    .bind(resolution.as_str())
    .bind(to_millis(origin))
    .bind(attr_type)
    .bind(points)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

#[allow(clippy::too_many_arguments)]
async fn update_numeric(
    pool: &SqlitePool,
    collection: &Collection,
    key: &BucketKey<'_>,
    resolution: Resolution,
    origin: DateTime<Utc>,
    slot: usize,
    attr_type: &str,
    value: f64,
) -> StoreResult<u64> {
    let path = |field: &str| format!("$[{}].{}", slot, field);
    let result = sqlx::query(&format!(
        r#"
        UPDATE {} SET attr_type = $1, points = json_set(points,
            $2, json_extract(points, $2) + 1,
            $3, json_extract(points, $3) + 1,
            $4, max(min(coalesce(json_extract(points, $4), 0) + $8, $15), -$15),
            $5, min(coalesce(json_extract(points, $5), 0) + $9, $15),
            $6, min(coalesce(json_extract(points, $6), $8), $8),
            $7, max(coalesce(json_extract(points, $7), $8), $8))
        WHERE entity_id = $10 AND entity_type = $11 AND attr_name = $12
            AND resolution = $13 AND origin = $14
        "#,
        collection.table()
    ))
    .bind(attr_type)
    .bind(path("samples"))
    .bind(path("numSamples"))
    .bind(path("sum"))
    .bind(path("sum2"))
    .bind(path("min"))
    .bind(path("max"))
    .bind(value)
    .bind((value * value).min(STAT_LIMIT))
    .bind(key.entity_id)
    .bind(key.entity_type)
    .bind(key.attr_name)
    .bind(resolution.as_str())
    .bind(to_millis(origin))
    .bind(STAT_LIMIT)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[allow(clippy::too_many_arguments)]
async fn update_textual(
    pool: &SqlitePool,
    collection: &Collection,
    key: &BucketKey<'_>,
    resolution: Resolution,
    origin: DateTime<Utc>,
    slot: usize,
    attr_type: &str,
    occurrence: &str,
) -> StoreResult<u64> {
    let path = |field: &str| format!("$[{}].{}", slot, field);
    let result = sqlx::query(&format!(
        r#"
        UPDATE {} SET attr_type = $1, points = json_set(points,
            $2, json_extract(points, $2) + 1,
            $3, json_extract(points, $3) + 1,
            $4, json(json_patch(
                coalesce(json_extract(points, $4), '{{}}'),
                json_object($5, coalesce(
                    (SELECT je.value FROM json_each(points, $4) AS je WHERE je.key = $5), 0) + 1))))
        WHERE entity_id = $6 AND entity_type = $7 AND attr_name = $8
            AND resolution = $9 AND origin = $10
        "#,
        collection.table()
    ))
    .bind(attr_type)
    .bind(path("samples"))
    .bind(path("txtSamples"))
    .bind(path("occur"))
    .bind(occurrence)
    .bind(key.entity_id)
    .bind(key.entity_type)
    .bind(key.attr_name)
    .bind(resolution.as_str())
    .bind(to_millis(origin))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Folds one value into the bucket of `resolution` holding `timestamp`.
pub async fn store_for_resolution(
    pool: &SqlitePool,
    collection: &Collection,
    fields: &IdentityFields,
    attr_type: &str,
    value: &AttrValue,
    resolution: Resolution,
    timestamp: DateTime<Utc>,
) -> StoreResult<()> {
    let key = BucketKey::new(fields);
    let origin = bucket::origin(timestamp, resolution);
    let offset = bucket::offset(resolution, timestamp);
    let slot = bucket::slot(resolution, offset);

    let created = ensure_bucket(pool, collection, &key, resolution, origin, attr_type).await?;
    let updated = match value.as_number() {
        Some(v) => {
            let v = v.clamp(-STAT_LIMIT, STAT_LIMIT);
            update_numeric(pool, collection, &key, resolution, origin, slot, attr_type, v).await?
        }
        None => {
            let occurrence = bucket::escape_key(&value.as_text());
            update_textual(pool, collection, &key, resolution, origin, slot, attr_type, &occurrence)
                .await?
        }
    };
    debug!(
        collection = %collection.name,
        resolution = %resolution,
        origin = %origin,
        offset,
        created,
        updated,
        "aggregated value"
    );
    Ok(())
}

/// Aggregates one value at every resolution concurrently. Every resolution runs to the end;
/// the last error seen is returned and completed writes stay in place.
pub async fn store_all_resolutions(
    pool: &SqlitePool,
    collection: &Collection,
    fields: &IdentityFields,
    attr_type: &str,
    value: &AttrValue,
    resolutions: &[Resolution],
    timestamp: DateTime<Utc>,
) -> StoreResult<()> {
    let results = join_all(resolutions.iter().map(|resolution| {
        store_for_resolution(pool, collection, fields, attr_type, value, *resolution, timestamp)
    }))
    .await;

    let mut last_error = None;
    for (resolution, result) in resolutions.iter().zip(results) {
        if let Err(e) = result {
            warn!(collection = %collection.name, resolution = %resolution, error = %e,
                "aggregation failed for resolution");
            last_error = Some(e);
        }
    }
    match last_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn parse_row(row: &SqliteRow) -> StoreResult<AggregationBucket> {
    let resolution: String = row.try_get("resolution")?;
    let resolution = resolution
        .parse::<Resolution>()
        .map_err(|e| sqlx::Error::Decode(e.into()))?;
    let origin: i64 = row.try_get("origin")?;
    let points: String = row.try_get("points")?;
    let entity_id: String = row.try_get("entity_id")?;
    let entity_type: String = row.try_get("entity_type")?;
    let attr_name: String = row.try_get("attr_name")?;
    Ok(AggregationBucket {
        id: BucketId {
            identity: IdentityFields {
                entity_id: not_empty(&entity_id),
                entity_type: not_empty(&entity_type),
                attr_name: not_empty(&attr_name),
            },
            resolution,
            origin: from_millis(origin),
        },
        attr_type: row.try_get("attr_type")?,
        points: serde_json::from_str(&points)?,
    })
}

/// Buckets of one identity and resolution with `from <= origin <= to`, oldest first.
pub async fn find_buckets(
    pool: &SqlitePool,
    collection: &Collection,
    fields: &IdentityFields,
    resolution: Resolution,
    origin_from: Option<DateTime<Utc>>,
    origin_to: Option<DateTime<Utc>>,
) -> StoreResult<Vec<AggregationBucket>> {
    let key = BucketKey::new(fields);
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT entity_id, entity_type, attr_name, resolution, origin, attr_type, points FROM {} WHERE entity_id = ",
        collection.table()
    ));
    qb.push_bind(key.entity_id);
    qb.push(" AND entity_type = ").push_bind(key.entity_type);
    qb.push(" AND attr_name = ").push_bind(key.attr_name);
    qb.push(" AND resolution = ").push_bind(resolution.as_str());
    if let Some(from) = origin_from {
        qb.push(" AND origin >= ").push_bind(to_millis(from));
    }
    if let Some(to) = origin_to {
        qb.push(" AND origin <= ").push_bind(to_millis(to));
    }
    qb.push(" ORDER BY origin ASC");

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(parse_row).collect()
}

pub async fn delete_documents(
    pool: &SqlitePool,
    collection: &Collection,
    filter: &DocumentFilter,
) -> StoreResult<u64> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("DELETE FROM {} WHERE 1 = 1", collection.table()));
    if let Some(entity_id) = &filter.entity_id {
        qb.push(" AND entity_id = ").push_bind(entity_id);
        qb.push(" AND entity_type = ")
            .push_bind(filter.entity_type.clone().unwrap_or_default());
    }
    if let Some(attr_name) = &filter.attr_name {
        qb.push(" AND attr_name = ").push_bind(attr_name);
    }
    let result = qb.build().execute(pool).await?;
    Ok(result.rows_affected())
}
