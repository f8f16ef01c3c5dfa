// Raw history: one row per event, optional identity columns depending on the data model.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::bucket::{from_millis, to_millis};
use super::catalog::Collection;
use super::naming::DocumentFilter;
use crate::error::StoreResult;
use crate::models::{Identity, IdentityFields, RawEvent};

/// Raw history read. `last_n` wins over pagination; neither returns everything.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    pub identity: Identity,
    /// Newest N documents (0 = all), returned oldest first.
    pub last_n: Option<u64>,
    /// Page size (0 = unlimited).
    pub h_limit: Option<u64>,
    pub h_offset: Option<u64>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl RawQuery {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            last_n: None,
            h_limit: None,
            h_offset: None,
            date_from: None,
            date_to: None,
        }
    }

    pub fn last_n(mut self, n: u64) -> Self {
        self.last_n = Some(n);
        self
    }

    pub fn page(mut self, h_limit: u64, h_offset: u64) -> Self {
        self.h_limit = Some(h_limit);
        self.h_offset = Some(h_offset);
        self
    }

    pub fn window(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }
}

impl From<&IdentityFields> for DocumentFilter {
    fn from(fields: &IdentityFields) -> Self {
        DocumentFilter {
            entity_id: fields.entity_id.clone(),
            entity_type: fields.entity_type.clone(),
            attr_name: fields.attr_name.clone(),
        }
    }
}

pub fn raw_ddl(collection: &Collection) -> Vec<String> {
    vec![
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recv_time INTEGER NOT NULL,
                entity_id TEXT,
                entity_type TEXT,
                attr_name TEXT,
                attr_type TEXT NOT NULL,
                attr_value TEXT NOT NULL,
                doc_size INTEGER NOT NULL
            )
            "#,
            collection.table()
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}(recv_time)",
            collection.index("recv_time"),
            collection.table()
        ),
    ]
}

pub async fn insert(pool: &SqlitePool, collection: &Collection, doc: &RawEvent) -> StoreResult<()> {
    let doc_size = serde_json::to_vec(doc)?.len() as i64;
    let attr_value = serde_json::to_string(&doc.attr_value)?;
    sqlx::query(&format!(
        "INSERT INTO {} (recv_time, entity_id, entity_type, attr_name, attr_type, attr_value, doc_size)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
        collection.table()
    ))
    .bind(to_millis(doc.recv_time))
    .bind(&doc.identity.entity_id)
    .bind(&doc.identity.entity_type)
    .bind(&doc.identity.attr_name)
    .bind(&doc.attr_type)
    .bind(attr_value)
    .bind(doc_size)
    .execute(pool)
    .await?;
    Ok(())
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a DocumentFilter) {
    if let Some(entity_id) = &filter.entity_id {
        qb.push(" AND entity_id = ").push_bind(entity_id);
        qb.push(" AND entity_type IS ").push_bind(&filter.entity_type);
    }
    if let Some(attr_name) = &filter.attr_name {
        qb.push(" AND attr_name = ").push_bind(attr_name);
    }
}

fn parse_row(row: &SqliteRow) -> StoreResult<RawEvent> {
    let recv_time: i64 = row.try_get("recv_time")?;
    let attr_value: String = row.try_get("attr_value")?;
    Ok(RawEvent {
        recv_time: from_millis(recv_time),
        identity: IdentityFields {
            entity_id: row.try_get("entity_id")?,
            entity_type: row.try_get("entity_type")?,
            attr_name: row.try_get("attr_name")?,
        },
        attr_type: row.try_get("attr_type")?,
        attr_value: serde_json::from_str(&attr_value)?,
    })
}

/// Documents of `collection` matching `filter` and the query window, in the order
/// the query asks for.
pub async fn find(
    pool: &SqlitePool,
    collection: &Collection,
    filter: &DocumentFilter,
    query: &RawQuery,
) -> StoreResult<Vec<RawEvent>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT recv_time, entity_id, entity_type, attr_name, attr_type, attr_value FROM {} WHERE 1 = 1",
        collection.table()
    ));
    push_filter(&mut qb, filter);
    if let Some(from) = query.date_from {
        qb.push(" AND recv_time >= ").push_bind(to_millis(from));
    }
    if let Some(to) = query.date_to {
        qb.push(" AND recv_time <= ").push_bind(to_millis(to));
    }

    if let Some(last_n) = query.last_n {
        qb.push(" ORDER BY recv_time DESC, id DESC");
        if last_n > 0 {
            qb.push(" LIMIT ").push_bind(last_n as i64);
        }
        let rows = qb.build().fetch_all(pool).await?;
        let mut out = rows.iter().map(parse_row).collect::<StoreResult<Vec<_>>>()?;
        out.reverse();
        return Ok(out);
    }

    qb.push(" ORDER BY recv_time ASC, id ASC");
    if query.h_limit.is_some() || query.h_offset.is_some() {
        let limit = match query.h_limit.unwrap_or(0) {
            0 => -1,
            n => n as i64,
        };
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(query.h_offset.unwrap_or(0) as i64);
    }
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
    push_filter(&mut qb, filter);
    let result = qb.build().execute(pool).await?;
    Ok(result.rows_affected())
}
