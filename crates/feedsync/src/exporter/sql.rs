//! Relational exporter over a `sqlx` `AnyPool`
//!
//! Reads go straight to the pool. Every mutation takes the write gate and runs
//! in its own transaction, so concurrent feeds never interleave statements
//! within a batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Row as _, Transaction};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::exporter::dialect::Dialect;
use crate::exporter::row::{Row, Stored, Value};
use crate::exporter::{Exporter, RowFilter};
use crate::feed::descriptor::{ColumnKind, FeedDescriptor};
use feedsync_common::timestamp;

/// Destination connection settings
#[derive(Debug, Clone)]
pub struct SqlConfig {
    pub dialect: Dialect,
    pub connection_string: String,
    /// Create missing tables on `init_feed`
    pub auto_migrate: bool,
    /// Overrides the dialect's default parameter limit
    pub parameter_limit: Option<usize>,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl SqlConfig {
    pub fn new(dialect: Dialect, connection_string: impl Into<String>) -> Self {
        Self {
            dialect,
            connection_string: connection_string.into(),
            auto_migrate: true,
            parameter_limit: None,
            max_connections: 10,
            connect_timeout_secs: 30,
        }
    }

    /// SQLite database file, created if missing
    pub fn sqlite_file(path: &std::path::Path) -> Self {
        Self::new(Dialect::Sqlite, format!("sqlite://{}?mode=rwc", path.display()))
    }
}

/// Exporter writing to a relational database
pub struct SqlExporter {
    pool: AnyPool,
    dialect: Dialect,
    auto_migrate: bool,
    parameter_limit: usize,
    write_gate: Mutex<()>,
}

/// Serialized write transaction
struct WriteTx<'a> {
    _gate: MutexGuard<'a, ()>,
    tx: Transaction<'static, Any>,
}

impl WriteTx<'_> {
    async fn execute<'q>(&mut self, query: Query<'q, Any, AnyArguments<'q>>) -> Result<u64> {
        Ok(query.execute(&mut *self.tx).await?.rows_affected())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn bind<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &Value,
    kind: ColumnKind,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value.to_stored(kind) {
        Stored::Text(v) => query.bind(v),
        Stored::Integer(v) => query.bind(v),
        Stored::Float(v) => query.bind(v),
    }
}

fn read_stored(row: &AnyRow, index: usize, kind: ColumnKind) -> Result<Stored> {
    Ok(match kind {
        ColumnKind::Text | ColumnKind::Timestamp => Stored::Text(row.try_get(index)?),
        ColumnKind::Integer | ColumnKind::Boolean => Stored::Integer(row.try_get(index)?),
        ColumnKind::Float => Stored::Float(row.try_get(index)?),
    })
}

fn decode_row(feed: &FeedDescriptor, row: &AnyRow) -> Result<Row> {
    feed.columns
        .iter()
        .enumerate()
        .map(|(i, column)| Ok(Value::from_stored(read_stored(row, i, column.kind)?, column.kind)))
        .collect()
}

fn column_kind(feed: &FeedDescriptor, column: &str) -> Result<ColumnKind> {
    feed.column(column)
        .map(|c| c.kind)
        .ok_or_else(|| SyncError::config(format!("{} has no column {}", feed.name, column)))
}

impl SqlExporter {
    /// Connect and build the exporter
    pub async fn connect(config: &SqlConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.connection_string)
            .await?;

        let parameter_limit = config
            .parameter_limit
            .unwrap_or_else(|| config.dialect.default_parameter_limit());

        info!(
            dialect = %config.dialect,
            max_connections = config.max_connections,
            parameter_limit,
            "Database connection pool created"
        );

        Ok(Self {
            pool,
            dialect: config.dialect,
            auto_migrate: config.auto_migrate,
            parameter_limit,
            write_gate: Mutex::new(()),
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    async fn begin_write(&self) -> Result<WriteTx<'_>> {
        let gate = self.write_gate.lock().await;
        let tx = self.pool.begin().await?;
        Ok(WriteTx { _gate: gate, tx })
    }

    /// Create the feed's table if it is missing
    pub async fn create_schema(&self, feed: &FeedDescriptor) -> Result<()> {
        let sql = self.dialect.create_table(feed);
        let mut tx = self.begin_write().await?;
        tx.execute(sqlx::query(&sql)).await?;
        tx.commit().await
    }

    pub async fn count_rows(&self, feed: &FeedDescriptor) -> Result<i64> {
        let sql = self.dialect.count(feed);
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(row.try_get(0)?)
    }

    /// One page of rows in the feed's write-out order
    pub async fn fetch_page(&self, feed: &FeedDescriptor, limit: usize, offset: usize) -> Result<Vec<Row>> {
        let sql = self.dialect.select_page(feed, limit, offset);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(|row| decode_row(feed, row)).collect()
    }

    /// Look up one row by its full primary key
    pub async fn find_row(&self, feed: &FeedDescriptor, key: &[Value]) -> Result<Option<Row>> {
        if key.len() != feed.primary_key.len() {
            return Err(SyncError::config(format!(
                "{} key has {} columns, got {} values",
                feed.name,
                feed.primary_key.len(),
                key.len()
            )));
        }

        let sql = self.dialect.select_by_key(feed);
        let mut query = sqlx::query(&sql);
        for (name, value) in feed.primary_key.iter().zip(key) {
            query = bind(query, value, column_kind(feed, name)?);
        }

        match query.fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(decode_row(feed, &row)?)),
            None => Ok(None),
        }
    }

    async fn latest_cursor(
        &self,
        feed: &FeedDescriptor,
        cursor: &str,
        scope: &str,
        scope_id: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>> {
        let sql = self
            .dialect
            .latest_cursor(feed, cursor, scope, scope_id.is_some());
        let mut query = sqlx::query(&sql);
        if let Some(id) = scope_id {
            query = query.bind(id.to_string());
        }

        let stored: Option<String> = match query.fetch_optional(&self.pool).await? {
            Some(row) => row.try_get(0)?,
            None => None,
        };

        stored
            .map(|s| timestamp::parse(&s).map_err(SyncError::from))
            .transpose()
    }
}

#[async_trait]
impl Exporter for SqlExporter {
    async fn init_feed(&self, feed: &FeedDescriptor, truncate: bool) -> Result<()> {
        if self.auto_migrate {
            self.create_schema(feed).await?;
        }

        if truncate {
            let sql = self.dialect.delete_all(feed);
            let mut tx = self.begin_write().await?;
            let removed = tx.execute(sqlx::query(&sql)).await?;
            tx.commit().await?;
            info!(feed = feed.name, removed, "truncated feed table");
        }

        Ok(())
    }

    async fn write_batch(&self, feed: &FeedDescriptor, rows: &[&Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let sql = self.dialect.upsert(feed, rows.len())?;
        let mut query = sqlx::query(&sql);
        for row in rows {
            if row.len() != feed.columns.len() {
                return Err(SyncError::data_integrity(format!(
                    "{} row has {} values for {} columns",
                    feed.name,
                    row.len(),
                    feed.columns.len()
                )));
            }
            for (value, column) in row.iter().zip(feed.columns) {
                query = bind(query, value, column.kind);
            }
        }

        let mut tx = self.begin_write().await?;
        tx.execute(query).await?;
        tx.commit().await?;

        debug!(feed = feed.name, rows = rows.len(), "batch written");
        Ok(())
    }

    async fn delete_rows_if_exist(&self, feed: &FeedDescriptor, filter: &RowFilter) -> Result<u64> {
        if filter.is_empty() {
            return Ok(0);
        }

        let kind = column_kind(feed, filter.column())?;
        let sql = self.dialect.delete_where(feed, filter);
        let mut query = sqlx::query(&sql);
        for value in filter.values() {
            query = bind(query, value, kind);
        }

        let mut tx = self.begin_write().await?;
        let removed = tx.execute(query).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn last_modified_at(
        &self,
        feed: &FeedDescriptor,
        fallback: DateTime<Utc>,
        scope_id: &str,
    ) -> Result<DateTime<Utc>> {
        let Some(cursor) = feed.cursor_column else {
            return Ok(fallback);
        };

        let latest = match feed.scope_column {
            Some(scope) => match self.latest_cursor(feed, cursor, scope, Some(scope_id)).await? {
                Some(ts) => Some(ts),
                None => self.latest_cursor(feed, cursor, scope, None).await?,
            },
            None => {
                let sql = format!(
                    "SELECT {c} FROM {t} WHERE {c} IS NOT NULL ORDER BY {c} DESC LIMIT 1",
                    c = self.dialect.quote(cursor),
                    t = self.dialect.quote(feed.name)
                );
                let stored: Option<String> = match sqlx::query(&sql).fetch_optional(&self.pool).await? {
                    Some(row) => row.try_get(0)?,
                    None => None,
                };
                stored.map(|s| timestamp::parse(&s)).transpose()?
            },
        };

        Ok(match latest {
            Some(ts) if ts > fallback => ts,
            _ => fallback,
        })
    }

    async fn finalise_export(&self, _feed: &FeedDescriptor) -> Result<()> {
        Ok(())
    }

    fn parameter_limit(&self) -> usize {
        self.parameter_limit
    }
}
