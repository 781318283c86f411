//! SQL generation per database engine

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::exporter::RowFilter;
use crate::feed::descriptor::{ColumnDef, ColumnKind, FeedDescriptor};

// ============================================================================
// Parameter Limits
// ============================================================================

/// PostgreSQL binds at most 65535 parameters per statement.
pub const POSTGRES_PARAMETER_LIMIT: usize = 65_535;

/// MySQL prepared statements accept at most 65535 placeholders.
pub const MYSQL_PARAMETER_LIMIT: usize = 65_535;

/// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER` since 3.32.
pub const SQLITE_PARAMETER_LIMIT: usize = 32_766;

/// Relational engines the exporter can write to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    Mysql,
    Sqlite,
}

impl std::str::FromStr for Dialect {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pgsql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::Mysql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "sqlserver" | "mssql" => Err(SyncError::config(
                "sqlserver is not supported; use postgres, mysql or sqlite",
            )),
            other => Err(SyncError::config(format!("unknown database dialect '{}'", other))),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Mysql => write!(f, "mysql"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl Dialect {
    pub fn default_parameter_limit(self) -> usize {
        match self {
            Dialect::Postgres => POSTGRES_PARAMETER_LIMIT,
            Dialect::Mysql => MYSQL_PARAMETER_LIMIT,
            Dialect::Sqlite => SQLITE_PARAMETER_LIMIT,
        }
    }

    pub fn quote(self, ident: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", ident.replace('`', "``")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Placeholder for the 1-based parameter `n`
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            _ => "?".to_string(),
        }
    }

    pub fn column_type(self, column: &ColumnDef) -> String {
        match (column.kind, column.size) {
            (ColumnKind::Text, Some(size)) => format!("VARCHAR({})", size),
            (ColumnKind::Text, None) => "TEXT".to_string(),
            (ColumnKind::Timestamp, _) => "VARCHAR(32)".to_string(),
            (ColumnKind::Integer | ColumnKind::Boolean, _) => "BIGINT".to_string(),
            (ColumnKind::Float, _) => "DOUBLE PRECISION".to_string(),
        }
    }

    fn column_list(self, feed: &FeedDescriptor) -> String {
        feed.column_names()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn key_list(self, feed: &FeedDescriptor) -> String {
        feed.primary_key
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn create_table(self, feed: &FeedDescriptor) -> String {
        let mut defs: Vec<String> = feed
            .columns
            .iter()
            .map(|c| {
                let null = if feed.is_key(c.name) { " NOT NULL" } else { "" };
                format!("{} {}{}", self.quote(c.name), self.column_type(c), null)
            })
            .collect();
        defs.push(format!("PRIMARY KEY ({})", self.key_list(feed)));

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote(feed.name),
            defs.join(", ")
        )
    }

    pub fn delete_all(self, feed: &FeedDescriptor) -> String {
        format!("DELETE FROM {}", self.quote(feed.name))
    }

    /// Multi-row upsert for `rows` rows, parameters numbered row by row
    pub fn upsert(self, feed: &FeedDescriptor, rows: usize) -> Result<String, SyncError> {
        let first_key = feed
            .primary_key
            .first()
            .ok_or_else(|| SyncError::config(format!("{} has no primary key to upsert on", feed.name)))?;
        let width = feed.columns.len();
        let values = (0..rows)
            .map(|r| {
                let params = (0..width)
                    .map(|c| self.placeholder(r * width + c + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", params)
            })
            .collect::<Vec<_>>()
            .join(", ");

        let updates: Vec<&ColumnDef> = feed.update_columns().collect();
        let conflict = match self {
            Dialect::Mysql if updates.is_empty() => {
                let key = self.quote(first_key);
                format!(" ON DUPLICATE KEY UPDATE {} = {}", key, key)
            },
            Dialect::Mysql => {
                let sets = updates
                    .iter()
                    .map(|c| {
                        let col = self.quote(c.name);
                        format!("{} = VALUES({})", col, col)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(" ON DUPLICATE KEY UPDATE {}", sets)
            },
            _ if updates.is_empty() => {
                format!(" ON CONFLICT ({}) DO NOTHING", self.key_list(feed))
            },
            _ => {
                let sets = updates
                    .iter()
                    .map(|c| {
                        let col = self.quote(c.name);
                        format!("{} = excluded.{}", col, col)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    " ON CONFLICT ({}) DO UPDATE SET {}",
                    self.key_list(feed),
                    sets
                )
            },
        };

        Ok(format!(
            "INSERT INTO {} ({}) VALUES {}{}",
            self.quote(feed.name),
            self.column_list(feed),
            values,
            conflict
        ))
    }

    /// `DELETE ... WHERE` for a filter. Values are bound in filter order.
    pub fn delete_where(self, feed: &FeedDescriptor, filter: &RowFilter) -> String {
        let predicate = match filter {
            RowFilter::Eq { column, .. } => {
                format!("{} = {}", self.quote(column), self.placeholder(1))
            },
            RowFilter::In { column, values } => {
                let params = (1..=values.len())
                    .map(|n| self.placeholder(n))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} IN ({})", self.quote(column), params)
            },
        };
        format!("DELETE FROM {} WHERE {}", self.quote(feed.name), predicate)
    }

    /// One page of rows in write-out order
    pub fn select_page(self, feed: &FeedDescriptor, limit: usize, offset: usize) -> String {
        let order = feed
            .sort_columns()
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT {} OFFSET {}",
            self.column_list(feed),
            self.quote(feed.name),
            order,
            limit,
            offset
        )
    }

    /// Row lookup by full primary key
    pub fn select_by_key(self, feed: &FeedDescriptor) -> String {
        let predicate = feed
            .primary_key
            .iter()
            .enumerate()
            .map(|(i, k)| format!("{} = {}", self.quote(k), self.placeholder(i + 1)))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(
            "SELECT {} FROM {} WHERE {}",
            self.column_list(feed),
            self.quote(feed.name),
            predicate
        )
    }

    /// Latest cursor value. With `scoped`, binds the scope id as the only parameter;
    /// otherwise matches rows with a NULL or empty scope.
    pub fn latest_cursor(self, feed: &FeedDescriptor, cursor: &str, scope: &str, scoped: bool) -> String {
        let cursor = self.quote(cursor);
        let scope = self.quote(scope);
        let scope_match = if scoped {
            format!("{} = {}", scope, self.placeholder(1))
        } else {
            format!("({} IS NULL OR {} = '')", scope, scope)
        };
        format!(
            "SELECT {} FROM {} WHERE {} AND {} IS NOT NULL ORDER BY {} DESC LIMIT 1",
            cursor,
            self.quote(feed.name),
            scope_match,
            cursor,
            cursor
        )
    }

    pub fn count(self, feed: &FeedDescriptor) -> String {
        format!("SELECT COUNT(*) FROM {}", self.quote(feed.name))
    }
}
