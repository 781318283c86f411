//! Static per-entity metadata
//!
//! A [`FeedDescriptor`] describes one entity: where it comes from, which
//! columns it has, how rows are keyed and ordered, and how a run refreshes it.
//! Descriptors are `static` and never change at runtime.

use chrono::{DateTime, Utc};
use serde_json::Value as Json;

use crate::error::{Result, SyncError};
use crate::exporter::row::{Row, Value};

/// Storage kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

/// Where a column's value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    /// Dotted path into the record, e.g. `"location.latitude"`
    Field(&'static str),
    /// Comma-joined `name` fields of an array of objects
    NameList(&'static str),
    /// Comma-joined array of strings
    StringList(&'static str),
    /// Dotted path into the fanned-out item rather than the record
    Item(&'static str),
    /// The time the row was written by this run
    ExportedAt,
}

/// One column of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub source: ColumnSource,
    pub kind: ColumnKind,
    /// Width for indexed text columns
    pub size: Option<u32>,
}

impl ColumnDef {
    pub const fn new(name: &'static str, path: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            source: ColumnSource::Field(path),
            kind,
            size: None,
        }
    }

    pub const fn text(name: &'static str, path: &'static str) -> Self {
        Self::new(name, path, ColumnKind::Text)
    }

    pub const fn integer(name: &'static str, path: &'static str) -> Self {
        Self::new(name, path, ColumnKind::Integer)
    }

    pub const fn float(name: &'static str, path: &'static str) -> Self {
        Self::new(name, path, ColumnKind::Float)
    }

    pub const fn boolean(name: &'static str, path: &'static str) -> Self {
        Self::new(name, path, ColumnKind::Boolean)
    }

    pub const fn timestamp(name: &'static str, path: &'static str) -> Self {
        Self::new(name, path, ColumnKind::Timestamp)
    }

    /// Text column usable in a key or index
    pub const fn key(name: &'static str, path: &'static str, size: u32) -> Self {
        Self {
            name,
            source: ColumnSource::Field(path),
            kind: ColumnKind::Text,
            size: Some(size),
        }
    }

    pub const fn name_list(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            source: ColumnSource::NameList(path),
            kind: ColumnKind::Text,
            size: None,
        }
    }

    pub const fn string_list(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            source: ColumnSource::StringList(path),
            kind: ColumnKind::Text,
            size: None,
        }
    }

    /// Column read from the fan-out item, see [`FeedDescriptor::fan_out`]
    pub const fn item(name: &'static str, path: &'static str, kind: ColumnKind, size: Option<u32>) -> Self {
        Self {
            name,
            source: ColumnSource::Item(path),
            kind,
            size,
        }
    }

    pub const fn exported_at() -> Self {
        Self {
            name: "exported_at",
            source: ColumnSource::ExportedAt,
            kind: ColumnKind::Timestamp,
            size: None,
        }
    }

    fn extract(&self, record: &Json, item: Option<&Json>, exported_at: &DateTime<Utc>) -> Result<Value> {
        let coerce = |raw: Option<&Json>| {
            Value::from_json(raw.unwrap_or(&Json::Null), self.kind).map_err(|reason| {
                SyncError::data_integrity(format!("column {}: {}", self.name, reason))
            })
        };

        match self.source {
            ColumnSource::ExportedAt => Ok(Value::Timestamp(*exported_at)),
            ColumnSource::Field(path) => coerce(lookup(record, path)),
            ColumnSource::Item(path) => coerce(item.and_then(|item| lookup(item, path))),
            ColumnSource::NameList(path) => Ok(match lookup(record, path) {
                Some(Json::Array(items)) => Value::Text(
                    items
                        .iter()
                        .filter_map(|item| item.get("name").and_then(Json::as_str))
                        .collect::<Vec<_>>()
                        .join(","),
                ),
                _ => Value::Null,
            }),
            ColumnSource::StringList(path) => Ok(match lookup(record, path) {
                Some(Json::Array(items)) => Value::Text(
                    items.iter().filter_map(Json::as_str).collect::<Vec<_>>().join(","),
                ),
                _ => Value::Null,
            }),
        }
    }
}

fn lookup<'a>(record: &'a Json, path: &str) -> Option<&'a Json> {
    path.split('.').try_fold(record, |node, segment| node.get(segment))
}

/// Remote endpoint a feed is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
    /// Paginated endpoint on the primary API, e.g. `feed/users`
    Paginated(&'static str),
    /// Bare array endpoint under a SHEQSY company, e.g. `employees`
    Sheqsy(&'static str),
    /// Versioned history endpoint under a SHEQSY company, e.g. `shifts/history`
    SheqsyHistory(&'static str),
}

impl FeedSource {
    /// Path relative to the scope's base URL
    pub fn path(&self, scope_id: &str) -> String {
        match self {
            FeedSource::Paginated(path) => (*path).to_string(),
            FeedSource::Sheqsy(resource) | FeedSource::SheqsyHistory(resource) => format!(
                "SheqsyIntegrationApi/api/v3/companies/{}/{}",
                scope_id, resource
            ),
        }
    }

    pub fn is_sheqsy(&self) -> bool {
        matches!(self, FeedSource::Sheqsy(_) | FeedSource::SheqsyHistory(_))
    }
}

/// How a run treats rows already stored for a feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Resume from the stored cursor; truncate only for full (non-incremental) runs
    Incremental,
    /// Always truncate; the API cannot report deletions for this entity
    Truncate,
    /// Never truncate; rows are merged by primary key
    Upsert,
}

/// Rows removed before fresh rows are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacePolicy {
    None,
    /// Delete every row of the run's scope before draining
    Scope,
    /// Before each page, delete rows whose parent column matches a parent in the page
    Parent(&'static str),
}

/// Query parameters a paginated feed accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryParam {
    ModifiedAfter,
    Templates,
    Archived,
    Completed,
    InspectionLimit,
    ActionLimit,
    IssueLimit,
    AssetLimit,
    IncludeInactive,
    WebReportLink,
    IncludeDeleted,
    ShowOnlyLeafNodes,
}

/// Columns naming media to download alongside a feed's rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaRefs {
    /// Newline-separated media URLs
    pub urls: &'static str,
    /// Directory the media is filed under, e.g. the inspection id
    pub owner: &'static str,
}

/// Immutable metadata for one entity
#[derive(Debug)]
pub struct FeedDescriptor {
    pub name: &'static str,
    pub source: FeedSource,
    pub primary_key: &'static [&'static str],
    pub columns: &'static [ColumnDef],
    /// Ascending sort columns for write-out
    pub order: &'static [&'static str],
    /// Column holding the remote modification time
    pub cursor_column: Option<&'static str>,
    /// Column holding the owning organisation
    pub scope_column: Option<&'static str>,
    pub refresh: RefreshPolicy,
    pub replace: ReplacePolicy,
    pub params: &'static [QueryParam],
    /// Column checked against the configured skip list
    pub skip_column: Option<&'static str>,
    /// Array field whose items each become one row
    pub fan_out: Option<&'static str>,
    pub media: Option<MediaRefs>,
}

impl FeedDescriptor {
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.primary_key.iter().any(|key| *key == name)
    }

    /// Positions of the primary key columns within a row
    pub fn key_indices(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|k| self.column_index(k))
            .collect()
    }

    /// Columns rewritten when an upsert hits an existing key
    pub fn update_columns(&self) -> impl Iterator<Item = &ColumnDef> + '_ {
        self.columns.iter().filter(|c| !self.is_key(c.name))
    }

    /// Sort columns followed by any key columns not already listed, for a stable order
    pub fn sort_columns(&self) -> Vec<&'static str> {
        let mut cols: Vec<&'static str> = self.order.to_vec();
        for key in self.primary_key {
            if !cols.contains(key) {
                cols.push(key);
            }
        }
        cols
    }

    /// Decode one raw record into a row aligned with `columns`
    pub fn row_from_json(&self, record: &Json, exported_at: &DateTime<Utc>) -> Result<Row> {
        self.ensure_object(record)?;
        self.build_row(record, None, exported_at)
    }

    /// Decode one raw record into its rows: one per fan-out item, or exactly one.
    ///
    /// A record with a missing or empty fan-out array yields no rows.
    pub fn rows_from_json(&self, record: &Json, exported_at: &DateTime<Utc>) -> Result<Vec<Row>> {
        self.ensure_object(record)?;
        let Some(path) = self.fan_out else {
            return Ok(vec![self.build_row(record, None, exported_at)?]);
        };

        match lookup(record, path) {
            Some(Json::Array(items)) => items
                .iter()
                .map(|item| self.build_row(record, Some(item), exported_at))
                .collect(),
            None | Some(Json::Null) => Ok(Vec::new()),
            Some(other) => Err(SyncError::data_integrity(format!(
                "{}: expected an array at {}, got {}",
                self.name, path, other
            ))),
        }
    }

    fn ensure_object(&self, record: &Json) -> Result<()> {
        if record.is_object() {
            return Ok(());
        }
        Err(SyncError::data_integrity(format!(
            "{}: expected an object record, got {}",
            self.name, record
        )))
    }

    fn build_row(&self, record: &Json, item: Option<&Json>, exported_at: &DateTime<Utc>) -> Result<Row> {
        self.columns
            .iter()
            .map(|column| column.extract(record, item, exported_at))
            .collect()
    }

    /// Check that keys, order, cursor and scope columns exist.
    pub fn validate(&self) -> Result<()> {
        let referenced = self
            .primary_key
            .iter()
            .chain(self.order)
            .chain(self.cursor_column.iter())
            .chain(self.scope_column.iter())
            .chain(self.skip_column.iter());

        for name in referenced {
            if self.column_index(name).is_none() {
                return Err(SyncError::config(format!(
                    "feed {} references unknown column {}",
                    self.name, name
                )));
            }
        }

        if let ReplacePolicy::Parent(parent) = self.replace {
            if self.column_index(parent).is_none() {
                return Err(SyncError::config(format!(
                    "feed {} replaces by unknown column {}",
                    self.name, parent
                )));
            }
        }

        if self.replace == ReplacePolicy::Scope && self.scope_column.is_none() {
            return Err(SyncError::config(format!(
                "feed {} replaces by scope but has no scope column",
                self.name
            )));
        }

        if self.primary_key.is_empty() {
            return Err(SyncError::config(format!("feed {} has no primary key", self.name)));
        }

        if let Some(media) = self.media {
            for name in [media.urls, media.owner] {
                if self.column_index(name).is_none() {
                    return Err(SyncError::config(format!(
                        "feed {} takes media from unknown column {}",
                        self.name, name
                    )));
                }
            }
        }

        let reads_items = self
            .columns
            .iter()
            .any(|c| matches!(c.source, ColumnSource::Item(_)));
        if reads_items && self.fan_out.is_none() {
            return Err(SyncError::config(format!(
                "feed {} reads item columns without a fan-out field",
                self.name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    static THINGS: FeedDescriptor = FeedDescriptor {
        name: "things",
        source: FeedSource::Paginated("feed/things"),
        primary_key: &["thing_id"],
        columns: &[
            ColumnDef::key("thing_id", "id", 100),
            ColumnDef::text("name", "name"),
            ColumnDef::float("lat", "location.latitude"),
            ColumnDef::boolean("active", "active"),
            ColumnDef::timestamp("modified_at", "modified_at"),
            ColumnDef::exported_at(),
        ],
        order: &["modified_at"],
        cursor_column: Some("modified_at"),
        scope_column: None,
        refresh: RefreshPolicy::Incremental,
        replace: ReplacePolicy::None,
        params: &[QueryParam::ModifiedAfter],
        skip_column: None,
        fan_out: None,
        media: None,
    };

    #[test]
    fn test_row_from_json() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let row = THINGS
            .row_from_json(
                &json!({
                    "id": "t1",
                    "name": "Pump",
                    "location": {"latitude": -33.5},
                    "active": true,
                    "modified_at": "2024-04-30T08:00:00Z"
                }),
                &now,
            )
            .unwrap();

        assert_eq!(row[0], Value::Text("t1".to_string()));
        assert_eq!(row[2], Value::Float(-33.5));
        assert_eq!(row[3], Value::Boolean(true));
        assert_eq!(
            row[4],
            Value::Timestamp(Utc.with_ymd_and_hms(2024, 4, 30, 8, 0, 0).unwrap())
        );
        assert_eq!(row[5], Value::Timestamp(now));
    }

    #[test]
    fn test_missing_fields_are_null() {
        let row = THINGS.row_from_json(&json!({"id": "t2"}), &Utc::now()).unwrap();
        assert_eq!(row[1], Value::Null);
        assert_eq!(row[2], Value::Null);
    }

    #[test]
    fn test_bad_value_names_column() {
        let err = THINGS
            .row_from_json(&json!({"id": "t3", "modified_at": "soon"}), &Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("column modified_at"));
        assert!(matches!(err, SyncError::DataIntegrity(_)));
    }

    #[test]
    fn test_non_object_record_rejected() {
        assert!(THINGS.row_from_json(&json!("t1"), &Utc::now()).is_err());
    }

    #[test]
    fn test_sort_columns_append_key() {
        assert_eq!(THINGS.sort_columns(), vec!["modified_at", "thing_id"]);
        assert_eq!(THINGS.key_indices(), vec![0]);
        assert_eq!(THINGS.update_columns().count(), 5);
        THINGS.validate().unwrap();
    }

    #[test]
    fn test_name_list_column() {
        let column = ColumnDef::name_list("departments", "departments");
        let value = column
            .extract(
                &json!({"departments": [{"name": "Ops"}, {"id": 4}, {"name": "Field"}]}),
                None,
                &Utc::now(),
            )
            .unwrap();
        assert_eq!(value, Value::Text("Ops,Field".to_string()));

        let missing = column.extract(&json!({}), None, &Utc::now()).unwrap();
        assert_eq!(missing, Value::Null);
    }

    #[test]
    fn test_sheqsy_path() {
        let source = FeedSource::Sheqsy("employees");
        assert_eq!(
            source.path("c-1"),
            "SheqsyIntegrationApi/api/v3/companies/c-1/employees"
        );
        assert!(source.is_sheqsy());

        let history = FeedSource::SheqsyHistory("shifts/history");
        assert_eq!(
            history.path("c-1"),
            "SheqsyIntegrationApi/api/v3/companies/c-1/shifts/history"
        );
        assert!(history.is_sheqsy());
        assert!(!FeedSource::Paginated("feed/users").is_sheqsy());
    }

    #[test]
    fn test_string_list_column() {
        let column = ColumnDef::string_list("departments", "departments");
        let value = column
            .extract(&json!({"departments": ["Ops", 7, "Field"]}), None, &Utc::now())
            .unwrap();
        assert_eq!(value, Value::Text("Ops,Field".to_string()));

        let empty = column.extract(&json!({"departments": []}), None, &Utc::now()).unwrap();
        assert_eq!(empty, Value::Text(String::new()));
    }

    static MEMBERSHIPS: FeedDescriptor = FeedDescriptor {
        name: "memberships",
        source: FeedSource::Sheqsy("members"),
        primary_key: &["member_id", "team_id"],
        columns: &[
            ColumnDef::key("member_id", "memberId", 32),
            ColumnDef::item("team_id", "teamId", ColumnKind::Text, Some(32)),
            ColumnDef::item("rank", "rank", ColumnKind::Integer, None),
        ],
        order: &["member_id"],
        cursor_column: None,
        scope_column: None,
        refresh: RefreshPolicy::Upsert,
        replace: ReplacePolicy::None,
        params: &[],
        skip_column: None,
        fan_out: Some("teams"),
        media: None,
    };

    #[test]
    fn test_fan_out_makes_a_row_per_item() {
        MEMBERSHIPS.validate().unwrap();
        let rows = MEMBERSHIPS
            .rows_from_json(
                &json!({"memberId": "m1", "teams": [{"teamId": "t1", "rank": 2}, {"teamId": "t2"}]}),
                &Utc::now(),
            )
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![
            Value::Text("m1".to_string()),
            Value::Text("t1".to_string()),
            Value::Integer(2),
        ]);
        assert_eq!(rows[1][1], Value::Text("t2".to_string()));
        assert_eq!(rows[1][2], Value::Null);
    }

    #[test]
    fn test_fan_out_without_items() {
        let now = Utc::now();
        assert!(MEMBERSHIPS.rows_from_json(&json!({"memberId": "m1"}), &now).unwrap().is_empty());
        assert!(MEMBERSHIPS
            .rows_from_json(&json!({"memberId": "m1", "teams": []}), &now)
            .unwrap()
            .is_empty());
        assert!(MEMBERSHIPS
            .rows_from_json(&json!({"memberId": "m1", "teams": "t1"}), &now)
            .is_err());
    }

    #[test]
    fn test_plain_feed_makes_one_row() {
        let rows = THINGS.rows_from_json(&json!({"id": "t9"}), &Utc::now()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Value::Text("t9".to_string()));
    }
}
