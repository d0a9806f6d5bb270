//! Relational Tag Source
//!
//! Equipment and point rows live in two tables with a `tags` JSON column.
//! Each filter becomes one parameterised `SELECT`; rows come back as
//! `to_jsonb(row)` and are flattened so that non-tag columns such as
//! `topic_name` read like tags. Queries run on a private single-threaded
//! runtime, one at a time, and are never retried.

use std::sync::LazyLock;

use haystack_types::{TagFilter, TagPredicate, TagRow};
use regex::Regex;
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Postgres;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::{SourceError, TagSource, scoped};
use crate::config::ConnectionParams;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid pattern")
});

/// Tag source backed by PostgreSQL
pub struct PostgresTagSource {
    pool: PgPool,
    runtime: Runtime,
    equip_table: String,
    point_table: String,
    site_id: Option<String>,
}

impl PostgresTagSource {
    pub fn connect(
        params: &ConnectionParams,
        equip_table: &str,
        point_table: &str,
        site_id: Option<String>,
    ) -> Result<Self, SourceError> {
        let equip_table = checked_identifier(equip_table)?;
        let point_table = checked_identifier(point_table)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SourceError::Runtime)?;

        let mut options = PgConnectOptions::new();
        if let Some(host) = &params.host {
            options = options.host(host);
        }
        if let Some(port) = params.port {
            options = options.port(port);
        }
        if let Some(user) = &params.user {
            options = options.username(user);
        }
        if let Some(password) = &params.password {
            options = options.password(password);
        }
        if let Some(dbname) = &params.dbname {
            options = options.database(dbname);
        }

        let pool = runtime.block_on(
            PgPoolOptions::new()
                .max_connections(1)
                .connect_with(options),
        )?;
        info!(
            "Connected to metadata store (equipment: {}, points: {})",
            equip_table, point_table
        );

        Ok(Self {
            runtime,
            pool,
            equip_table,
            point_table,
            site_id,
        })
    }

    fn fetch(&self, query: SelectQuery) -> Result<Vec<TagRow>, SourceError> {
        debug!(sql = %query.sql, binds = ?query.binds, "Executing metadata query");
        let rows = self.runtime.block_on(async {
            let mut q = sqlx::query_scalar::<Postgres, Json<Value>>(&query.sql);
            for bind in &query.binds {
                q = q.bind(bind.as_str());
            }
            q.fetch_all(&self.pool).await
        })?;
        Ok(rows.into_iter().map(|Json(row)| flatten_row(row)).collect())
    }
}

impl Drop for PostgresTagSource {
    fn drop(&mut self) {
        self.runtime.block_on(self.pool.close());
    }
}

impl TagSource for PostgresTagSource {
    fn list_equipment(&self, filter: &TagFilter) -> Result<Vec<TagRow>, SourceError> {
        let filter = scoped(filter, self.site_id.as_deref());
        self.fetch(SelectQuery::build(&self.equip_table, &filter))
    }

    fn list_points(&self, filter: &TagFilter) -> Result<Vec<TagRow>, SourceError> {
        self.fetch(SelectQuery::build(&self.point_table, filter))
    }
}

/// A rendered `SELECT` with its positional parameters
#[derive(Debug, PartialEq, Eq)]
struct SelectQuery {
    sql: String,
    binds: Vec<String>,
}

impl SelectQuery {
    fn build(table: &str, filter: &TagFilter) -> Self {
        let mut binds: Vec<String> = Vec::new();
        let mut clauses: Vec<String> = Vec::new();

        for predicate in filter.predicates() {
            binds.push(predicate.tag().to_string());
            let key = binds.len();
            let clause = match predicate {
                TagPredicate::Has(_) => {
                    format!("(t.tags->>${key} IS NOT NULL AND t.tags->>${key} <> 'false')")
                }
                TagPredicate::Missing(_) => {
                    format!("(t.tags->>${key} IS NULL OR t.tags->>${key} = '')")
                }
                TagPredicate::NonEmpty(_) => format!("t.tags->>${key} <> ''"),
                TagPredicate::Equals(_, value) => {
                    binds.push(value.clone());
                    format!("t.tags->>${key} = ${}", binds.len())
                }
            };
            clauses.push(clause);
        }

        let mut sql = format!("SELECT to_jsonb(t) FROM {table} t");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY t.tags->>'id'");

        Self { sql, binds }
    }
}

fn checked_identifier(name: &str) -> Result<String, SourceError> {
    if IDENTIFIER.is_match(name) {
        Ok(name.to_string())
    } else {
        Err(SourceError::InvalidIdentifier(name.to_string()))
    }
}

/// Tag column entries first, then scalar columns that are not already tags
fn flatten_row(row: Value) -> TagRow {
    let Value::Object(mut columns) = row else {
        return TagRow::new();
    };
    let mut tags = match columns.remove("tags") {
        Some(Value::Object(tags)) => tags,
        _ => Map::new(),
    };
    for (column, value) in columns {
        if value.is_null() || value.is_object() || value.is_array() {
            continue;
        }
        tags.entry(column).or_insert(value);
    }
    TagRow::from(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use haystack_types::tag;
    use serde_json::json;

    #[test]
    fn test_build_equipment_query() {
        let filter = TagFilter::new()
            .has(tag::VAV)
            .missing(tag::AHU_REF)
            .equals(tag::SITE_REF, "pnnl.bldg");
        let query = SelectQuery::build("equipment", &filter);

        assert_eq!(
            query.sql,
            "SELECT to_jsonb(t) FROM equipment t WHERE \
             (t.tags->>$1 IS NOT NULL AND t.tags->>$1 <> 'false') AND \
             (t.tags->>$2 IS NULL OR t.tags->>$2 = '') AND \
             t.tags->>$3 = $4 ORDER BY t.tags->>'id'"
        );
        assert_eq!(query.binds, vec!["vav", "ahuRef", "siteRef", "pnnl.bldg"]);
    }

    #[test]
    fn test_build_unfiltered_query() {
        let query = SelectQuery::build("public.points", &TagFilter::new());
        assert_eq!(query.sql, "SELECT to_jsonb(t) FROM public.points t ORDER BY t.tags->>'id'");
        assert!(query.binds.is_empty());
    }

    #[test]
    fn test_values_are_never_inlined() {
        let filter = TagFilter::new().equals(tag::EQUIP_REF, "x'; DROP TABLE points; --");
        let query = SelectQuery::build("points", &filter);
        assert!(!query.sql.contains("DROP"));
        assert_eq!(query.binds[1], "x'; DROP TABLE points; --");
    }

    #[test]
    fn test_table_names_are_checked() {
        assert!(checked_identifier("schema.points").is_ok());
        assert!(matches!(
            checked_identifier("points; DROP"),
            Err(SourceError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_flatten_row_prefers_tags() {
        let row = flatten_row(json!({
            "id": 17,
            "topic_name": "devices/b/vav1/DmpCmd",
            "device_name": "1001",
            "extra": {"nested": true},
            "tags": {"id": "s.b.vav1.dmp", "equipRef": "s.b.vav1"}
        }));

        assert_eq!(row.id(), Some("s.b.vav1.dmp"));
        assert_eq!(row.str(tag::TOPIC_NAME), Some("devices/b/vav1/DmpCmd"));
        assert_eq!(row.str(tag::DEVICE_NAME), Some("1001"));
        assert!(row.get("extra").is_none());
    }
}
