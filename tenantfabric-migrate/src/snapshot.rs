//! Captures the current shape of a schema via `information_schema.columns`.

use tenantfabric_pool::PgConnection;

use crate::error::MigrateResult;

mod sql {
    pub const SNAPSHOT_COLUMNS: &str = r#"
        SELECT table_name, column_name, data_type, is_nullable, column_default
        FROM information_schema.columns
        WHERE table_schema = current_schema()
        ORDER BY table_name, ordinal_position
    "#;
}

/// One row of an `information_schema.columns` snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
}

/// The full set of columns visible in the current schema at a point in time.
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    pub columns: Vec<ColumnInfo>,
}

impl SchemaSnapshot {
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        let mut seen = Vec::new();
        self.columns.iter().filter_map(move |c| {
            if seen.contains(&c.table_name.as_str()) {
                None
            } else {
                seen.push(c.table_name.as_str());
                Some(c.table_name.as_str())
            }
        })
    }

    pub fn columns_for<'a>(&'a self, table_name: &str) -> impl Iterator<Item = &'a ColumnInfo> {
        self.columns.iter().filter(move |c| c.table_name == table_name)
    }
}

/// Capture a snapshot of `conn`'s current schema (per `current_schema()`,
/// i.e. whatever `search_path` is in effect).
pub async fn capture_snapshot(conn: &PgConnection) -> MigrateResult<SchemaSnapshot> {
    let rows = conn.query(sql::SNAPSHOT_COLUMNS, &[]).await?;

    let columns = rows
        .iter()
        .map(|row| {
            let is_nullable: String = row.get("is_nullable");
            ColumnInfo {
                table_name: row.get("table_name"),
                column_name: row.get("column_name"),
                data_type: row.get("data_type"),
                is_nullable: is_nullable.eq_ignore_ascii_case("YES"),
                column_default: row.get("column_default"),
            }
        })
        .collect();

    Ok(SchemaSnapshot { columns })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(rows: &[(&str, &str, &str, bool, Option<&str>)]) -> SchemaSnapshot {
        SchemaSnapshot {
            columns: rows
                .iter()
                .map(|(table, column, ty, nullable, default)| ColumnInfo {
                    table_name: table.to_string(),
                    column_name: column.to_string(),
                    data_type: ty.to_string(),
                    is_nullable: *nullable,
                    column_default: default.map(|s| s.to_string()),
                })
                .collect(),
        }
    }

    #[test]
    fn tables_deduplicates_in_order() {
        let snap = snapshot(&[
            ("users", "id", "integer", false, None),
            ("users", "email", "text", true, None),
            ("orgs", "id", "integer", false, None),
        ]);
        assert_eq!(snap.tables().collect::<Vec<_>>(), vec!["users", "orgs"]);
    }

    #[test]
    fn columns_for_filters_by_table() {
        let snap = snapshot(&[
            ("users", "id", "integer", false, None),
            ("orgs", "id", "integer", false, None),
        ]);
        let cols: Vec<_> = snap.columns_for("users").collect();
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].column_name, "id");
    }

    // Live snapshot capture against `information_schema.columns` requires a
    // real PostgreSQL connection and is covered as an integration test, not here.
}
