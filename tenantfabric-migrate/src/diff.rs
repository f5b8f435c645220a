//! Diffs two [`crate::snapshot::SchemaSnapshot`]s.
//!
//! The only purpose of default-value normalization here is to keep the
//! no-op `ALTER ... SET DEFAULT` statements a catalog-sync step tends to
//! emit (re-quoting an identical default, adding a redundant type cast)
//! from showing up as changes.

use regex_lite::Regex;
use std::collections::BTreeMap;

use crate::snapshot::{ColumnInfo, SchemaSnapshot};

/// What changed between two snapshots, at the granularity of one table or column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffKind {
    TableAdded,
    TableRemoved,
    ColumnAdded,
    ColumnRemoved,
    ColumnChanged,
}

/// One entry of a schema diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub kind: DiffKind,
    pub table: String,
    pub column: Option<String>,
    /// For `ColumnChanged`, which of {type, nullable, default} differed.
    pub detail: Option<String>,
}

/// Strip a trailing `::type` cast (case-insensitive), then one leading and
/// one trailing single quote, then fold any `nextval(...)` default to a
/// sentinel so all sequence-backed defaults compare equal.
pub fn normalize_default(value: &str) -> String {
    let cast_re = Regex::new(r"(?i)::[a-z_ ]+$").unwrap();
    let stripped = cast_re.replace(value, "").to_string();

    let quote_stripped = strip_one_quote(&stripped);

    if quote_stripped.to_lowercase().contains("nextval") {
        return "[sequence]".to_string();
    }

    quote_stripped.trim().to_string()
}

fn strip_one_quote(value: &str) -> &str {
    let value = value.strip_prefix('\'').unwrap_or(value);
    value.strip_suffix('\'').unwrap_or(value)
}

fn defaults_equal(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => normalize_default(a) == normalize_default(b),
        _ => false,
    }
}

fn column_changed_detail(before: &ColumnInfo, after: &ColumnInfo) -> Option<String> {
    let mut changed = Vec::new();
    if before.data_type != after.data_type {
        changed.push("type");
    }
    if before.is_nullable != after.is_nullable {
        changed.push("nullable");
    }
    if !defaults_equal(before.column_default.as_deref(), after.column_default.as_deref()) {
        changed.push("default");
    }

    if changed.is_empty() {
        None
    } else {
        Some(changed.join(","))
    }
}

/// Diff `before` against `after`. Empty iff the two snapshots are equal
/// modulo default-value normalization.
pub fn diff(before: &SchemaSnapshot, after: &SchemaSnapshot) -> Vec<DiffEntry> {
    let mut entries = Vec::new();

    let before_tables: Vec<&str> = before.tables().collect();
    let after_tables: Vec<&str> = after.tables().collect();

    for table in &after_tables {
        if !before_tables.contains(table) {
            entries.push(DiffEntry {
                kind: DiffKind::TableAdded,
                table: table.to_string(),
                column: None,
                detail: None,
            });
        }
    }
    for table in &before_tables {
        if !after_tables.contains(table) {
            entries.push(DiffEntry {
                kind: DiffKind::TableRemoved,
                table: table.to_string(),
                column: None,
                detail: None,
            });
        }
    }

    for table in &after_tables {
        if !before_tables.contains(table) {
            continue;
        }

        let before_cols: BTreeMap<&str, &ColumnInfo> = before
            .columns_for(table)
            .map(|c| (c.column_name.as_str(), c))
            .collect();
        let after_cols: BTreeMap<&str, &ColumnInfo> = after
            .columns_for(table)
            .map(|c| (c.column_name.as_str(), c))
            .collect();

        for (name, col) in &after_cols {
            if !before_cols.contains_key(name) {
                entries.push(DiffEntry {
                    kind: DiffKind::ColumnAdded,
                    table: table.to_string(),
                    column: Some(col.column_name.clone()),
                    detail: None,
                });
            }
        }
        for (name, col) in &before_cols {
            if !after_cols.contains_key(name) {
                entries.push(DiffEntry {
                    kind: DiffKind::ColumnRemoved,
                    table: table.to_string(),
                    column: Some(col.column_name.clone()),
                    detail: None,
                });
            }
        }
        for (name, after_col) in &after_cols {
            let Some(before_col) = before_cols.get(name) else {
                continue;
            };
            if let Some(detail) = column_changed_detail(before_col, after_col) {
                entries.push(DiffEntry {
                    kind: DiffKind::ColumnChanged,
                    table: table.to_string(),
                    column: Some(after_col.column_name.clone()),
                    detail: Some(detail),
                });
            }
        }
    }

    entries
}

/// Render one entry as the pseudo-DDL line the dry-run report prints.
pub fn format_pseudo_ddl(entry: &DiffEntry) -> String {
    match entry.kind {
        DiffKind::TableAdded => format!("CREATE TABLE {}", entry.table),
        DiffKind::TableRemoved => format!("DROP TABLE {}", entry.table),
        DiffKind::ColumnAdded => format!(
            "ALTER TABLE {} ADD COLUMN {}",
            entry.table,
            entry.column.as_deref().unwrap_or("?")
        ),
        DiffKind::ColumnRemoved => format!(
            "ALTER TABLE {} DROP COLUMN {}",
            entry.table,
            entry.column.as_deref().unwrap_or("?")
        ),
        DiffKind::ColumnChanged => format!(
            "ALTER TABLE {} ALTER COLUMN {} ({})",
            entry.table,
            entry.column.as_deref().unwrap_or("?"),
            entry.detail.as_deref().unwrap_or("")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(table: &str, column: &str, ty: &str, nullable: bool, default: Option<&str>) -> ColumnInfo {
        ColumnInfo {
            table_name: table.to_string(),
            column_name: column.to_string(),
            data_type: ty.to_string(),
            is_nullable: nullable,
            column_default: default.map(|s| s.to_string()),
        }
    }

    #[test]
    fn normalize_strips_cast_and_quotes() {
        assert_eq!(
            normalize_default("'active'::character varying"),
            "active"
        );
    }

    #[test]
    fn normalize_folds_sequences() {
        assert_eq!(
            normalize_default("nextval('users_id_seq'::regclass)"),
            "[sequence]"
        );
    }

    #[test]
    fn identical_snapshots_diff_empty() {
        let before = SchemaSnapshot {
            columns: vec![col("users", "id", "integer", false, None)],
        };
        let after = before.clone();
        assert!(diff(&before, &after).is_empty());
    }

    /// S4 — default normalization: a quoted-with-cast default and its bare
    /// form must compare equal.
    #[test]
    fn s4_default_normalization_produces_no_diff() {
        let before = SchemaSnapshot {
            columns: vec![col(
                "users",
                "status",
                "character varying",
                false,
                Some("'active'::character varying"),
            )],
        };
        let after = SchemaSnapshot {
            columns: vec![col(
                "users",
                "status",
                "character varying",
                false,
                Some("'active'"),
            )],
        };
        assert!(diff(&before, &after).is_empty());
    }

    /// S3 — an additive column change is reported, formatted as pseudo-DDL.
    #[test]
    fn s3_additive_change_is_reported() {
        let before = SchemaSnapshot {
            columns: vec![col("users", "id", "integer", false, None)],
        };
        let after = SchemaSnapshot {
            columns: vec![
                col("users", "id", "integer", false, None),
                col("users", "email", "character varying", true, None),
            ],
        };
        let entries = diff(&before, &after);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DiffKind::ColumnAdded);
        assert_eq!(
            format_pseudo_ddl(&entries[0]),
            "ALTER TABLE users ADD COLUMN email"
        );
    }

    #[test]
    fn table_added_and_removed_are_detected() {
        let before = SchemaSnapshot {
            columns: vec![col("orgs", "id", "integer", false, None)],
        };
        let after = SchemaSnapshot {
            columns: vec![col("users", "id", "integer", false, None)],
        };
        let entries = diff(&before, &after);
        assert!(entries.iter().any(|e| e.kind == DiffKind::TableAdded && e.table == "users"));
        assert!(entries.iter().any(|e| e.kind == DiffKind::TableRemoved && e.table == "orgs"));
    }

    #[test]
    fn column_type_change_is_detected_with_detail() {
        let before = SchemaSnapshot {
            columns: vec![col("users", "id", "integer", false, None)],
        };
        let after = SchemaSnapshot {
            columns: vec![col("users", "id", "bigint", false, None)],
        };
        let entries = diff(&before, &after);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DiffKind::ColumnChanged);
        assert_eq!(entries[0].detail.as_deref(), Some("type"));
    }
}
