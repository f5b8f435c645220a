//! Informational DDL capture for live-mode reporting.
//!
//! The engine doesn't execute DDL itself — catalog-sync is an injected
//! collaborator — but callers that wire a logger into that collaborator can
//! feed its raw statement lines through [`filter_ddl_lines`] to get the
//! subset worth surfacing in a migration report.

/// Keep only lines that are actually DDL (`ALTER`/`CREATE`/`DROP`), stripping
/// a leading `Executing (default): ` prefix first if present.
pub fn filter_ddl_lines<'a, I>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    const PREFIX: &str = "Executing (default): ";

    lines
        .into_iter()
        .filter_map(|line| {
            let stripped = line.strip_prefix(PREFIX).unwrap_or(line).trim();
            let first_token = stripped.split_whitespace().next()?;
            let is_ddl = matches!(
                first_token.to_ascii_uppercase().as_str(),
                "ALTER" | "CREATE" | "DROP"
            );
            is_ddl.then(|| stripped.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prefix_and_keeps_ddl_only() {
        let lines = vec![
            "Executing (default): ALTER TABLE users ADD COLUMN email varchar",
            "Executing (default): SELECT 1",
            "CREATE INDEX idx_users_email ON users (email)",
            "INSERT INTO users VALUES (1)",
        ];
        let kept = filter_ddl_lines(lines);
        assert_eq!(
            kept,
            vec![
                "ALTER TABLE users ADD COLUMN email varchar".to_string(),
                "CREATE INDEX idx_users_email ON users (email)".to_string(),
            ]
        );
    }

    #[test]
    fn case_insensitive_first_token() {
        let kept = filter_ddl_lines(vec!["drop table old_users"]);
        assert_eq!(kept, vec!["drop table old_users".to_string()]);
    }
}
