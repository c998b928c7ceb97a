//! Table layouts shared by the persisted and ephemeral schemas.
//!
//! The ephemeral (`wisp`) tables mirror the persisted columns one for one so
//! rows can be copied with `INSERT ... SELECT` and the same column list.

pub const ISSUES_TABLE: &str = "issues";
pub const WISPS_TABLE: &str = "wisps";

pub const ISSUE_COLUMNS: [&str; 11] = [
    "id",
    "title",
    "description",
    "status",
    "priority",
    "issue_type",
    "assignee",
    "ephemeral",
    "created_at",
    "updated_at",
    "closed_at",
];

/// One auxiliary relation hanging off an issue by `issue_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxRelation {
    pub persisted: &'static str,
    pub ephemeral: &'static str,
    pub columns: &'static [&'static str],
    /// Columns identifying one row across both tables.
    pub key: &'static [&'static str],
    column_defs: &'static str,
}

impl AuxRelation {
    pub fn column_list(&self) -> String {
        self.columns.join(", ")
    }

    pub fn create_sql(&self, table: &str) -> String {
        format!("CREATE TABLE IF NOT EXISTS {table} ({})", self.column_defs)
    }

    /// Predicate on the persisted table: the same row is present in the
    /// ephemeral twin.
    pub fn copied_predicate(&self) -> String {
        let matches: Vec<String> = self
            .key
            .iter()
            .map(|column| format!("w.{column} = {}.{column}", self.persisted))
            .collect();
        format!(
            "EXISTS (SELECT 1 FROM {} w WHERE {})",
            self.ephemeral,
            matches.join(" AND ")
        )
    }
}

pub const LABELS: AuxRelation = AuxRelation {
    persisted: "labels",
    ephemeral: "wisp_labels",
    columns: &["issue_id", "label"],
    key: &["issue_id", "label"],
    column_defs: "issue_id VARCHAR(255) NOT NULL, label VARCHAR(255) NOT NULL, \
                  PRIMARY KEY (issue_id, label)",
};

pub const COMMENTS: AuxRelation = AuxRelation {
    persisted: "comments",
    ephemeral: "wisp_comments",
    columns: &["id", "issue_id", "author", "text", "created_at"],
    key: &["id", "issue_id"],
    column_defs: "id BIGINT NOT NULL PRIMARY KEY, issue_id VARCHAR(255) NOT NULL, \
                  author VARCHAR(255), text TEXT, created_at DATETIME",
};

pub const EVENTS: AuxRelation = AuxRelation {
    persisted: "events",
    ephemeral: "wisp_events",
    columns: &[
        "id",
        "issue_id",
        "event_type",
        "actor",
        "old_value",
        "new_value",
        "comment",
        "created_at",
    ],
    key: &["id", "issue_id"],
    column_defs: "id BIGINT NOT NULL PRIMARY KEY, issue_id VARCHAR(255) NOT NULL, \
                  event_type VARCHAR(64), actor VARCHAR(255), old_value TEXT, \
                  new_value TEXT, comment TEXT, created_at DATETIME",
};

pub const DEPENDENCIES: AuxRelation = AuxRelation {
    persisted: "dependencies",
    ephemeral: "wisp_dependencies",
    columns: &["issue_id", "depends_on_id", "type", "created_at", "created_by"],
    key: &["issue_id", "depends_on_id"],
    column_defs: "issue_id VARCHAR(255) NOT NULL, depends_on_id VARCHAR(255) NOT NULL, \
                  type VARCHAR(64), created_at DATETIME, created_by VARCHAR(255), \
                  PRIMARY KEY (issue_id, depends_on_id)",
};

pub const AUX_RELATIONS: [AuxRelation; 4] = [LABELS, COMMENTS, EVENTS, DEPENDENCIES];

const ISSUE_COLUMN_DEFS: &str = "id VARCHAR(255) NOT NULL PRIMARY KEY, title TEXT, description TEXT, \
     status VARCHAR(32), priority INT, issue_type VARCHAR(32), assignee VARCHAR(255), \
     ephemeral TINYINT DEFAULT 0, created_at DATETIME, updated_at DATETIME, closed_at DATETIME";

pub fn issue_column_list() -> String {
    ISSUE_COLUMNS.join(", ")
}

pub fn create_issue_table_sql(table: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS {table} ({ISSUE_COLUMN_DEFS})")
}

/// DDL for a fresh persisted store: `issues` plus its four relations.
pub fn persisted_schema_ddl() -> String {
    let mut statements = vec![create_issue_table_sql(ISSUES_TABLE)];
    statements.extend(AUX_RELATIONS.iter().map(|aux| aux.create_sql(aux.persisted)));
    statements.join(";\n") + ";"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_tables_mirror_persisted_names() {
        for aux in AUX_RELATIONS {
            assert_eq!(aux.ephemeral, format!("wisp_{}", aux.persisted));
            assert_eq!(aux.columns.iter().filter(|c| **c == "issue_id").count(), 1);
        }
    }

    #[test]
    fn copied_predicate_matches_on_key_columns() {
        assert_eq!(
            COMMENTS.copied_predicate(),
            "EXISTS (SELECT 1 FROM wisp_comments w WHERE w.id = comments.id AND w.issue_id = comments.issue_id)"
        );
        for aux in AUX_RELATIONS {
            assert!(aux.key.iter().all(|column| aux.columns.contains(column)));
        }
    }

    #[test]
    fn persisted_ddl_creates_five_tables() {
        let ddl = persisted_schema_ddl();
        assert_eq!(ddl.matches("CREATE TABLE IF NOT EXISTS").count(), 5);
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS issues ("));
    }
}
