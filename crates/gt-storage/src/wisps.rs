use crate::db::BeadsDb;
use crate::schema::{
    create_issue_table_sql, issue_column_list, AUX_RELATIONS, ISSUES_TABLE, WISPS_TABLE,
};
use crate::StorageError;
use tracing::{debug, info, warn};

/// Which persisted rows a migration moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Rows already flagged `ephemeral = 1` that still live in `issues`.
    FlaggedEphemeral,
    /// Explicit ids, e.g. misclassified records found by a scan.
    Ids(Vec<String>),
}

impl Selection {
    fn predicate(&self, db: &dyn BeadsDb) -> Option<String> {
        match self {
            Selection::FlaggedEphemeral => Some("ephemeral = 1".to_string()),
            Selection::Ids(ids) if ids.is_empty() => None,
            Selection::Ids(ids) => Some(format!(
                "id IN ({})",
                db.dialect().quote_list(ids.iter().map(String::as_str))
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub dry_run: bool,
    pub commit_message: String,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            commit_message: "doctor: move ephemeral records to wisps".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub schema_created: bool,
    pub aux_created: Vec<String>,
    /// Persisted rows matching the selection when the run started.
    pub candidates: u64,
    /// Rows newly inserted into `wisps` (existing ids are skipped).
    pub copied: u64,
    /// Rows removed from `issues`.
    pub purged: u64,
    /// Open rows left in `issues` that were closed instead of purged.
    pub closed: u64,
    pub committed: bool,
    /// Best-effort steps that failed without aborting the run.
    pub warnings: Vec<String>,
}

/// Moves persisted records into the ephemeral schema.
///
/// Every step is idempotent: tables are created only when missing, rows are
/// copied insert-if-absent keyed by id, and a child row is deleted only once
/// its copy is in place and always before its parent. Children whose key is
/// already taken on the wisp side are left in the persisted table and
/// reported in [`MigrationReport::warnings`].
pub struct WispMigrator<'a> {
    db: &'a dyn BeadsDb,
}

impl<'a> WispMigrator<'a> {
    pub fn new(db: &'a dyn BeadsDb) -> Self {
        Self { db }
    }

    /// Creates `wisps` when it does not exist. Returns whether it was created.
    pub fn ensure_wisps_table(&self) -> Result<bool, StorageError> {
        if self.db.table_exists(WISPS_TABLE)? {
            return Ok(false);
        }
        self.db.execute(&create_issue_table_sql(WISPS_TABLE))?;
        info!(table = WISPS_TABLE, "wisp_schema_created");
        Ok(true)
    }

    /// Creates each missing auxiliary wisp relation independently. Failures
    /// are returned as warnings so one bad relation does not block the rest.
    pub fn ensure_aux_tables(&self) -> (Vec<String>, Vec<String>) {
        let mut created = Vec::new();
        let mut warnings = Vec::new();
        for aux in AUX_RELATIONS {
            let result = self.db.table_exists(aux.ephemeral).and_then(|exists| {
                if exists {
                    Ok(false)
                } else {
                    self.db.execute(&aux.create_sql(aux.ephemeral)).map(|_| true)
                }
            });
            match result {
                Ok(true) => created.push(aux.ephemeral.to_string()),
                Ok(false) => {}
                Err(err) => warnings.push(format!("create {}: {err}", aux.ephemeral)),
            }
        }
        (created, warnings)
    }

    /// True when `wisps` and all four auxiliary relations exist.
    pub fn schema_complete(&self) -> Result<bool, StorageError> {
        if !self.db.table_exists(WISPS_TABLE)? {
            return Ok(false);
        }
        for aux in AUX_RELATIONS {
            if !self.db.table_exists(aux.ephemeral)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn migrate(
        &self,
        selection: &Selection,
        options: &MigrationOptions,
    ) -> Result<MigrationReport, StorageError> {
        let mut report = MigrationReport {
            dry_run: options.dry_run,
            ..MigrationReport::default()
        };

        // 1-2: schema
        report.schema_created = self.ensure_wisps_table()?;
        let (aux_created, aux_warnings) = self.ensure_aux_tables();
        report.aux_created = aux_created;
        report.warnings.extend(aux_warnings);

        let Some(predicate) = selection.predicate(self.db) else {
            return Ok(report);
        };
        report.candidates = self.count_issues(&predicate)?;
        debug!(candidates = report.candidates, dry_run = options.dry_run, "wisp_migration_scan");
        if options.dry_run || report.candidates == 0 {
            return Ok(report);
        }

        let insert = self.db.dialect().insert_ignore();
        let selected_ids = format!("SELECT id FROM {ISSUES_TABLE} WHERE {predicate}");

        // 3: copy primary rows, never overwriting an existing wisp
        let before = self.db.count(&format!("SELECT COUNT(*) FROM {WISPS_TABLE}"))?;
        let columns = issue_column_list();
        self.db.execute(&format!(
            "{insert} INTO {WISPS_TABLE} ({columns}) SELECT {columns} FROM {ISSUES_TABLE} WHERE {predicate}"
        ))?;
        self.db.execute(&format!(
            "UPDATE {WISPS_TABLE} SET ephemeral = 1 WHERE id IN ({selected_ids})"
        ))?;
        let after = self.db.count(&format!("SELECT COUNT(*) FROM {WISPS_TABLE}"))?;
        report.copied = after.saturating_sub(before);

        // 4: copy children whose parent is now a wisp
        let migrated_parent = format!(
            "issue_id IN ({selected_ids}) AND issue_id IN (SELECT id FROM {WISPS_TABLE})"
        );
        for aux in AUX_RELATIONS {
            let columns = aux.column_list();
            let sql = format!(
                "{insert} INTO {} ({columns}) SELECT {columns} FROM {} WHERE {migrated_parent}",
                aux.ephemeral, aux.persisted
            );
            if let Err(err) = self.db.execute(&sql) {
                warn!(table = aux.persisted, error = %err, "wisp_aux_copy_failed");
                report.warnings.push(format!("copy {}: {err}", aux.persisted));
            }
        }

        // 5: delete children that reached the wisp side, then the parents.
        // A child whose key is already taken there stays where it is.
        for aux in AUX_RELATIONS {
            let sql = format!(
                "DELETE FROM {} WHERE {migrated_parent} AND {}",
                aux.persisted,
                aux.copied_predicate()
            );
            if let Err(err) = self.db.execute(&sql) {
                warn!(table = aux.persisted, error = %err, "wisp_aux_purge_failed");
                report.warnings.push(format!("purge {}: {err}", aux.persisted));
                continue;
            }
            let kept = self.db.count(&format!(
                "SELECT COUNT(*) FROM {} WHERE {migrated_parent}",
                aux.persisted
            ));
            match kept {
                Ok(0) => {}
                Ok(kept) => {
                    warn!(table = aux.persisted, kept, "wisp_aux_rows_kept");
                    report.warnings.push(format!(
                        "kept {kept} {} row(s) whose key is taken in {}",
                        aux.persisted, aux.ephemeral
                    ));
                }
                Err(err) => report.warnings.push(format!("recount {}: {err}", aux.persisted)),
            }
        }
        let remaining_before = self.count_issues(&predicate)?;
        self.db.execute(&format!(
            "DELETE FROM {ISSUES_TABLE} WHERE {predicate} AND id IN (SELECT id FROM {WISPS_TABLE})"
        ))?;
        let remaining = self.count_issues(&predicate)?;
        report.purged = remaining_before.saturating_sub(remaining);

        // 6: whatever could not be purged is at least closed
        report.closed = self.close_open(&predicate)?;

        // 7: record the change
        self.db.commit(&options.commit_message)?;
        report.committed = true;
        info!(
            copied = report.copied,
            purged = report.purged,
            closed = report.closed,
            warnings = report.warnings.len(),
            "wisp_migration_done"
        );
        Ok(report)
    }

    /// Degraded remediation for stores where the ephemeral schema cannot be
    /// created: flips the flag on matching rows in place. Never clears it.
    pub fn mark_ephemeral_in_place(&self, selection: &Selection) -> Result<u64, StorageError> {
        let Some(predicate) = selection.predicate(self.db) else {
            return Ok(0);
        };
        let unflagged = format!("{predicate} AND (ephemeral IS NULL OR ephemeral = 0)");
        let count = self.count_issues(&unflagged)?;
        if count == 0 {
            return Ok(0);
        }
        self.db.execute(&format!(
            "UPDATE {ISSUES_TABLE} SET ephemeral = 1 WHERE {unflagged}"
        ))?;
        self.db.commit("doctor: mark operational records ephemeral")?;
        Ok(count)
    }

    fn close_open(&self, predicate: &str) -> Result<u64, StorageError> {
        let open = format!("{predicate} AND status NOT IN ('closed', 'tombstone')");
        let count = self.count_issues(&open)?;
        if count > 0 {
            self.db.execute(&format!(
                "UPDATE {ISSUES_TABLE} SET status = 'closed', closed_at = CURRENT_TIMESTAMP WHERE {open}"
            ))?;
        }
        Ok(count)
    }

    fn count_issues(&self, predicate: &str) -> Result<u64, StorageError> {
        self.db
            .count(&format!("SELECT COUNT(*) FROM {ISSUES_TABLE} WHERE {predicate}"))
    }
}
