use crate::check::{Category, Check, CheckResult, CheckStatus};
use crate::checks::{plural, rigs_or_error, store_units, StoreUnit};
use crate::context::CheckContext;
use crate::doctor::worst;
use crate::error::FixError;
use gt_core::town::EXPORT_FILE;
use gt_core::{should_be_ephemeral, EphemeralReason, Issue, IssueStatus};
use gt_storage::schema::{AUX_RELATIONS, ISSUES_TABLE, WISPS_TABLE};
use gt_storage::{BeadsDb, MigrationOptions, Selection, StorageError, WispMigrator};
use std::collections::HashMap;
use std::fs;
use tracing::{info, warn};

const OPEN_PERSISTED: &str =
    "status NOT IN ('closed', 'tombstone') AND (ephemeral IS NULL OR ephemeral = 0)";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    id: String,
    reason: EphemeralReason,
}

#[derive(Debug, Default)]
struct Scan {
    candidates: Vec<Candidate>,
    from_export: bool,
    unverified: usize,
}

fn scan_live(db: &dyn BeadsDb) -> Result<Vec<Candidate>, StorageError> {
    let rows = db.query(&format!(
        "SELECT id, title, issue_type FROM {ISSUES_TABLE} WHERE {OPEN_PERSISTED} ORDER BY id"
    ))?;
    let label_rows = db.query(&format!(
        "SELECT issue_id, label FROM labels WHERE issue_id IN \
         (SELECT id FROM {ISSUES_TABLE} WHERE {OPEN_PERSISTED})"
    ))?;
    let mut labels: HashMap<&str, Vec<String>> = HashMap::new();
    for row in label_rows.iter() {
        labels
            .entry(row.text("issue_id"))
            .or_default()
            .push(row.text("label").to_string());
    }
    Ok(rows
        .iter()
        .filter_map(|row| {
            let id = row.text("id");
            let row_labels = labels.get(id).map(Vec::as_slice).unwrap_or_default();
            should_be_ephemeral(id, row.text("issue_type"), row.text("title"), row_labels).map(
                |reason| Candidate {
                    id: id.to_string(),
                    reason,
                },
            )
        })
        .collect())
}

/// Whether a candidate from the export is still open and unflagged in the
/// live store.
fn still_open(db: &dyn BeadsDb, id: &str) -> Result<bool, StorageError> {
    let rows = db.query(&format!(
        "SELECT status, ephemeral FROM {ISSUES_TABLE} WHERE id = {}",
        db.dialect().quote(id)
    ))?;
    let open = rows.iter().next().map_or(false, |row| {
        let closed = row
            .text("status")
            .parse::<IssueStatus>()
            .map_or(false, |status| status.is_closed());
        !closed && row.text("ephemeral").trim() != "1"
    });
    Ok(open)
}

fn scan_export(
    ctx: &CheckContext<'_>,
    unit: &StoreUnit,
    db: Option<&dyn BeadsDb>,
) -> Result<Scan, String> {
    let store_dir = unit
        .canonical_dir(ctx)
        .unwrap_or_else(|| unit.own_store_dir(ctx));
    let export_path = store_dir.join(EXPORT_FILE);
    let content = fs::read_to_string(&export_path)
        .map_err(|err| format!("no usable {EXPORT_FILE}: {err}"))?;
    let mut scan = Scan {
        from_export: true,
        ..Scan::default()
    };
    for line in content.lines().filter(|line| !line.trim().is_empty()) {
        let Ok(issue) = serde_json::from_str::<Issue>(line) else {
            continue;
        };
        if issue.ephemeral || issue.status.is_closed() {
            continue;
        }
        let Some(reason) = should_be_ephemeral(&issue.id, &issue.issue_type, &issue.title, &issue.labels)
        else {
            continue;
        };
        match db.map(|db| still_open(db, &issue.id)) {
            Some(Ok(true)) => scan.candidates.push(Candidate { id: issue.id, reason }),
            Some(Ok(false)) => {}
            Some(Err(_)) | None => scan.unverified += 1,
        }
    }
    Ok(scan)
}

/// Live store first; the export is only read when the live scan fails.
fn scan_unit(ctx: &CheckContext<'_>, unit: &StoreUnit) -> Result<Scan, String> {
    match unit.open(ctx) {
        Ok(db) => match scan_live(db.as_ref()) {
            Ok(candidates) => Ok(Scan {
                candidates,
                ..Scan::default()
            }),
            Err(err) => {
                warn!(event = "misclassified_live_scan_failed", store = unit.label(), error = %err);
                scan_export(ctx, unit, Some(db.as_ref()))
                    .map_err(|reason| format!("live scan failed ({err}); {reason}"))
            }
        },
        Err(err) => scan_export(ctx, unit, None)
            .map_err(|reason| format!("store unreachable ({err}); {reason}")),
    }
}

/// Persisted records that should have been wisps.
pub struct MisclassifiedWispsCheck;

impl Check for MisclassifiedWispsCheck {
    fn name(&self) -> &'static str {
        "misclassified-wisps"
    }

    fn description(&self) -> &'static str {
        "Operational records are not stored as persisted issues"
    }

    fn category(&self) -> Category {
        Category::Storage
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let rigs = match rigs_or_error(self, ctx) {
            Ok(rigs) => rigs,
            Err(result) => return result,
        };
        let mut details = Vec::new();
        let mut found = 0;
        for unit in store_units(ctx, rigs) {
            let label = unit.label();
            let scan = match scan_unit(ctx, &unit) {
                Ok(scan) => scan,
                Err(reason) => {
                    details.push(format!("{label}: {reason}"));
                    continue;
                }
            };
            if scan.from_export {
                details.push(format!("{label}: live store unavailable, scanned {EXPORT_FILE}"));
            }
            if scan.unverified > 0 {
                details.push(format!(
                    "{label}: {} could not be verified against the live store",
                    plural(scan.unverified, "candidate")
                ));
            }
            found += scan.candidates.len();
            details.extend(
                scan.candidates
                    .into_iter()
                    .map(|c| format!("{label}: {} ({})", c.id, c.reason)),
            );
        }
        if details.is_empty() {
            return CheckResult::ok(self, "no misclassified records");
        }
        CheckResult::warning(self, format!("{} should be ephemeral", plural(found, "record")))
            .with_details(details)
            .with_hint("`gt-doctor fix` moves them to the wisps tables")
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn fix(&self, ctx: &CheckContext<'_>) -> Result<(), FixError> {
        let mut failures = Vec::new();
        for unit in store_units(ctx, ctx.rigs()?) {
            if let Err(err) = fix_misclassified(ctx, &unit) {
                failures.push(format!("{}: {err}", unit.label()));
            }
        }
        FixError::collect(failures)
    }
}

fn fix_misclassified(ctx: &CheckContext<'_>, unit: &StoreUnit) -> Result<(), StorageError> {
    let db = unit.open(ctx)?;
    let candidates = scan_live(db.as_ref())?;
    if candidates.is_empty() {
        return Ok(());
    }
    let selection = Selection::Ids(candidates.into_iter().map(|c| c.id).collect());
    let migrator = WispMigrator::new(db.as_ref());
    match migrator.ensure_wisps_table() {
        Ok(_) => {
            let report = migrator.migrate(&selection, &MigrationOptions::default())?;
            for warning in &report.warnings {
                warn!(event = "wisp_migration_warning", store = unit.label(), warning = %warning);
            }
            info!(event = "misclassified_migrated", store = unit.label(), copied = report.copied, purged = report.purged);
        }
        Err(err) => {
            warn!(event = "wisp_schema_unavailable", store = unit.label(), error = %err);
            let marked = migrator.mark_ephemeral_in_place(&selection)?;
            info!(event = "misclassified_marked", store = unit.label(), count = marked);
        }
    }
    Ok(())
}

/// The town store and each rig store have the complete wisp schema and no
/// flagged rows left in the persisted tables.
pub struct WispSchemaCheck;

fn schema_gaps(db: &dyn BeadsDb) -> Result<(Vec<&'static str>, u64), StorageError> {
    let mut missing = Vec::new();
    for table in std::iter::once(WISPS_TABLE).chain(AUX_RELATIONS.iter().map(|aux| aux.ephemeral)) {
        if !db.table_exists(table)? {
            missing.push(table);
        }
    }
    let flagged = db.count(&format!(
        "SELECT COUNT(*) FROM {ISSUES_TABLE} WHERE ephemeral = 1"
    ))?;
    Ok((missing, flagged))
}

impl Check for WispSchemaCheck {
    fn name(&self) -> &'static str {
        "wisp-schema"
    }

    fn description(&self) -> &'static str {
        "Ephemeral schema exists and holds all flagged records"
    }

    fn category(&self) -> Category {
        Category::Storage
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let rigs = match rigs_or_error(self, ctx) {
            Ok(rigs) => rigs,
            Err(result) => return result,
        };
        let mut statuses = Vec::new();
        let mut details = Vec::new();
        for unit in store_units(ctx, rigs) {
            let label = unit.label();
            match unit.open(ctx).and_then(|db| schema_gaps(db.as_ref())) {
                Ok((missing, flagged)) => {
                    if !missing.is_empty() {
                        statuses.push(CheckStatus::Warning);
                        details.push(format!("{label}: missing {}", missing.join(", ")));
                    }
                    if flagged > 0 {
                        statuses.push(CheckStatus::Warning);
                        details.push(format!(
                            "{label}: {} flagged ephemeral still in {ISSUES_TABLE}",
                            plural(flagged as usize, "row")
                        ));
                    }
                }
                Err(err) => {
                    statuses.push(CheckStatus::Warning);
                    details.push(format!("{label}: cannot inspect store: {err}"));
                }
            }
        }
        match worst(statuses) {
            CheckStatus::Ok => CheckResult::ok(self, "wisp schema complete"),
            status => CheckResult::new(self, status, "wisp schema incomplete")
                .with_details(details)
                .with_hint("`gt-doctor fix` or `gt-doctor migrate-wisps` completes the migration"),
        }
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn fix(&self, ctx: &CheckContext<'_>) -> Result<(), FixError> {
        let mut failures = Vec::new();
        for unit in store_units(ctx, ctx.rigs()?) {
            let result = unit.open(ctx).and_then(|db| {
                WispMigrator::new(db.as_ref())
                    .migrate(&Selection::FlaggedEphemeral, &MigrationOptions::default())
            });
            match result {
                Ok(report) if report.warnings.is_empty() => {}
                Ok(report) => failures.push(format!("{}: {}", unit.label(), report.warnings.join("; "))),
                Err(err) => failures.push(format!("{}: {err}", unit.label())),
            }
        }
        FixError::collect(failures)
    }
}
