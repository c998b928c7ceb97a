use crate::check::{Category, Check, CheckResult, CheckStatus};
use crate::checks::{rigs_or_error, store_units};
use crate::config::DoctorConfig;
use crate::context::CheckContext;
use crate::doctor::worst;
use gt_core::town::EXPORT_FILE;
use gt_core::Issue;
use gt_storage::schema::ISSUES_TABLE;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub total: u64,
    pub ephemeral: u64,
}

impl ExportStats {
    /// Counts non-blank lines; lines that do not parse still count toward
    /// the total.
    pub fn from_jsonl(content: &str) -> Self {
        let mut stats = Self::default();
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            stats.total += 1;
            if serde_json::from_str::<Issue>(line).map_or(false, |issue| issue.ephemeral) {
                stats.ephemeral += 1;
            }
        }
        stats
    }

    pub fn load(path: &Path) -> io::Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(Self::from_jsonl(&content))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Describes the bloat, if any, of an export relative to the live store.
pub fn assess_drift(export: ExportStats, live: u64, config: &DoctorConfig) -> Option<String> {
    let baseline = live.max(1) as f64;
    if export.total as f64 > config.drift_ratio * baseline {
        return Some(format!(
            "export has {} rows vs {live} live ({:.1}x)",
            export.total,
            export.total as f64 / baseline
        ));
    }
    if export.total > 0 && export.ephemeral as f64 / export.total as f64 > config.ephemeral_fraction {
        return Some(format!(
            "{} of {} exported rows are ephemeral",
            export.ephemeral, export.total
        ));
    }
    None
}

/// The git-tracked export is not polluted by ephemeral churn.
pub struct JsonlDriftCheck;

impl Check for JsonlDriftCheck {
    fn name(&self) -> &'static str {
        "jsonl-drift"
    }

    fn description(&self) -> &'static str {
        "Git-tracked export stays in line with the live store"
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
        let mut bloated = 0;
        for unit in store_units(ctx, rigs) {
            let label = unit.label();
            let Some(store_dir) = unit.canonical_dir(ctx) else {
                statuses.push(CheckStatus::Warning);
                details.push(format!("{label}: no canonical store"));
                continue;
            };
            let export = match ExportStats::load(&store_dir.join(EXPORT_FILE)) {
                Ok(Some(export)) => export,
                Ok(None) => {
                    details.push(format!("{label}: no {EXPORT_FILE}, skipped"));
                    continue;
                }
                Err(err) => {
                    statuses.push(CheckStatus::Warning);
                    details.push(format!("{label}: cannot read {EXPORT_FILE}: {err}"));
                    continue;
                }
            };
            let live = unit
                .open(ctx)
                .and_then(|db| db.count(&format!("SELECT COUNT(*) FROM {ISSUES_TABLE}")));
            match live {
                Ok(live) => {
                    if let Some(finding) = assess_drift(export, live, &ctx.config) {
                        bloated += 1;
                        statuses.push(CheckStatus::Warning);
                        details.push(format!("{label}: {finding}"));
                    }
                }
                Err(err) => {
                    statuses.push(CheckStatus::Warning);
                    details.push(format!("{label}: cannot count live rows: {err}"));
                }
            }
        }
        match worst(statuses) {
            CheckStatus::Ok => CheckResult::ok(self, "exports in line with live stores").with_details(details),
            status => {
                let result = CheckResult::new(self, status, format!("{bloated} bloated export(s)"))
                    .with_details(details);
                if bloated > 0 {
                    result.with_hint("move ephemeral records out with `gt-doctor migrate-wisps`")
                } else {
                    result
                }
            }
        }
    }
}
