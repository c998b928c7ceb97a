use crate::check::{Category, Check, CheckResult};
use crate::checks::{plural, rigs_or_error};
use crate::context::CheckContext;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use gt_storage::schema::ISSUES_TABLE;
use gt_storage::Rows;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckItem {
    pub id: String,
    pub title: String,
    pub assignee: String,
    pub idle: Duration,
}

/// Accepts the store's `YYYY-MM-DD HH:MM:SS` form (read as UTC) and
/// RFC 3339 timestamps.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// In-progress rows idle for longer than `threshold`. Rows whose timestamp
/// does not parse are skipped.
pub fn find_stuck(rows: &Rows, now: DateTime<Utc>, threshold: Duration) -> Vec<StuckItem> {
    rows.iter()
        .filter_map(|row| {
            let updated = row.get("updated_at").and_then(parse_timestamp);
            if updated.is_none() {
                debug!(event = "stuck_work_unparsed", id = row.text("id"));
            }
            let idle = now - updated?;
            (idle > threshold).then(|| StuckItem {
                id: row.text("id").to_string(),
                title: row.text("title").to_string(),
                assignee: row.text("assignee").to_string(),
                idle,
            })
        })
        .collect()
}

fn format_idle(idle: Duration) -> String {
    let hours = idle.num_hours();
    let minutes = idle.num_minutes() % 60;
    if hours >= 48 {
        format!("{}d", hours / 24)
    } else {
        format!("{hours}h{minutes:02}m")
    }
}

/// In-progress work that has not been touched for longer than the threshold.
pub struct StuckWorkCheck;

impl Check for StuckWorkCheck {
    fn name(&self) -> &'static str {
        "stuck-work"
    }

    fn description(&self) -> &'static str {
        "In-progress work is still moving"
    }

    fn category(&self) -> Category {
        Category::Work
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let rigs = match rigs_or_error(self, ctx) {
            Ok(rigs) => rigs,
            Err(result) => return result,
        };
        let threshold = ctx.config.stuck_threshold();
        let now = Utc::now();
        let mut details = Vec::new();
        let mut stuck_total = 0;
        for rig in &rigs {
            let rows = ctx.open_rig_store(rig).and_then(|db| {
                db.query(&format!(
                    "SELECT id, title, assignee, updated_at FROM {ISSUES_TABLE} \
                     WHERE status = 'in_progress' ORDER BY updated_at ASC"
                ))
            });
            match rows {
                Ok(rows) => {
                    for item in find_stuck(&rows, now, threshold) {
                        stuck_total += 1;
                        let owner = if item.assignee.is_empty() {
                            "unassigned".to_string()
                        } else {
                            item.assignee.clone()
                        };
                        details.push(format!(
                            "{}: {} {:?} idle {} ({owner})",
                            rig.name,
                            item.id,
                            item.title,
                            format_idle(item.idle)
                        ));
                    }
                }
                Err(err) => details.push(format!("{}: query failed: {err}", rig.name)),
            }
        }
        if details.is_empty() {
            return CheckResult::ok(
                self,
                format!("nothing in progress longer than {}m", threshold.num_minutes()),
            );
        }
        CheckResult::warning(self, format!("{} stuck", plural(stuck_total, "item")))
            .with_details(details)
            .with_hint("nudge the assignee or reset the item to open")
    }
}
