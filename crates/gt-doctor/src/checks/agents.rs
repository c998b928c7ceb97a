use crate::check::{Category, Check, CheckResult, CheckStatus};
use crate::checks::{plural, rigs_or_error};
use crate::context::CheckContext;
use crate::doctor::worst;
use crate::error::FixError;
use chrono::Utc;
use gt_core::{agent_bead_id, parse_agent_bead_id, AgentRole, ListingError, Rig, AGENT_LABEL};
use gt_storage::schema::{ISSUES_TABLE, WISPS_TABLE};
use gt_storage::{BeadsDb, StorageError};
use std::collections::BTreeSet;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExpectedAgent {
    id: String,
    role: AgentRole,
    rig: Option<String>,
    worker: Option<String>,
}

impl ExpectedAgent {
    fn title(&self) -> String {
        match (&self.rig, &self.worker) {
            (Some(rig), Some(worker)) => format!("{} {worker} ({rig})", self.role),
            (Some(rig), None) => format!("{} ({rig})", self.role),
            _ => self.role.to_string(),
        }
    }
}

/// One store and the agent beads that should live in it.
struct AgentUnit {
    label: String,
    rig: Option<Rig>,
    expected: Vec<ExpectedAgent>,
}

#[derive(Debug, Default)]
struct AgentPresence {
    labeled: BTreeSet<String>,
    unlabeled: BTreeSet<String>,
    ephemeral: BTreeSet<String>,
}

impl AgentPresence {
    fn exists(&self, id: &str) -> bool {
        self.labeled.contains(id) || self.unlabeled.contains(id) || self.ephemeral.contains(id)
    }
}

fn town_agents() -> Vec<ExpectedAgent> {
    [AgentRole::Mayor, AgentRole::Deacon]
        .into_iter()
        .map(|role| ExpectedAgent {
            id: agent_bead_id("", "", role, None),
            role,
            rig: None,
            worker: None,
        })
        .collect()
}

/// Worker names per role, `None` where the directory could not be listed.
struct LiveWorkers {
    crew: Option<Vec<String>>,
    polecats: Option<Vec<String>>,
}

impl LiveWorkers {
    fn scan(rig: &Rig, notes: &mut Vec<String>) -> Self {
        let mut note = |result: Result<Vec<String>, ListingError>| match result {
            Ok(names) => Some(names),
            Err(err) => {
                notes.push(format!("{}: {err}, workers not checked", rig.name));
                None
            }
        };
        Self {
            crew: note(rig.crew_names()),
            polecats: note(rig.polecat_names()),
        }
    }

    /// `None` when the role's directory is unreadable and liveness unknown.
    fn is_live(&self, role: AgentRole, worker: &str) -> Option<bool> {
        let names = match role {
            AgentRole::Crew => self.crew.as_ref(),
            AgentRole::Polecat => self.polecats.as_ref(),
            _ => return Some(true),
        };
        names.map(|names| names.iter().any(|name| name == worker))
    }
}

fn rig_agents(rig: &Rig, prefix: &str, notes: &mut Vec<String>) -> Vec<ExpectedAgent> {
    let workers = LiveWorkers::scan(rig, notes);
    let mut slots: Vec<(AgentRole, Option<String>)> =
        vec![(AgentRole::Witness, None), (AgentRole::Refinery, None)];
    if rig.has_librarian() {
        slots.push((AgentRole::Librarian, None));
    }
    for (role, names) in [
        (AgentRole::Crew, workers.crew),
        (AgentRole::Polecat, workers.polecats),
    ] {
        slots.extend(names.unwrap_or_default().into_iter().map(|name| (role, Some(name))));
    }
    slots
        .into_iter()
        .map(|(role, worker)| ExpectedAgent {
            id: agent_bead_id(prefix, &rig.name, role, worker.as_deref()),
            role,
            rig: Some(rig.name.clone()),
            worker,
        })
        .collect()
}

/// Which expected ids exist, and whether the persisted copies are labeled.
/// The ephemeral listing carries no labels, so those copies only count
/// toward existence.
fn probe_agents(db: &dyn BeadsDb, expected: &[ExpectedAgent]) -> Result<AgentPresence, StorageError> {
    let mut presence = AgentPresence::default();
    if expected.is_empty() {
        return Ok(presence);
    }
    let dialect = db.dialect();
    let ids = dialect.quote_list(expected.iter().map(|agent| agent.id.as_str()));
    let label = dialect.quote(AGENT_LABEL);
    let rows = db.query(&format!(
        "SELECT i.id AS id, (SELECT COUNT(*) FROM labels l WHERE l.issue_id = i.id AND l.label = {label}) AS labeled \
         FROM {ISSUES_TABLE} i WHERE i.id IN ({ids})"
    ))?;
    for row in rows.iter() {
        let id = row.text("id").to_string();
        if row.text("labeled").trim().parse::<u64>().unwrap_or(0) > 0 {
            presence.labeled.insert(id);
        } else {
            presence.unlabeled.insert(id);
        }
    }
    if db.table_exists(WISPS_TABLE)? {
        let rows = db.query(&format!("SELECT id FROM {WISPS_TABLE} WHERE id IN ({ids})"))?;
        presence
            .ephemeral
            .extend(rows.iter().map(|row| row.text("id").to_string()));
    }
    Ok(presence)
}

fn agent_units(ctx: &CheckContext<'_>, rigs: Vec<Rig>, notes: &mut Vec<String>) -> Vec<AgentUnit> {
    let mut units = Vec::new();
    if ctx.rig.is_none() {
        units.push(AgentUnit {
            label: "town".to_string(),
            rig: None,
            expected: town_agents(),
        });
    }
    for rig in rigs {
        let Some(prefix) = rig.prefix.clone() else {
            notes.push(format!("{}: no beads prefix, agent beads not checked", rig.name));
            continue;
        };
        units.push(AgentUnit {
            label: rig.name.clone(),
            expected: rig_agents(&rig, &prefix, notes),
            rig: Some(rig),
        });
    }
    units
}

fn open_unit_store(ctx: &CheckContext<'_>, unit: &AgentUnit) -> Result<Box<dyn BeadsDb>, StorageError> {
    match &unit.rig {
        Some(rig) => ctx.open_rig_store(rig),
        None => ctx.open_town_store(),
    }
}

/// Every live agent role has a bead, and persisted beads carry `gt:agent`.
pub struct AgentBeadsCheck;

impl Check for AgentBeadsCheck {
    fn name(&self) -> &'static str {
        "agent-beads"
    }

    fn description(&self) -> &'static str {
        "Agent beads exist and are labeled"
    }

    fn category(&self) -> Category {
        Category::Agents
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let rigs = match rigs_or_error(self, ctx) {
            Ok(rigs) => rigs,
            Err(result) => return result,
        };
        let mut notes = Vec::new();
        let units = agent_units(ctx, rigs, &mut notes);
        let mut statuses = vec![];
        let mut details = Vec::new();
        let (mut expected_total, mut missing_total, mut unlabeled_total) = (0, 0, 0);
        if !notes.is_empty() {
            statuses.push(CheckStatus::Warning);
            details.append(&mut notes);
        }

        for unit in &units {
            expected_total += unit.expected.len();
            let presence = match open_unit_store(ctx, unit)
                .and_then(|db| probe_agents(db.as_ref(), &unit.expected))
            {
                Ok(presence) => presence,
                Err(err) => {
                    statuses.push(CheckStatus::Warning);
                    details.push(format!("{}: cannot query store: {err}", unit.label));
                    continue;
                }
            };
            for agent in &unit.expected {
                if !presence.exists(&agent.id) {
                    missing_total += 1;
                    statuses.push(CheckStatus::Error);
                    details.push(format!("{}: missing {}", unit.label, agent.id));
                } else if presence.unlabeled.contains(&agent.id) {
                    unlabeled_total += 1;
                    statuses.push(CheckStatus::Warning);
                    details.push(format!("{}: {} lacks label {AGENT_LABEL}", unit.label, agent.id));
                }
            }
        }

        let status = worst(statuses);
        if status == CheckStatus::Ok {
            return CheckResult::ok(self, format!("{} present", plural(expected_total, "agent bead")));
        }
        CheckResult::new(
            self,
            status,
            format!("{missing_total} missing, {unlabeled_total} unlabeled agent beads"),
        )
        .with_details(details)
        .with_hint("`gt-doctor fix` creates missing beads and adds missing labels")
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn fix(&self, ctx: &CheckContext<'_>) -> Result<(), FixError> {
        let rigs = ctx.rigs()?;
        let mut notes = Vec::new();
        let units = agent_units(ctx, rigs, &mut notes);
        let mut failures = Vec::new();
        for unit in &units {
            if let Err(err) = fix_unit(ctx, unit) {
                failures.push(format!("{}: {err}", unit.label));
            }
        }
        FixError::collect(failures)
    }
}

fn fix_unit(ctx: &CheckContext<'_>, unit: &AgentUnit) -> Result<(), StorageError> {
    let db = open_unit_store(ctx, unit)?;
    let presence = probe_agents(db.as_ref(), &unit.expected)?;
    let dialect = db.dialect();
    let insert_ignore = dialect.insert_ignore();
    let label = dialect.quote(AGENT_LABEL);
    let now = dialect.quote(&Utc::now().format("%Y-%m-%d %H:%M:%S").to_string());
    let mut changed = 0;
    for agent in &unit.expected {
        let id = dialect.quote(&agent.id);
        if !presence.exists(&agent.id) {
            // Created flagged; the wisp-schema check moves it out of `issues`.
            db.execute(&format!(
                "INSERT INTO {ISSUES_TABLE} (id, title, status, priority, issue_type, ephemeral, created_at, updated_at) \
                 VALUES ({id}, {}, 'open', 2, 'agent', 1, {now}, {now})",
                dialect.quote(&agent.title())
            ))?;
        } else if !presence.unlabeled.contains(&agent.id) {
            continue;
        }
        db.execute(&format!(
            "{insert_ignore} INTO labels (issue_id, label) VALUES ({id}, {label})"
        ))?;
        changed += 1;
    }
    if changed > 0 {
        db.commit("doctor: create and label agent beads")?;
        info!(event = "agent_beads_fixed", store = %unit.label, count = changed);
    }
    Ok(())
}

/// Open worker beads whose crew or polecat directory is gone.
pub struct StaleAgentBeadsCheck;

#[derive(Debug, Clone, PartialEq, Eq)]
struct StaleBead {
    id: String,
    table: &'static str,
}

fn stale_beads(
    db: &dyn BeadsDb,
    rig: &Rig,
    prefix: &str,
    workers: &LiveWorkers,
) -> Result<Vec<StaleBead>, StorageError> {
    let dialect = db.dialect();
    let pattern = dialect.quote(&format!("{prefix}-%"));
    let mut tables = vec![ISSUES_TABLE];
    if db.table_exists(WISPS_TABLE)? {
        tables.push(WISPS_TABLE);
    }
    let mut stale = Vec::new();
    for table in tables {
        let rows = db.query(&format!(
            "SELECT id FROM {table} WHERE id LIKE {pattern} AND status NOT IN ('closed', 'tombstone') ORDER BY id"
        ))?;
        for row in rows.iter() {
            let id = row.text("id");
            let Some(parsed) = parse_agent_bead_id(id, prefix, &rig.name) else {
                continue;
            };
            let Some(worker) = parsed.worker.as_deref() else {
                continue;
            };
            if workers.is_live(parsed.role, worker) == Some(false) {
                stale.push(StaleBead {
                    id: id.to_string(),
                    table,
                });
            }
        }
    }
    Ok(stale)
}

impl Check for StaleAgentBeadsCheck {
    fn name(&self) -> &'static str {
        "stale-agent-beads"
    }

    fn description(&self) -> &'static str {
        "No open agent beads for removed workers"
    }

    fn category(&self) -> Category {
        Category::Agents
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let rigs = match rigs_or_error(self, ctx) {
            Ok(rigs) => rigs,
            Err(result) => return result,
        };
        let mut details = Vec::new();
        let mut stale_total = 0;
        for rig in &rigs {
            let Some(prefix) = rig.prefix.as_deref() else {
                details.push(format!("{}: no beads prefix, skipped", rig.name));
                continue;
            };
            let workers = LiveWorkers::scan(rig, &mut details);
            match ctx
                .open_rig_store(rig)
                .and_then(|db| stale_beads(db.as_ref(), rig, prefix, &workers))
            {
                Ok(stale) => {
                    stale_total += stale.len();
                    details.extend(
                        stale
                            .into_iter()
                            .map(|bead| format!("{}: {} ({})", rig.name, bead.id, bead.table)),
                    );
                }
                Err(err) => details.push(format!("{}: cannot query store: {err}", rig.name)),
            }
        }
        if details.is_empty() {
            return CheckResult::ok(self, "no stale agent beads");
        }
        let result = CheckResult::warning(self, format!("{} stale", plural(stale_total, "agent bead")))
            .with_details(details);
        if stale_total > 0 {
            result.with_hint("`gt-doctor fix` closes beads of removed workers")
        } else {
            result
        }
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn fix(&self, ctx: &CheckContext<'_>) -> Result<(), FixError> {
        let mut failures = Vec::new();
        for rig in ctx.rigs()? {
            let Some(prefix) = rig.prefix.as_deref() else {
                continue;
            };
            let workers = LiveWorkers::scan(&rig, &mut Vec::new());
            let result = ctx.open_rig_store(&rig).and_then(|db| {
                let stale = stale_beads(db.as_ref(), &rig, prefix, &workers)?;
                if stale.is_empty() {
                    return Ok(());
                }
                let dialect = db.dialect();
                for table in [ISSUES_TABLE, WISPS_TABLE] {
                    let ids: Vec<&str> = stale
                        .iter()
                        .filter(|bead| bead.table == table)
                        .map(|bead| bead.id.as_str())
                        .collect();
                    if ids.is_empty() {
                        continue;
                    }
                    db.execute(&format!(
                        "UPDATE {table} SET status = 'closed', closed_at = CURRENT_TIMESTAMP WHERE id IN ({})",
                        dialect.quote_list(ids)
                    ))?;
                }
                db.commit("doctor: close stale agent beads")?;
                info!(event = "stale_agent_beads_closed", rig = %rig.name, count = stale.len());
                Ok(())
            });
            if let Err(err) = result {
                failures.push(format!("{}: {err}", rig.name));
            }
        }
        FixError::collect(failures)
    }
}
