//! The built-in checks.
//!
//! Per-rig work follows one rule: a rig that cannot be probed becomes a
//! detail line on the result and the check moves on to the next rig.

mod agents;
mod drift;
mod patrol;
mod plugins;
mod redirects;
mod registry;
mod routes;
mod stuck;
mod tools;
mod wisps;

pub use agents::{AgentBeadsCheck, StaleAgentBeadsCheck};
pub use drift::{assess_drift, ExportStats, JsonlDriftCheck};
pub use patrol::{PatrolFormulasCheck, PatrolHooksCheck, PATROL_FORMULAS};
pub use plugins::PluginDirsCheck;
pub use redirects::RedirectTargetsCheck;
pub use registry::RigRegistryCheck;
pub use routes::RoutesCheck;
pub use stuck::{find_stuck, parse_timestamp, StuckItem, StuckWorkCheck};
pub use tools::DoltBinaryCheck;
pub use wisps::{MisclassifiedWispsCheck, WispSchemaCheck};

use crate::check::{Check, CheckResult};
use crate::context::CheckContext;
use gt_core::Rig;
use gt_storage::{BeadsDb, StorageError};
use std::path::PathBuf;

pub fn standard_checks() -> Vec<Box<dyn Check>> {
    vec![
        Box::new(DoltBinaryCheck),
        Box::new(RigRegistryCheck),
        Box::new(RoutesCheck),
        Box::new(RedirectTargetsCheck),
        Box::new(AgentBeadsCheck),
        Box::new(StaleAgentBeadsCheck),
        Box::new(PatrolFormulasCheck),
        Box::new(PatrolHooksCheck),
        Box::new(StuckWorkCheck),
        Box::new(PluginDirsCheck),
        Box::new(JsonlDriftCheck),
        Box::new(MisclassifiedWispsCheck),
        Box::new(WispSchemaCheck),
    ]
}

/// Rigs in scope, or the structural error result that ends the check.
pub(crate) fn rigs_or_error<C: Check + ?Sized>(
    check: &C,
    ctx: &CheckContext<'_>,
) -> Result<Vec<Rig>, CheckResult> {
    ctx.rigs().map_err(|err| {
        CheckResult::error(check, format!("cannot enumerate rigs: {err}"))
            .with_hint("check mayor/rigs.json")
    })
}

/// One store walked by the storage checks.
pub(crate) enum StoreUnit {
    Town,
    Rig(Rig),
}

impl StoreUnit {
    pub(crate) fn label(&self) -> &str {
        match self {
            StoreUnit::Town => "town",
            StoreUnit::Rig(rig) => &rig.name,
        }
    }

    /// Where the unit's data actually lives, after redirects.
    pub(crate) fn canonical_dir(&self, ctx: &CheckContext<'_>) -> Option<PathBuf> {
        match self {
            StoreUnit::Town => ctx.town_store_dir(),
            StoreUnit::Rig(rig) => ctx.rig_store_dir(rig),
        }
    }

    /// The unit's own `.beads`, used when nothing resolves.
    pub(crate) fn own_store_dir(&self, ctx: &CheckContext<'_>) -> PathBuf {
        match self {
            StoreUnit::Town => ctx.town.store_dir(),
            StoreUnit::Rig(rig) => rig.store_dir(),
        }
    }

    pub(crate) fn open(&self, ctx: &CheckContext<'_>) -> Result<Box<dyn BeadsDb>, StorageError> {
        match self {
            StoreUnit::Town => ctx.open_town_store(),
            StoreUnit::Rig(rig) => ctx.open_rig_store(rig),
        }
    }
}

/// The town store first, unless the run is scoped to one rig, then every
/// rig in scope.
pub(crate) fn store_units(ctx: &CheckContext<'_>, rigs: Vec<Rig>) -> Vec<StoreUnit> {
    let town = ctx.rig.is_none().then_some(StoreUnit::Town);
    town.into_iter().chain(rigs.into_iter().map(StoreUnit::Rig)).collect()
}

/// `1 rig` / `3 rigs`.
pub(crate) fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use gt_core::town::{SQLITE_FILE, STORE_DIR};
    use gt_storage::{BeadsDb, SqliteDb};
    use serde_json::json;
    use std::fs;
    use std::path::Path;

    /// Registers rigs as `(name, prefix)` and gives each a SQLite store in
    /// its mayor clone, with the rig-level store redirecting there.
    pub fn town_with_rigs(root: &Path, rigs: &[(&str, &str)]) {
        let mut entries = serde_json::Map::new();
        for (name, prefix) in rigs {
            entries.insert(
                name.to_string(),
                json!({"git_url": format!("https://example.com/{name}.git"), "beads": {"prefix": prefix}}),
            );
            let mayor_store = root.join(name).join("mayor/rig").join(STORE_DIR);
            fs::create_dir_all(&mayor_store).expect("mayor store");
            SqliteDb::open_or_init(mayor_store.join(SQLITE_FILE)).expect("init store");
            let rig_store = root.join(name).join(STORE_DIR);
            fs::create_dir_all(&rig_store).expect("rig store");
            fs::write(rig_store.join("redirect"), "../mayor/rig/.beads\n").expect("redirect");
        }
        fs::create_dir_all(root.join("mayor")).expect("mayor dir");
        fs::write(
            root.join("mayor/rigs.json"),
            serde_json::to_string(&json!({"version": 1, "rigs": entries})).expect("json"),
        )
        .expect("registry");
        let town_store = root.join(STORE_DIR);
        fs::create_dir_all(&town_store).expect("town store");
        SqliteDb::open_or_init(town_store.join(SQLITE_FILE)).expect("init town store");
    }

    pub fn rig_db(root: &Path, rig: &str) -> SqliteDb {
        SqliteDb::open(root.join(rig).join("mayor/rig").join(STORE_DIR).join(SQLITE_FILE))
            .expect("open rig store")
    }

    pub fn town_db(root: &Path) -> SqliteDb {
        SqliteDb::open(root.join(STORE_DIR).join(SQLITE_FILE)).expect("open town store")
    }

    pub fn insert_issue(db: &dyn BeadsDb, id: &str, title: &str, status: &str, issue_type: &str) {
        db.execute(&format!(
            "INSERT INTO issues (id, title, status, priority, issue_type, ephemeral, created_at, updated_at) \
             VALUES ('{id}', '{title}', '{status}', 2, '{issue_type}', 0, '2026-01-01 00:00:00', '2026-01-01 00:00:00')"
        ))
        .expect("insert issue");
    }

    pub fn add_label(db: &dyn BeadsDb, id: &str, label: &str) {
        db.execute(&format!(
            "INSERT INTO labels (issue_id, label) VALUES ('{id}', '{label}')"
        ))
        .expect("insert label");
    }
}
