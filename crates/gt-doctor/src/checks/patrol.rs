use crate::check::{Category, Check, CheckResult, CheckStatus};
use crate::context::CheckContext;
use crate::error::FixError;
use gt_core::atomic_write;
use serde_json::{json, Map, Value};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::info;

/// `(role, formula)` for every patrol the daemon drives.
pub const PATROL_FORMULAS: [(&str, &str); 3] = [
    ("deacon", "mol-deacon-patrol"),
    ("witness", "mol-witness-patrol"),
    ("refinery", "mol-refinery-patrol"),
];

const DAEMON_FILE: &str = "daemon.json";

fn formulas_dir(ctx: &CheckContext<'_>) -> PathBuf {
    ctx.town.store_dir().join("formulas")
}

fn formula_readable(ctx: &CheckContext<'_>, formula: &str) -> Result<PathBuf, String> {
    let dir = formulas_dir(ctx);
    let mut last_err = None;
    for ext in ["toml", "json"] {
        let path = dir.join(format!("{formula}.formula.{ext}"));
        match fs::read_to_string(&path) {
            Ok(_) => return Ok(path),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => last_err = Some(format!("{}: {err}", path.display())),
        }
    }
    Err(last_err.unwrap_or_else(|| "not found".to_string()))
}

/// The patrol formulas are present and readable.
pub struct PatrolFormulasCheck;

impl Check for PatrolFormulasCheck {
    fn name(&self) -> &'static str {
        "patrol-formulas"
    }

    fn description(&self) -> &'static str {
        "Patrol formulas are readable"
    }

    fn category(&self) -> Category {
        Category::Patrol
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let mut missing = Vec::new();
        let mut details = Vec::new();
        for (_, formula) in PATROL_FORMULAS {
            if let Err(reason) = formula_readable(ctx, formula) {
                details.push(format!("{formula}: {reason}"));
                missing.push(formula);
            }
        }
        if missing.is_empty() {
            return CheckResult::ok(self, "all patrol formulas readable");
        }
        CheckResult::warning(self, format!("{} of {} patrol formulas unavailable", missing.len(), PATROL_FORMULAS.len()))
            .with_details(details)
            .with_hint(format!(
                "restore {} under {}",
                missing.join(", "),
                formulas_dir(ctx).display()
            ))
    }
}

/// `mayor/daemon.json` wires each patrol to its formula.
pub struct PatrolHooksCheck;

impl PatrolHooksCheck {
    fn daemon_path(ctx: &CheckContext<'_>) -> PathBuf {
        ctx.town.mayor_dir().join(DAEMON_FILE)
    }

    fn load(ctx: &CheckContext<'_>) -> Result<Option<Value>, String> {
        let path = Self::daemon_path(ctx);
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|err| format!("{}: {err}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(format!("{}: {err}", path.display())),
        }
    }

    fn problems(config: &Value) -> Vec<String> {
        let mut problems = Vec::new();
        for (role, formula) in PATROL_FORMULAS {
            let Some(entry) = config.pointer(&format!("/patrols/{role}")) else {
                problems.push(format!("{role}: no patrol entry"));
                continue;
            };
            if entry.get("enabled").and_then(Value::as_bool) != Some(true) {
                problems.push(format!("{role}: patrol disabled"));
            }
            match entry.get("formula").and_then(Value::as_str) {
                Some(found) if found == formula => {}
                Some(found) => problems.push(format!("{role}: uses formula {found}, expected {formula}")),
                None => problems.push(format!("{role}: no formula")),
            }
        }
        problems
    }
}

impl Check for PatrolHooksCheck {
    fn name(&self) -> &'static str {
        "patrol-hooks"
    }

    fn description(&self) -> &'static str {
        "Daemon config hooks every patrol to its formula"
    }

    fn category(&self) -> Category {
        Category::Patrol
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let config = match Self::load(ctx) {
            Ok(Some(config)) => config,
            Ok(None) => {
                return CheckResult::warning(self, format!("mayor/{DAEMON_FILE} not found"))
                    .with_hint("`gt-doctor fix` writes a default patrol configuration");
            }
            Err(err) => {
                return CheckResult::error(self, format!("cannot read mayor/{DAEMON_FILE}"))
                    .with_details(vec![err])
                    .with_hint("fix the JSON by hand; it is not overwritten automatically");
            }
        };
        let problems = Self::problems(&config);
        if problems.is_empty() {
            return CheckResult::ok(self, "all patrols hooked");
        }
        CheckResult::new(self, CheckStatus::Warning, "patrol hooks incomplete")
            .with_details(problems)
            .with_hint("`gt-doctor fix` adds missing entries; disabled patrols stay disabled")
    }

    fn can_fix(&self) -> bool {
        true
    }

    /// Adds missing patrol entries and formulas. Existing fields, including
    /// an explicit `enabled = false`, are left alone.
    fn fix(&self, ctx: &CheckContext<'_>) -> Result<(), FixError> {
        let mut config = Self::load(ctx)
            .map_err(FixError::Refused)?
            .unwrap_or_else(|| json!({}));
        let Some(root) = config.as_object_mut() else {
            return Err(FixError::Refused(format!("mayor/{DAEMON_FILE} is not a JSON object")));
        };
        let patrols = root
            .entry("patrols")
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(patrols) = patrols.as_object_mut() else {
            return Err(FixError::Refused("`patrols` is not a JSON object".to_string()));
        };
        for (role, formula) in PATROL_FORMULAS {
            let entry = patrols
                .entry(role)
                .or_insert_with(|| json!({ "enabled": true }));
            if let Some(entry) = entry.as_object_mut() {
                entry.entry("enabled").or_insert(Value::Bool(true));
                entry
                    .entry("formula")
                    .or_insert_with(|| Value::String(formula.to_string()));
            }
        }
        let path = Self::daemon_path(ctx);
        let rendered = serde_json::to_string_pretty(&config)
            .map_err(|err| FixError::Refused(err.to_string()))?;
        atomic_write(&path, &format!("{rendered}\n")).map_err(|source| FixError::Io {
            path: path.clone(),
            source,
        })?;
        info!(event = "patrol_hooks_written", path = %path.display());
        Ok(())
    }
}
