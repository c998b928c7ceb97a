use crate::check::{Category, Check, CheckResult, CheckStatus};
use crate::checks::rigs_or_error;
use crate::context::CheckContext;
use crate::doctor::worst;
use crate::error::FixError;
use std::fs;
use std::path::Path;
use tracing::info;

const PLUGINS_DIR: &str = "plugins";

/// `Ok(false)` when absent; `Err` when present but unusable.
fn inspect(dir: &Path) -> Result<bool, String> {
    if !dir.exists() {
        return Ok(false);
    }
    if !dir.is_dir() {
        return Err(format!("{} is not a directory", dir.display()));
    }
    fs::read_dir(dir)
        .map(|_| true)
        .map_err(|err| format!("{} is not readable: {err}", dir.display()))
}

/// Plugin directories exist and can be listed.
pub struct PluginDirsCheck;

impl Check for PluginDirsCheck {
    fn name(&self) -> &'static str {
        "plugin-dirs"
    }

    fn description(&self) -> &'static str {
        "Plugin directories are accessible"
    }

    fn category(&self) -> Category {
        Category::Core
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let mut statuses = Vec::new();
        let mut details = Vec::new();
        let mut hint = None;

        match inspect(&ctx.town.root().join(PLUGINS_DIR)) {
            Ok(true) => {}
            Ok(false) => {
                statuses.push(CheckStatus::Warning);
                details.push("town plugins directory missing".to_string());
                hint = Some("`gt-doctor fix` creates the town plugins directory");
            }
            Err(reason) => {
                statuses.push(CheckStatus::Error);
                details.push(reason);
            }
        }

        match rigs_or_error(self, ctx) {
            Ok(rigs) => {
                for rig in rigs {
                    if let Err(reason) = inspect(&rig.path.join(PLUGINS_DIR)) {
                        statuses.push(CheckStatus::Error);
                        details.push(format!("{}: {reason}", rig.name));
                    }
                }
            }
            Err(result) => {
                statuses.push(CheckStatus::Warning);
                details.push(format!("rig plugin dirs not checked: {}", result.message));
            }
        }

        match worst(statuses) {
            CheckStatus::Ok => CheckResult::ok(self, "plugin directories accessible"),
            status => {
                let result = CheckResult::new(self, status, "plugin directories need attention")
                    .with_details(details);
                match hint {
                    Some(hint) => result.with_hint(hint),
                    None => result,
                }
            }
        }
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn fix(&self, ctx: &CheckContext<'_>) -> Result<(), FixError> {
        let dir = ctx.town.root().join(PLUGINS_DIR);
        if dir.exists() {
            return Ok(());
        }
        fs::create_dir_all(&dir).map_err(|source| FixError::Io {
            path: dir.clone(),
            source,
        })?;
        info!(event = "plugins_dir_created", path = %dir.display());
        Ok(())
    }
}
