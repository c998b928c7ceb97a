use crate::check::{Category, Check, CheckResult};
use crate::checks::{plural, rigs_or_error};
use crate::context::CheckContext;

/// `mayor/rigs.json` loads and every registered rig exists on disk.
pub struct RigRegistryCheck;

impl Check for RigRegistryCheck {
    fn name(&self) -> &'static str {
        "rig-registry"
    }

    fn description(&self) -> &'static str {
        "Rig registry loads and lists existing rigs"
    }

    fn category(&self) -> Category {
        Category::Core
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let rigs = match rigs_or_error(self, ctx) {
            Ok(rigs) => rigs,
            Err(result) => return result,
        };
        let missing: Vec<String> = rigs
            .iter()
            .filter(|rig| !rig.path.is_dir())
            .map(|rig| format!("{}: directory {} missing", rig.name, rig.path.display()))
            .collect();
        if missing.is_empty() {
            return CheckResult::ok(self, format!("{} registered", plural(rigs.len(), "rig")));
        }
        CheckResult::error(self, format!("{} missing on disk", plural(missing.len(), "rig")))
            .with_details(missing)
            .with_hint("re-clone the rig or remove it from mayor/rigs.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckStatus;
    use crate::checks::testutil::town_with_rigs;
    use gt_core::Town;
    use gt_storage::DefaultStoreOpener;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_registry_is_structural_error() {
        let dir = TempDir::new().expect("tempdir");
        let opener = DefaultStoreOpener::default();
        let ctx = CheckContext::new(Town::new(dir.path()), &opener);
        let result = RigRegistryCheck.run(&ctx);
        assert_eq!(result.status, CheckStatus::Error);
        assert!(result.message.contains("cannot enumerate rigs"));
    }

    #[test]
    fn flags_registered_rig_without_directory() {
        let dir = TempDir::new().expect("tempdir");
        town_with_rigs(dir.path(), &[("gastown", "gt"), ("beads", "bd")]);
        let opener = DefaultStoreOpener::default();
        let ctx = CheckContext::new(Town::new(dir.path()), &opener);
        assert_eq!(RigRegistryCheck.run(&ctx).status, CheckStatus::Ok);

        fs::remove_dir_all(dir.path().join("beads")).expect("remove rig");
        let result = RigRegistryCheck.run(&ctx);
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.details.len(), 1);
        assert!(result.details[0].starts_with("beads:"));
    }
}
