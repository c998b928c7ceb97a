use crate::check::{Category, Check, CheckResult};
use crate::checks::{plural, rigs_or_error};
use crate::context::CheckContext;
use crate::error::FixError;
use gt_routing::{repair_for_rig, resolve, Target};

/// Every redirected worktree store resolves to a usable database.
pub struct RedirectTargetsCheck;

impl Check for RedirectTargetsCheck {
    fn name(&self) -> &'static str {
        "redirect-targets"
    }

    fn description(&self) -> &'static str {
        "Worktree redirects resolve to a canonical store"
    }

    fn category(&self) -> Category {
        Category::Routing
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let rigs = match rigs_or_error(self, ctx) {
            Ok(rigs) => rigs,
            Err(result) => return result,
        };
        let mut checked = 0;
        let mut broken = 0;
        let mut details = Vec::new();
        for rig in &rigs {
            let scan = rig.worktrees();
            details.extend(scan.unlisted.iter().map(|err| format!("{}: {err}", rig.name)));
            for worktree in scan.worktrees {
                checked += 1;
                let resolution = resolve(&worktree.path);
                if resolution.is_healthy() {
                    continue;
                }
                if let Target::Broken { path, reason } = &resolution.target {
                    broken += 1;
                    details.push(format!(
                        "{}/{}: {} ({reason}: {})",
                        rig.name,
                        worktree.kind,
                        resolution.chain(),
                        path.display()
                    ));
                }
            }
        }
        if details.is_empty() {
            return CheckResult::ok(self, format!("{} checked", plural(checked, "worktree")));
        }
        let result = CheckResult::warning(
            self,
            format!("{} with a broken redirect", plural(broken, "worktree")),
        )
        .with_details(details);
        if broken > 0 {
            result.with_hint("`gt-doctor fix` rewrites redirects to the rig's canonical store")
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
            for worktree in rig.worktrees().worktrees {
                if resolve(&worktree.path).is_healthy() {
                    continue;
                }
                if let Err(err) = repair_for_rig(&rig, &worktree) {
                    failures.push(format!("{}/{}: {err}", rig.name, worktree.kind));
                }
            }
        }
        FixError::collect(failures)
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
    fn broken_polecat_redirect_is_reported_and_repaired() {
        let dir = TempDir::new().expect("tempdir");
        town_with_rigs(dir.path(), &[("gastown", "gt")]);
        let polecat_store = dir.path().join("gastown/polecats/nux/.beads");
        fs::create_dir_all(&polecat_store).expect("polecat store");
        fs::write(polecat_store.join("redirect"), "../../.beads\n").expect("redirect");
        // a crew member with a store but no redirect is fine
        fs::create_dir_all(dir.path().join("gastown/crew/max/.beads")).expect("crew store");

        let opener = DefaultStoreOpener::default();
        let ctx = CheckContext::new(Town::new(dir.path()), &opener);
        let before = RedirectTargetsCheck.run(&ctx);
        assert_eq!(before.status, CheckStatus::Warning);
        assert_eq!(before.details.len(), 1);
        assert!(before.details[0].starts_with("gastown/polecats/nux:"));

        RedirectTargetsCheck.fix(&ctx).expect("fix");
        assert_eq!(RedirectTargetsCheck.run(&ctx).status, CheckStatus::Ok);
        assert_eq!(
            fs::read_to_string(polecat_store.join("redirect")).expect("read"),
            "../../../.beads\n"
        );
    }

    #[test]
    fn unlistable_crew_dir_is_a_detail() {
        let dir = TempDir::new().expect("tempdir");
        town_with_rigs(dir.path(), &[("gastown", "gt")]);
        fs::write(dir.path().join("gastown/crew"), "").expect("crew file");

        let opener = DefaultStoreOpener::default();
        let ctx = CheckContext::new(Town::new(dir.path()), &opener);
        let result = RedirectTargetsCheck.run(&ctx);
        assert_eq!(result.status, CheckStatus::Warning);
        assert_eq!(result.message, "0 worktrees with a broken redirect");
        assert_eq!(result.details.len(), 1);
        assert!(result.details[0].starts_with("gastown: cannot list "));
        assert!(result.fix_hint.is_none());
    }

    #[test]
    fn unrepairable_worktrees_are_aggregated() {
        let dir = TempDir::new().expect("tempdir");
        town_with_rigs(dir.path(), &[("gastown", "gt"), ("beads", "bd")]);
        for rig in ["gastown", "beads"] {
            // no canonical store left for either rig
            fs::remove_dir_all(dir.path().join(rig).join("mayor")).expect("remove mayor clone");
        }
        let opener = DefaultStoreOpener::default();
        let ctx = CheckContext::new(Town::new(dir.path()), &opener);
        let err = RedirectTargetsCheck.fix(&ctx).expect_err("nothing to point at");
        match err {
            FixError::Multiple(messages) => assert_eq!(messages.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
