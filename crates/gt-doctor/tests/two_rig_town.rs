use gt_core::Town;
use gt_doctor::checks::RedirectTargetsCheck;
use gt_doctor::{CheckContext, CheckRegistry, CheckStatus, Doctor, DoctorConfig};
use gt_storage::{BeadsDb, DefaultStoreOpener, SqliteDb};
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Two rigs with one routing entry each. Each rig keeps its database in the
/// mayor clone and has one worker whose redirect points nowhere.
fn broken_town(root: &Path) {
    fs::create_dir_all(root.join("mayor")).expect("mayor dir");
    fs::write(
        root.join("mayor/rigs.json"),
        json!({
            "version": 1,
            "rigs": {
                "gastown": {"git_url": "https://example.com/gastown.git", "beads": {"prefix": "gt"}},
                "beads": {"git_url": "https://example.com/beads.git", "beads": {"prefix": "bd"}}
            }
        })
        .to_string(),
    )
    .expect("registry");

    fs::create_dir_all(root.join(".beads")).expect("town store");
    SqliteDb::open_or_init(root.join(".beads/beads.db")).expect("town db");
    fs::write(
        root.join(".beads/routes.jsonl"),
        "{\"prefix\":\"gt-\",\"path\":\"gastown/mayor/rig\"}\n{\"prefix\":\"bd-\",\"path\":\"beads/mayor/rig\"}\n",
    )
    .expect("routes");

    for (rig, worker) in [("gastown", "crew/max"), ("beads", "polecats/nux")] {
        let canonical = root.join(rig).join("mayor/rig/.beads");
        fs::create_dir_all(&canonical).expect("canonical store");
        SqliteDb::open_or_init(canonical.join("beads.db")).expect("rig db");
        fs::create_dir_all(root.join(rig).join(".beads")).expect("rig store");
        fs::write(root.join(rig).join(".beads/redirect"), "../mayor/rig/.beads\n")
            .expect("rig redirect");

        let worker_store = root.join(rig).join(worker).join(".beads");
        fs::create_dir_all(&worker_store).expect("worker store");
        fs::write(worker_store.join("redirect"), "../../gone/.beads\n").expect("worker redirect");
    }
}

fn read_redirects(root: &Path) -> Vec<String> {
    ["gastown/crew/max", "beads/polecats/nux"]
        .iter()
        .map(|worker| {
            fs::read_to_string(root.join(worker).join(".beads/redirect")).expect("read redirect")
        })
        .collect()
}

#[test]
fn redirect_fix_converges_without_touching_other_checks() {
    let dir = TempDir::new().expect("tempdir");
    broken_town(dir.path());
    let opener = DefaultStoreOpener::default();
    let ctx = CheckContext::new(Town::new(dir.path()), &opener).with_config(DoctorConfig {
        skip: vec!["dolt-binary".to_string()],
        ..DoctorConfig::default()
    });

    let standard = CheckRegistry::standard();
    let before = Doctor::new(&standard).run(&ctx);
    let redirects = before.get("redirect-targets").expect("redirect result");
    assert_eq!(redirects.status, CheckStatus::Warning);
    assert_eq!(redirects.details.len(), 2, "{:?}", redirects.details);

    let only_redirects = CheckRegistry::new().with(RedirectTargetsCheck);
    let fixed = Doctor::new(&only_redirects).fix(&ctx);
    assert_eq!(fixed.results[0].status, CheckStatus::Ok);
    assert!(fixed.results[0].message.ends_with("(fixed)"));
    assert_eq!(fixed.summary.fixed, 1);

    let after = Doctor::new(&standard).run(&ctx);
    assert_eq!(
        after.get("redirect-targets").expect("redirect result").status,
        CheckStatus::Ok
    );
    for result in &before.results {
        if result.name == "redirect-targets" {
            continue;
        }
        let again = after.get(&result.name).expect("same checks");
        assert_eq!(again.status, result.status, "{} changed", result.name);
    }

    // a second fix is a no-op
    let written = read_redirects(dir.path());
    let second = Doctor::new(&only_redirects).fix(&ctx);
    assert_eq!(second.results[0].status, CheckStatus::Ok);
    assert_eq!(second.summary.fixed, 0);
    assert_eq!(read_redirects(dir.path()), written);
    assert_eq!(written[0], "../../../.beads\n");
}

#[test]
fn full_fix_leaves_fixable_checks_healthy() {
    let dir = TempDir::new().expect("tempdir");
    broken_town(dir.path());
    let opener = DefaultStoreOpener::default();
    let ctx = CheckContext::new(Town::new(dir.path()), &opener).with_config(DoctorConfig {
        skip: vec!["dolt-binary".to_string()],
        ..DoctorConfig::default()
    });

    let standard = CheckRegistry::standard();
    let fixed = Doctor::new(&standard).fix(&ctx);
    assert!(fixed.summary.fixed > 0);

    let after = Doctor::new(&standard).run(&ctx);
    for name in [
        "routes",
        "redirect-targets",
        "agent-beads",
        "stale-agent-beads",
        "patrol-hooks",
        "plugin-dirs",
        "misclassified-wisps",
        "wisp-schema",
    ] {
        let result = after.get(name).expect("result");
        assert_eq!(result.status, CheckStatus::Ok, "{name}: {:?}", result.details);
    }
    // agent beads created in the town store were moved out of `issues` too
    let town = SqliteDb::open(dir.path().join(".beads/beads.db")).expect("town db");
    assert_eq!(
        town.count("SELECT COUNT(*) FROM issues WHERE ephemeral = 1")
            .expect("flagged"),
        0
    );
    assert_eq!(
        town.count("SELECT COUNT(*) FROM wisps WHERE id IN ('hq-mayor', 'hq-deacon')")
            .expect("town wisps"),
        2
    );

    // formulas cannot be conjured up
    assert_eq!(
        after.get("patrol-formulas").expect("formulas").status,
        CheckStatus::Warning
    );
}
