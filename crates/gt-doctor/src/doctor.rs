use crate::check::{Check, CheckResult, CheckStatus};
use crate::checks;
use crate::config::CONFIG_FILE;
use crate::context::CheckContext;
use crate::report::Report;
use tracing::{debug, info, warn};

/// An ordered set of checks, built by the caller and handed to [`Doctor`].
#[derive(Default)]
pub struct CheckRegistry {
    checks: Vec<Box<dyn Check>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in check, in report order.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for check in checks::standard_checks() {
            registry.register(check);
        }
        registry
    }

    pub fn register(&mut self, check: Box<dyn Check>) {
        self.checks.push(check);
    }

    pub fn with(mut self, check: impl Check + 'static) -> Self {
        self.register(Box::new(check));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Check> {
        self.checks
            .iter()
            .find(|check| check.name() == name)
            .map(|check| check.as_ref())
    }

    /// Keeps only the named checks. Returns the names that matched nothing.
    pub fn retain(&mut self, names: &[String]) -> Vec<String> {
        let unknown = names
            .iter()
            .filter(|name| self.get(name).is_none())
            .cloned()
            .collect();
        self.checks
            .retain(|check| names.iter().any(|name| name == check.name()));
        unknown
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Check> {
        self.checks.iter().map(|check| check.as_ref())
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

pub struct Doctor<'r> {
    registry: &'r CheckRegistry,
}

impl<'r> Doctor<'r> {
    pub fn new(registry: &'r CheckRegistry) -> Self {
        Self { registry }
    }

    pub fn run(&self, ctx: &CheckContext<'_>) -> Report {
        let results = self
            .registry
            .iter()
            .map(|check| run_check(check, ctx))
            .collect();
        Report::from_results(results)
    }

    /// Runs every check and fixes what it can. A fixed check is run again
    /// and its fresh result replaces the original one.
    pub fn fix(&self, ctx: &CheckContext<'_>) -> Report {
        let mut results = Vec::with_capacity(self.registry.len());
        for check in self.registry.iter() {
            let result = run_check(check, ctx);
            if result.is_ok() || !check.can_fix() || ctx.config.is_skipped(check.name()) {
                results.push(result);
                continue;
            }
            match check.fix(ctx) {
                Ok(()) => {
                    let mut rerun = run_check(check, ctx);
                    if rerun.is_ok() {
                        rerun.message.push_str(" (fixed)");
                        rerun.fixed = true;
                        info!(event = "check_fixed", check = check.name());
                    } else {
                        let status = rerun.status;
                        rerun.message = format!("{} (fix attempted, still {status})", rerun.message);
                        warn!(event = "fix_incomplete", check = check.name(), status = %status);
                    }
                    results.push(rerun);
                }
                Err(err) => {
                    warn!(event = "fix_failed", check = check.name(), error = %err);
                    let mut result = result;
                    result.details.push(format!("fix failed: {err}"));
                    results.push(result);
                }
            }
        }
        Report::from_results(results)
    }
}

fn run_check(check: &dyn Check, ctx: &CheckContext<'_>) -> CheckResult {
    if ctx.config.is_skipped(check.name()) {
        return CheckResult::ok(check, "skipped")
            .with_details(vec![format!("skipped by `skip` in mayor/{CONFIG_FILE}")]);
    }
    let result = check.run(ctx);
    debug!(
        event = "check_ran",
        check = check.name(),
        status = %result.status,
        details = result.details.len()
    );
    result
}

pub(crate) fn worst(statuses: impl IntoIterator<Item = CheckStatus>) -> CheckStatus {
    statuses.into_iter().max().unwrap_or(CheckStatus::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::Category;
    use crate::config::DoctorConfig;
    use crate::error::FixError;
    use gt_core::Town;
    use gt_storage::DefaultStoreOpener;
    use std::cell::Cell;

    /// Reports an error until `fix` has been called `needed` times.
    struct Flaky {
        fixes: Cell<u32>,
        needed: u32,
        fails: bool,
    }

    impl Flaky {
        fn new(needed: u32) -> Self {
            Self {
                fixes: Cell::new(0),
                needed,
                fails: false,
            }
        }
    }

    impl Check for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn description(&self) -> &'static str {
            "test check"
        }

        fn category(&self) -> Category {
            Category::Core
        }

        fn run(&self, _ctx: &CheckContext<'_>) -> CheckResult {
            if self.fixes.get() >= self.needed {
                CheckResult::ok(self, "healthy")
            } else {
                CheckResult::error(self, "broken")
            }
        }

        fn can_fix(&self) -> bool {
            true
        }

        fn fix(&self, _ctx: &CheckContext<'_>) -> Result<(), FixError> {
            if self.fails {
                return Err(FixError::Refused("disk full".into()));
            }
            self.fixes.set(self.fixes.get() + 1);
            Ok(())
        }
    }

    struct ReadOnly;

    impl Check for ReadOnly {
        fn name(&self) -> &'static str {
            "read-only"
        }

        fn description(&self) -> &'static str {
            "never fixable"
        }

        fn category(&self) -> Category {
            Category::Work
        }

        fn run(&self, _ctx: &CheckContext<'_>) -> CheckResult {
            CheckResult::warning(self, "meh")
        }
    }

    fn context(opener: &DefaultStoreOpener) -> CheckContext<'_> {
        CheckContext::new(Town::new("/nonexistent-town"), opener)
    }

    #[test]
    fn fix_reruns_and_marks_fixed() {
        let opener = DefaultStoreOpener::default();
        let registry = CheckRegistry::new().with(Flaky::new(1)).with(ReadOnly);
        let report = Doctor::new(&registry).fix(&context(&opener));
        let flaky = report.get("flaky").expect("flaky result");
        assert_eq!(flaky.status, CheckStatus::Ok);
        assert_eq!(flaky.message, "healthy (fixed)");
        assert_eq!(report.summary.fixed, 1);
        assert_eq!(report.get("read-only").expect("read-only").message, "meh");
    }

    #[test]
    fn incomplete_fix_is_annotated() {
        let opener = DefaultStoreOpener::default();
        let registry = CheckRegistry::new().with(Flaky::new(2));
        let report = Doctor::new(&registry).fix(&context(&opener));
        assert_eq!(
            report.results[0].message,
            "broken (fix attempted, still error)"
        );
        assert!(report.has_errors());
    }

    #[test]
    fn failed_fix_keeps_result_and_continues() {
        let opener = DefaultStoreOpener::default();
        let mut failing = Flaky::new(1);
        failing.fails = true;
        let registry = CheckRegistry::new().with(failing).with(ReadOnly);
        let report = Doctor::new(&registry).fix(&context(&opener));
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].message, "broken");
        assert_eq!(report.results[0].details, vec!["fix failed: disk full"]);
    }

    #[test]
    fn default_fix_is_cannot_fix() {
        let opener = DefaultStoreOpener::default();
        assert!(matches!(ReadOnly.fix(&context(&opener)), Err(FixError::CannotFix)));
    }

    #[test]
    fn skipped_checks_still_appear() {
        let opener = DefaultStoreOpener::default();
        let config = DoctorConfig {
            skip: vec!["flaky".to_string()],
            ..DoctorConfig::default()
        };
        let ctx = context(&opener).with_config(config);
        let registry = CheckRegistry::new().with(Flaky::new(1));
        let report = Doctor::new(&registry).run(&ctx);
        assert_eq!(report.results[0].status, CheckStatus::Ok);
        assert!(report.results[0].details[0].contains("skipped"));
    }

    #[test]
    fn standard_registry_has_unique_names() {
        let registry = CheckRegistry::standard();
        let mut names: Vec<_> = registry.iter().map(|check| check.name()).collect();
        assert_eq!(names.len(), 13);
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 13);
    }

    #[test]
    fn retain_reports_unknown_names() {
        let mut registry = CheckRegistry::standard();
        let unknown = registry.retain(&["routes".to_string(), "bogus".to_string()]);
        assert_eq!(unknown, vec!["bogus".to_string()]);
        assert_eq!(registry.len(), 1);
    }
}
