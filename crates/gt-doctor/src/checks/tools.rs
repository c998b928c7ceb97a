use crate::check::{Category, Check, CheckResult};
use crate::context::CheckContext;
use crate::probe::{ProbeOutcome, ToolProbe};

/// The Dolt binary is on `PATH`, runs, and is new enough.
pub struct DoltBinaryCheck;

impl DoltBinaryCheck {
    pub fn result_for(&self, probe: &ToolProbe, outcome: ProbeOutcome) -> CheckResult {
        let binary = &probe.binary;
        match outcome {
            ProbeOutcome::Ok(version) => CheckResult::ok(self, format!("{binary} {version}")),
            ProbeOutcome::NotFound => CheckResult::error(self, format!("{binary} not found on PATH"))
                .with_hint(format!("install {binary} {} or newer and put it on PATH", probe.minimum)),
            ProbeOutcome::ExecFailed(err) => {
                CheckResult::error(self, format!("{binary} could not report its version"))
                    .with_details(vec![err])
                    .with_hint(format!(
                        "run `{binary} {}` by hand and check the installation",
                        probe.version_args.join(" ")
                    ))
            }
            ProbeOutcome::Unknown(output) => {
                CheckResult::warning(self, format!("could not parse {binary} version"))
                    .with_details(vec![format!("output: {output}")])
                    .with_hint(format!("make sure {binary} is at least {}", probe.minimum))
            }
            ProbeOutcome::TooOld { found, minimum } => {
                CheckResult::error(self, format!("{binary} {found} is older than {minimum}"))
                    .with_hint(format!("upgrade {binary} to {minimum} or newer"))
            }
        }
    }
}

impl Check for DoltBinaryCheck {
    fn name(&self) -> &'static str {
        "dolt-binary"
    }

    fn description(&self) -> &'static str {
        "Dolt is installed and new enough"
    }

    fn category(&self) -> Category {
        Category::Tools
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let probe = ToolProbe::from_config(&ctx.config);
        let outcome = probe.probe();
        self.result_for(&probe, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckStatus;
    use gt_core::Version;

    #[test]
    fn each_outcome_gets_its_own_hint() {
        let check = DoltBinaryCheck;
        let probe = ToolProbe::default();
        let outcomes = [
            ProbeOutcome::NotFound,
            ProbeOutcome::ExecFailed("exit status: 1".into()),
            ProbeOutcome::Unknown("???".into()),
            ProbeOutcome::TooOld {
                found: Version::new(1, 0, 0),
                minimum: Version::new(1, 82, 4),
            },
        ];
        let hints: Vec<_> = outcomes
            .into_iter()
            .map(|outcome| check.result_for(&probe, outcome).fix_hint.expect("hint"))
            .collect();
        let mut unique = hints.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), hints.len());

        let ok = check.result_for(&probe, ProbeOutcome::Ok(Version::new(1, 83, 0)));
        assert_eq!(ok.status, CheckStatus::Ok);
        assert_eq!(ok.message, "dolt 1.83.0");
    }
}
