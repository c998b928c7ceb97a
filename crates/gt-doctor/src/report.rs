use crate::check::{Category, CheckResult, CheckStatus};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub ok: usize,
    pub warnings: usize,
    pub errors: usize,
    pub fixed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub results: Vec<CheckResult>,
    pub summary: Summary,
}

impl Report {
    pub fn from_results(results: Vec<CheckResult>) -> Self {
        let mut summary = Summary::default();
        for result in &results {
            match result.status {
                CheckStatus::Ok => summary.ok += 1,
                CheckStatus::Warning => summary.warnings += 1,
                CheckStatus::Error => summary.errors += 1,
            }
            if result.fixed {
                summary.fixed += 1;
            }
        }
        Self { results, summary }
    }

    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.results.iter().find(|result| result.name == name)
    }

    /// Human-readable report grouped by category. Details of OK results are
    /// only shown when `verbose`.
    pub fn render_human(&self, verbose: bool) -> String {
        let mut out = String::new();
        for category in Category::ALL {
            let mut results = self
                .results
                .iter()
                .filter(|result| result.category == category)
                .peekable();
            if results.peek().is_none() {
                continue;
            }
            let _ = writeln!(out, "{}", category.title());
            for result in results {
                let _ = writeln!(
                    out,
                    "  {} {}: {}",
                    result.status.symbol(),
                    result.name,
                    result.message
                );
                if verbose || !result.is_ok() {
                    for detail in &result.details {
                        let _ = writeln!(out, "      {detail}");
                    }
                    if let Some(hint) = &result.fix_hint {
                        let _ = writeln!(out, "      → {hint}");
                    }
                }
            }
            out.push('\n');
        }
        let summary = &self.summary;
        let _ = write!(
            out,
            "{} passed, {} warnings, {} errors",
            summary.ok, summary.warnings, summary.errors
        );
        if summary.fixed > 0 {
            let _ = write!(out, ", {} fixed", summary.fixed);
        }
        out.push('\n');
        out
    }

    pub fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
