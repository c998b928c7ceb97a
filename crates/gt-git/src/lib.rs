//! Thin seam over the `git` binary plus the worktree checkout protocol.

pub mod checkout;

pub use checkout::{checkout_branch, extract_conflict_path, CheckoutError, CheckoutOutcome};

use std::path::Path;
use std::process::Command;

/// Runs git with `cwd` as working directory. `Err` carries trimmed stderr.
pub trait GitRunner {
    fn run(&self, cwd: &Path, args: &[&str]) -> Result<String, String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemGit;

impl GitRunner for SystemGit {
    fn run(&self, cwd: &Path, args: &[&str]) -> Result<String, String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|err| format!("git_missing: {err}"))?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
