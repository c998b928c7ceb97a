use crate::GitRunner;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const CONFLICT_MARKERS: [&str; 2] = ["already checked out at '", "already used by worktree at '"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    CheckedOut,
    /// The branch was held by a bare repository whose HEAD had to move first.
    CheckedOutAfterRetarget { bare_repo: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("checkout failed: {0}")]
    Checkout(String),
    #[error("branch is held by {path}, which is not a bare repo; refusing to move its HEAD")]
    NotBare { path: PathBuf },
    #[error("cannot inspect {path}, which holds the branch: {raw}")]
    Inspect { path: PathBuf, raw: String },
    #[error("failed to retarget bare repo HEAD: {0}")]
    Retarget(String),
    #[error("checkout still failing after retarget: {0}")]
    Retry(String),
}

/// Pulls the conflicting worktree path out of git's complaint. Both the
/// older and newer phrasings are recognised; an unterminated quote yields
/// `None`.
pub fn extract_conflict_path(stderr: &str) -> Option<String> {
    CONFLICT_MARKERS.iter().find_map(|marker| {
        let start = stderr.find(marker)? + marker.len();
        let rest = &stderr[start..];
        let end = rest.find('\'')?;
        let path = &rest[..end];
        (!path.is_empty()).then(|| path.to_string())
    })
}

/// Checks out `branch` in `worktree`, freeing it from a bare repository
/// that owns it when that is the only obstacle. The retry happens once.
pub fn checkout_branch(
    git: &dyn GitRunner,
    worktree: &Path,
    branch: &str,
) -> Result<CheckoutOutcome, CheckoutError> {
    let raw = match git.run(worktree, &["checkout", branch]) {
        Ok(_) => return Ok(CheckoutOutcome::CheckedOut),
        Err(raw) => raw,
    };
    let Some(conflict) = extract_conflict_path(&raw) else {
        return Err(CheckoutError::Checkout(raw));
    };
    let conflict = PathBuf::from(conflict);
    let conflict_arg = conflict.display().to_string();

    let is_bare = match git.run(worktree, &["-C", &conflict_arg, "rev-parse", "--is-bare-repository"]) {
        Ok(out) => out.trim() == "true",
        Err(raw) => return Err(CheckoutError::Inspect { path: conflict, raw }),
    };
    if !is_bare {
        warn!(event = "checkout_conflict", holder = %conflict_arg, branch = branch);
        return Err(CheckoutError::NotBare { path: conflict });
    }

    let head_ref = format!("refs/heads/{branch}");
    git.run(worktree, &["-C", &conflict_arg, "symbolic-ref", "HEAD", &head_ref])
        .map_err(CheckoutError::Retarget)?;
    info!(event = "bare_head_retargeted", bare_repo = %conflict_arg, branch = branch);

    git.run(worktree, &["checkout", branch])
        .map_err(CheckoutError::Retry)?;
    Ok(CheckoutOutcome::CheckedOutAfterRetarget { bare_repo: conflict })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned responses in order and records every invocation.
    struct ScriptedGit {
        responses: RefCell<VecDeque<Result<String, String>>>,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl ScriptedGit {
        fn new(responses: Vec<Result<&str, &str>>) -> Self {
            Self {
                responses: RefCell::new(
                    responses
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.borrow().clone()
        }
    }

    impl GitRunner for ScriptedGit {
        fn run(&self, _cwd: &Path, args: &[&str]) -> Result<String, String> {
            self.calls
                .borrow_mut()
                .push(args.iter().map(|a| a.to_string()).collect());
            self.responses
                .borrow_mut()
                .pop_front()
                .expect("unexpected git call")
        }
    }

    const CONFLICT: &str = "fatal: 'main' is already checked out at '/p'";

    #[test]
    fn extracts_both_phrasings() {
        assert_eq!(extract_conflict_path(CONFLICT).as_deref(), Some("/p"));
        assert_eq!(
            extract_conflict_path("fatal: 'main' is already used by worktree at '/p'").as_deref(),
            Some("/p")
        );
    }

    #[test]
    fn unterminated_or_unrelated_yields_none() {
        assert_eq!(
            extract_conflict_path("fatal: 'main' is already checked out at '/p"),
            None
        );
        assert_eq!(extract_conflict_path("error: pathspec 'x' did not match"), None);
        assert_eq!(extract_conflict_path("already checked out at ''"), None);
    }

    #[test]
    fn plain_success_needs_one_call() {
        let git = ScriptedGit::new(vec![Ok("")]);
        let outcome = checkout_branch(&git, Path::new("/w"), "main").expect("checkout");
        assert_eq!(outcome, CheckoutOutcome::CheckedOut);
        assert_eq!(git.calls().len(), 1);
    }

    #[test]
    fn unparseable_failure_keeps_raw_error() {
        let git = ScriptedGit::new(vec![Err("fatal: not a git repository")]);
        let err = checkout_branch(&git, Path::new("/w"), "main").expect_err("fails");
        assert_eq!(err, CheckoutError::Checkout("fatal: not a git repository".into()));
    }

    #[test]
    fn bare_holder_is_retargeted_and_retried() {
        let git = ScriptedGit::new(vec![Err(CONFLICT), Ok("true\n"), Ok(""), Ok("")]);
        let outcome = checkout_branch(&git, Path::new("/w"), "main").expect("checkout");
        assert_eq!(
            outcome,
            CheckoutOutcome::CheckedOutAfterRetarget {
                bare_repo: PathBuf::from("/p")
            }
        );
        let calls = git.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls[2],
            vec!["-C", "/p", "symbolic-ref", "HEAD", "refs/heads/main"]
        );
        assert_eq!(calls[3], vec!["checkout", "main"]);
    }

    #[test]
    fn non_bare_holder_is_refused() {
        let git = ScriptedGit::new(vec![Err(CONFLICT), Ok("false\n")]);
        let err = checkout_branch(&git, Path::new("/w"), "main").expect_err("refused");
        assert_eq!(err, CheckoutError::NotBare { path: PathBuf::from("/p") });
        assert_eq!(git.calls().len(), 2);
    }

    #[test]
    fn unreadable_holder_keeps_git_error() {
        let git = ScriptedGit::new(vec![Err(CONFLICT), Err("fatal: cannot change to '/p': No such file or directory")]);
        let err = checkout_branch(&git, Path::new("/w"), "main").expect_err("inspect fails");
        assert_eq!(
            err,
            CheckoutError::Inspect {
                path: PathBuf::from("/p"),
                raw: "fatal: cannot change to '/p': No such file or directory".into()
            }
        );
        assert_eq!(git.calls().len(), 2);
    }

    #[test]
    fn failed_retry_is_reported_once() {
        let git = ScriptedGit::new(vec![Err(CONFLICT), Ok("true"), Ok(""), Err("still busy")]);
        let err = checkout_branch(&git, Path::new("/w"), "main").expect_err("retry fails");
        assert_eq!(err, CheckoutError::Retry("still busy".into()));
        assert_eq!(git.calls().len(), 4);
    }
}
