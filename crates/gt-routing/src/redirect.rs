//! Locating the canonical store behind a worktree.
//!
//! A worktree's `.beads` directory either holds data itself or contains a
//! `redirect` file naming another store directory. Redirects may chain
//! (crew member → rig → mayor clone); the chain is followed from disk on
//! every hop and cut off after [`MAX_HOPS`].

use gt_core::town::{REDIRECT_FILE, STORE_DIR};
use gt_core::{atomic_write, has_store_setup, Rig, Worktree};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const MAX_HOPS: usize = 4;

#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("failed to read redirect {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write redirect {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("no valid canonical store for {0}")]
    NoCanonicalTarget(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// The worktree has no `.beads` directory at all.
    NoStore,
    /// A store directory without a redirect file.
    Local,
    Redirected,
}

/// One followed `redirect` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub store_dir: PathBuf,
    pub raw: String,
    pub resolved: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokenReason {
    EmptyRedirect,
    Missing,
    NoSetup,
    TooManyHops,
    Unreadable(String),
}

impl fmt::Display for BrokenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokenReason::EmptyRedirect => f.write_str("redirect file is empty"),
            BrokenReason::Missing => f.write_str("target does not exist"),
            BrokenReason::NoSetup => f.write_str("target has no database setup"),
            BrokenReason::TooManyHops => {
                write!(f, "redirect chain longer than {MAX_HOPS} hops")
            }
            BrokenReason::Unreadable(err) => write!(f, "unreadable redirect: {err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Valid(PathBuf),
    Broken { path: PathBuf, reason: BrokenReason },
}

impl Target {
    pub fn path(&self) -> &Path {
        match self {
            Target::Valid(path) | Target::Broken { path, .. } => path,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Target::Valid(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub store_dir: PathBuf,
    pub status: StoreStatus,
    pub hops: Vec<Hop>,
    pub target: Target,
}

impl Resolution {
    /// Only redirected stores are judged; a worktree without a redirect is
    /// never a defect here.
    pub fn is_healthy(&self) -> bool {
        self.status != StoreStatus::Redirected || self.target.is_valid()
    }

    pub fn chain(&self) -> String {
        let mut parts = vec![self.store_dir.display().to_string()];
        parts.extend(self.hops.iter().map(|hop| hop.resolved.display().to_string()));
        parts.join(" -> ")
    }
}

pub fn resolve(worktree: &Path) -> Resolution {
    resolve_store(&worktree.join(STORE_DIR))
}

/// Follows the redirect chain starting at a store directory.
pub fn resolve_store(store_dir: &Path) -> Resolution {
    let mut hops: Vec<Hop> = Vec::new();
    let mut current = store_dir.to_path_buf();

    let target = loop {
        let raw = match read_redirect(&current) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                break if has_store_setup(&current) {
                    Target::Valid(current)
                } else {
                    Target::Broken {
                        path: current,
                        reason: BrokenReason::NoSetup,
                    }
                };
            }
            Err(err) => {
                break Target::Broken {
                    path: current,
                    reason: BrokenReason::Unreadable(err.to_string()),
                }
            }
        };
        if hops.len() == MAX_HOPS {
            break Target::Broken {
                path: current,
                reason: BrokenReason::TooManyHops,
            };
        }
        if raw.is_empty() {
            break Target::Broken {
                path: current,
                reason: BrokenReason::EmptyRedirect,
            };
        }
        let next = resolve_value(&current, &raw);
        debug!(event = "redirect_hop", from = %current.display(), to = %next.display());
        hops.push(Hop {
            store_dir: current,
            raw,
            resolved: next.clone(),
        });
        if !next.is_dir() {
            break Target::Broken {
                path: next,
                reason: BrokenReason::Missing,
            };
        }
        current = next;
    };

    let status = if !hops.is_empty() {
        StoreStatus::Redirected
    } else if store_dir.is_dir() {
        StoreStatus::Local
    } else {
        StoreStatus::NoStore
    };

    Resolution {
        store_dir: store_dir.to_path_buf(),
        status,
        hops,
        target,
    }
}

/// Absolute values are taken as written; relative ones are joined to the
/// store directory holding the redirect file.
pub fn resolve_value(store_dir: &Path, raw: &str) -> PathBuf {
    let value = Path::new(raw);
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        normalize(&store_dir.join(value))
    }
}

fn read_redirect(store_dir: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(store_dir.join(REDIRECT_FILE)) {
        Ok(content) => Ok(Some(content.trim().to_string())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Lexical `.`/`..` folding; the target may not exist yet.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The store a worktree of `rig` should redirect to: the rig-level store
/// when it resolves and is not the worktree's own, else the mayor clone.
pub fn canonical_target(rig: &Rig, worktree: &Worktree) -> Option<PathBuf> {
    let own = normalize(&worktree.store_dir());
    let candidates = [rig.store_dir(), rig.mayor_clone().join(STORE_DIR)];
    candidates.into_iter().map(|dir| normalize(&dir)).find(|dir| {
        *dir != own && {
            let resolution = resolve_store(dir);
            resolution.target.is_valid() && normalize(resolution.target.path()) != own
        }
    })
}

/// Points the worktree's redirect at `target`. Returns `true` when the file
/// was rewritten and `false` when it already resolved there.
pub fn repair(worktree: &Worktree, target: &Path) -> Result<bool, RedirectError> {
    let store_dir = worktree.store_dir();
    let redirect_path = store_dir.join(REDIRECT_FILE);
    let existing = read_redirect(&store_dir).map_err(|source| RedirectError::Read {
        path: redirect_path.clone(),
        source,
    })?;
    let target = normalize(target);

    if let Some(raw) = existing.as_deref().filter(|raw| !raw.is_empty()) {
        if normalize(&resolve_value(&store_dir, raw)) == target {
            return Ok(false);
        }
    }

    let prefer_absolute = existing
        .as_deref()
        .map(|raw| Path::new(raw).is_absolute())
        .unwrap_or(false)
        || read_redirect(&target)
            .ok()
            .flatten()
            .map(|raw| Path::new(&raw).is_absolute())
            .unwrap_or(false);
    let value = redirect_value(&store_dir, &target, prefer_absolute);

    atomic_write(&redirect_path, &format!("{value}\n")).map_err(|source| {
        RedirectError::Write {
            path: redirect_path.clone(),
            source,
        }
    })?;
    info!(
        event = "redirect_repaired",
        worktree = %worktree.path.display(),
        value = %value
    );
    Ok(true)
}

/// Repairs the worktree against its rig's canonical store.
pub fn repair_for_rig(rig: &Rig, worktree: &Worktree) -> Result<bool, RedirectError> {
    let target = canonical_target(rig, worktree)
        .ok_or_else(|| RedirectError::NoCanonicalTarget(worktree.path.clone()))?;
    repair(worktree, &target)
}

fn redirect_value(store_dir: &Path, target: &Path, prefer_absolute: bool) -> String {
    if !prefer_absolute && target.is_absolute() == store_dir.is_absolute() {
        if let Some(relative) = pathdiff::diff_paths(target, normalize(store_dir)) {
            return relative.display().to_string();
        }
    }
    target.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gt_core::town::{CONFIG_MARKER, DOLT_DIR};
    use gt_core::WorktreeKind;
    use tempfile::TempDir;

    fn rig_at(root: &Path, name: &str) -> Rig {
        Rig {
            name: name.to_string(),
            path: root.join(name),
            prefix: Some("gt".to_string()),
        }
    }

    fn crew(rig: &Rig, name: &str) -> Worktree {
        let path = rig.path.join("crew").join(name);
        fs::create_dir_all(path.join(STORE_DIR)).expect("crew store");
        Worktree {
            kind: WorktreeKind::Crew(name.to_string()),
            path,
        }
    }

    fn write_redirect(store: &Path, value: &str) {
        fs::create_dir_all(store).expect("store dir");
        fs::write(store.join(REDIRECT_FILE), format!("{value}\n")).expect("redirect");
    }

    /// Rig root redirects to the mayor clone, which holds the database.
    fn seeded_rig(root: &Path) -> Rig {
        let rig = rig_at(root, "gastown");
        fs::create_dir_all(rig.mayor_clone().join(STORE_DIR).join(DOLT_DIR)).expect("dolt");
        write_redirect(&rig.store_dir(), "../mayor/rig/.beads");
        rig
    }

    #[test]
    fn worktree_without_store_or_redirect_is_healthy() {
        let dir = TempDir::new().expect("tempdir");
        let resolution = resolve(dir.path());
        assert_eq!(resolution.status, StoreStatus::NoStore);
        assert!(resolution.is_healthy());

        fs::create_dir_all(dir.path().join(STORE_DIR)).expect("store");
        let resolution = resolve(dir.path());
        assert_eq!(resolution.status, StoreStatus::Local);
        assert!(resolution.is_healthy());
    }

    #[test]
    fn follows_two_hop_chain_to_mayor_clone() {
        let dir = TempDir::new().expect("tempdir");
        let rig = seeded_rig(dir.path());
        let member = crew(&rig, "max");
        write_redirect(&member.store_dir(), "../../../.beads");

        let resolution = resolve(&member.path);
        assert_eq!(resolution.status, StoreStatus::Redirected);
        assert_eq!(resolution.hops.len(), 2);
        assert_eq!(
            resolution.target,
            Target::Valid(rig.mayor_clone().join(STORE_DIR))
        );
    }

    #[test]
    fn reports_missing_and_setup_less_targets() {
        let dir = TempDir::new().expect("tempdir");
        let rig = seeded_rig(dir.path());
        let member = crew(&rig, "max");

        write_redirect(&member.store_dir(), "../../../nowhere/.beads");
        let resolution = resolve(&member.path);
        assert!(matches!(
            resolution.target,
            Target::Broken { reason: BrokenReason::Missing, .. }
        ));

        fs::create_dir_all(rig.path.join("empty")).expect("empty dir");
        write_redirect(&member.store_dir(), "../../../empty");
        let resolution = resolve(&member.path);
        assert!(matches!(
            resolution.target,
            Target::Broken { reason: BrokenReason::NoSetup, .. }
        ));
        assert!(!resolution.is_healthy());
    }

    #[test]
    fn cycle_fails_closed() {
        let dir = TempDir::new().expect("tempdir");
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        write_redirect(&a, "../b");
        write_redirect(&b, "../a");

        let resolution = resolve_store(&a);
        assert_eq!(resolution.hops.len(), MAX_HOPS);
        assert!(matches!(
            resolution.target,
            Target::Broken { reason: BrokenReason::TooManyHops, .. }
        ));
    }

    #[test]
    fn absolute_value_is_not_prefixed() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("db");
        fs::create_dir_all(&target).expect("target");
        fs::write(target.join(CONFIG_MARKER), "{}").expect("marker");
        let store = dir.path().join("deep/nested/.beads");
        write_redirect(&store, &target.display().to_string());

        let resolution = resolve_store(&store);
        assert_eq!(resolution.target, Target::Valid(target));
    }

    #[test]
    fn repair_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let rig = seeded_rig(dir.path());
        let member = crew(&rig, "max");
        write_redirect(&member.store_dir(), "../../.beads");
        assert!(!resolve(&member.path).is_healthy());

        assert!(repair_for_rig(&rig, &member).expect("first repair"));
        let written = fs::read_to_string(member.store_dir().join(REDIRECT_FILE)).expect("read");
        assert_eq!(written, "../../../.beads\n");
        assert!(resolve(&member.path).is_healthy());

        assert!(!repair_for_rig(&rig, &member).expect("second repair"));
        let again = fs::read_to_string(member.store_dir().join(REDIRECT_FILE)).expect("read");
        assert_eq!(written, again);
    }

    #[test]
    fn correct_absolute_redirect_round_trips_unchanged() {
        let dir = TempDir::new().expect("tempdir");
        let rig = seeded_rig(dir.path());
        let member = crew(&rig, "max");
        let absolute = rig.store_dir().display().to_string();
        write_redirect(&member.store_dir(), &absolute);

        assert!(!repair_for_rig(&rig, &member).expect("repair"));
        let written = fs::read_to_string(member.store_dir().join(REDIRECT_FILE)).expect("read");
        assert_eq!(written.trim(), absolute);
    }

    #[test]
    fn broken_absolute_redirect_is_rewritten_absolute() {
        let dir = TempDir::new().expect("tempdir");
        let rig = seeded_rig(dir.path());
        let member = crew(&rig, "max");
        let stale = dir.path().join("old/.beads").display().to_string();
        write_redirect(&member.store_dir(), &stale);

        assert!(repair_for_rig(&rig, &member).expect("repair"));
        let written = fs::read_to_string(member.store_dir().join(REDIRECT_FILE)).expect("read");
        assert_eq!(PathBuf::from(written.trim()), rig.store_dir());
    }

    #[test]
    fn rig_root_falls_back_to_mayor_clone() {
        let dir = TempDir::new().expect("tempdir");
        let rig = rig_at(dir.path(), "gastown");
        fs::create_dir_all(rig.mayor_clone().join(STORE_DIR).join(DOLT_DIR)).expect("dolt");
        write_redirect(&rig.store_dir(), "../missing/.beads");
        let root = Worktree {
            kind: WorktreeKind::RigRoot,
            path: rig.path.clone(),
        };

        assert_eq!(
            canonical_target(&rig, &root),
            Some(rig.mayor_clone().join(STORE_DIR))
        );
        assert!(repair_for_rig(&rig, &root).expect("repair"));
        assert!(resolve(&rig.path).is_healthy());
    }

    #[test]
    fn normalize_folds_parent_components() {
        assert_eq!(
            normalize(Path::new("/town/rig/crew/max/.beads/../../../.beads")),
            PathBuf::from("/town/rig/.beads")
        );
        assert_eq!(normalize(Path::new("a/./../../b")), PathBuf::from("../b"));
    }
}
