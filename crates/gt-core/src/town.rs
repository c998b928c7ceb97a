use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const STORE_DIR: &str = ".beads";
pub const REDIRECT_FILE: &str = "redirect";
pub const ROUTES_FILE: &str = "routes.jsonl";
pub const EXPORT_FILE: &str = "issues.jsonl";
pub const CONFIG_MARKER: &str = "metadata.json";
pub const DOLT_DIR: &str = "dolt";
pub const SQLITE_FILE: &str = "beads.db";
pub const MAYOR_DIR: &str = "mayor";
pub const RIG_REGISTRY_FILE: &str = "rigs.json";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("rig registry not found at {0}")]
    Missing(PathBuf),
    #[error("failed to read rig registry {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed rig registry {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("unknown rig: {0}")]
    UnknownRig(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigRegistry {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub rigs: BTreeMap<String, RigEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigEntry {
    #[serde(default)]
    pub git_url: Option<String>,
    #[serde(default)]
    pub added_at: Option<String>,
    #[serde(default)]
    pub beads: Option<RigBeadsConfig>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigBeadsConfig {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

/// Root of the fleet. Everything else is addressed relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Town {
    root: PathBuf,
}

impl Town {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mayor_dir(&self) -> PathBuf {
        self.root.join(MAYOR_DIR)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.mayor_dir().join(RIG_REGISTRY_FILE)
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join(STORE_DIR)
    }

    pub fn routes_path(&self) -> PathBuf {
        self.store_dir().join(ROUTES_FILE)
    }

    pub fn rig_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn load_registry(&self) -> Result<RigRegistry, RegistryError> {
        let path = self.registry_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(RegistryError::Missing(path))
            }
            Err(source) => return Err(RegistryError::Io { path, source }),
        };
        serde_json::from_str(&content).map_err(|err| RegistryError::Malformed {
            path,
            reason: err.to_string(),
        })
    }

    /// Registered rigs, in name order, optionally narrowed to one rig.
    pub fn rigs(&self, scope: Option<&str>) -> Result<Vec<Rig>, RegistryError> {
        let registry = self.load_registry()?;
        if let Some(name) = scope {
            if !registry.rigs.contains_key(name) {
                return Err(RegistryError::UnknownRig(name.to_string()));
            }
        }
        Ok(registry
            .rigs
            .iter()
            .filter(|(name, _)| scope.map_or(true, |wanted| wanted == name.as_str()))
            .map(|(name, entry)| Rig {
                name: name.clone(),
                path: self.rig_dir(name),
                prefix: entry
                    .beads
                    .as_ref()
                    .and_then(|beads| beads.prefix.clone())
                    .map(|prefix| prefix.trim_end_matches('-').to_string()),
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rig {
    pub name: String,
    pub path: PathBuf,
    /// Record-id prefix from the registry, without the trailing `-`.
    pub prefix: Option<String>,
}

impl Rig {
    pub fn store_dir(&self) -> PathBuf {
        self.path.join(STORE_DIR)
    }

    pub fn mayor_clone(&self) -> PathBuf {
        self.path.join(MAYOR_DIR).join("rig")
    }

    pub fn refinery_clone(&self) -> PathBuf {
        self.path.join("refinery").join("rig")
    }

    /// Crew member directories. A missing `crew/` is an empty list.
    pub fn crew_names(&self) -> Result<Vec<String>, ListingError> {
        list_child_dirs(&self.path.join("crew"))
    }

    pub fn polecat_names(&self) -> Result<Vec<String>, ListingError> {
        list_child_dirs(&self.path.join("polecats"))
    }

    pub fn has_librarian(&self) -> bool {
        self.path.join("librarian").is_dir()
    }

    /// Every worktree belonging to the rig that exists on disk: rig root,
    /// mayor clone, refinery, crew members and polecats, in that order.
    /// Worker directories that cannot be listed land in
    /// [`WorktreeScan::unlisted`] instead of aborting the scan.
    pub fn worktrees(&self) -> WorktreeScan {
        let mut worktrees = vec![Worktree {
            kind: WorktreeKind::RigRoot,
            path: self.path.clone(),
        }];
        let mayor = self.mayor_clone();
        if mayor.is_dir() {
            worktrees.push(Worktree {
                kind: WorktreeKind::MayorClone,
                path: mayor,
            });
        }
        let refinery = self.refinery_clone();
        if refinery.is_dir() {
            worktrees.push(Worktree {
                kind: WorktreeKind::Refinery,
                path: refinery,
            });
        }
        let mut unlisted = Vec::new();
        match self.crew_names() {
            Ok(names) => worktrees.extend(names.into_iter().map(|name| Worktree {
                path: self.path.join("crew").join(&name),
                kind: WorktreeKind::Crew(name),
            })),
            Err(err) => unlisted.push(err),
        }
        match self.polecat_names() {
            Ok(names) => worktrees.extend(names.into_iter().map(|name| Worktree {
                path: self.path.join("polecats").join(&name),
                kind: WorktreeKind::Polecat(name),
            })),
            Err(err) => unlisted.push(err),
        }
        WorktreeScan { worktrees, unlisted }
    }
}

/// A worker directory that exists but could not be read.
#[derive(Debug, Error)]
#[error("cannot list {}: {source}", .path.display())]
pub struct ListingError {
    pub path: PathBuf,
    pub source: io::Error,
}

#[derive(Debug, Default)]
pub struct WorktreeScan {
    pub worktrees: Vec<Worktree>,
    pub unlisted: Vec<ListingError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorktreeKind {
    RigRoot,
    MayorClone,
    Refinery,
    Crew(String),
    Polecat(String),
}

impl fmt::Display for WorktreeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorktreeKind::RigRoot => f.write_str("rig"),
            WorktreeKind::MayorClone => f.write_str("mayor/rig"),
            WorktreeKind::Refinery => f.write_str("refinery/rig"),
            WorktreeKind::Crew(name) => write!(f, "crew/{name}"),
            WorktreeKind::Polecat(name) => write!(f, "polecats/{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worktree {
    pub kind: WorktreeKind,
    pub path: PathBuf,
}

impl Worktree {
    pub fn store_dir(&self) -> PathBuf {
        self.path.join(STORE_DIR)
    }
}

/// True when `dir` holds a usable store: a schema marker (`dolt/` or
/// `beads.db`), a `redirect` pointer or a `metadata.json` config marker.
pub fn has_store_setup(dir: &Path) -> bool {
    dir.join(DOLT_DIR).is_dir()
        || dir.join(SQLITE_FILE).is_file()
        || dir.join(REDIRECT_FILE).is_file()
        || dir.join(CONFIG_MARKER).is_file()
}

fn list_child_dirs(dir: &Path) -> Result<Vec<String>, ListingError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ListingError {
                path: dir.to_path_buf(),
                source,
            })
        }
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();
    Ok(names)
}
