use gt_core::atomic_write;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("routes file not found at {0}")]
    Missing(PathBuf),
    #[error("failed to access routes file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid route: {0}")]
    Invalid(String),
}

/// One `{prefix, path}` line of `routes.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub prefix: String,
    pub path: String,
}

impl Route {
    pub fn new(prefix: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            path: path.into(),
        }
    }

    /// Prefix without its trailing `-` separator.
    pub fn normalized_prefix(&self) -> &str {
        self.prefix.trim().trim_end_matches('-')
    }

    fn first_segment(&self) -> &str {
        self.path
            .trim()
            .trim_start_matches("./")
            .split('/')
            .next()
            .unwrap_or_default()
    }

    /// Routes whose path starts at `.` point at the fleet-level store.
    pub fn is_town_level(&self) -> bool {
        matches!(self.first_segment(), "." | "")
    }

    pub fn rig_name(&self) -> Option<&str> {
        (!self.is_town_level()).then(|| self.first_segment())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RigRoute {
    pub rig_name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteParseError {
    pub line: usize,
    pub reason: String,
}

/// The fleet-wide prefix → location table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    routes: Vec<Route>,
    errors: Vec<RouteParseError>,
}

impl RouteTable {
    /// Parses `routes.jsonl` leniently: blank lines and `#` comments are
    /// skipped, malformed lines are collected in [`RouteTable::errors`].
    pub fn parse(content: &str) -> Self {
        let mut table = Self::default();
        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<Route>(trimmed) {
                Ok(route) if route.normalized_prefix().is_empty() => {
                    table.errors.push(RouteParseError {
                        line: index + 1,
                        reason: "empty prefix".to_string(),
                    });
                }
                Ok(route) => table.routes.push(route),
                Err(err) => table.errors.push(RouteParseError {
                    line: index + 1,
                    reason: err.to_string(),
                }),
            }
        }
        table
    }

    /// Like [`RouteTable::parse`] but the first malformed line is an error.
    pub fn parse_strict(content: &str) -> Result<Self, RouteError> {
        let table = Self::parse(content);
        match table.errors.first() {
            Some(err) => Err(RouteError::Invalid(format!("line {}: {}", err.line, err.reason))),
            None => Ok(table),
        }
    }

    pub fn load(path: &Path) -> Result<Self, RouteError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(RouteError::Missing(path.to_path_buf()))
            }
            Err(source) => Err(RouteError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn errors(&self) -> &[RouteParseError] {
        &self.errors
    }

    /// Normalized prefix → rig, for rig-level routes only. On duplicates the
    /// first line wins; see [`RouteTable::duplicate_prefixes`].
    pub fn rig_map(&self) -> BTreeMap<String, RigRoute> {
        let mut map = BTreeMap::new();
        for route in &self.routes {
            let Some(rig_name) = route.rig_name() else {
                continue;
            };
            map.entry(route.normalized_prefix().to_string())
                .or_insert_with(|| RigRoute {
                    rig_name: rig_name.to_string(),
                    path: route.path.trim().to_string(),
                });
        }
        map
    }

    /// Every normalized prefix, including fleet-level ones.
    pub fn known_prefixes(&self) -> BTreeSet<String> {
        self.routes
            .iter()
            .map(|route| route.normalized_prefix().to_string())
            .collect()
    }

    pub fn duplicate_prefixes(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        for route in &self.routes {
            let prefix = route.normalized_prefix();
            if !seen.insert(prefix) {
                duplicates.insert(prefix.to_string());
            }
        }
        duplicates.into_iter().collect()
    }

    pub fn prefix_for_rig(&self, rig: &str) -> Option<String> {
        self.routes
            .iter()
            .find(|route| route.rig_name() == Some(rig))
            .map(|route| route.normalized_prefix().to_string())
    }
}

/// Appends one route, rewriting the file atomically. Refuses a prefix that
/// is already present so the table stays unique.
pub fn append_route(path: &Path, route: &Route) -> Result<(), RouteError> {
    let existing = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(RouteError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let table = RouteTable::parse(&existing);
    if table.known_prefixes().contains(route.normalized_prefix()) {
        return Err(RouteError::Invalid(format!(
            "prefix {} already routed",
            route.prefix
        )));
    }
    let line = serde_json::to_string(route).map_err(|err| RouteError::Invalid(err.to_string()))?;
    let mut contents = existing;
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&line);
    contents.push('\n');
    atomic_write(path, &contents).map_err(|source| RouteError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{"prefix":"hq-","path":"."}
{"prefix":"gt-","path":"gastown/mayor/rig"}

# beads lives in its own rig
{"prefix":"bd-","path":"beads/mayor/rig"}
not json
{"prefix":"gt","path":"gastown"}
"#;

    #[test]
    fn builds_rig_map_without_town_rows() {
        let table = RouteTable::parse(SAMPLE);
        let map = table.rig_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["gt"].rig_name, "gastown");
        assert_eq!(map["gt"].path, "gastown/mayor/rig");
        assert_eq!(map["bd"].rig_name, "beads");
        assert!(!map.contains_key("hq"));
    }

    #[test]
    fn town_prefixes_count_as_known() {
        let table = RouteTable::parse(SAMPLE);
        let known = table.known_prefixes();
        assert!(known.contains("hq"));
        assert!(known.contains("gt"));
        assert_eq!(known.len(), 3);
    }

    #[test]
    fn detects_duplicates_after_normalization_and_bad_lines() {
        let table = RouteTable::parse(SAMPLE);
        assert_eq!(table.duplicate_prefixes(), vec!["gt".to_string()]);
        assert_eq!(table.errors().len(), 1);
        assert_eq!(table.errors()[0].line, 6);
    }

    #[test]
    fn strict_mode_rejects_first_bad_line() {
        let err = RouteTable::parse_strict(SAMPLE).expect_err("bad line");
        assert!(err.to_string().contains("line 6"));
        let table = RouteTable::parse_strict("{\"prefix\":\"gt-\",\"path\":\"gastown\"}\n")
            .expect("clean table");
        assert_eq!(table.routes().len(), 1);
    }

    #[test]
    fn appends_new_route_and_rejects_duplicates() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("routes.jsonl");
        fs::write(&path, r#"{"prefix":"hq-","path":"."}"#).expect("seed");

        append_route(&path, &Route::new("gt-", "gastown/mayor/rig")).expect("append");
        let table = RouteTable::load(&path).expect("load");
        assert_eq!(table.routes().len(), 2);
        assert_eq!(table.prefix_for_rig("gastown").as_deref(), Some("gt"));

        assert!(append_route(&path, &Route::new("gt", "elsewhere")).is_err());
    }

    #[test]
    fn missing_file_is_distinct() {
        let dir = TempDir::new().expect("tempdir");
        assert!(matches!(
            RouteTable::load(&dir.path().join("routes.jsonl")),
            Err(RouteError::Missing(_))
        ));
    }
}
