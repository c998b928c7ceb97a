use crate::csv::parse_csv;
use crate::db::{BeadsDb, Dialect, Rows};
use crate::StorageError;
use gt_core::town::DOLT_DIR;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

pub const DEFAULT_DOLT_BINARY: &str = "dolt";

/// Dolt database driven through its command line: reads come back as CSV,
/// writes are plain `sql -q` invocations, commits go through `DOLT_COMMIT`.
#[derive(Debug, Clone)]
pub struct DoltCli {
    binary: String,
    repo_dir: PathBuf,
}

impl DoltCli {
    pub fn new(binary: impl Into<String>, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            repo_dir: repo_dir.into(),
        }
    }

    /// Finds the Dolt repository under a store directory: either
    /// `<store>/dolt` itself or its first child holding a `.dolt` directory.
    pub fn locate(binary: &str, store_dir: &Path) -> Result<Self, StorageError> {
        let data_dir = store_dir.join(DOLT_DIR);
        if data_dir.join(".dolt").is_dir() {
            return Ok(Self::new(binary, data_dir));
        }
        let entries = fs::read_dir(&data_dir).map_err(|source| StorageError::Io {
            path: data_dir.clone(),
            source,
        })?;
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.join(".dolt").is_dir())
            .collect();
        candidates.sort();
        candidates
            .into_iter()
            .next()
            .map(|repo| Self::new(binary, repo))
            .ok_or(StorageError::NoBackend(store_dir.to_path_buf()))
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn run(&self, args: &[&str]) -> Result<String, StorageError> {
        debug!(binary = %self.binary, dir = %self.repo_dir.display(), ?args, "dolt_invoke");
        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|err| {
                if err.kind() == io::ErrorKind::NotFound {
                    StorageError::BinaryMissing(self.binary.clone())
                } else {
                    StorageError::Io {
                        path: self.repo_dir.clone(),
                        source: err,
                    }
                }
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            return Err(StorageError::Command {
                command: format!("{} {}", self.binary, args.join(" ")),
                stderr: if stderr.is_empty() { stdout } else { stderr },
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl BeadsDb for DoltCli {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn version(&self) -> Result<String, StorageError> {
        Ok(self.run(&["version"])?.trim().to_string())
    }

    fn query(&self, sql: &str) -> Result<Rows, StorageError> {
        let output = self.run(&["sql", "-r", "csv", "-q", sql])?;
        parse_csv(&output)
    }

    fn execute(&self, sql: &str) -> Result<(), StorageError> {
        self.run(&["sql", "-q", sql]).map(|_| ())
    }

    fn commit(&self, message: &str) -> Result<(), StorageError> {
        let sql = format!(
            "CALL DOLT_COMMIT('-Am', {})",
            self.dialect().quote(message)
        );
        match self.execute(&sql) {
            Ok(()) => Ok(()),
            Err(StorageError::Command { stderr, .. }) if stderr.contains("nothing to commit") => {
                debug!("dolt_commit_noop");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn locates_nested_repository() {
        let dir = TempDir::new().expect("tempdir");
        let store = dir.path().join(".beads");
        fs::create_dir_all(store.join("dolt/beads_gt/.dolt")).expect("mkdir");
        let cli = DoltCli::locate(DEFAULT_DOLT_BINARY, &store).expect("locate");
        assert_eq!(cli.repo_dir(), store.join("dolt/beads_gt"));
    }

    #[test]
    fn locate_without_repository_fails() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir_all(dir.path().join("dolt/empty")).expect("mkdir");
        assert!(matches!(
            DoltCli::locate(DEFAULT_DOLT_BINARY, dir.path()),
            Err(StorageError::NoBackend(_))
        ));
    }

    #[test]
    fn missing_binary_is_distinguished() {
        let dir = TempDir::new().expect("tempdir");
        let cli = DoltCli::new("gt-definitely-not-a-binary", dir.path());
        assert!(matches!(
            cli.version(),
            Err(StorageError::BinaryMissing(_))
        ));
    }
}
