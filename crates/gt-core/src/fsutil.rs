use std::fs;
use std::io;
use std::path::Path;

/// Writes `contents` next to `path` and renames it into place, so readers
/// never observe a half-written file.
pub fn atomic_write(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp_path, contents)?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn replaces_existing_content_and_leaves_no_temp_file() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("nested/redirect");
        atomic_write(&target, "one\n").expect("first write");
        atomic_write(&target, "two\n").expect("second write");
        assert_eq!(fs::read_to_string(&target).expect("read"), "two\n");
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
