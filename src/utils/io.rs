//! File I/O primitives with consistent error handling.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Read file contents with standardized error handling.
///
/// Wraps `fs::read_to_string` with consistent `Error::internal_io` formatting.
pub fn read_file(path: &Path, operation: &str) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

/// Read a file, treating a missing file as empty text.
pub fn read_file_or_empty(path: &Path, operation: &str) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(Error::internal_io(e.to_string(), Some(operation.to_string()))),
    }
}

/// Write content to file atomically (write to .tmp, then rename).
///
/// Readers always see either the old content or the new content.
pub fn write_file_atomic(path: &Path, content: &str, operation: &str) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        Error::internal_io(
            format!("Invalid path: {}", path.display()),
            Some(operation.to_string()),
        )
    })?;

    let filename = path.file_name().ok_or_else(|| {
        Error::internal_io(
            format!("Invalid path: {}", path.display()),
            Some(operation.to_string()),
        )
    })?;

    let tmp_path = parent.join(format!("{}.tmp", filename.to_string_lossy()));

    fs::write(&tmp_path, content)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} (write temp)", operation))))?;

    fs::rename(&tmp_path, path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} (rename)", operation))))?;

    Ok(())
}

/// Create a directory and all of its parents.
pub fn ensure_dir(dir: &Path, operation: &str) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

/// Copy a file or a directory tree to `dst`, creating parent directories.
pub fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent, "create destination parent")?;
    }

    if src.is_dir() {
        copy_dir_recursive(src, dst)
    } else {
        fs::copy(src, dst)
            .map(|_| ())
            .map_err(|e| Error::internal_io(e.to_string(), Some(format!("copy {}", src.display()))))
    }
}

/// Recursively copy a directory tree, merging into an existing destination.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst, "create target dir")?;

    for entry in fs::read_dir(src)
        .map_err(|e| Error::internal_io(e.to_string(), Some("read source dir".into())))?
    {
        let entry =
            entry.map_err(|e| Error::internal_io(e.to_string(), Some("read dir entry".into())))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).map_err(|e| {
                Error::internal_io(e.to_string(), Some("copy file".into()))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn read_file_succeeds_for_existing_file() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "test content").unwrap();

        let content = read_file(temp.path(), "test read").unwrap();
        assert!(content.contains("test content"));
    }

    #[test]
    fn read_file_returns_error_for_missing_file() {
        let result = read_file(Path::new("/nonexistent/path.txt"), "test read");
        let err = result.unwrap_err();
        assert_eq!(err.code.as_str(), "internal.io_error");
    }

    #[test]
    fn read_file_or_empty_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let content = read_file_or_empty(&dir.path().join("absent.tfvars"), "read").unwrap();
        assert!(content.is_empty());
    }

    #[test]
    fn write_file_atomic_replaces_content_without_leaving_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.tfvars");
        fs::write(&path, "old").unwrap();

        write_file_atomic(&path, "new", "test write").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(!dir.path().join("dev.tfvars.tmp").exists());
    }

    #[test]
    fn copy_path_handles_files_and_trees() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("build/static")).unwrap();
        fs::write(src.path().join("build/index.html"), "<html>").unwrap();
        fs::write(src.path().join("build/static/app.js"), "js").unwrap();
        fs::write(src.path().join("package.json"), "{}").unwrap();

        let dst = tempfile::tempdir().unwrap();
        copy_path(&src.path().join("build"), &dst.path().join("build")).unwrap();
        copy_path(&src.path().join("package.json"), &dst.path().join("nested/package.json")).unwrap();

        assert_eq!(fs::read_to_string(dst.path().join("build/static/app.js")).unwrap(), "js");
        assert_eq!(fs::read_to_string(dst.path().join("nested/package.json")).unwrap(), "{}");
    }
}
