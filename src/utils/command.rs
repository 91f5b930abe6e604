//! PATH lookup for the external tools a stage depends on.

use std::env;
use std::path::{Path, PathBuf};

/// Locate an executable the way a shell would, returning its full path.
///
/// Names containing a path separator are checked as-is.
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .flat_map(|dir| executable_names(program).into_iter().map(move |n| dir.join(n)))
        .find(|p| is_executable(p))
}

#[cfg(windows)]
fn executable_names(program: &str) -> Vec<String> {
    vec![
        program.to_string(),
        format!("{}.exe", program),
        format!("{}.cmd", program),
    ]
}

#[cfg(not(windows))]
fn executable_names(program: &str) -> Vec<String> {
    vec![program.to_string()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn finds_sh_on_path() {
        let found = find_on_path("sh").unwrap();
        assert!(found.ends_with("sh"));
    }

    #[test]
    fn missing_program_is_none() {
        assert!(find_on_path("stackops-definitely-missing-binary").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn explicit_path_is_checked_directly() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("tool");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        let path = script.to_string_lossy().to_string();
        assert!(find_on_path(&path).is_none());

        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(find_on_path(&path), Some(script));
    }
}
