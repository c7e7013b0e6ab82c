//! Tool lookup and validation.
//!
//! Used by environment validation before any orchestration starts: a required
//! tool that cannot be resolved is a fatal environment error.

use std::path::{Path, PathBuf};
use testrig_common::{Error, Result};

/// Resolve `program` to an executable file.
///
/// A program containing a path separator is checked as-is; a bare name is
/// searched for in every `PATH` entry.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }

    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| executable_names(program).into_iter().map(move |n| dir.join(n)))
        .find(|path| is_executable(path))
}

/// Validate that a required tool is available.
pub fn require_tool(program: &str) -> Result<PathBuf> {
    if program.is_empty() {
        return Err(Error::validation("Tool name cannot be empty"));
    }
    find_executable(program)
        .ok_or_else(|| Error::environment(program, "not found on PATH"))
}

#[cfg(windows)]
fn executable_names(program: &str) -> Vec<String> {
    vec![program.to_string(), format!("{}.exe", program)]
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
