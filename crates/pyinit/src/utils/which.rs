use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Resolve `program` to an executable. Names containing a path separator are
/// checked as-is, bare names are looked up on PATH.
#[must_use]
pub(crate) fn which(program: &str) -> Option<PathBuf> {
  let candidates: Vec<PathBuf> = if Path::new(program).components().count() > 1 {
    vec![PathBuf::from(program)]
  } else {
    search_dirs("PATH")
      .into_iter()
      .map(|dir| dir.join(program))
      .collect()
  };
  candidates.into_iter().find(|path| is_executable(path))
}

/// Directories listed in the environment variable `var`, falling back to PATH
/// when `var` is unset or empty.
#[must_use]
pub(crate) fn search_dirs(var: &str) -> Vec<PathBuf> {
  let value: Option<OsString> = match std::env::var_os(var) {
    Some(value) if !value.is_empty() => Some(value),
    _ => std::env::var_os("PATH"),
  };
  value.map_or_else(Vec::new, |value| std::env::split_paths(&value).collect())
}

/// A regular file with at least one execute bit set.
#[cfg(unix)]
#[must_use]
pub(crate) fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt as _;
  std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
#[must_use]
pub(crate) fn is_executable(path: &Path) -> bool {
  path.is_file()
}
