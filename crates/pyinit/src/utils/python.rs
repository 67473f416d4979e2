use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use log::debug;
use regex::Regex;

use crate::utils::errors::InitError;
use crate::utils::session::Questions;
use crate::utils::specifier::{Specifier, Version};
use crate::utils::which::{is_executable, search_dirs, which};
use crate::utils::wizard::Choice;

/// Directories searched for interpreters; falls back to PATH when unset.
pub const PYTHON_PATH_ENV: &str = "PYINIT_PYTHON_PATH";

const VERSION_PROBE: &str =
  "import sys; print('.'.join(map(str, sys.version_info[:3]))); print(sys.executable)";

fn interpreter_name_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^python(3(\.\d+)?)?$").expect("valid interpreter regex"))
}

/// A concrete interpreter: its version and executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonInfo {
  pub executable: PathBuf,
  pub version: Version,
}

impl PythonInfo {
  pub fn new(executable: impl Into<PathBuf>, version: Version) -> Self {
    Self {
      executable: executable.into(),
      version,
    }
  }

  /// Run the interpreter at `path` and ask it for its version and real executable.
  pub fn from_path(path: &Path) -> Result<Self> {
    let out = Command::new(path)
      .args(["-c", VERSION_PROBE])
      .stdin(Stdio::null())
      .stderr(Stdio::null())
      .output()
      .with_context(|| format!("failed to run {}", path.display()))?;
    if !out.status.success() {
      bail!("{} exited with status {}", path.display(), out.status);
    }
    let stdout = String::from_utf8_lossy(&out.stdout);
    let mut lines = stdout.lines().map(str::trim);
    let version: Version = lines
      .next()
      .unwrap_or_default()
      .parse()
      .with_context(|| format!("unexpected version output from {}", path.display()))?;
    if version.parts().len() < 2 {
      bail!("unexpected version output from {}: {version}", path.display());
    }
    let executable = lines
      .next()
      .filter(|line| !line.is_empty())
      .map_or_else(|| path.to_path_buf(), PathBuf::from);
    Ok(Self {
      executable,
      version,
    })
  }

  #[must_use]
  pub fn major(&self) -> u64 {
    self.version.parts().first().copied().unwrap_or(0)
  }

  #[must_use]
  pub fn minor(&self) -> u64 {
    self.version.parts().get(1).copied().unwrap_or(0)
  }

  /// `major.minor`, e.g. `3.11`.
  #[must_use]
  pub fn major_minor(&self) -> String {
    format!("{}.{}", self.major(), self.minor())
  }
}

/// What the workflow asks of the runtime selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeRequest {
  /// Empty, a version prefix (`3`, `3.11`), an interpreter name or a path.
  pub selector: String,
  /// Skip filtering by the manifest's existing `requires-python`.
  pub ignore_requires_python: bool,
  /// Take the best match without asking.
  pub pick_first: bool,
}

pub trait RuntimeSelector {
  /// Resolve a concrete interpreter for `request`.
  ///
  /// Fails with [`InitError::RuntimeNotFound`] when nothing matches.
  fn resolve(&self, request: &RuntimeRequest, questions: &Questions<'_>) -> Result<PythonInfo>;

  /// Remember `python` as the project's interpreter.
  fn remember(&self, python: &PythonInfo) -> Result<()>;

  /// The constraint currently declared by the project, if any.
  fn requires_python(&self) -> Option<&Specifier>;
}

/// Finds interpreters on disk.
#[derive(Debug, Clone)]
pub struct PythonFinder {
  marker: PathBuf,
  requires_python: Option<Specifier>,
}

impl PythonFinder {
  pub fn new(marker: impl Into<PathBuf>, requires_python: Option<Specifier>) -> Self {
    Self {
      marker: marker.into(),
      requires_python,
    }
  }

  /// Every distinct interpreter on the search path, highest version first.
  #[must_use]
  pub fn discover() -> Vec<PythonInfo> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut found: Vec<PythonInfo> = Vec::new();
    for dir in search_dirs(PYTHON_PATH_ENV) {
      let Ok(entries) = fs::read_dir(&dir) else {
        continue;
      };
      let mut names: Vec<(String, PathBuf)> = entries
        .flatten()
        .map(|entry| (entry.file_name().to_string_lossy().into_owned(), entry.path()))
        .filter(|(name, path)| interpreter_name_re().is_match(name) && is_executable(path))
        .collect();
      names.sort();
      for (_, path) in names {
        let key = path.canonicalize().unwrap_or_else(|_| path.clone());
        if !seen.insert(key) {
          continue;
        }
        match PythonInfo::from_path(&path) {
          Ok(info) => found.push(info),
          Err(err) => debug!("skip interpreter {}: {err:#}", path.display()),
        }
      }
    }
    found.sort_by(|a, b| b.version.cmp(&a.version));
    found
  }

  fn candidates(selector: &str) -> Result<Vec<PythonInfo>> {
    let selector = selector.trim();
    if selector.is_empty() {
      return Ok(Self::discover());
    }
    if let Ok(prefix) = selector.parse::<Version>() {
      return Ok(
        Self::discover()
          .into_iter()
          .filter(|info| info.version.starts_with(&prefix))
          .collect(),
      );
    }
    let path = Path::new(selector);
    if path.is_file() {
      return Ok(vec![PythonInfo::from_path(path)?]);
    }
    match which(selector) {
      Some(resolved) => Ok(vec![PythonInfo::from_path(&resolved)?]),
      None => Ok(Vec::new()),
    }
  }
}

impl RuntimeSelector for PythonFinder {
  fn resolve(&self, request: &RuntimeRequest, questions: &Questions<'_>) -> Result<PythonInfo> {
    let mut matches = Self::candidates(&request.selector)?;
    debug!(
      "found {} interpreter(s) for `{}`",
      matches.len(),
      request.selector
    );
    let constraint = self
      .requires_python
      .as_ref()
      .filter(|spec| !request.ignore_requires_python && !spec.is_any());
    if let Some(spec) = constraint {
      matches.retain(|info| spec.contains(&info.version));
    }
    if matches.is_empty() {
      return Err(
        InitError::RuntimeNotFound {
          request: request.selector.clone(),
          constraint: constraint.map(ToString::to_string),
        }
        .into(),
      );
    }
    if request.pick_first || matches.len() == 1 {
      return Ok(matches.swap_remove(0));
    }

    let options: Vec<Choice> = matches
      .iter()
      .map(|info| {
        let exe = info.executable.display().to_string();
        Choice::new(exe.clone(), info.version.to_string()).with_detail(exe)
      })
      .collect();
    let default = options[0].value.clone();
    let picked = questions.select("Please select a Python interpreter", &options, &default)?;
    let idx = options
      .iter()
      .position(|opt| opt.value == picked)
      .unwrap_or(0);
    Ok(matches.swap_remove(idx))
  }

  fn remember(&self, python: &PythonInfo) -> Result<()> {
    fs::write(
      &self.marker,
      format!("{}\n", python.executable.display()),
    )
    .with_context(|| format!("failed to write {}", self.marker.display()))
  }

  fn requires_python(&self) -> Option<&Specifier> {
    self.requires_python.as_ref()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn major_minor_formats_version() {
    let info = PythonInfo::new("/usr/bin/python3.6", "3.6.15".parse().unwrap());
    assert_eq!(info.major(), 3);
    assert_eq!(info.minor(), 6);
    assert_eq!(info.major_minor(), "3.6");
  }

  #[test]
  fn interpreter_names() {
    let re = interpreter_name_re();
    for name in ["python", "python3", "python3.11"] {
      assert!(re.is_match(name), "{name}");
    }
    for name in ["python3-config", "python2.7", "pythonw", "ipython3"] {
      assert!(!re.is_match(name), "{name}");
    }
  }

  #[cfg(unix)]
  #[test]
  fn from_path_reads_probe_output() {
    use std::os::unix::fs::PermissionsExt as _;
    let dir = tempfile::tempdir().unwrap();
    let exe = dir.path().join("python3.10");
    fs::write(&exe, "#!/bin/sh\necho 3.10.4\necho /opt/py/bin/python3.10\n").unwrap();
    fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
    let info = PythonInfo::from_path(&exe).unwrap();
    assert_eq!(info.version.to_string(), "3.10.4");
    assert_eq!(info.executable, PathBuf::from("/opt/py/bin/python3.10"));
  }

  #[cfg(unix)]
  #[test]
  fn from_path_rejects_failing_interpreter() {
    use std::os::unix::fs::PermissionsExt as _;
    let dir = tempfile::tempdir().unwrap();
    let exe = dir.path().join("python3");
    fs::write(&exe, "#!/bin/sh\nexit 3\n").unwrap();
    fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
    assert!(PythonInfo::from_path(&exe).is_err());
  }

  #[cfg(unix)]
  fn fake_interpreters(versions: &[(&str, &str)]) -> tempfile::TempDir {
    use std::os::unix::fs::PermissionsExt as _;
    let dir = tempfile::tempdir().unwrap();
    for (name, version) in versions {
      let exe = dir.path().join(name);
      fs::write(&exe, format!("#!/bin/sh\necho {version}\necho \"$0\"\n")).unwrap();
      fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
    }
    dir
  }

  #[cfg(unix)]
  fn with_search_path<R>(dir: &Path, f: impl FnOnce() -> R) -> R {
    temp_env::with_var(PYTHON_PATH_ENV, Some(dir.as_os_str()), f)
  }

  #[cfg(unix)]
  #[test]
  #[serial_test::serial(env)]
  fn discover_sorts_highest_first() {
    let dir = fake_interpreters(&[("python3.9", "3.9.7"), ("python3.11", "3.11.2")]);
    let found = with_search_path(dir.path(), PythonFinder::discover);
    let versions: Vec<String> = found.iter().map(|i| i.version.to_string()).collect();
    assert_eq!(versions, vec!["3.11.2", "3.9.7"]);
  }

  #[cfg(unix)]
  #[test]
  #[serial_test::serial(env)]
  fn resolve_filters_by_prefix_and_constraint() {
    use crate::utils::session::testing::ScriptedPrompter;
    use crate::utils::session::Session;

    let dir = fake_interpreters(&[("python3.9", "3.9.7"), ("python3.11", "3.11.2")]);
    let marker = dir.path().join(".pyinit-python");
    let finder = PythonFinder::new(&marker, Some(">=3.10".parse().unwrap()));
    let session = Session::new(false, "3");
    let prompter = ScriptedPrompter::new(&[]);
    let questions = Questions::new(&session, &prompter);
    let request = |selector: &str, ignore: bool| RuntimeRequest {
      selector: selector.to_string(),
      ignore_requires_python: ignore,
      pick_first: true,
    };

    with_search_path(dir.path(), || {
      let best = finder.resolve(&request("3", false), &questions).unwrap();
      assert_eq!(best.major_minor(), "3.11");

      let forced = finder.resolve(&request("3.9", true), &questions).unwrap();
      assert_eq!(forced.major_minor(), "3.9");

      let err = finder.resolve(&request("3.9", false), &questions).unwrap_err();
      assert!(matches!(
        err.downcast_ref::<InitError>(),
        Some(InitError::RuntimeNotFound { .. })
      ));
    });

    let python = PythonInfo::new("/opt/python3.11", "3.11.2".parse().unwrap());
    finder.remember(&python).unwrap();
    assert_eq!(fs::read_to_string(&marker).unwrap(), "/opt/python3.11\n");
  }

  #[cfg(unix)]
  #[test]
  #[serial_test::serial(env)]
  fn interactive_resolve_asks_when_ambiguous() {
    use crate::utils::session::testing::ScriptedPrompter;
    use crate::utils::session::Session;

    let dir = fake_interpreters(&[("python3.9", "3.9.7"), ("python3.11", "3.11.2")]);
    let finder = PythonFinder::new(dir.path().join(".pyinit-python"), None);
    let session = Session::new(true, "3");
    let wanted = dir.path().join("python3.9").display().to_string();
    let prompter = ScriptedPrompter::new(&[Some(wanted.as_str())]);
    let questions = Questions::new(&session, &prompter);
    let request = RuntimeRequest {
      selector: String::new(),
      ignore_requires_python: true,
      pick_first: false,
    };
    let picked = with_search_path(dir.path(), || finder.resolve(&request, &questions)).unwrap();
    assert_eq!(picked.major_minor(), "3.9");
    assert_eq!(prompter.prompt_count(), 1);
  }
}
