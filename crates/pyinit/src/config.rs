use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use owo_colors::OwoColorize as _;
use serde::Deserialize;
use toml::Value as TomlValue;

/// Known top-level config keys.
const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["python", "venv", "init"];

/// Known keys within `[python]`.
const KNOWN_PYTHON_KEYS: &[&str] = &["use_venv"];

/// Known keys within `[venv]`.
const KNOWN_VENV_KEYS: &[&str] = &["backend", "in_project"];

/// Known keys within `[init]`.
const KNOWN_INIT_KEYS: &[&str] = &[
  "requirements",
  "interactive_requires_python",
  "requires_python_upper",
];

// Embed repository defaults
const DEFAULT_TOML: &str =
  include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/defaults/pyinit.toml"));

pub const MANIFEST_FILE: &str = "pyproject.toml";
pub const PROJECT_CONFIG_FILE: &str = ".pyinit.toml";
pub const PYTHON_MARKER_FILE: &str = ".pyinit-python";
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

#[derive(Debug, Clone, Deserialize)]
pub struct PythonConfig {
  #[serde(default = "default_true")]
  pub use_venv: bool,
}

impl Default for PythonConfig {
  fn default() -> Self {
    Self { use_venv: true }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenvBackend {
  #[default]
  Venv,
  Virtualenv,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenvConfig {
  #[serde(default)]
  pub backend: VenvBackend,
  #[serde(default = "default_true")]
  pub in_project: bool,
}

impl Default for VenvConfig {
  fn default() -> Self {
    Self {
      backend: VenvBackend::Venv,
      in_project: true,
    }
  }
}

/// Where the non-interactive import looks for `requirements.txt`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum RequirementsLookup {
  /// `<cwd>/requirements.txt`
  #[default]
  WorkingDir,
  /// `<project root>/requirements.txt`
  ProjectRoot,
  /// A file path, relative paths are taken from the project root
  Fixed(PathBuf),
}

impl From<String> for RequirementsLookup {
  fn from(value: String) -> Self {
    match value.trim() {
      "cwd" => Self::WorkingDir,
      "root" => Self::ProjectRoot,
      other => Self::Fixed(PathBuf::from(other)),
    }
  }
}

impl RequirementsLookup {
  #[must_use]
  pub fn resolve(&self, paths: &ProjectPaths) -> PathBuf {
    match self {
      Self::WorkingDir => paths.cwd().join(REQUIREMENTS_FILE),
      Self::ProjectRoot => paths.root().join(REQUIREMENTS_FILE),
      Self::Fixed(path) => paths.root().join(path),
    }
  }
}

/// Whether interactive runtime selection honours an existing `requires-python`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiresPythonPolicy {
  #[default]
  Ignore,
  Enforce,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitConfig {
  #[serde(default)]
  pub requirements: RequirementsLookup,
  #[serde(default)]
  pub interactive_requires_python: RequiresPythonPolicy,
  /// Upper bound appended to the offered requires-python default, e.g. `3.14`.
  #[serde(default)]
  pub requires_python_upper: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PyinitConfig {
  #[serde(default)]
  pub python: PythonConfig,
  #[serde(default)]
  pub venv: VenvConfig,
  #[serde(default)]
  pub init: InitConfig,
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone)]
pub struct ProjectPaths {
  root: PathBuf,
  cwd: PathBuf,
}

impl ProjectPaths {
  pub fn new(root: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      cwd: cwd.into(),
    }
  }

  #[must_use]
  pub fn root(&self) -> &PathBuf {
    &self.root
  }

  #[must_use]
  pub fn cwd(&self) -> &PathBuf {
    &self.cwd
  }

  /// Base name of the project root, used as the default project name.
  #[must_use]
  pub fn root_name(&self) -> String {
    let canonical = self
      .root
      .canonicalize()
      .unwrap_or_else(|_| self.root.clone());
    canonical
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default()
  }

  #[must_use]
  pub fn manifest(&self) -> PathBuf {
    self.root.join(MANIFEST_FILE)
  }

  #[must_use]
  pub fn python_marker(&self) -> PathBuf {
    self.root.join(PYTHON_MARKER_FILE)
  }

  #[must_use]
  pub fn in_project_venv(&self) -> PathBuf {
    self.root.join(".venv")
  }
}

#[derive(Debug, Clone)]
pub struct AppContext {
  pub paths: ProjectPaths,
  pub config: PyinitConfig,
}

fn merge_values(base: &mut TomlValue, overlay: TomlValue) {
  match (base, overlay) {
    (TomlValue::Table(base_tbl), TomlValue::Table(overlay_tbl)) => {
      for (k, v) in overlay_tbl {
        match base_tbl.get_mut(&k) {
          Some(existing) => merge_values(existing, v),
          None => {
            base_tbl.insert(k, v);
          }
        }
      }
    }
    // Arrays and scalars: replace last-wins
    (base_slot, new_v) => *base_slot = new_v,
  }
}

/// Warn about unknown keys in a parsed TOML config file.
fn warn_unknown_keys(val: &TomlValue, file_path: &Path) {
  let TomlValue::Table(table) = val else {
    return;
  };

  for key in table.keys() {
    if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
      eprintln!(
        "{}: unknown config key '{}' in {} (did you mean one of: {}?)",
        "warning".yellow(),
        key,
        file_path.display(),
        KNOWN_TOP_LEVEL_KEYS.join(", ")
      );
    }
  }

  for (section, known) in [
    ("python", KNOWN_PYTHON_KEYS),
    ("venv", KNOWN_VENV_KEYS),
    ("init", KNOWN_INIT_KEYS),
  ] {
    let Some(TomlValue::Table(inner)) = table.get(section) else {
      continue;
    };
    for key in inner.keys() {
      if !known.contains(&key.as_str()) {
        eprintln!(
          "{}: unknown config key '{}.{}' in {} (known keys: {})",
          "warning".yellow(),
          section,
          key,
          file_path.display(),
          known.join(", ")
        );
      }
    }
  }
}

fn merge_file(merged: &mut TomlValue, path: &Path) -> Result<()> {
  let data =
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let val: TomlValue =
    toml::from_str(&data).with_context(|| format!("invalid TOML in {}", path.display()))?;
  warn_unknown_keys(&val, path);
  merge_values(merged, val);
  Ok(())
}

/// Load and merge configuration from defaults, global, and project files.
///
/// # Errors
/// Returns an error if any of the config files cannot be read or parsed
/// as valid TOML.
pub fn load_config(project_root: &Path) -> Result<PyinitConfig> {
  let mut merged: TomlValue =
    toml::from_str(DEFAULT_TOML).context("invalid embedded default config")?;

  let xdg = xdg::BaseDirectories::with_prefix("pyinit");
  if let Some(global_path) = xdg.find_config_file("config.toml") {
    merge_file(&mut merged, &global_path)?;
  }

  let project_cfg = project_root.join(PROJECT_CONFIG_FILE);
  if project_cfg.exists() {
    merge_file(&mut merged, &project_cfg)?;
  }

  parse_merged(&merged)
}

fn parse_merged(merged: &TomlValue) -> Result<PyinitConfig> {
  let merged_str = toml::to_string(merged).context("failed to serialize merged config")?;
  let cfg: PyinitConfig = toml::from_str(&merged_str).context("failed to parse merged config")?;
  Ok(cfg)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_defaults_parse() {
    let val: TomlValue = toml::from_str(DEFAULT_TOML).unwrap();
    let cfg = parse_merged(&val).unwrap();
    assert!(cfg.python.use_venv);
    assert_eq!(cfg.venv.backend, VenvBackend::Venv);
    assert!(cfg.venv.in_project);
    assert_eq!(cfg.init.requirements, RequirementsLookup::WorkingDir);
    assert_eq!(
      cfg.init.interactive_requires_python,
      RequiresPythonPolicy::Ignore
    );
    assert!(cfg.init.requires_python_upper.is_none());
  }

  #[test]
  fn overlay_replaces_scalars_and_keeps_siblings() {
    let mut base: TomlValue = toml::from_str(DEFAULT_TOML).unwrap();
    let overlay: TomlValue =
      toml::from_str("[venv]\nbackend = \"virtualenv\"\n[init]\nrequirements = \"/srv/req.txt\"\n")
        .unwrap();
    merge_values(&mut base, overlay);
    let cfg = parse_merged(&base).unwrap();
    assert_eq!(cfg.venv.backend, VenvBackend::Virtualenv);
    assert!(cfg.venv.in_project, "sibling key survives the merge");
    assert_eq!(
      cfg.init.requirements,
      RequirementsLookup::Fixed(PathBuf::from("/srv/req.txt"))
    );
  }

  #[test]
  fn requirements_lookup_resolves_against_paths() {
    let paths = ProjectPaths::new("/work/demo", "/work");
    assert_eq!(
      RequirementsLookup::WorkingDir.resolve(&paths),
      PathBuf::from("/work/requirements.txt")
    );
    assert_eq!(
      RequirementsLookup::ProjectRoot.resolve(&paths),
      PathBuf::from("/work/demo/requirements.txt")
    );
    assert_eq!(
      RequirementsLookup::from("/requirements.txt".to_string()).resolve(&paths),
      PathBuf::from("/requirements.txt")
    );
    assert_eq!(
      RequirementsLookup::from("deps/base.txt".to_string()).resolve(&paths),
      PathBuf::from("/work/demo/deps/base.txt")
    );
  }

  #[test]
  fn root_name_is_directory_base_name() {
    let paths = ProjectPaths::new("/nonexistent/demo", "/");
    assert_eq!(paths.root_name(), "demo");
    assert_eq!(paths.manifest(), PathBuf::from("/nonexistent/demo/pyproject.toml"));
  }
}
