use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use toml::{Table, Value};

use crate::utils::errors::InitError;
use crate::utils::metadata::ProjectMetadata;
use crate::utils::specifier::Specifier;

const BUILD_REQUIRES: &str = "hatchling";
const BUILD_BACKEND: &str = "hatchling.build";

/// Read `pyproject.toml` into a table; a missing file is an empty table.
pub fn read_manifest(path: &Path) -> Result<Table> {
  if !path.exists() {
    return Ok(Table::new());
  }
  let data =
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let table: Table =
    toml::from_str(&data).with_context(|| format!("invalid TOML in {}", path.display()))?;
  Ok(table)
}

/// Replace `path` with the serialized `table` via a sibling temp file and rename.
pub fn write_manifest(path: &Path, table: &Table) -> Result<()> {
  let body = toml::to_string_pretty(table).context("failed to serialize manifest")?;
  let tmp = path.with_extension("toml.tmp");
  fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
  fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
  Ok(())
}

/// The `project.requires-python` of an existing manifest, when present and parseable.
#[must_use]
pub fn declared_requires_python(path: &Path) -> Option<Specifier> {
  let table = read_manifest(path).ok()?;
  let raw = table
    .get("project")?
    .get("requires-python")?
    .as_str()?
    .to_string();
  match raw.parse() {
    Ok(spec) => Some(spec),
    Err(err) => {
      debug!("ignore requires-python `{raw}`: {err:#}");
      None
    }
  }
}

/// Look up `[tool.pyinit.scripts].<name>`.
#[must_use]
pub fn script_entry(table: &Table, name: &str) -> Option<Value> {
  table
    .get("tool")?
    .get("pyinit")?
    .get("scripts")?
    .get(name)
    .cloned()
}

/// Mutable access to `[tool.pyinit]`, created on demand.
pub fn tool_table(table: &mut Table) -> &mut Table {
  let tool = table
    .entry("tool")
    .or_insert_with(|| Value::Table(Table::new()));
  if !tool.is_table() {
    *tool = Value::Table(Table::new());
  }
  let Value::Table(tool) = tool else {
    unreachable!("tool was just made a table")
  };
  let own = tool
    .entry("pyinit")
    .or_insert_with(|| Value::Table(Table::new()));
  if !own.is_table() {
    *own = Value::Table(Table::new());
  }
  let Value::Table(own) = own else {
    unreachable!("tool.pyinit was just made a table")
  };
  own
}

pub trait ManifestWriter {
  /// Persist `metadata`, returning the manifest path.
  ///
  /// Fails with [`InitError::Persist`].
  fn write(&self, metadata: &ProjectMetadata) -> Result<PathBuf>;
}

/// Writes `[project]` and `[build-system]` of `pyproject.toml`, leaving other tables alone.
#[derive(Debug, Clone)]
pub struct PyprojectWriter {
  root: PathBuf,
  manifest: PathBuf,
}

impl PyprojectWriter {
  pub fn new(root: impl Into<PathBuf>, manifest: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      manifest: manifest.into(),
    }
  }

  fn project_table(metadata: &ProjectMetadata, previous: Option<&Table>) -> Table {
    let mut project = Table::new();
    for (key, value) in [
      ("name", &metadata.name),
      ("version", &metadata.version),
      ("description", &metadata.description),
    ] {
      if !value.is_empty() {
        project.insert(key.into(), Value::String(value.clone()));
      }
    }

    let mut author = Table::new();
    if !metadata.author.is_empty() {
      author.insert("name".into(), Value::String(metadata.author.clone()));
    }
    if !metadata.email.is_empty() {
      author.insert("email".into(), Value::String(metadata.email.clone()));
    }
    let authors = if author.is_empty() {
      Vec::new()
    } else {
      vec![Value::Table(author)]
    };
    project.insert("authors".into(), Value::Array(authors));

    if !metadata.license.is_empty() {
      let mut license = Table::new();
      license.insert("text".into(), Value::String(metadata.license.clone()));
      project.insert("license".into(), Value::Table(license));
    }

    let requires = metadata.requires_python.trim();
    if !requires.is_empty() && requires != "*" {
      project.insert("requires-python".into(), Value::String(requires.to_string()));
    }

    // Dependencies declared before re-initialisation survive it
    let kept = |key: &str| previous.and_then(|p| p.get(key)).cloned();
    project.insert(
      "dependencies".into(),
      kept("dependencies").unwrap_or_else(|| Value::Array(Vec::new())),
    );
    if let Some(optional) = kept("optional-dependencies") {
      project.insert("optional-dependencies".into(), optional);
    }
    project
  }

  /// Existing README name, or a freshly written `README.md`.
  fn ensure_readme(&self, metadata: &ProjectMetadata) -> Result<String> {
    let existing = fs::read_dir(&self.root)
      .with_context(|| format!("failed to read {}", self.root.display()))?
      .flatten()
      .map(|entry| entry.file_name().to_string_lossy().into_owned())
      .filter(|name| name.starts_with("README"))
      .min();
    if let Some(name) = existing {
      return Ok(name);
    }
    let readme = self.root.join("README.md");
    fs::write(
      &readme,
      format!("# {}\n\n{}\n", metadata.name, metadata.description),
    )
    .with_context(|| format!("failed to write {}", readme.display()))?;
    Ok("README.md".to_string())
  }

  fn persist(&self, metadata: &ProjectMetadata) -> Result<()> {
    let mut doc = read_manifest(&self.manifest)?;
    let previous = doc.get("project").and_then(Value::as_table);
    let mut project = Self::project_table(metadata, previous);

    if metadata.is_distribution() {
      let readme = self.ensure_readme(metadata)?;
      project.insert("readme".into(), Value::String(readme));
      let mut build = Table::new();
      build.insert(
        "requires".into(),
        Value::Array(vec![Value::String(BUILD_REQUIRES.into())]),
      );
      build.insert("build-backend".into(), Value::String(BUILD_BACKEND.into()));
      doc.insert("build-system".into(), Value::Table(build));
    } else if doc.get("build-system").is_some_and(is_generated_build_system) {
      // An application has no name or version, so our backend could not build it
      doc.remove("build-system");
    }
    doc.insert("project".into(), Value::Table(project));
    write_manifest(&self.manifest, &doc)
  }
}

/// True for the exact `[build-system]` table a library init writes.
fn is_generated_build_system(value: &Value) -> bool {
  let Some(table) = value.as_table() else {
    return false;
  };
  let requires: Option<Vec<&str>> = table
    .get("requires")
    .and_then(Value::as_array)
    .map(|items| items.iter().filter_map(Value::as_str).collect());
  table.len() == 2
    && table.get("build-backend").and_then(Value::as_str) == Some(BUILD_BACKEND)
    && requires.as_deref() == Some(&[BUILD_REQUIRES][..])
}

impl ManifestWriter for PyprojectWriter {
  fn write(&self, metadata: &ProjectMetadata) -> Result<PathBuf> {
    self.persist(metadata).map_err(|source| InitError::Persist {
      path: self.manifest.clone(),
      source,
    })?;
    Ok(self.manifest.clone())
  }
}
