use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use log::debug;
use regex::Regex;
use toml::{Table, Value};

use crate::config::MANIFEST_FILE;
use crate::log_warn;
use crate::utils::errors::InitError;
use crate::utils::manifest::{read_manifest, tool_table, write_manifest};

/// Formats the importer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
  /// pip `requirements.txt` syntax
  Requirements,
  /// pipenv `Pipfile`
  Pipfile,
}

impl SourceKind {
  /// Guess the format from a file name.
  #[must_use]
  pub fn from_path(path: &Path) -> Option<Self> {
    let name = path.file_name()?.to_str()?;
    if name == "Pipfile" {
      return Some(Self::Pipfile);
    }
    let in_requirements_dir = path
      .parent()
      .and_then(Path::file_name)
      .is_some_and(|dir| dir == "requirements");
    let is_txt = path.extension().is_some_and(|ext| ext == "txt");
    if is_txt && (name.starts_with("requirements") || in_requirements_dir) {
      return Some(Self::Requirements);
    }
    None
  }
}

impl fmt::Display for SourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Requirements => write!(f, "requirements"),
      Self::Pipfile => write!(f, "Pipfile"),
    }
  }
}

/// Importable files in `root`, sorted by path.
#[must_use]
pub fn detect_sources(root: &Path) -> Vec<(PathBuf, SourceKind)> {
  let mut found = Vec::new();
  for dir in [root.to_path_buf(), root.join("requirements")] {
    let Ok(entries) = fs::read_dir(&dir) else {
      continue;
    };
    for entry in entries.flatten() {
      let path = entry.path();
      if !path.is_file() {
        continue;
      }
      if let Some(kind) = SourceKind::from_path(&path) {
        found.push((path, kind));
      }
    }
  }
  found.sort_by(|a, b| a.0.cmp(&b.0));
  found
}

/// One package index referenced by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIndex {
  pub name: String,
  pub url: String,
  pub verify_ssl: bool,
}

/// Parsed content of a dependency source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedDependencies {
  pub requirements: Vec<String>,
  pub indexes: Vec<PackageIndex>,
}

pub trait DependencyImporter {
  /// Merge the dependencies declared in `source` into the manifest of `project_root`.
  ///
  /// Fails with [`InitError::Import`] when `source` is malformed.
  fn import(&self, project_root: &Path, source: &Path, kind: SourceKind)
  -> Result<ImportedDependencies>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequirementsImporter;

impl DependencyImporter for RequirementsImporter {
  fn import(
    &self,
    project_root: &Path,
    source: &Path,
    kind: SourceKind,
  ) -> Result<ImportedDependencies> {
    let parsed = match kind {
      SourceKind::Requirements => parse_requirements(source)?,
      SourceKind::Pipfile => parse_pipfile(source)?,
    };
    debug!(
      "import {} requirement(s) and {} index(es) from {}",
      parsed.requirements.len(),
      parsed.indexes.len(),
      source.display()
    );
    let manifest = project_root.join(MANIFEST_FILE);
    merge_into_manifest(&manifest, &parsed)?;
    Ok(parsed)
  }
}

fn requirement_name_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(?:$|[\[(<>=!~;@\s])")
      .expect("valid requirement regex")
  })
}

/// PEP 503 normalized distribution name.
#[must_use]
pub fn normalize_name(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  let mut in_sep = false;
  for ch in name.chars() {
    if matches!(ch, '-' | '_' | '.') {
      if !in_sep {
        out.push('-');
      }
      in_sep = true;
    } else {
      out.push(ch.to_ascii_lowercase());
      in_sep = false;
    }
  }
  out
}

/// Distribution name at the start of a requirement string.
#[must_use]
pub fn requirement_name(requirement: &str) -> Option<&str> {
  requirement_name_re()
    .captures(requirement.trim())
    .and_then(|caps| caps.get(1))
    .map(|m| m.as_str())
}

/// Logical lines with their starting line number; comments stripped, continuations joined.
fn logical_lines(body: &str) -> Vec<(usize, String)> {
  let mut out = Vec::new();
  let mut pending: Option<(usize, String)> = None;
  for (idx, raw) in body.lines().enumerate() {
    let line = strip_comment(raw);
    let (start, mut buf) = pending.take().unwrap_or((idx + 1, String::new()));
    if let Some(head) = line.strip_suffix('\\') {
      buf.push_str(head);
      buf.push(' ');
      pending = Some((start, buf));
      continue;
    }
    buf.push_str(line);
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
      out.push((start, trimmed.to_string()));
    }
  }
  if let Some((start, buf)) = pending {
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
      out.push((start, trimmed.to_string()));
    }
  }
  out
}

fn strip_comment(line: &str) -> &str {
  if line.trim_start().starts_with('#') {
    return "";
  }
  match line.find(" #").or_else(|| line.find("\t#")) {
    Some(pos) => &line[..pos],
    None => line,
  }
}

/// Value of `-r file`, `-rfile` or `--requirement=file` style options.
fn split_option<'a>(line: &'a str, short: &str, long: &str) -> Option<&'a str> {
  let rest = if let Some(rest) = line.strip_prefix(long) {
    rest
  } else if !short.is_empty()
    && let Some(rest) = line.strip_prefix(short)
  {
    rest
  } else {
    return None;
  };
  let value = rest.trim_start_matches('=').trim();
  if rest.starts_with(['=', ' ', '\t']) || (!short.is_empty() && line.starts_with(short)) {
    Some(value)
  } else {
    None
  }
}

/// Parse a requirements file, following `-r` includes.
pub fn parse_requirements(path: &Path) -> Result<ImportedDependencies> {
  let mut out = ImportedDependencies::default();
  let mut visited = HashSet::new();
  parse_requirements_into(path, &mut out, &mut visited)?;
  Ok(out)
}

fn parse_requirements_into(
  path: &Path,
  out: &mut ImportedDependencies,
  visited: &mut HashSet<PathBuf>,
) -> Result<()> {
  let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
  if !visited.insert(key) {
    debug!("skip already included {}", path.display());
    return Ok(());
  }
  let body =
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let base = path.parent().unwrap_or_else(|| Path::new("."));
  let import_error = |line: usize, message: String| InitError::Import {
    path: path.to_path_buf(),
    line,
    message,
  };

  for (lineno, line) in logical_lines(&body) {
    if let Some(include) = split_option(&line, "-r", "--requirement") {
      if include.is_empty() {
        return Err(import_error(lineno, "missing file after -r".into()).into());
      }
      parse_requirements_into(&base.join(include), out, visited)?;
      continue;
    }
    if let Some(url) = split_option(&line, "-i", "--index-url") {
      push_index(out, "pypi", url);
      continue;
    }
    if let Some(url) = split_option(&line, "", "--extra-index-url") {
      let name = format!("extra{}", out.indexes.len());
      push_index(out, &name, url);
      continue;
    }
    if split_option(&line, "-e", "--editable").is_some() {
      log_warn!(
        "Skipping editable requirement at {}:{}: {}",
        path.display(),
        lineno,
        line
      );
      continue;
    }
    if line.starts_with('-') {
      debug!("ignore option at {}:{lineno}: {line}", path.display());
      continue;
    }

    // Per-requirement options such as --hash are not kept
    let requirement = line
      .split(" --")
      .next()
      .unwrap_or_default()
      .split_whitespace()
      .collect::<Vec<_>>()
      .join(" ");
    if requirement_name(&requirement).is_none() {
      return Err(
        import_error(
          lineno,
          format!("`{requirement}` does not start with a valid distribution name"),
        )
        .into(),
      );
    }
    out.requirements.push(requirement);
  }
  Ok(())
}

fn push_index(out: &mut ImportedDependencies, name: &str, url: &str) {
  if url.is_empty() || out.indexes.iter().any(|idx| idx.url == url) {
    return;
  }
  out.indexes.push(PackageIndex {
    name: name.to_string(),
    url: url.to_string(),
    verify_ssl: true,
  });
}

/// Parse `[packages]` and `[[source]]` of a Pipfile.
pub fn parse_pipfile(path: &Path) -> Result<ImportedDependencies> {
  let body =
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let doc: Table = toml::from_str(&body).map_err(|err| InitError::Import {
    path: path.to_path_buf(),
    line: err
      .span()
      .map_or(0, |span| body[..span.start].lines().count().max(1)),
    message: err.message().to_string(),
  })?;

  let mut out = ImportedDependencies::default();
  if let Some(Value::Array(sources)) = doc.get("source") {
    for source in sources {
      let Some(url) = source.get("url").and_then(Value::as_str) else {
        continue;
      };
      let name = source
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("pypi");
      push_index(&mut out, name, url);
      if let Some(last) = out.indexes.last_mut()
        && last.url == url
      {
        last.verify_ssl = source
          .get("verify_ssl")
          .and_then(Value::as_bool)
          .unwrap_or(true);
      }
    }
  }

  let Some(Value::Table(packages)) = doc.get("packages") else {
    return Ok(out);
  };
  for (name, spec) in packages {
    match pipfile_requirement(name, spec) {
      Some(req) => out.requirements.push(req),
      None => log_warn!("Skipping unsupported Pipfile entry `{}`", name),
    }
  }
  Ok(out)
}

fn pipfile_requirement(name: &str, spec: &Value) -> Option<String> {
  let version = |raw: &str| {
    if raw.trim() == "*" {
      String::new()
    } else {
      raw.trim().to_string()
    }
  };
  match spec {
    Value::String(raw) => Some(format!("{name}{}", version(raw))),
    Value::Table(table) => {
      if ["git", "path", "file", "editable"]
        .iter()
        .any(|key| table.contains_key(*key))
      {
        return None;
      }
      let mut req = name.to_string();
      if let Some(Value::Array(extras)) = table.get("extras") {
        let extras: Vec<&str> = extras.iter().filter_map(Value::as_str).collect();
        if !extras.is_empty() {
          req.push_str(&format!("[{}]", extras.join(",")));
        }
      }
      if let Some(raw) = table.get("version").and_then(Value::as_str) {
        req.push_str(&version(raw));
      }
      if let Some(markers) = table.get("markers").and_then(Value::as_str) {
        req.push_str(&format!("; {markers}"));
      }
      Some(req)
    }
    _ => None,
  }
}

/// Merge into `project.dependencies` by normalized name and `[[tool.pyinit.source]]` by URL.
fn merge_into_manifest(manifest: &Path, parsed: &ImportedDependencies) -> Result<()> {
  let mut doc = read_manifest(manifest)?;

  let project = doc
    .entry("project")
    .or_insert_with(|| Value::Table(Table::new()));
  if let Value::Table(project) = project {
    let deps = project
      .entry("dependencies")
      .or_insert_with(|| Value::Array(Vec::new()));
    if !deps.is_array() {
      *deps = Value::Array(Vec::new());
    }
    if let Value::Array(deps) = deps {
      for req in &parsed.requirements {
        let key = requirement_name(req).map(normalize_name);
        let existing = deps.iter().position(|dep| {
          dep.as_str().and_then(requirement_name).map(normalize_name) == key
        });
        match existing {
          Some(idx) => deps[idx] = Value::String(req.clone()),
          None => deps.push(Value::String(req.clone())),
        }
      }
    }
  }

  if !parsed.indexes.is_empty() {
    let own = tool_table(&mut doc);
    let sources = own
      .entry("source")
      .or_insert_with(|| Value::Array(Vec::new()));
    if !sources.is_array() {
      *sources = Value::Array(Vec::new());
    }
    if let Value::Array(sources) = sources {
      for index in &parsed.indexes {
        let known = sources
          .iter()
          .any(|s| s.get("url").and_then(Value::as_str) == Some(index.url.as_str()));
        if known {
          continue;
        }
        let mut entry = Table::new();
        entry.insert("name".into(), Value::String(index.name.clone()));
        entry.insert("url".into(), Value::String(index.url.clone()));
        entry.insert("verify_ssl".into(), Value::Boolean(index.verify_ssl));
        sources.push(Value::Table(entry));
      }
    }
  }

  write_manifest(manifest, &doc)
}
