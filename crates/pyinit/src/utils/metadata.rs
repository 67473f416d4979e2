use anyhow::Result;

use crate::utils::git::GitIdentity;
use crate::utils::python::PythonInfo;
use crate::utils::session::Questions;

pub const DEFAULT_VERSION: &str = "0.1.0";
pub const DEFAULT_LICENSE: &str = "MIT";

/// Everything the manifest writer needs, collected once per session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectMetadata {
  pub name: String,
  pub version: String,
  pub description: String,
  /// SPDX identifier, taken as typed
  pub license: String,
  pub author: String,
  pub email: String,
  pub requires_python: String,
}

impl ProjectMetadata {
  /// Libraries carry a distribution name and version.
  #[must_use]
  pub fn is_distribution(&self) -> bool {
    !self.name.is_empty() && !self.version.is_empty()
  }
}

/// Defaults offered for each question.
#[derive(Debug, Clone)]
pub struct MetadataDefaults {
  pub name: String,
  pub identity: GitIdentity,
  pub requires_python: String,
}

impl MetadataDefaults {
  pub fn new(
    project_name: impl Into<String>,
    identity: GitIdentity,
    python: &PythonInfo,
    upper_bound: Option<&str>,
  ) -> Self {
    Self {
      name: project_name.into(),
      identity,
      requires_python: default_requires_python(python, upper_bound),
    }
  }
}

/// `>=major.minor` for the resolved interpreter. `3.6` is widened to `3.6.9`,
/// the oldest 3.6 release still accepted by current packaging tools.
#[must_use]
pub fn default_requires_python(python: &PythonInfo, upper_bound: Option<&str>) -> String {
  let mut floor = python.major_minor();
  if floor == "3.6" {
    floor = "3.6.9".to_string();
  }
  match upper_bound.map(str::trim).filter(|bound| !bound.is_empty()) {
    Some(bound) => format!(">={floor},<{bound}"),
    None => format!(">={floor}"),
  }
}

/// Ask for every metadata field. Applications get empty name/version/description
/// whatever the defaults are.
pub fn collect_metadata(
  questions: &Questions<'_>,
  is_library: bool,
  defaults: &MetadataDefaults,
) -> Result<ProjectMetadata> {
  let (name, version, description) = if is_library {
    (
      questions.ask("Project name", &defaults.name)?,
      questions.ask("Project version", DEFAULT_VERSION)?,
      questions.ask("Project description", "")?,
    )
  } else {
    (String::new(), String::new(), String::new())
  };
  let license = questions.ask("License (SPDX name)", DEFAULT_LICENSE)?;
  let author = questions.ask("Author name", &defaults.identity.name)?;
  let email = questions.ask("Author email", &defaults.identity.email)?;
  let requires_python = questions.ask(
    "Python requires ('*' to allow any)",
    &defaults.requires_python,
  )?;
  Ok(ProjectMetadata {
    name,
    version,
    description,
    license,
    author,
    email,
    requires_python,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::utils::session::Session;
  use crate::utils::session::testing::ScriptedPrompter;

  fn python(version: &str) -> PythonInfo {
    PythonInfo::new("/usr/bin/python3", version.parse().unwrap())
  }

  fn defaults() -> MetadataDefaults {
    MetadataDefaults::new(
      "demo",
      GitIdentity {
        name: "Ada".into(),
        email: "ada@example.com".into(),
      },
      &python("3.11.4"),
      None,
    )
  }

  #[test]
  fn legacy_36_floor_is_widened() {
    assert_eq!(default_requires_python(&python("3.6.15"), None), ">=3.6.9");
    assert_eq!(default_requires_python(&python("3.9.7"), None), ">=3.9");
    assert_eq!(
      default_requires_python(&python("3.11.2"), Some("3.14")),
      ">=3.11,<3.14"
    );
  }

  #[test]
  fn non_interactive_uses_every_default() {
    let session = Session::new(false, "3");
    let prompter = ScriptedPrompter::new(&[]);
    let questions = Questions::new(&session, &prompter);
    let meta = collect_metadata(&questions, true, &defaults()).unwrap();
    assert_eq!(
      meta,
      ProjectMetadata {
        name: "demo".into(),
        version: "0.1.0".into(),
        description: String::new(),
        license: "MIT".into(),
        author: "Ada".into(),
        email: "ada@example.com".into(),
        requires_python: ">=3.11".into(),
      }
    );
    assert_eq!(prompter.prompt_count(), 0);
  }

  #[test]
  fn applications_never_ask_for_identity_fields() {
    let session = Session::new(true, "3");
    let prompter = ScriptedPrompter::new(&[Some("Apache-2.0"), None, None, Some("*")]);
    let questions = Questions::new(&session, &prompter);
    let meta = collect_metadata(&questions, false, &defaults()).unwrap();
    assert_eq!(meta.name, "");
    assert_eq!(meta.version, "");
    assert_eq!(meta.description, "");
    assert_eq!(meta.license, "Apache-2.0");
    assert_eq!(meta.requires_python, "*");
    assert!(!meta.is_distribution());
    let asked = prompter.asked.borrow();
    assert!(!asked.iter().any(|p| p.starts_with("Project")));
  }
}
