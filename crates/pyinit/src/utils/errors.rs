use std::path::PathBuf;

use thiserror::Error;

/// Failure kinds raised by the collaborators the init workflow drives.
///
/// Which of these abort the workflow is decided by the orchestrator:
/// `Provision` and `HookListener` are reported as warnings, the rest propagate.
#[derive(Debug, Error)]
pub enum InitError {
  #[error("no Python interpreter found matching `{request}`{}", describe_constraint(.constraint))]
  RuntimeNotFound {
    request: String,
    constraint: Option<String>,
  },
  #[error("failed to create virtualenv at {}: {message}", .path.display())]
  Provision { path: PathBuf, message: String },
  #[error("failed to write {}: {source}", .path.display())]
  Persist {
    path: PathBuf,
    #[source]
    source: anyhow::Error,
  },
  #[error("{}:{line}: {message}", .path.display())]
  Import {
    path: PathBuf,
    line: usize,
    message: String,
  },
  #[error("hook `{listener}` failed on {event}: {source}")]
  HookListener {
    listener: String,
    event: String,
    #[source]
    source: anyhow::Error,
  },
}

fn describe_constraint(constraint: &Option<String>) -> String {
  match constraint {
    Some(spec) => format!(" (requires-python {spec})"),
    None => String::new(),
  }
}
