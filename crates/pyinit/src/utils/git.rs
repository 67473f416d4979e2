use std::path::Path;
use std::process::{Command, Stdio};

use log::debug;

/// Author identity from git configuration. Empty fields when unset or git is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitIdentity {
  pub name: String,
  pub email: String,
}

pub trait IdentitySource {
  fn identity(&self) -> GitIdentity;
}

/// Reads `user.name` / `user.email` through the `git` binary.
#[derive(Debug, Clone)]
pub struct GitConfigIdentity<'a> {
  cwd: &'a Path,
}

impl<'a> GitConfigIdentity<'a> {
  pub fn new(cwd: &'a Path) -> Self {
    Self { cwd }
  }
}

impl IdentitySource for GitConfigIdentity<'_> {
  fn identity(&self) -> GitIdentity {
    GitIdentity {
      name: git_config_value(self.cwd, "user.name").unwrap_or_default(),
      email: git_config_value(self.cwd, "user.email").unwrap_or_default(),
    }
  }
}

fn git_config_value(cwd: &Path, key: &str) -> Option<String> {
  let out = Command::new("git")
    .current_dir(cwd)
    .args(["config", "--get", key])
    .stdin(Stdio::null())
    .stderr(Stdio::null())
    .output();
  match out {
    Ok(out) if out.status.success() => {
      Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
    Ok(out) => {
      debug!("git config {key} exited with {}", out.status);
      None
    }
    Err(err) => {
      debug!("git config {key} failed: {err}");
      None
    }
  }
}
