use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use log::debug;

use crate::config::VenvBackend;
use crate::utils::errors::InitError;
use crate::utils::python::PythonInfo;
use crate::utils::which::which;

/// Return the environment prefix when `executable` lives inside a virtualenv or
/// conda environment.
#[must_use]
pub fn venv_like_prefix(executable: &Path) -> Option<PathBuf> {
  let bin_dir = executable.parent()?;
  let candidate = bin_dir.parent()?;
  if candidate.join("pyvenv.cfg").is_file() || candidate.join("conda-meta").is_dir() {
    return Some(candidate.to_path_buf());
  }
  None
}

/// Interpreter path inside the environment at `prefix`.
#[must_use]
pub fn venv_python(prefix: &Path) -> PathBuf {
  if cfg!(windows) {
    prefix.join("Scripts").join("python.exe")
  } else {
    prefix.join("bin").join("python")
  }
}

pub trait EnvironmentProvisioner {
  /// Create an isolated environment for `python` and return the interpreter bound to it.
  ///
  /// Fails with [`InitError::Provision`].
  fn provision(&self, python: &PythonInfo) -> Result<PythonInfo>;
}

#[derive(Debug, Clone)]
pub struct VenvProvisioner {
  backend: VenvBackend,
  base: VenvLocation,
}

#[derive(Debug, Clone)]
enum VenvLocation {
  /// `<root>/.venv`
  InProject(PathBuf),
  /// `<data dir>/<project>-<major.minor>`
  Shared { dir: PathBuf, project: String },
}

impl VenvProvisioner {
  #[must_use]
  pub fn in_project(backend: VenvBackend, venv_dir: impl Into<PathBuf>) -> Self {
    Self {
      backend,
      base: VenvLocation::InProject(venv_dir.into()),
    }
  }

  #[must_use]
  pub fn shared(backend: VenvBackend, dir: impl Into<PathBuf>, project: &str) -> Self {
    Self {
      backend,
      base: VenvLocation::Shared {
        dir: dir.into(),
        project: project.to_string(),
      },
    }
  }

  /// Shared location under `$XDG_DATA_HOME/pyinit/venvs`.
  ///
  /// # Errors
  /// Returns an error if the XDG data home cannot be resolved.
  pub fn shared_data_dir() -> Result<PathBuf> {
    let xdg = xdg::BaseDirectories::with_prefix("pyinit");
    xdg
      .get_data_file("venvs")
      .ok_or_else(|| anyhow::anyhow!("unable to resolve XDG data home"))
  }

  #[must_use]
  pub fn location(&self, python: &PythonInfo) -> PathBuf {
    match &self.base {
      VenvLocation::InProject(path) => path.clone(),
      VenvLocation::Shared { dir, project } => {
        dir.join(format!("{project}-{}", python.major_minor()))
      }
    }
  }

  fn create(&self, python: &PythonInfo, location: &Path) -> Result<()> {
    if location.exists() && fs::read_dir(location)?.next().is_some() {
      anyhow::bail!("the directory already exists and is not empty");
    }
    if let Some(parent) = location.parent() {
      fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut cmd = match self.backend {
      VenvBackend::Venv => {
        let mut cmd = Command::new(&python.executable);
        cmd.arg("-m").arg("venv").arg(location);
        cmd
      }
      VenvBackend::Virtualenv => {
        let tool = which("virtualenv")
          .ok_or_else(|| anyhow::anyhow!("`virtualenv` was not found on PATH"))?;
        let mut cmd = Command::new(tool);
        cmd.arg("-p").arg(&python.executable).arg(location);
        cmd
      }
    };
    debug!("create virtualenv: {cmd:?}");
    let out = cmd
      .stdin(Stdio::null())
      .output()
      .context("failed to start the virtualenv backend")?;
    if !out.status.success() {
      let stderr = String::from_utf8_lossy(&out.stderr);
      anyhow::bail!("backend exited with {}: {}", out.status, stderr.trim());
    }
    Ok(())
  }
}

impl EnvironmentProvisioner for VenvProvisioner {
  fn provision(&self, python: &PythonInfo) -> Result<PythonInfo> {
    let location = self.location(python);
    let result = self
      .create(python, &location)
      .and_then(|()| PythonInfo::from_path(&venv_python(&location)));
    result.map_err(|err| {
      InitError::Provision {
        path: location,
        message: format!("{err:#}"),
      }
      .into()
    })
  }
}
