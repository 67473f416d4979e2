use anyhow::Result;
use assert_cmd::Command;
use std::path::{Path, PathBuf};
use temp_env::with_vars;
use tempfile::{Builder, TempDir};

/// Sandbox for one CLI run: a project directory named `demo`, an XDG home and a
/// directory of fake interpreters exposed through `PYINIT_PYTHON_PATH`.
#[derive(Debug)]
pub struct TestEnv {
  temp: TempDir,
  project: PathBuf,
  python_dir: PathBuf,
  xdg_home: PathBuf,
}

impl TestEnv {
  pub fn run<F, R>(f: F) -> R
  where
    F: FnOnce(&TestEnv) -> R,
  {
    let env = TestEnv::new();
    let git_config = env.xdg_home_dir().join("gitconfig");
    with_vars(
      [
        (
          "XDG_CONFIG_HOME",
          Some(env.xdg_home_dir().join("config").display().to_string()),
        ),
        (
          "XDG_DATA_HOME",
          Some(env.xdg_home_dir().join("data").display().to_string()),
        ),
        ("GIT_CONFIG_GLOBAL", Some(git_config.display().to_string())),
        ("GIT_CONFIG_NOSYSTEM", Some("1".to_string())),
        ("PYINIT_LOG", None),
      ],
      || f(&env),
    )
  }

  pub fn new() -> Self {
    let temp = Builder::new()
      .prefix("pyinit-test-")
      .tempdir_in(tmp_root())
      .expect("temp dir");
    let project = temp.path().join("demo");
    let python_dir = temp.path().join("pythons");
    let xdg_home = temp.path().join("xdg");
    for dir in [&project, &python_dir, &xdg_home] {
      std::fs::create_dir_all(dir).expect("create sandbox dir");
    }
    std::fs::write(
      xdg_home.join("gitconfig"),
      "[user]\n\tname = Test User\n\temail = test@example.com\n",
    )
    .expect("write git config");
    Self {
      temp,
      project,
      python_dir,
      xdg_home,
    }
  }

  /// The project root (`<sandbox>/demo`).
  pub fn path(&self) -> &Path {
    &self.project
  }

  pub fn sandbox(&self) -> &Path {
    self.temp.path()
  }

  pub fn xdg_home_dir(&self) -> &Path {
    &self.xdg_home
  }

  pub fn pyinit(&self) -> Result<Command> {
    let mut cmd = Command::cargo_bin("pyinit")?;
    cmd.current_dir(self.path());
    cmd.env("PYINIT_PYTHON_PATH", &self.python_dir);
    cmd.env("NO_COLOR", "1");
    Ok(cmd)
  }

  /// Install a fake `python<major.minor>` that answers the version probe and can
  /// lay out a virtualenv for `-m venv <dir>`.
  pub fn add_python(&self, version: &str) -> Result<PathBuf> {
    let body = format!(
      r#"#!/bin/sh
if [ "$1" = "-m" ] && [ "$2" = "venv" ]; then
  mkdir -p "$3/bin"
  echo "home = $(dirname "$0")" > "$3/pyvenv.cfg"
  printf '#!/bin/sh\necho {version}\necho "$0"\n' > "$3/bin/python"
  chmod +x "$3/bin/python"
  exit 0
fi
echo {version}
echo "$0"
"#
    );
    self.add_python_script(version, &body)
  }

  /// Install a fake interpreter whose `-m venv` always fails.
  pub fn add_broken_venv_python(&self, version: &str) -> Result<PathBuf> {
    let body = format!(
      r#"#!/bin/sh
if [ "$1" = "-m" ]; then
  echo "No module named venv" 1>&2
  exit 1
fi
echo {version}
echo "$0"
"#
    );
    self.add_python_script(version, &body)
  }

  fn add_python_script(&self, version: &str, body: &str) -> Result<PathBuf> {
    let major_minor: Vec<&str> = version.split('.').take(2).collect();
    let path = self
      .python_dir
      .join(format!("python{}", major_minor.join(".")));
    self.write_executable_script(&path, body)?;
    Ok(path)
  }

  pub fn write_executable_script(&self, path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|err| {
        anyhow::anyhow!(
          "create parent dir for script under {}: {err}",
          self.sandbox().display()
        )
      })?;
    }
    std::fs::write(path, body)
      .map_err(|err| anyhow::anyhow!("write script body at {}: {err}", path.display()))?;
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt as _;
      let mut perms = std::fs::metadata(path)?.permissions();
      perms.set_mode(0o755);
      std::fs::set_permissions(path, perms)
        .map_err(|err| anyhow::anyhow!("set script executable at {}: {err}", path.display()))?;
    }
    Ok(())
  }

  pub fn write_file(&self, relative: &str, body: &str) -> Result<PathBuf> {
    let path = self.path().join(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, body)
      .map_err(|err| anyhow::anyhow!("write file body at {}: {err}", path.display()))?;
    Ok(path)
  }

  pub fn read_file(&self, relative: &str) -> Result<String> {
    let path = self.path().join(relative);
    std::fs::read_to_string(&path)
      .map_err(|err| anyhow::anyhow!("read {}: {err}", path.display()))
  }

  /// Parsed `pyproject.toml` of the project.
  pub fn manifest(&self) -> Result<toml::Table> {
    Ok(toml::from_str(&self.read_file("pyproject.toml")?)?)
  }

  pub fn write_xdg_config(&self, relative: &str, body: &str) -> Result<PathBuf> {
    let path = self.xdg_home_dir().join("config").join(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, body)
      .map_err(|err| anyhow::anyhow!("write XDG config at {}: {err}", path.display()))?;
    Ok(path)
  }
}

/// Workspace-local temp root under `./target/test-tmp`.
pub fn tmp_root() -> PathBuf {
  let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
  let workspace_root = manifest_dir
    .parent()
    .and_then(|parent| parent.parent())
    .unwrap_or(&manifest_dir)
    .to_path_buf();
  let root = workspace_root.join("target").join("test-tmp");
  let _ = std::fs::create_dir_all(&root);
  root
}
