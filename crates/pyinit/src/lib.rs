use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

pub mod commands;
pub mod config;
pub mod utils;

use crate::commands::init::{InitArgs, InitDeps};
use crate::config::{AppContext, ProjectPaths, load_config};
use crate::utils::git::GitConfigIdentity;
use crate::utils::hooks::{HookRegistry, ScriptHook};
use crate::utils::import::RequirementsImporter;
use crate::utils::manifest::{PyprojectWriter, declared_requires_python};
use crate::utils::python::PythonFinder;
use crate::utils::venv::VenvProvisioner;
use crate::utils::wizard::Wizard;

/// pyinit - bootstrap a pyproject.toml for new and existing Python projects.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None, bin_name = "pyinit")]
pub struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
  /// Initialize a pyproject.toml for a Python project
  Init(InitArgs),
}

pub fn parse() -> Cli {
  Cli::parse()
}

pub fn run() -> Result<()> {
  utils::log::init_diagnostics();
  let cli = parse();

  match cli.command {
    Commands::Init(args) => init(&args),
  }
}

/// Listeners known at startup. The registry is read-only afterwards.
fn hook_registry() -> HookRegistry {
  let mut hooks = HookRegistry::new();
  hooks.register(ScriptHook);
  hooks
}

fn project_root(cwd: &Path, project: Option<&Path>) -> Result<PathBuf> {
  let root = match project {
    Some(path) => cwd.join(path),
    None => cwd.to_path_buf(),
  };
  fs::create_dir_all(&root)
    .with_context(|| format!("failed to create project root {}", root.display()))?;
  Ok(root)
}

fn init(args: &InitArgs) -> Result<()> {
  let cwd = std::env::current_dir()?;
  let root = project_root(&cwd, args.project.as_deref())?;
  let ctx = AppContext {
    config: load_config(&root)?,
    paths: ProjectPaths::new(root, cwd),
  };
  let paths = &ctx.paths;

  let runtime = PythonFinder::new(
    paths.python_marker(),
    declared_requires_python(&paths.manifest()),
  );
  let backend = ctx.config.venv.backend;
  let provisioner = if ctx.config.venv.in_project {
    VenvProvisioner::in_project(backend, paths.in_project_venv())
  } else {
    VenvProvisioner::shared(
      backend,
      VenvProvisioner::shared_data_dir()?,
      &paths.root_name(),
    )
  };
  let writer = PyprojectWriter::new(paths.root(), paths.manifest());
  let identity = GitConfigIdentity::new(paths.root());
  let wizard = Wizard::new();

  let deps = InitDeps {
    prompter: &wizard,
    runtime: &runtime,
    provisioner: &provisioner,
    writer: &writer,
    importer: &RequirementsImporter,
    identity: &identity,
  };
  let hooks = hook_registry();
  commands::init::run(&ctx, args, &deps, &hooks)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory as _;

  #[test]
  fn cli_definition_is_valid() {
    Cli::command().debug_assert();
  }

  #[test]
  fn init_flags_parse() {
    let cli = Cli::try_parse_from([
      "pyinit", "init", "-n", "-r", "3.9", "-k", "post_init", "--skip", ":pre", "-p", "demo",
    ])
    .unwrap();
    let Commands::Init(args) = cli.command;
    assert!(args.non_interactive);
    assert_eq!(args.runtime, "3.9");
    assert_eq!(args.skip, vec!["post_init", ":pre"]);
    assert_eq!(args.project, Some(PathBuf::from("demo")));
  }

  #[test]
  fn runtime_defaults_to_python3() {
    let cli = Cli::try_parse_from(["pyinit", "init"]).unwrap();
    let Commands::Init(args) = cli.command;
    assert!(!args.non_interactive);
    assert_eq!(args.runtime, "3");
    assert!(args.skip.is_empty());
  }

  #[test]
  fn relative_project_is_created_under_cwd() {
    let dir = tempfile::tempdir().unwrap();
    let root = project_root(dir.path(), Some(Path::new("nested/app"))).unwrap();
    assert_eq!(root, dir.path().join("nested/app"));
    assert!(root.is_dir());
    assert_eq!(hook_registry().len(), 1);
  }
}
