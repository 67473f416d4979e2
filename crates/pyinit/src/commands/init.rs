use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use log::debug;

use crate::config::{AppContext, MANIFEST_FILE, RequiresPythonPolicy};
use crate::utils::git::IdentitySource;
use crate::utils::hooks::{DispatchReport, HookContext, HookEvent, HookRegistry, HookSkips};
use crate::utils::import::{DependencyImporter, SourceKind, detect_sources};
use crate::utils::log::t;
use crate::utils::manifest::ManifestWriter;
use crate::utils::metadata::{MetadataDefaults, ProjectMetadata, collect_metadata};
use crate::utils::python::{PythonInfo, RuntimeRequest, RuntimeSelector};
use crate::utils::session::{Questions, Session};
use crate::utils::venv::{EnvironmentProvisioner, venv_like_prefix};
use crate::utils::wizard::{Choice, Prompter};
use crate::{log_info, log_success, log_warn};

const SKIP_IMPORT: &str = "";

#[derive(Debug, Clone, Args)]
pub struct InitArgs {
  /// Don't ask questions but use default values
  #[arg(short = 'n', long)]
  pub non_interactive: bool,
  /// Python version, interpreter name or path used in non-interactive mode
  #[arg(short = 'r', long, default_value = "3")]
  pub runtime: String,
  /// Skip hooks (comma separated, repeatable; `:all`, `:pre`, `:post`)
  #[arg(short = 'k', long = "skip", value_name = "HOOKS")]
  pub skip: Vec<String>,
  /// Project root (defaults to the current directory)
  #[arg(short = 'p', long)]
  pub project: Option<PathBuf>,
}

/// Collaborators the workflow drives.
pub struct InitDeps<'a> {
  pub prompter: &'a dyn Prompter,
  pub runtime: &'a dyn RuntimeSelector,
  pub provisioner: &'a dyn EnvironmentProvisioner,
  pub writer: &'a dyn ManifestWriter,
  pub importer: &'a dyn DependencyImporter,
  pub identity: &'a dyn IdentitySource,
}

/// What a finished session produced.
#[derive(Debug)]
pub struct InitOutcome {
  pub python: PythonInfo,
  pub metadata: ProjectMetadata,
  pub manifest: PathBuf,
  pub imported: Option<PathBuf>,
  pub hooks: DispatchReport,
}

pub fn run(
  ctx: &AppContext,
  args: &InitArgs,
  deps: &InitDeps<'_>,
  hooks: &HookRegistry,
) -> Result<InitOutcome> {
  let manifest = ctx.paths.manifest();
  if manifest.exists() {
    log_info!("{} already exists, update it now.", t::path(MANIFEST_FILE));
  } else {
    log_info!("Creating a {}...", t::path(MANIFEST_FILE));
  }

  let session = Session::new(!args.non_interactive, &args.runtime);
  let questions = Questions::new(&session, deps.prompter);

  let python = resolve_runtime(ctx, &questions, deps)?;

  let is_library = questions.confirm(
    "Is the project a library that will be uploaded to PyPI",
    false,
  )?;
  let defaults = MetadataDefaults::new(
    ctx.paths.root_name(),
    deps.identity.identity(),
    &python,
    ctx.config.init.requires_python_upper.as_deref(),
  );
  let metadata = collect_metadata(&questions, is_library, &defaults)?;

  let written = deps.writer.write(&metadata)?;
  log_success!("Changes are written to {}.", written.display());

  // The manifest exists from here on, so post_init fires even if the import fails.
  let imported = import_dependencies(ctx, &questions, deps);

  let skips = HookSkips::parse(&args.skip);
  let report = hooks.dispatch(
    HookEvent::PostInit,
    &HookContext {
      project_root: ctx.paths.root(),
      manifest: &written,
      metadata: &metadata,
      skips: &skips,
    },
  );
  debug!(
    "post_init delivered to {} listener(s), {} failed",
    report.delivered,
    report.failures.len()
  );

  Ok(InitOutcome {
    python,
    metadata,
    manifest: written,
    imported: imported?,
    hooks: report,
  })
}

fn resolve_runtime(
  ctx: &AppContext,
  questions: &Questions<'_>,
  deps: &InitDeps<'_>,
) -> Result<PythonInfo> {
  let session = questions.session();
  if !session.is_interactive() {
    let request = RuntimeRequest {
      selector: session.runtime_override().to_string(),
      ignore_requires_python: true,
      pick_first: true,
    };
    let python = deps.runtime.resolve(&request, questions)?;
    if let Some(spec) = deps.runtime.requires_python()
      && !spec.contains(&python.version)
    {
      log_warn!(
        "Python {} does not satisfy requires-python {}, it will be overwritten.",
        python.version,
        spec
      );
    }
    deps.runtime.remember(&python)?;
    log_info!(
      "Using Python interpreter: {} ({})",
      t::path(python.executable.display()),
      t::version(&python.version)
    );
    return Ok(python);
  }

  let request = RuntimeRequest {
    selector: String::new(),
    ignore_requires_python: ctx.config.init.interactive_requires_python
      == RequiresPythonPolicy::Ignore,
    pick_first: false,
  };
  let python = deps.runtime.resolve(&request, questions)?;
  deps.runtime.remember(&python)?;
  log_info!(
    "Using Python interpreter: {} ({})",
    t::path(python.executable.display()),
    t::version(&python.version)
  );

  if !ctx.config.python.use_venv || venv_like_prefix(&python.executable).is_some() {
    return Ok(python);
  }
  let prompt = format!(
    "Would you like to create a virtualenv with {}?",
    python.executable.display()
  );
  if !questions.confirm(&prompt, true)? {
    return Ok(python);
  }
  match deps.provisioner.provision(&python) {
    Ok(venv_python) => {
      log_success!(
        "Virtualenv is created successfully at {}",
        venv_python.executable.display()
      );
      deps.runtime.remember(&venv_python)?;
      Ok(venv_python)
    }
    Err(err) => {
      log_warn!("Error occurred when creating virtualenv: {:#}", err);
      log_warn!("Please fix it and create later.");
      Ok(python)
    }
  }
}

fn import_dependencies(
  ctx: &AppContext,
  questions: &Questions<'_>,
  deps: &InitDeps<'_>,
) -> Result<Option<PathBuf>> {
  let root = ctx.paths.root();
  if !questions.session().is_interactive() {
    let source = ctx.config.init.requirements.resolve(&ctx.paths);
    if !source.is_file() {
      debug!("no {} to import", source.display());
      return Ok(None);
    }
    deps
      .importer
      .import(root, &source, SourceKind::Requirements)?;
    log_success!("Imported dependencies from {}.", source.display());
    return Ok(Some(source));
  }

  let found = detect_sources(root);
  if found.is_empty() {
    return Ok(None);
  }
  let mut options: Vec<Choice> = found
    .iter()
    .map(|(path, kind)| {
      let label = path.strip_prefix(root).unwrap_or(path).display().to_string();
      Choice::new(path.display().to_string(), label).with_detail(format!("({kind})"))
    })
    .collect();
  options.push(Choice::new(
    SKIP_IMPORT,
    "don't do anything, I will import later.",
  ));
  let picked = questions.select(
    "Found dependency files that can be imported",
    &options,
    SKIP_IMPORT,
  )?;
  let Some((source, kind)) = found
    .into_iter()
    .find(|(path, _)| path.display().to_string() == picked)
  else {
    return Ok(None);
  };
  deps.importer.import(root, &source, kind)?;
  log_success!("Imported dependencies from {}.", source.display());
  Ok(Some(source))
}
