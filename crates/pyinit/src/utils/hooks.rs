use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use toml::Value;

use crate::log_warn;
use crate::utils::child::ScriptCommand;
use crate::utils::errors::InitError;
use crate::utils::manifest::{read_manifest, script_entry};
use crate::utils::metadata::ProjectMetadata;

/// Lifecycle events published by the init workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
  PostInit,
}

impl HookEvent {
  #[must_use]
  pub fn name(self) -> &'static str {
    match self {
      Self::PostInit => "post_init",
    }
  }
}

impl fmt::Display for HookEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Hook names excluded with `--skip`.
///
/// Entries are comma separated. `:all` skips everything, `:pre` and `:post`
/// skip every `pre_*` / `post_*` hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookSkips {
  all: bool,
  names: HashSet<String>,
}

impl HookSkips {
  pub fn parse<S: AsRef<str>>(values: &[S]) -> Self {
    let mut skips = Self::default();
    for item in values
      .iter()
      .flat_map(|v| v.as_ref().split(','))
      .map(str::trim)
      .filter(|item| !item.is_empty())
    {
      if item == ":all" {
        skips.all = true;
      } else {
        skips.names.insert(item.to_string());
      }
    }
    skips
  }

  #[must_use]
  pub fn is_skipped(&self, hook: &str) -> bool {
    if self.all || self.names.contains(hook) {
      return true;
    }
    hook
      .split_once('_')
      .is_some_and(|(phase, _)| self.names.contains(&format!(":{phase}")))
  }
}

/// What listeners get to see when an event fires.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
  pub project_root: &'a Path,
  pub manifest: &'a Path,
  pub metadata: &'a ProjectMetadata,
  pub skips: &'a HookSkips,
}

pub trait HookListener {
  fn name(&self) -> &str;

  fn on_event(&self, event: HookEvent, ctx: &HookContext<'_>) -> Result<()>;
}

/// Outcome of one broadcast.
#[derive(Debug, Default)]
pub struct DispatchReport {
  pub delivered: usize,
  pub failures: Vec<InitError>,
}

/// Listeners registered at startup; read-only once dispatching begins.
#[derive(Default)]
pub struct HookRegistry {
  listeners: Vec<Box<dyn HookListener>>,
}

impl HookRegistry {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, listener: impl HookListener + 'static) {
    self.listeners.push(Box::new(listener));
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.listeners.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.listeners.is_empty()
  }

  /// Deliver `event` to every listener in registration order.
  ///
  /// A failing listener is reported as a warning and does not stop the rest.
  pub fn dispatch(&self, event: HookEvent, ctx: &HookContext<'_>) -> DispatchReport {
    let mut report = DispatchReport::default();
    for listener in &self.listeners {
      debug!("dispatch {event} to {}", listener.name());
      match listener.on_event(event, ctx) {
        Ok(()) => report.delivered += 1,
        Err(source) => {
          let err = InitError::HookListener {
            listener: listener.name().to_string(),
            event: event.name().to_string(),
            source,
          };
          log_warn!("{}", err);
          report.failures.push(err);
        }
      }
    }
    report
  }
}

/// Runs `[tool.pyinit.scripts].<event>` from the freshly written manifest.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptHook;

impl ScriptHook {
  fn command(entry: &Value, cwd: &Path) -> Result<ScriptCommand> {
    match entry {
      Value::String(line) => {
        let argv = shell_words::split(line).context("invalid script command")?;
        ScriptCommand::from_argv(&argv, cwd)
      }
      Value::Array(_) => ScriptCommand::from_argv(&string_list(entry)?, cwd),
      Value::Table(table) => {
        let mut cmd = if let Some(shell) = table.get("shell").and_then(Value::as_str) {
          ScriptCommand::shell(shell, cwd)
        } else if let Some(inner) = table.get("cmd") {
          Self::command(inner, cwd)?
        } else {
          bail!("script table needs a `cmd` or `shell` key");
        };
        if let Some(Value::Table(env)) = table.get("env") {
          for (key, value) in env {
            let value = match value {
              Value::String(s) => s.clone(),
              other => other.to_string(),
            };
            cmd = cmd.with_env(key, value);
          }
        }
        Ok(cmd)
      }
      other => bail!("unsupported script value: {other}"),
    }
  }
}

fn string_list(value: &Value) -> Result<Vec<String>> {
  let Value::Array(items) = value else {
    bail!("expected an array of strings");
  };
  items
    .iter()
    .map(|item| {
      item
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("expected an array of strings"))
    })
    .collect()
}

impl HookListener for ScriptHook {
  fn name(&self) -> &str {
    "scripts"
  }

  fn on_event(&self, event: HookEvent, ctx: &HookContext<'_>) -> Result<()> {
    if ctx.skips.is_skipped(event.name()) {
      debug!("skip {event} script");
      return Ok(());
    }
    let doc = read_manifest(ctx.manifest)?;
    let Some(entry) = script_entry(&doc, event.name()) else {
      debug!("no {event} script configured");
      return Ok(());
    };
    let cmd = Self::command(&entry, ctx.project_root)?
      .with_env("PYINIT_PROJECT_ROOT", ctx.project_root.display().to_string())
      .with_env("PYINIT_HOOK", event.name());
    let status = cmd.run()?;
    if !status.success() {
      bail!("script exited with {status}");
    }
    Ok(())
  }
}
