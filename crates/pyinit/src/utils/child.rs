use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{Context, Result, bail};
use log::debug;

use crate::{log_info, log_warn};

/// A script command ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCommand {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: PathBuf,
  pub env: Vec<(String, String)>,
}

impl ScriptCommand {
  /// First element is the program, the rest are its arguments.
  pub fn from_argv(argv: &[String], cwd: &Path) -> Result<Self> {
    let Some((program, args)) = argv.split_first() else {
      bail!("command is empty");
    };
    if program.trim().is_empty() {
      bail!("command program is empty");
    }
    Ok(Self {
      program: program.clone(),
      args: args.to_vec(),
      cwd: cwd.to_path_buf(),
      env: Vec::new(),
    })
  }

  /// `sh -c <line>` (or `cmd /C` on Windows).
  #[must_use]
  pub fn shell(line: &str, cwd: &Path) -> Self {
    let (program, flag) = if cfg!(windows) {
      ("cmd", "/C")
    } else {
      ("sh", "-c")
    };
    Self {
      program: program.to_string(),
      args: vec![flag.to_string(), line.to_string()],
      cwd: cwd.to_path_buf(),
      env: Vec::new(),
    }
  }

  #[must_use]
  pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.push((key.into(), value.into()));
    self
  }

  pub fn run(&self) -> Result<ExitStatus> {
    debug!("run {} {:?} in {}", self.program, self.args, self.cwd.display());
    run_child_process(&self.program, &self.args, &self.cwd, &self.env)
      .with_context(|| format!("failed to run `{}`", self.program))
  }
}

/// Spawn `program` and wait for it.
///
/// When a log sink is registered the child's output is captured line by line
/// (stdout as info, stderr as warnings) and stdin is closed. Otherwise the child
/// shares our terminal.
pub fn run_child_process(
  program: &str,
  args: &[String],
  cwd: &Path,
  env: &[(String, String)],
) -> Result<ExitStatus> {
  let mut cmd = Command::new(program);
  cmd
    .args(args)
    .current_dir(cwd)
    .envs(env.iter().map(|(k, v)| (k, v)));

  if !crate::utils::log::is_sink_set() {
    return Ok(cmd.status()?);
  }

  let mut child = cmd
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()?;
  let stdout = child.stdout.take();
  let stderr = child.stderr.take();

  std::thread::scope(|scope| {
    if let Some(out) = stdout {
      scope.spawn(move || forward_lines(out, |line| log_info!("{line}")));
    }
    if let Some(err) = stderr {
      scope.spawn(move || forward_lines(err, |line| log_warn!("{line}")));
    }
    child.wait()
  })
  .map_err(Into::into)
}

fn forward_lines(stream: impl Read, mut emit: impl FnMut(&str)) {
  BufReader::new(stream)
    .lines()
    .map_while(std::io::Result::ok)
    .for_each(|line| emit(&line));
}
