use anyhow::Result;

use crate::utils::wizard::{Choice, Prompter};

/// Per-invocation settings of `pyinit init`, fixed once the arguments are parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
  interactive: bool,
  runtime_override: String,
}

impl Session {
  pub fn new(interactive: bool, runtime_override: impl Into<String>) -> Self {
    Self {
      interactive,
      runtime_override: runtime_override.into(),
    }
  }

  #[must_use]
  pub fn is_interactive(&self) -> bool {
    self.interactive
  }

  #[must_use]
  pub fn runtime_override(&self) -> &str {
    &self.runtime_override
  }
}

/// Gate for every question of the workflow.
///
/// Non-interactive sessions get the default back without touching the prompter.
pub struct Questions<'a> {
  session: &'a Session,
  prompter: &'a dyn Prompter,
}

impl<'a> Questions<'a> {
  pub fn new(session: &'a Session, prompter: &'a dyn Prompter) -> Self {
    Self { session, prompter }
  }

  #[must_use]
  pub fn session(&self) -> &Session {
    self.session
  }

  pub fn ask(&self, prompt: &str, default: &str) -> Result<String> {
    if !self.session.is_interactive() {
      return Ok(default.to_string());
    }
    self.prompter.text(prompt, default)
  }

  pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
    if !self.session.is_interactive() {
      return Ok(default);
    }
    self.prompter.confirm(prompt, default)
  }

  pub fn select(&self, prompt: &str, options: &[Choice], default: &str) -> Result<String> {
    if !self.session.is_interactive() {
      return Ok(default.to_string());
    }
    self.prompter.select(prompt, options, Some(default))
  }
}
