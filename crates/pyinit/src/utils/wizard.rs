use std::cell::RefCell;
use std::fmt;
use std::io::{self, BufRead, IsTerminal as _, Write};

use anyhow::{Context, Result, anyhow, bail};
use inquire::{Confirm, Select, Text};
use owo_colors::OwoColorize as _;

/// A selectable item: `label` is shown, `value` is returned.
#[derive(Clone, Debug)]
pub struct Choice {
  pub value: String,
  pub label: String,
  pub detail: Option<String>,
}

impl Choice {
  pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
    Self {
      value: value.into(),
      label: label.into(),
      detail: None,
    }
  }

  #[must_use]
  pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
    self.detail = Some(detail.into());
    self
  }
}

impl fmt::Display for Choice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.detail {
      Some(detail) => write!(f, "{} {}", self.label.cyan().bold(), detail.dimmed()),
      None => write!(f, "{}", self.label.cyan().bold()),
    }
  }
}

/// One method per prompt kind. The init workflow only talks to this trait, so the
/// terminal backend can be swapped without touching orchestration logic.
pub trait Prompter {
  /// Free-text question; empty input yields `default`.
  fn text(&self, prompt: &str, default: &str) -> Result<String>;

  /// Yes/no question; empty input yields `default`.
  fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;

  /// Pick one of `options` and return its value.
  fn select(&self, prompt: &str, options: &[Choice], default_value: Option<&str>)
  -> Result<String>;
}

/// Prompt backend: `inquire` widgets on a TTY, [`LinePrompter`] over stdin otherwise
/// (tests, piped input).
#[derive(Clone, Debug)]
pub struct Wizard {
  is_tty: bool,
}

impl Default for Wizard {
  fn default() -> Self {
    Self::new()
  }
}

impl Wizard {
  #[must_use]
  pub fn new() -> Self {
    Self {
      is_tty: io::stdin().is_terminal() && io::stdout().is_terminal(),
    }
  }

  fn lines() -> LinePrompter<io::StdinLock<'static>, anstream::Stdout> {
    LinePrompter::new(io::stdin().lock(), anstream::stdout())
  }
}

impl Prompter for Wizard {
  fn text(&self, prompt: &str, default: &str) -> Result<String> {
    if !self.is_tty {
      return Self::lines().text(prompt, default);
    }
    Text::new(prompt)
      .with_default(default)
      .prompt()
      .map(|ans| ans.trim().to_string())
      .map_err(|err| anyhow!(err))
  }

  fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
    if !self.is_tty {
      return Self::lines().confirm(prompt, default);
    }
    Confirm::new(prompt)
      .with_default(default)
      .prompt()
      .map_err(|err| anyhow!(err))
  }

  fn select(
    &self,
    prompt: &str,
    options: &[Choice],
    default_value: Option<&str>,
  ) -> Result<String> {
    if options.is_empty() {
      bail!("cannot prompt for selection without any options");
    }
    if !self.is_tty {
      return Self::lines().select(prompt, options, default_value);
    }
    let cursor = default_value
      .and_then(|value| options.iter().position(|opt| opt.value == value))
      .unwrap_or(0);
    Select::new(prompt, options.to_vec())
      .with_starting_cursor(cursor)
      .prompt()
      .map(|choice| choice.value)
      .map_err(|err| anyhow!(err))
  }
}

/// Line-based prompts: one question per line of input, end of input accepts the default.
pub struct LinePrompter<R, W> {
  input: RefCell<R>,
  output: RefCell<W>,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
  pub fn new(input: R, output: W) -> Self {
    Self {
      input: RefCell::new(input),
      output: RefCell::new(output),
    }
  }

  fn ask(&self, question: &str) -> Result<String> {
    {
      let mut out = self.output.borrow_mut();
      writeln!(out, "{question}")?;
      write!(out, "{}", "-> ".bright_cyan())?;
      out.flush().ok();
    }
    let mut line = String::new();
    self
      .input
      .borrow_mut()
      .read_line(&mut line)
      .context("failed to read from stdin")?;
    Ok(line.trim().to_string())
  }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
  fn text(&self, prompt: &str, default: &str) -> Result<String> {
    let question = if default.is_empty() {
      prompt.to_string()
    } else {
      format!("{prompt} [{default}]")
    };
    let answer = self.ask(&question)?;
    Ok(if answer.is_empty() {
      default.to_string()
    } else {
      answer
    })
  }

  fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let answer = self.ask(&format!("{prompt} {hint}"))?;
    Ok(match answer.chars().next() {
      None => default,
      Some(first) => matches!(first, 'y' | 'Y'),
    })
  }

  fn select(
    &self,
    prompt: &str,
    options: &[Choice],
    default_value: Option<&str>,
  ) -> Result<String> {
    let Some(first) = options.first() else {
      bail!("cannot prompt for selection without any options");
    };
    let mut question = prompt.to_string();
    for (idx, opt) in options.iter().enumerate() {
      question.push_str(&format!("\n  {}. {}", idx + 1, opt.label));
      if let Some(detail) = &opt.detail {
        question.push_str(&format!(" {detail}"));
      }
    }
    let default = default_value
      .and_then(|value| options.iter().find(|opt| opt.value == value))
      .unwrap_or(first);
    question.push_str(&format!("\n  (Press Enter for {})", default.label));

    let answer = self.ask(&question)?;
    if answer.is_empty() {
      return Ok(default.value.clone());
    }
    if let Ok(idx) = answer.parse::<usize>()
      && let Some(opt) = idx.checked_sub(1).and_then(|i| options.get(i))
    {
      return Ok(opt.value.clone());
    }
    options
      .iter()
      .find(|opt| opt.value == answer || opt.label.eq_ignore_ascii_case(&answer))
      .map(|opt| opt.value.clone())
      .ok_or_else(|| anyhow!("invalid selection: {answer}"))
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;

  fn lines(input: &str) -> LinePrompter<Cursor<Vec<u8>>, Vec<u8>> {
    LinePrompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
  }

  fn transcript(p: &LinePrompter<Cursor<Vec<u8>>, Vec<u8>>) -> String {
    String::from_utf8_lossy(&p.output.borrow()).into_owned()
  }

  fn pythons() -> Vec<Choice> {
    vec![
      Choice::new("/usr/bin/python3.12", "3.12.1"),
      Choice::new("/usr/bin/python3.11", "3.11.4").with_detail("(system)"),
    ]
  }

  #[test]
  fn choice_renders_label_and_detail() {
    let choice = Choice::new("/usr/bin/python3.11", "3.11.4").with_detail("/usr/bin/python3.11");
    let rendered = choice.to_string();
    assert!(rendered.contains("3.11.4"));
    assert!(rendered.contains("/usr/bin/python3.11"));
    assert_eq!(choice.value, "/usr/bin/python3.11");
  }

  #[test]
  fn text_uses_default_on_empty_line_and_eof() {
    let p = lines("\nBSD-3-Clause\n");
    assert_eq!(p.text("License", "MIT").unwrap(), "MIT");
    assert_eq!(p.text("License", "MIT").unwrap(), "BSD-3-Clause");
    assert_eq!(p.text("Author", "Ada").unwrap(), "Ada");
    assert!(transcript(&p).contains("License [MIT]"));
  }

  #[test]
  fn long_answers_are_kept_whole() {
    let description = "a".repeat(320);
    let p = lines(&format!("{description}\n"));
    assert_eq!(p.text("Project description", "").unwrap(), description);
  }

  #[test]
  fn confirm_reads_first_letter() {
    let p = lines("yes\nNo\n\n");
    assert!(p.confirm("Library?", false).unwrap());
    assert!(!p.confirm("Create?", true).unwrap());
    assert!(p.confirm("Create?", true).unwrap());
    assert!(transcript(&p).contains("Create? [Y/n]"));
  }

  #[test]
  fn select_by_number_label_or_default() {
    let p = lines("2\n3.12.1\n\n9\n");
    let opts = pythons();
    assert_eq!(p.select("Pick", &opts, None).unwrap(), "/usr/bin/python3.11");
    assert_eq!(p.select("Pick", &opts, None).unwrap(), "/usr/bin/python3.12");
    assert_eq!(
      p.select("Pick", &opts, Some("/usr/bin/python3.11")).unwrap(),
      "/usr/bin/python3.11"
    );
    assert!(p.select("Pick", &opts, None).is_err());
    assert!(transcript(&p).contains("2. 3.11.4 (system)"));
  }

  #[test]
  fn select_without_options_fails() {
    let wizard = Wizard { is_tty: false };
    let err = wizard.select("Pick", &[], None).unwrap_err();
    assert!(err.to_string().contains("without any options"));
  }
}
