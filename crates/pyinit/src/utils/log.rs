use crossbeam_channel::Sender;
use owo_colors::OwoColorize as _;
use parking_lot::Mutex;

/// Styling for values embedded in `log_info!` lines.
pub mod t {
  use std::fmt::Display;

  use owo_colors::OwoColorize as _;

  pub fn path(p: impl Display) -> String {
    p.to_string().cyan().to_string()
  }

  pub fn version(v: impl Display) -> String {
    v.to_string().magenta().to_string()
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
  Info,
  Success,
  Warn,
  Error,
}

impl LogLevel {
  /// Info lines stay neutral; every other level tints the whole line.
  fn paint(self, text: String) -> String {
    match self {
      Self::Info => text,
      Self::Success => text.green().to_string(),
      Self::Warn => text.yellow().to_string(),
      Self::Error => text.red().to_string(),
    }
  }

  fn to_stderr(self) -> bool {
    matches!(self, Self::Warn | Self::Error)
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEvent {
  pub level: LogLevel,
  /// Rendered line with ANSI styling kept
  pub ansi: String,
}

static SINK: Mutex<Option<Sender<LogEvent>>> = Mutex::new(None);

/// Capture user-facing output on `sender` instead of the terminal.
pub fn set_log_sink(sender: Sender<LogEvent>) {
  SINK.lock().replace(sender);
}

pub fn clear_log_sink() {
  SINK.lock().take();
}

pub fn is_sink_set() -> bool {
  SINK.lock().is_some()
}

#[doc(hidden)]
pub fn emit(level: LogLevel, text: String) {
  let ansi = level.paint(text);
  let sink = SINK.lock().clone();
  match sink {
    Some(tx) => {
      let _ = tx.send(LogEvent { level, ansi });
    }
    None if level.to_stderr() => anstream::eprintln!("{ansi}"),
    None => anstream::println!("{ansi}"),
  }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_at {
  ($level:ident, $fmt:literal $(, $args:expr )* $(,)?) => {
    $crate::utils::log::emit(
      $crate::utils::log::LogLevel::$level,
      format!($fmt $(, $args )*),
    )
  };
}

#[macro_export]
macro_rules! log_info {
  ($($tt:tt)+) => { $crate::__log_at!(Info, $($tt)+) };
}

#[macro_export]
macro_rules! log_success {
  ($($tt:tt)+) => { $crate::__log_at!(Success, $($tt)+) };
}

#[macro_export]
macro_rules! log_warn {
  ($($tt:tt)+) => { $crate::__log_at!(Warn, $($tt)+) };
}

#[macro_export]
macro_rules! log_error {
  ($($tt:tt)+) => { $crate::__log_at!(Error, $($tt)+) };
}

/// Diagnostic `log` records go to stderr through `env_logger`, filtered by `PYINIT_LOG`.
pub fn init_diagnostics() {
  let env = env_logger::Env::default()
    .filter_or("PYINIT_LOG", "warn")
    .write_style("PYINIT_LOG_STYLE");
  let _ = env_logger::Builder::from_env(env)
    .format_timestamp(None)
    .try_init();
}
