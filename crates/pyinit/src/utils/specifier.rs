//! Minimal `requires-python` handling: release versions and comma-separated
//! specifier clauses (`>=3.9,<3.13`, `==3.11.*`, `~=3.10`, `*`).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};

/// A release version such as `3`, `3.11` or `3.11.4`. Missing components count as zero.
#[derive(Debug, Clone)]
pub struct Version {
  parts: Vec<u64>,
}

impl Version {
  pub fn new(parts: &[u64]) -> Self {
    Self {
      parts: parts.to_vec(),
    }
  }

  #[must_use]
  pub fn parts(&self) -> &[u64] {
    &self.parts
  }

  /// True when every component of `prefix` matches the leading components of `self`.
  #[must_use]
  pub fn starts_with(&self, prefix: &Version) -> bool {
    prefix.parts.len() <= self.parts.len()
      && prefix
        .parts
        .iter()
        .zip(&self.parts)
        .all(|(left, right)| left == right)
  }

  fn component(&self, idx: usize) -> u64 {
    self.parts.get(idx).copied().unwrap_or(0)
  }

  fn compare(&self, other: &Version) -> Ordering {
    let len = self.parts.len().max(other.parts.len());
    (0..len)
      .map(|idx| self.component(idx).cmp(&other.component(idx)))
      .find(|ord| *ord != Ordering::Equal)
      .unwrap_or(Ordering::Equal)
  }
}

impl PartialEq for Version {
  fn eq(&self, other: &Self) -> bool {
    self.compare(other) == Ordering::Equal
  }
}

impl Eq for Version {}

impl PartialOrd for Version {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Version {
  fn cmp(&self, other: &Self) -> Ordering {
    self.compare(other)
  }
}

impl FromStr for Version {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
      bail!("empty version");
    }
    let parts = trimmed
      .split('.')
      .map(|part| {
        part
          .parse::<u64>()
          .map_err(|_| anyhow::anyhow!("invalid version `{trimmed}`"))
      })
      .collect::<Result<Vec<_>>>()?;
    Ok(Self { parts })
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rendered: Vec<String> = self.parts.iter().map(u64::to_string).collect();
    write!(f, "{}", rendered.join("."))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
  Eq,
  NotEq,
  Ge,
  Le,
  Gt,
  Lt,
  Compatible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
  op: Op,
  version: Version,
  wildcard: bool,
}

impl Clause {
  fn parse(raw: &str) -> Result<Self> {
    let raw = raw.trim();
    let (op, rest) = [
      ("~=", Op::Compatible),
      ("==", Op::Eq),
      ("!=", Op::NotEq),
      (">=", Op::Ge),
      ("<=", Op::Le),
      (">", Op::Gt),
      ("<", Op::Lt),
    ]
    .into_iter()
    .find_map(|(token, op)| raw.strip_prefix(token).map(|rest| (op, rest.trim())))
    .ok_or_else(|| anyhow::anyhow!("invalid specifier `{raw}`"))?;
    let (body, wildcard) = match rest.strip_suffix(".*") {
      Some(body) => (body, true),
      None => (rest, false),
    };
    if wildcard && !matches!(op, Op::Eq | Op::NotEq) {
      bail!("wildcard is only allowed with == and != in `{raw}`");
    }
    let version: Version = body.parse()?;
    if op == Op::Compatible && version.parts.len() < 2 {
      bail!("~= needs at least two version components in `{raw}`");
    }
    Ok(Self {
      op,
      version,
      wildcard,
    })
  }

  fn contains(&self, candidate: &Version) -> bool {
    match self.op {
      Op::Eq if self.wildcard => candidate.starts_with(&self.version),
      Op::NotEq if self.wildcard => !candidate.starts_with(&self.version),
      Op::Eq => candidate == &self.version,
      Op::NotEq => candidate != &self.version,
      Op::Ge => candidate >= &self.version,
      Op::Le => candidate <= &self.version,
      Op::Gt => candidate > &self.version,
      Op::Lt => candidate < &self.version,
      Op::Compatible => {
        let prefix = Version::new(&self.version.parts[..self.version.parts.len() - 1]);
        candidate >= &self.version && candidate.starts_with(&prefix)
      }
    }
  }
}

/// A parsed `requires-python` value. The empty string and `*` accept everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
  raw: String,
  clauses: Vec<Clause>,
}

impl Specifier {
  #[must_use]
  pub fn is_any(&self) -> bool {
    self.clauses.is_empty()
  }

  #[must_use]
  pub fn contains(&self, version: &Version) -> bool {
    self.clauses.iter().all(|clause| clause.contains(version))
  }
}

impl FromStr for Specifier {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self> {
    let raw = s.trim();
    if raw.is_empty() || raw == "*" {
      return Ok(Self {
        raw: raw.to_string(),
        clauses: Vec::new(),
      });
    }
    let clauses = raw
      .split(',')
      .filter(|part| !part.trim().is_empty())
      .map(Clause::parse)
      .collect::<Result<Vec<_>>>()?;
    Ok(Self {
      raw: raw.to_string(),
      clauses,
    })
  }
}

impl fmt::Display for Specifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.raw)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn v(s: &str) -> Version {
    s.parse().unwrap()
  }

  fn spec(s: &str) -> Specifier {
    s.parse().unwrap()
  }

  #[test]
  fn versions_compare_with_implicit_zeros() {
    assert_eq!(v("3.9"), v("3.9.0"));
    assert!(v("3.10") > v("3.9.18"));
    assert!(v("3.11.4").starts_with(&v("3.11")));
    assert!(!v("3.1").starts_with(&v("3.11")));
  }

  #[test]
  fn range_specifiers() {
    let range = spec(">=3.9,<3.11");
    assert!(range.contains(&v("3.9.7")));
    assert!(range.contains(&v("3.10.2")));
    assert!(!range.contains(&v("3.11.0")));
    assert!(!range.contains(&v("3.8.18")));
  }

  #[test]
  fn wildcard_and_compatible_release() {
    assert!(spec("==3.11.*").contains(&v("3.11.9")));
    assert!(!spec("==3.11.*").contains(&v("3.12.0")));
    assert!(spec("!=3.10.*").contains(&v("3.11.0")));
    assert!(spec("~=3.10").contains(&v("3.12.1")));
    assert!(!spec("~=3.10").contains(&v("4.0")));
    assert!(!spec("~=3.10.2").contains(&v("3.11.0")));
  }

  #[test]
  fn star_and_empty_accept_everything() {
    assert!(spec("*").is_any());
    assert!(spec("").contains(&v("2.7.18")));
    assert_eq!(spec(">=3.6.9").to_string(), ">=3.6.9");
  }

  #[test]
  fn rejects_garbage() {
    assert!("3.9".parse::<Specifier>().is_err());
    assert!(">=three".parse::<Specifier>().is_err());
    assert!(">=3.*".parse::<Specifier>().is_err());
  }
}
