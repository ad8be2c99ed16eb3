//! Repository source rewrite rules.
//!
//! Rules are plain data so a rule set can be serialized, shown in the plan
//! and tested on its own. Applying them is total: a rule that does not match
//! leaves its input alone, and so does a pattern that fails to compile.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single rewrite applied to a repository line.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewriteRule {
    /// Exact substring replacement.
    Literal { from: String, to: String },
    /// Regular expression replacement. `$1` / `${name}` in `replacement`
    /// refer to capture groups.
    Pattern { pattern: String, replacement: String },
}

impl RewriteRule {
    pub fn literal(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Literal {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn pattern(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

impl std::fmt::Display for RewriteRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal { from, to } => write!(f, "'{from}' -> '{to}'"),
            Self::Pattern {
                pattern,
                replacement,
            } => write!(f, "/{pattern}/ -> '{replacement}'"),
        }
    }
}

enum CompiledRule<'a> {
    Literal { from: &'a str, to: &'a str },
    Pattern { regex: Regex, replacement: &'a str },
}

/// An ordered rule list compiled once and applied to many lines.
pub struct RewritePipeline<'a> {
    rules: Vec<CompiledRule<'a>>,
}

impl<'a> RewritePipeline<'a> {
    /// Compile `rules`. Patterns that are not valid regular expressions are
    /// dropped with a warning.
    pub fn new(rules: &'a [RewriteRule]) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| match rule {
                RewriteRule::Literal { from, to } => Some(CompiledRule::Literal { from, to }),
                RewriteRule::Pattern {
                    pattern,
                    replacement,
                } => match Regex::new(pattern) {
                    Ok(regex) => Some(CompiledRule::Pattern { regex, replacement }),
                    Err(e) => {
                        warn!("Ignoring invalid rewrite pattern /{}/: {}", pattern, e);
                        None
                    }
                },
            })
            .collect();
        Self { rules }
    }

    /// Fold the line through every rule in order.
    pub fn apply(&self, line: &str) -> String {
        self.rules
            .iter()
            .fold(line.to_string(), |acc, rule| match rule {
                CompiledRule::Literal { from, .. } if from.is_empty() => acc,
                CompiledRule::Literal { from, to } => acc.replace(*from, to),
                CompiledRule::Pattern { regex, replacement } => {
                    regex.replace_all(&acc, *replacement).into_owned()
                }
            })
    }

    /// Rewrite the repository lines of a sources file, keeping every other
    /// line (comments, blanks, unknown syntax) byte for byte.
    pub fn apply_to_sources(&self, content: &str) -> String {
        let mut out = String::with_capacity(content.len());
        for segment in content.split_inclusive('\n') {
            let (line, newline) = match segment.strip_suffix('\n') {
                Some(line) => (line, "\n"),
                None => (segment, ""),
            };
            if is_repository_line(line) {
                out.push_str(&self.apply(line));
            } else {
                out.push_str(line);
            }
            out.push_str(newline);
        }
        out
    }
}

/// Apply `rules` to a single line.
pub fn rewrite(line: &str, rules: &[RewriteRule]) -> String {
    RewritePipeline::new(rules).apply(line)
}

/// Whether `line` defines a repository, in one-line (`deb ...`) or deb822
/// (`Suites:` / `URIs:`) format.
pub fn is_repository_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return false;
    }
    let mut tokens = trimmed.split_whitespace();
    match tokens.next() {
        Some("deb" | "deb-src") => tokens.next().is_some(),
        Some("Suites:" | "URIs:") => true,
        _ => false,
    }
}
