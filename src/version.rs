//! Dotted version parsing for Plesk and PHP versions.

use std::cmp::Ordering;

use crate::error::DistupError;

/// A version made of numeric components, e.g. `18.0.57` or `7.4`.
///
/// Missing trailing components compare as zero, so `7.4 == 7.4.0`.
#[derive(Debug, Clone, Eq)]
pub struct DottedVersion {
    parts: Vec<u32>,
}

impl DottedVersion {
    pub fn parse(version: &str) -> Result<Self, DistupError> {
        let trimmed = version.trim();
        if trimmed.is_empty() {
            return Err(DistupError::InvalidVersion(version.to_string()));
        }
        let parts = trimmed
            .split('.')
            .map(|p| p.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| DistupError::InvalidVersion(version.to_string()))?;
        Ok(Self { parts })
    }

    /// Find the first token in `text` that parses as a dotted version.
    pub fn find_in(text: &str) -> Option<Self> {
        text.split(|c: char| c.is_whitespace() || c == ',')
            .filter(|token| token.contains('.'))
            .find_map(|token| Self::parse(token).ok())
    }

    fn component(&self, index: usize) -> u32 {
        self.parts.get(index).copied().unwrap_or(0)
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl std::fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.parts.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> DottedVersion {
        DottedVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(v("18.0.57").to_string(), "18.0.57");
        assert!(DottedVersion::parse("").is_err());
        assert!(DottedVersion::parse("7.x").is_err());
        assert!(DottedVersion::parse("invalid").is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(v("18.0.58") > v("18.0.57"));
        assert!(v("18.1") > v("18.0.99"));
        assert!(v("7.3") < v("7.4"));
        assert!(v("8.0") > v("7.4"));
    }

    #[test]
    fn test_trailing_zero_equality() {
        assert_eq!(v("7.4"), v("7.4.0"));
    }

    #[test]
    fn test_find_in() {
        let text = "18.0.58 Debian 11.0 1800231213.10";
        assert_eq!(DottedVersion::find_in(text), Some(v("18.0.58")));
        assert_eq!(DottedVersion::find_in("no version here"), None);
    }
}
