//! OS release identity and detection.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::DistupError;
use crate::host::HostProbe;

pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// An OS release, compared by name and version.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Distro {
    pub name: String,
    pub version: String,
}

impl Distro {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Release codename used in apt sources, for the releases we know.
    pub fn codename(&self) -> Option<&'static str> {
        if !self.name.eq_ignore_ascii_case("debian") {
            return None;
        }
        match self.version.as_str() {
            "10" => Some("buster"),
            "11" => Some("bullseye"),
            "12" => Some("bookworm"),
            "13" => Some("trixie"),
            _ => None,
        }
    }

    /// Read the running release from `/etc/os-release`.
    pub fn detect(probe: &dyn HostProbe) -> Result<Self> {
        let content = probe
            .read_file(Path::new(OS_RELEASE_PATH))
            .with_context(|| format!("Failed to read {OS_RELEASE_PATH}"))?;
        Self::from_os_release(&content).ok_or_else(|| {
            DistupError::UnsupportedSystem(format!("cannot identify OS from {OS_RELEASE_PATH}"))
                .into()
        })
    }

    /// Parse the `NAME`/`ID` and `VERSION_ID` keys of an os-release file.
    pub fn from_os_release(content: &str) -> Option<Self> {
        let mut name = None;
        let mut id = None;
        let mut version = None;
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "NAME" => name = Some(value),
                "ID" => id = Some(value),
                "VERSION_ID" => version = Some(value),
                _ => {}
            }
        }
        // NAME is "Debian GNU/Linux"; the first word is the distribution.
        let name = name
            .and_then(|n| n.split_whitespace().next().map(str::to_string))
            .or_else(|| id.map(|i| capitalize(&i)))?;
        Some(Self::new(name, version?))
    }
}

impl std::fmt::Display for Distro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Partial description of a system, used to select an upgrader.
/// `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemDescription {
    pub os_name: Option<String>,
    pub os_version: Option<String>,
}

impl SystemDescription {
    pub fn matches(&self, distro: &Distro) -> bool {
        self.os_name.as_ref().is_none_or(|n| *n == distro.name)
            && self.os_version.as_ref().is_none_or(|v| *v == distro.version)
    }
}

impl From<&Distro> for SystemDescription {
    fn from(distro: &Distro) -> Self {
        Self {
            os_name: Some(distro.name.clone()),
            os_version: Some(distro.version.clone()),
        }
    }
}
