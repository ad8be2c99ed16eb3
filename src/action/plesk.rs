//! Plesk installer and extension steps.

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use super::Action;
use crate::host::Host;
use crate::phase::Phase;

const PLESK: &str = "plesk";

/// Runs the Plesk installer to update installed components.
pub struct UpdatePlesk {
    extra_args: Vec<String>,
}

impl UpdatePlesk {
    pub fn new() -> Self {
        Self {
            extra_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extra_args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for UpdatePlesk {
    fn default() -> Self {
        Self::new()
    }
}

impl Action for UpdatePlesk {
    fn name(&self) -> &str {
        "UpdatePlesk"
    }

    fn description(&self) -> String {
        if self.extra_args.is_empty() {
            "Update Plesk to the latest available version".to_string()
        } else {
            format!(
                "Update Plesk to the latest available version ({})",
                self.extra_args.join(" ")
            )
        }
    }

    fn prepare(&self, host: &mut dyn Host) -> Result<()> {
        let mut args = vec![
            "installer",
            "--select-release-current",
            "--upgrade-installed-components",
        ];
        args.extend(self.extra_args.iter().map(String::as_str));
        host.run(PLESK, &args)
    }
}

/// Repairs the Plesk installation once the system runs the new release.
pub struct RepairPleskInstallation;

impl Action for RepairPleskInstallation {
    fn name(&self) -> &str {
        "RepairPleskInstallation"
    }

    fn description(&self) -> String {
        "Repair the Plesk installation".to_string()
    }

    fn restricted_to_phase(&self) -> Option<Phase> {
        Some(Phase::Finish)
    }

    fn prepare(&self, _host: &mut dyn Host) -> Result<()> {
        Ok(())
    }

    fn finish(&self, host: &mut dyn Host) -> Result<()> {
        host.run(PLESK, &["repair", "installation", "-y"])
    }
}

/// Upgrades the listed extensions that are installed; others are skipped.
pub struct UpdatePleskExtensions {
    extensions: Vec<String>,
}

impl UpdatePleskExtensions {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    fn installed(host: &dyn Host) -> Result<Vec<String>> {
        let output = host
            .query(PLESK, &["bin", "extension", "--list"])
            .context("Failed to list Plesk extensions")?;
        if !output.success() {
            bail!("`plesk bin extension --list` failed: {}", output.stderr.trim());
        }
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect())
    }
}

impl Action for UpdatePleskExtensions {
    fn name(&self) -> &str {
        "UpdatePleskExtensions"
    }

    fn description(&self) -> String {
        format!("Update Plesk extensions: {}", self.extensions.join(", "))
    }

    fn prepare(&self, host: &mut dyn Host) -> Result<()> {
        let installed = Self::installed(host)?;
        for extension in &self.extensions {
            if !installed.contains(extension) {
                debug!("Extension {} is not installed, skipping", extension);
                continue;
            }
            info!("Upgrading Plesk extension {}", extension);
            host.run(PLESK, &["bin", "extension", "--upgrade", extension.as_str()])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CommandOutput, FakeHost};

    #[test]
    fn test_update_plesk_with_args() {
        let mut host = FakeHost::new();
        UpdatePlesk::with_args(["--skip-cleanup"])
            .prepare(&mut host)
            .unwrap();
        assert_eq!(
            host.commands,
            vec!["plesk installer --select-release-current --upgrade-installed-components --skip-cleanup"]
        );
    }

    #[test]
    fn test_repair_runs_only_in_finish() {
        let mut host = FakeHost::new();
        let action = RepairPleskInstallation;
        action.prepare(&mut host).unwrap();
        assert!(host.commands.is_empty());
        action.finish(&mut host).unwrap();
        assert_eq!(host.commands, vec!["plesk repair installation -y"]);
        assert_eq!(action.restricted_to_phase(), Some(Phase::Finish));
    }

    #[test]
    fn test_update_extensions_skips_missing() {
        let mut host = FakeHost::new().respond(
            "plesk bin extension --list",
            CommandOutput::ok("docker - Docker\ngrafana - Grafana\n"),
        );
        UpdatePleskExtensions::new(["panel-migrator", "docker", "grafana"])
            .prepare(&mut host)
            .unwrap();
        assert_eq!(
            host.commands,
            vec![
                "plesk bin extension --upgrade docker",
                "plesk bin extension --upgrade grafana",
            ]
        );
    }

    #[test]
    fn test_update_extensions_list_failure() {
        let mut host = FakeHost::new();
        assert!(
            UpdatePleskExtensions::new(["docker"])
                .prepare(&mut host)
                .is_err()
        );
    }
}
