//! Package manager steps.

use anyhow::Result;

use super::{Action, DPKG_KEEP_CONFIG};
use crate::host::Host;

fn apt_get(host: &mut dyn Host, args: &[&str]) -> Result<()> {
    let mut argv = vec!["-y"];
    argv.extend(DPKG_KEEP_CONFIG);
    argv.extend_from_slice(args);
    host.run("apt-get", &argv)
}

/// Brings the current release fully up to date before switching.
pub struct UpgradePackages;

impl Action for UpgradePackages {
    fn name(&self) -> &str {
        "UpgradePackages"
    }

    fn description(&self) -> String {
        "Upgrade installed packages to the latest version of the current release".to_string()
    }

    fn prepare(&self, host: &mut dyn Host) -> Result<()> {
        host.run("apt-get", &["-y", "update"])?;
        apt_get(host, &["upgrade"])
    }
}

/// Installs a fixed package set from the new release ahead of the full
/// dist-upgrade.
pub struct InstallPackages {
    packages: Vec<String>,
}

impl InstallPackages {
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            packages: packages.into_iter().map(Into::into).collect(),
        }
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }
}

impl Action for InstallPackages {
    fn name(&self) -> &str {
        "InstallPackages"
    }

    fn description(&self) -> String {
        format!("Install packages: {}", self.packages.join(", "))
    }

    fn prepare(&self, host: &mut dyn Host) -> Result<()> {
        if self.packages.is_empty() {
            return Ok(());
        }
        host.run("apt-get", &["-y", "update"])?;
        let mut args = vec!["install"];
        args.extend(self.packages.iter().map(String::as_str));
        apt_get(host, &args)
    }
}

/// The full package transition to the new release.
///
/// Without `allow_downgrade` apt refuses any downgrade, and the action fails.
pub struct DoDistupgrade {
    allow_downgrade: bool,
}

impl DoDistupgrade {
    pub fn new(allow_downgrade: bool) -> Self {
        Self { allow_downgrade }
    }

    pub fn allow_downgrade(&self) -> bool {
        self.allow_downgrade
    }
}

impl Action for DoDistupgrade {
    fn name(&self) -> &str {
        "DoDistupgrade"
    }

    fn description(&self) -> String {
        if self.allow_downgrade {
            "Run dist-upgrade (package downgrades allowed)".to_string()
        } else {
            "Run dist-upgrade".to_string()
        }
    }

    fn prepare(&self, host: &mut dyn Host) -> Result<()> {
        host.run("apt-get", &["-y", "update"])?;
        let mut args = vec!["dist-upgrade"];
        if self.allow_downgrade {
            args.push("--allow-downgrades");
        }
        apt_get(host, &args)?;
        host.run("apt-get", &["-y", "autoremove"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FakeHost;

    const KEEP: &str = "-o Dpkg::Options::=--force-confdef -o Dpkg::Options::=--force-confold";

    #[test]
    fn test_upgrade_packages_commands() {
        let mut host = FakeHost::new();
        UpgradePackages.prepare(&mut host).unwrap();
        assert_eq!(
            host.commands,
            vec![
                "apt-get -y update".to_string(),
                format!("apt-get -y {KEEP} upgrade"),
            ]
        );
    }

    #[test]
    fn test_install_packages_lists_all_packages() {
        let mut host = FakeHost::new();
        InstallPackages::new(["libc6", "python3"])
            .prepare(&mut host)
            .unwrap();
        assert_eq!(
            host.commands.last().unwrap(),
            &format!("apt-get -y {KEEP} install libc6 python3")
        );
    }

    #[test]
    fn test_install_no_packages_is_noop() {
        let mut host = FakeHost::new();
        InstallPackages::new(Vec::<String>::new())
            .prepare(&mut host)
            .unwrap();
        assert!(host.commands.is_empty());
    }

    #[test]
    fn test_dist_upgrade_without_downgrades() {
        let mut host = FakeHost::new();
        DoDistupgrade::new(false).prepare(&mut host).unwrap();
        assert!(host.commands.contains(&format!("apt-get -y {KEEP} dist-upgrade")));
        assert!(!host.commands.iter().any(|c| c.contains("--allow-downgrades")));
        assert_eq!(host.commands.last().unwrap(), "apt-get -y autoremove");
    }

    #[test]
    fn test_dist_upgrade_with_downgrades() {
        let mut host = FakeHost::new();
        DoDistupgrade::new(true).prepare(&mut host).unwrap();
        assert!(
            host.commands
                .contains(&format!("apt-get -y {KEEP} dist-upgrade --allow-downgrades"))
        );
    }

    #[test]
    fn test_dist_upgrade_refused_downgrade_fails() {
        let mut host = FakeHost::new();
        host.fail_command(&format!("apt-get -y {KEEP} dist-upgrade"));
        assert!(DoDistupgrade::new(false).prepare(&mut host).is_err());
        assert!(!host.ran("apt-get -y autoremove"));
    }
}
