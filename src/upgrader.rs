//! Upgrade definitions: the static description of one OS-to-OS upgrade and
//! the stage table built from it.

use crate::action::{
    AddFinishSshLoginMessage, AddInProgressSshLoginMessage, AddUpgradeSystemdService,
    ConfigValueReplacer, ConfigureMariadb, DisablePleskSshBanner, DoDistupgrade,
    HandleConversionStatus, InstallPackages, MariadbOption, Reboot, RemoveRepositoryBackups,
    RepairPleskInstallation, RepositorySource, RewriteRepositories, UpdatePlesk, UpdatePleskExtensions, UpgradePackages,
};
use crate::check::{
    AssertDpkgNotLocked, AssertMinPhpVersion, AssertMinPleskVersion, AssertNotInContainer,
    AssertPleskInstallerNotInProgress, BoxedCheck,
};
use crate::config::UpgradeOptions;
use crate::distro::{Distro, SystemDescription};
use crate::phase::Phase;
use crate::plan::{Plan, Stage};
use crate::rewrite::RewriteRule;

pub const STAGE_PREPARE: &str = "Prepare";
pub const STAGE_SWITCH_REPOSITORIES: &str = "Switch repositories";
pub const STAGE_PREINSTALL: &str = "Pre-install packages";
pub const STAGE_REBOOT: &str = "Reboot";
pub const STAGE_UPDATE_PLESK: &str = "Update Plesk";
pub const STAGE_UPDATE_EXTENSIONS: &str = "Update Plesk extensions";
pub const STAGE_DIST_UPGRADE: &str = "Dist-upgrade";
pub const STAGE_FINISHING: &str = "Finishing actions";

/// Static configuration of one upgrade path.
#[derive(Debug, Clone)]
pub struct UpgradeDefinition {
    pub name: String,
    pub from: Distro,
    pub to: Distro,
    pub preinstall_packages: Vec<String>,
    pub extensions: Vec<String>,
    pub min_plesk_version: String,
    pub min_php_version: String,
    pub mariadb_options: Vec<MariadbOption>,
}

impl UpgradeDefinition {
    /// Debian 11 (bullseye) to Debian 12 (bookworm) on a Plesk server.
    pub fn debian11to12() -> Self {
        Self {
            name: "Plesk::Debian11to12Upgrader".to_string(),
            from: Distro::new("Debian", "11"),
            to: Distro::new("Debian", "12"),
            preinstall_packages: to_strings(&[
                "base-files",
                "linux-image-amd64",
                "libc6",
                "python3",
                "mariadb-server",
            ]),
            extensions: to_strings(&["panel-migrator", "site-import", "docker", "grafana", "ruby"]),
            min_plesk_version: "18.0.57".to_string(),
            min_php_version: "7.4".to_string(),
            mariadb_options: vec![
                MariadbOption::new(
                    "mysqld.bind-address",
                    ConfigValueReplacer::new(Some("::ffff:127.0.0.1"), Some("127.0.0.1")),
                ),
                MariadbOption::new(
                    "mysqld.innodb_fast_shutdown",
                    ConfigValueReplacer::new(None, Some("0")),
                ),
            ],
        }
    }

    /// Whether this definition upgrades `from` to `to`. A missing side, or a
    /// missing field in a description, matches anything.
    pub fn supports(
        &self,
        from: Option<&SystemDescription>,
        to: Option<&SystemDescription>,
    ) -> bool {
        from.is_none_or(|d| d.matches(&self.from)) && to.is_none_or(|d| d.matches(&self.to))
    }

    /// Human name of the target release, e.g. "Debian 12".
    pub fn new_os(&self) -> String {
        self.to.to_string()
    }

    /// Rules for the distribution's own repositories.
    pub fn debian_rules(&self) -> Vec<RewriteRule> {
        codename_rule(&self.from, &self.to).into_iter().collect()
    }

    /// Rules for Plesk repositories: the codename, plus release numbers
    /// embedded in repository paths.
    pub fn plesk_rules(&self) -> Vec<RewriteRule> {
        let mut rules: Vec<RewriteRule> = codename_rule(&self.from, &self.to).into_iter().collect();
        rules.push(RewriteRule::pattern(
            format!(
                r"(plesk\.com/\S*?(?i:{})[_/-]?){}\b",
                regex::escape(&self.from.name),
                regex::escape(&self.from.version)
            ),
            format!("${{1}}{}", self.to.version),
        ));
        rules
    }

    /// The full stage table, before phase filtering.
    fn stage_table(&self, options: &UpgradeOptions) -> Vec<Stage> {
        let new_os = self.new_os();
        vec![
            Stage::new(
                STAGE_PREPARE,
                vec![
                    Box::new(HandleConversionStatus::new(
                        &self.name,
                        &options.completion_flag_path,
                        &new_os,
                    )),
                    Box::new(AddFinishSshLoginMessage::new(&new_os)),
                    Box::new(AddInProgressSshLoginMessage::new(&new_os)),
                    Box::new(DisablePleskSshBanner::new()),
                    Box::new(RepairPleskInstallation),
                    Box::new(UpgradePackages),
                    Box::new(UpdatePlesk::new()),
                    Box::new(AddUpgradeSystemdService::new(
                        &options.upgrader_bin_path,
                        &options.status_flag_path,
                    )),
                    Box::new(ConfigureMariadb::new(self.mariadb_options.clone())),
                ],
            ),
            Stage::restricted(
                STAGE_SWITCH_REPOSITORIES,
                Phase::Convert,
                vec![
                    Box::new(RewriteRepositories::new(
                        "SetupDebianRepositories",
                        RepositorySource::Debian,
                        self.debian_rules(),
                    )),
                    Box::new(RewriteRepositories::new(
                        "SwitchPleskRepositories",
                        RepositorySource::Plesk,
                        self.plesk_rules(),
                    )),
                ],
            ),
            Stage::restricted(
                STAGE_PREINSTALL,
                Phase::Convert,
                vec![Box::new(InstallPackages::new(
                    self.preinstall_packages.iter().cloned(),
                ))],
            ),
            Stage::restricted(STAGE_REBOOT, Phase::Convert, vec![Box::new(Reboot::new())]),
            Stage::restricted(
                STAGE_UPDATE_PLESK,
                Phase::Convert,
                vec![Box::new(UpdatePlesk::with_args(["--skip-cleanup"]))],
            ),
            Stage::restricted(
                STAGE_UPDATE_EXTENSIONS,
                Phase::Convert,
                vec![Box::new(UpdatePleskExtensions::new(
                    self.extensions.iter().cloned(),
                ))],
            ),
            Stage::restricted(
                STAGE_DIST_UPGRADE,
                Phase::Convert,
                vec![Box::new(DoDistupgrade::new(options.allow_downgrade))],
            ),
            Stage::new(
                STAGE_FINISHING,
                vec![
                    Box::new(RemoveRepositoryBackups::new([
                        RepositorySource::Debian,
                        RepositorySource::Plesk,
                    ])),
                    Box::new(Reboot::to_finish("reboot and perform finishing actions")),
                    Box::new(Reboot::final_reboot("final reboot")),
                ],
            ),
        ]
    }

    /// The plan `phase` runs. Building a plan reads nothing from the host.
    pub fn build_plan(&self, options: &UpgradeOptions, phase: Phase) -> Plan {
        Plan::for_phase(phase, self.stage_table(options))
    }

    /// Pre-flight checks for `phase`. The finish pass runs none: the system
    /// has already been converted by then.
    pub fn check_actions(&self, _options: &UpgradeOptions, phase: Phase) -> Vec<BoxedCheck> {
        if phase == Phase::Finish {
            return Vec::new();
        }
        vec![
            Box::new(AssertMinPleskVersion::new(&self.min_plesk_version)),
            Box::new(AssertPleskInstallerNotInProgress),
            Box::new(AssertMinPhpVersion::new(&self.min_php_version)),
            Box::new(AssertDpkgNotLocked),
            Box::new(AssertNotInContainer),
        ]
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn codename_rule(from: &Distro, to: &Distro) -> Option<RewriteRule> {
    Some(RewriteRule::literal(from.codename()?, to.codename()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::rewrite;

    fn definition() -> UpgradeDefinition {
        UpgradeDefinition::debian11to12()
    }

    #[test]
    fn test_supports() {
        let def = definition();
        let debian11 = SystemDescription::from(&Distro::new("Debian", "11"));
        let debian12 = SystemDescription::from(&Distro::new("Debian", "12"));
        assert!(def.supports(Some(&debian11), Some(&debian12)));
        assert!(def.supports(Some(&debian11), None));
        assert!(def.supports(None, None));
        assert!(!def.supports(Some(&debian12), None));

        let any_debian = SystemDescription {
            os_name: Some("Debian".to_string()),
            os_version: None,
        };
        assert!(def.supports(Some(&any_debian), Some(&any_debian)));
    }

    #[test]
    fn test_debian_rules_switch_codename() {
        let rules = definition().debian_rules();
        assert_eq!(rules, vec![RewriteRule::literal("bullseye", "bookworm")]);
    }

    #[test]
    fn test_plesk_rules_switch_path_release() {
        let rules = definition().plesk_rules();
        assert_eq!(
            rewrite(
                "deb [arch=amd64] http://autoinstall.plesk.com/debian/PHP82_17 bullseye all",
                &rules
            ),
            "deb [arch=amd64] http://autoinstall.plesk.com/debian/PHP82_17 bookworm all"
        );
        assert_eq!(
            rewrite("deb http://autoinstall.plesk.com/pool/Debian-11 bullseye all", &rules),
            "deb http://autoinstall.plesk.com/pool/Debian-12 bookworm all"
        );
    }

    #[test]
    fn test_prepare_stage_order() {
        let plan = definition().build_plan(&UpgradeOptions::default(), Phase::Prepare);
        let prepare = plan.stage(STAGE_PREPARE).unwrap();
        assert_eq!(
            prepare.action_names(),
            vec![
                "HandleConversionStatus",
                "AddInProgressSshLoginMessage",
                "DisablePleskSshBanner",
                "UpgradePackages",
                "UpdatePlesk",
                "AddUpgradeSystemdService",
                "ConfigureMariadb",
            ]
        );
    }

    #[test]
    fn test_finish_prepare_stage_includes_finish_only_actions() {
        let plan = definition().build_plan(&UpgradeOptions::default(), Phase::Finish);
        let names = plan.stage(STAGE_PREPARE).unwrap().action_names();
        assert_eq!(names[0], "HandleConversionStatus");
        assert_eq!(names[1], "AddFinishSshLoginMessage");
        assert!(names.contains(&"RepairPleskInstallation"));
        assert_eq!(names.last(), Some(&"ConfigureMariadb"));
    }

    #[test]
    fn test_finishing_actions_by_phase() {
        let def = definition();
        let options = UpgradeOptions::default();
        let convert = def.build_plan(&options, Phase::Convert);
        assert_eq!(
            convert.stage(STAGE_FINISHING).unwrap().action_names(),
            vec!["reboot and perform finishing actions", "final reboot"]
        );
        let finish = def.build_plan(&options, Phase::Finish);
        assert_eq!(
            finish.stage(STAGE_FINISHING).unwrap().action_names(),
            vec![
                "RemoveRepositoryBackups",
                "reboot and perform finishing actions",
                "final reboot",
            ]
        );
    }

    #[test]
    fn test_check_actions_by_phase() {
        let def = definition();
        let options = UpgradeOptions::default();
        let names: Vec<String> = def
            .check_actions(&options, Phase::Prepare)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "AssertMinPleskVersion",
                "AssertPleskInstallerNotInProgress",
                "AssertMinPhpVersion",
                "AssertDpkgNotLocked",
                "AssertNotInContainer",
            ]
        );
        assert!(def.check_actions(&options, Phase::Finish).is_empty());
    }

    #[test]
    fn test_dist_upgrade_follows_downgrade_option() {
        let options = UpgradeOptions {
            allow_downgrade: true,
            ..UpgradeOptions::default()
        };
        let plan = definition().build_plan(&options, Phase::Convert);
        let stage = plan.stage(STAGE_DIST_UPGRADE).unwrap();
        assert!(stage.actions[0].description().contains("downgrades allowed"));
    }
}
