use distup::action::{Action, RebootPoint};
use distup::config::UpgradeOptions;
use distup::phase::Phase;
use distup::rewrite::{RewriteRule, rewrite};
use distup::upgrader::{
    STAGE_DIST_UPGRADE, STAGE_FINISHING, STAGE_PREINSTALL, STAGE_PREPARE, UpgradeDefinition,
};

fn definition() -> UpgradeDefinition {
    UpgradeDefinition::debian11to12()
}

fn options() -> UpgradeOptions {
    UpgradeOptions {
        allow_downgrade: false,
        ..UpgradeOptions::default()
    }
}

#[test]
fn test_prepare_phase_stage_order() {
    let plan = definition().build_plan(&options(), Phase::Prepare);
    assert_eq!(
        plan.stage_names(),
        vec![
            "Prepare",
            "Switch repositories",
            "Pre-install packages",
            "Reboot",
            "Update Plesk",
            "Update Plesk extensions",
            "Dist-upgrade",
            "Finishing actions",
        ]
    );
}

#[test]
fn test_prepare_stage_starts_with_status_and_ends_with_configuration() {
    let plan = definition().build_plan(&options(), Phase::Prepare);
    let names = plan.stage(STAGE_PREPARE).unwrap().action_names();
    assert_eq!(names.first(), Some(&"HandleConversionStatus"));
    assert_eq!(names.last(), Some(&"ConfigureMariadb"));
}

#[test]
fn test_preinstall_lists_fixed_package_set() {
    let def = definition();
    assert_eq!(
        def.preinstall_packages,
        vec!["base-files", "linux-image-amd64", "libc6", "python3", "mariadb-server"]
    );

    let plan = def.build_plan(&options(), Phase::Prepare);
    let stage = plan.stage(STAGE_PREINSTALL).unwrap();
    assert_eq!(stage.actions.len(), 1);
    assert_eq!(
        stage.actions[0].description(),
        "Install packages: base-files, linux-image-amd64, libc6, python3, mariadb-server"
    );
}

#[test]
fn test_finishing_actions_end_with_two_reboots() {
    let convert = definition().build_plan(&options(), Phase::Convert);
    let actions = &convert.stage(STAGE_FINISHING).unwrap().actions;
    let [.., to_finish, final_reboot] = actions.as_slice() else {
        panic!("expected at least two finishing actions");
    };

    assert!(to_finish.requires_reboot());
    assert!(final_reboot.requires_reboot());

    let first = to_finish.reboot_request(Phase::Convert).unwrap();
    assert_eq!(first.point, RebootPoint::AfterCurrentStage);
    assert_eq!(first.next_phase, Some(Phase::Finish));

    let last = final_reboot.reboot_request(Phase::Finish).unwrap();
    assert_eq!(last.point, RebootPoint::AfterLastStage);
    assert_eq!(last.next_phase, None);
}

#[test]
fn test_finish_plan_excludes_conversion_stages() {
    let plan = definition().build_plan(&options(), Phase::Finish);
    assert_eq!(plan.stage_names(), vec!["Prepare", "Finishing actions"]);
    let prepare = plan.stage(STAGE_PREPARE).unwrap().action_names();
    assert!(prepare.contains(&"AddFinishSshLoginMessage"));
    assert!(prepare.contains(&"RepairPleskInstallation"));
}

#[test]
fn test_build_plan_is_deterministic() {
    let def = definition();
    for phase in Phase::ALL {
        let first = def.build_plan(&options(), phase);
        let second = def.build_plan(&options(), phase);
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
        let describe = |plan: &distup::plan::Plan| -> Vec<String> {
            plan.stages()
                .iter()
                .flat_map(|s| s.actions.iter().map(|a| a.description()))
                .collect()
        };
        assert_eq!(describe(&first), describe(&second));
    }
}

#[test]
fn test_downgrade_option_reaches_dist_upgrade() {
    let strict = definition().build_plan(&options(), Phase::Convert);
    assert_eq!(
        strict.stage(STAGE_DIST_UPGRADE).unwrap().actions[0].description(),
        "Run dist-upgrade"
    );

    let relaxed = UpgradeOptions {
        allow_downgrade: true,
        ..options()
    };
    let plan = definition().build_plan(&relaxed, Phase::Convert);
    assert_eq!(
        plan.stage(STAGE_DIST_UPGRADE).unwrap().actions[0].description(),
        "Run dist-upgrade (package downgrades allowed)"
    );
}

#[test]
fn test_repository_rewrite_pipeline() {
    let rules = vec![
        RewriteRule::literal("bullseye", "bookworm"),
        RewriteRule::pattern(r"11\.11", "12.7"),
    ];
    assert_eq!(
        rewrite("deb http://example.com/debian/11.11 main", &rules),
        "deb http://example.com/debian/12.7 main"
    );
    assert_eq!(
        rewrite("deb http://example.com/other/stable main", &rules),
        "deb http://example.com/other/stable main"
    );
}
