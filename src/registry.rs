//! Known upgrade paths.

use crate::distro::{Distro, SystemDescription};
use crate::error::DistupError;
use crate::upgrader::UpgradeDefinition;

/// Every upgrade definition this build ships, in lookup order.
pub fn all() -> Vec<UpgradeDefinition> {
    vec![UpgradeDefinition::debian11to12()]
}

/// First definition able to upgrade `from` (optionally to `to`).
pub fn select(from: &Distro, to: Option<&SystemDescription>) -> Result<UpgradeDefinition, DistupError> {
    let current = SystemDescription::from(from);
    all()
        .into_iter()
        .find(|definition| definition.supports(Some(&current), to))
        .ok_or_else(|| DistupError::UnsupportedSystem(format!("no upgrader available for {from}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_debian11() {
        let definition = select(&Distro::new("Debian", "11"), None).unwrap();
        assert_eq!(definition.name, "Plesk::Debian11to12Upgrader");
    }

    #[test]
    fn test_select_with_target() {
        let target = SystemDescription::from(&Distro::new("Debian", "12"));
        assert!(select(&Distro::new("Debian", "11"), Some(&target)).is_ok());

        let wrong = SystemDescription::from(&Distro::new("Debian", "13"));
        assert!(select(&Distro::new("Debian", "11"), Some(&wrong)).is_err());
    }

    #[test]
    fn test_select_unsupported() {
        let err = select(&Distro::new("Ubuntu", "22.04"), None).unwrap_err();
        assert!(matches!(err, DistupError::UnsupportedSystem(_)));
        assert_eq!(err.to_string(), "Unsupported system: no upgrader available for Ubuntu 22.04");
    }
}
