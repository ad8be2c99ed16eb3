//! Plesk SSH banner toggling.

use std::path::PathBuf;

use anyhow::Result;

use super::Action;
use crate::host::Host;

pub const PLESK_BANNER_PATH: &str = "/root/.plesk_banner";
pub const PLESK_BANNER_BACKUP_PATH: &str = "/root/.plesk_banner.distup-backup";

/// Moves the Plesk login banner aside for the duration of the upgrade so it
/// does not hide the upgrade notice.
pub struct DisablePleskSshBanner {
    banner: PathBuf,
    backup: PathBuf,
}

impl DisablePleskSshBanner {
    pub fn new() -> Self {
        Self {
            banner: PathBuf::from(PLESK_BANNER_PATH),
            backup: PathBuf::from(PLESK_BANNER_BACKUP_PATH),
        }
    }

    fn restore(&self, host: &mut dyn Host) -> Result<()> {
        if host.exists(&self.backup) {
            host.rename(&self.backup, &self.banner)?;
        }
        Ok(())
    }
}

impl Default for DisablePleskSshBanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Action for DisablePleskSshBanner {
    fn name(&self) -> &str {
        "DisablePleskSshBanner"
    }

    fn description(&self) -> String {
        format!("Disable the Plesk SSH banner ({})", self.banner.display())
    }

    fn prepare(&self, host: &mut dyn Host) -> Result<()> {
        if host.exists(&self.banner) && !host.exists(&self.backup) {
            host.rename(&self.banner, &self.backup)?;
        }
        Ok(())
    }

    fn finish(&self, host: &mut dyn Host) -> Result<()> {
        self.restore(host)
    }

    fn revert(&self, host: &mut dyn Host) -> Result<()> {
        self.restore(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FakeHost;

    #[test]
    fn test_prepare_moves_banner_aside() {
        let mut host = FakeHost::new().with_file(PLESK_BANNER_PATH, "banner");
        let action = DisablePleskSshBanner::new();
        action.prepare(&mut host).unwrap();
        action.prepare(&mut host).unwrap();
        assert!(host.file(PLESK_BANNER_PATH).is_none());
        assert_eq!(host.file(PLESK_BANNER_BACKUP_PATH), Some("banner"));
    }

    #[test]
    fn test_finish_restores_banner() {
        let mut host = FakeHost::new().with_file(PLESK_BANNER_PATH, "banner");
        let action = DisablePleskSshBanner::new();
        action.prepare(&mut host).unwrap();
        action.finish(&mut host).unwrap();
        assert_eq!(host.file(PLESK_BANNER_PATH), Some("banner"));
        assert!(host.file(PLESK_BANNER_BACKUP_PATH).is_none());
    }

    #[test]
    fn test_no_banner_is_noop() {
        let mut host = FakeHost::new();
        let action = DisablePleskSshBanner::new();
        action.prepare(&mut host).unwrap();
        action.revert(&mut host).unwrap();
        assert!(host.files.is_empty());
    }
}
