//! SSH login messages shown while and after the upgrade runs.

use std::path::{Path, PathBuf};

use anyhow::Result;

use super::Action;
use crate::host::{Host, read_if_exists};
use crate::phase::Phase;

pub const MOTD_PATH: &str = "/etc/motd";
pub const MOTD_BACKUP_PATH: &str = "/etc/motd.distup-backup";

const SEPARATOR: &str = "===============================================================================";

/// Save the original motd once; later calls keep the first copy.
fn save_original(host: &mut dyn Host, motd: &Path, backup: &Path) -> Result<()> {
    if host.exists(backup) {
        return Ok(());
    }
    let original = read_if_exists(host, motd)?.unwrap_or_default();
    host.write_file(backup, &original)
}

fn original(host: &dyn Host, backup: &Path) -> Result<String> {
    Ok(read_if_exists(host, backup)?.unwrap_or_default())
}

fn with_notice(original: &str, notice: &str) -> String {
    let mut content = original.to_string();
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&format!("{SEPARATOR}\n{notice}\n{SEPARATOR}\n"));
    content
}

/// Tells anyone logging in that the server is mid-upgrade.
pub struct AddInProgressSshLoginMessage {
    new_os: String,
    motd: PathBuf,
    backup: PathBuf,
}

impl AddInProgressSshLoginMessage {
    pub fn new(new_os: impl Into<String>) -> Self {
        Self {
            new_os: new_os.into(),
            motd: PathBuf::from(MOTD_PATH),
            backup: PathBuf::from(MOTD_BACKUP_PATH),
        }
    }

    fn notice(&self) -> String {
        format!(
            "Message from the Plesk distupgrade tool:\n\
             The server is being upgraded to {}. Please wait until the upgrade\n\
             is finished before making any changes.",
            self.new_os
        )
    }
}

impl Action for AddInProgressSshLoginMessage {
    fn name(&self) -> &str {
        "AddInProgressSshLoginMessage"
    }

    fn description(&self) -> String {
        format!("Add 'upgrade in progress' notice to {}", self.motd.display())
    }

    fn prepare(&self, host: &mut dyn Host) -> Result<()> {
        save_original(host, &self.motd, &self.backup)?;
        let content = with_notice(&original(host, &self.backup)?, &self.notice());
        host.write_file(&self.motd, &content)
    }

    fn revert(&self, host: &mut dyn Host) -> Result<()> {
        if !host.exists(&self.backup) {
            return Ok(());
        }
        let content = original(host, &self.backup)?;
        host.write_file(&self.motd, &content)?;
        host.remove_file(&self.backup)
    }
}

/// Replaces the in-progress notice with the upgrade result.
pub struct AddFinishSshLoginMessage {
    new_os: String,
    motd: PathBuf,
    backup: PathBuf,
}

impl AddFinishSshLoginMessage {
    pub fn new(new_os: impl Into<String>) -> Self {
        Self {
            new_os: new_os.into(),
            motd: PathBuf::from(MOTD_PATH),
            backup: PathBuf::from(MOTD_BACKUP_PATH),
        }
    }

    fn notice(&self) -> String {
        format!(
            "Message from the Plesk distupgrade tool:\n\
             The server has been upgraded to {}.\n\
             You can remove this message from {}.",
            self.new_os,
            self.motd.display()
        )
    }
}

impl Action for AddFinishSshLoginMessage {
    fn name(&self) -> &str {
        "AddFinishSshLoginMessage"
    }

    fn description(&self) -> String {
        format!("Add 'upgrade finished' notice to {}", self.motd.display())
    }

    fn restricted_to_phase(&self) -> Option<Phase> {
        Some(Phase::Finish)
    }

    fn prepare(&self, _host: &mut dyn Host) -> Result<()> {
        Ok(())
    }

    fn finish(&self, host: &mut dyn Host) -> Result<()> {
        let notice = self.notice();
        let content = if host.exists(&self.backup) {
            original(host, &self.backup)?
        } else {
            let current = read_if_exists(host, &self.motd)?.unwrap_or_default();
            if current.contains(&notice) {
                return Ok(());
            }
            current
        };
        host.write_file(&self.motd, &with_notice(&content, &notice))?;
        host.remove_file(&self.backup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FakeHost;

    #[test]
    fn test_in_progress_message_is_idempotent() {
        let mut host = FakeHost::new().with_file(MOTD_PATH, "Welcome\n");
        let action = AddInProgressSshLoginMessage::new("Debian 12");
        action.prepare(&mut host).unwrap();
        let first = host.file(MOTD_PATH).unwrap().to_string();
        action.prepare(&mut host).unwrap();

        assert_eq!(host.file(MOTD_PATH).unwrap(), first);
        assert!(first.starts_with("Welcome\n"));
        assert!(first.contains("being upgraded to Debian 12"));
        assert_eq!(host.file(MOTD_BACKUP_PATH), Some("Welcome\n"));
    }

    #[test]
    fn test_in_progress_revert_restores_original() {
        let mut host = FakeHost::new().with_file(MOTD_PATH, "Welcome\n");
        let action = AddInProgressSshLoginMessage::new("Debian 12");
        action.prepare(&mut host).unwrap();
        action.revert(&mut host).unwrap();
        assert_eq!(host.file(MOTD_PATH), Some("Welcome\n"));
        assert!(host.file(MOTD_BACKUP_PATH).is_none());
    }

    #[test]
    fn test_finish_message_replaces_in_progress_notice() {
        let mut host = FakeHost::new().with_file(MOTD_PATH, "Welcome\n");
        AddInProgressSshLoginMessage::new("Debian 12")
            .prepare(&mut host)
            .unwrap();
        AddFinishSshLoginMessage::new("Debian 12")
            .finish(&mut host)
            .unwrap();

        let motd = host.file(MOTD_PATH).unwrap();
        assert!(motd.starts_with("Welcome\n"));
        assert!(motd.contains("has been upgraded to Debian 12"));
        assert!(!motd.contains("being upgraded"));
        assert!(host.file(MOTD_BACKUP_PATH).is_none());
    }

    #[test]
    fn test_unreadable_motd_is_left_alone() {
        let mut host = FakeHost::new()
            .with_file(MOTD_PATH, "Welcome\n")
            .deny(MOTD_PATH);
        assert!(
            AddInProgressSshLoginMessage::new("Debian 12")
                .prepare(&mut host)
                .is_err()
        );
        assert!(host.file(MOTD_BACKUP_PATH).is_none());
    }

    #[test]
    fn test_finish_message_is_finish_only() {
        assert_eq!(
            AddFinishSshLoginMessage::new("Debian 12").restricted_to_phase(),
            Some(Phase::Finish)
        );
    }
}
