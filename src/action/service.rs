//! Systemd service that resumes the upgrade after each reboot.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use super::Action;
use crate::host::Host;

pub const SERVICE_NAME: &str = "distup-resume.service";
pub const SERVICE_DIR: &str = "/etc/systemd/system";

/// Installs a oneshot unit that re-invokes the tool with `--resume` on boot.
///
/// The unit only carries the status flag location; every other option is
/// read back from the snapshot stored in that file.
pub struct AddUpgradeSystemdService {
    bin_path: PathBuf,
    status_flag_path: PathBuf,
    unit_path: PathBuf,
}

impl AddUpgradeSystemdService {
    pub fn new(bin_path: impl Into<PathBuf>, status_flag_path: impl Into<PathBuf>) -> Self {
        Self {
            bin_path: bin_path.into(),
            status_flag_path: status_flag_path.into(),
            unit_path: Path::new(SERVICE_DIR).join(SERVICE_NAME),
        }
    }

    pub fn unit_content(&self) -> String {
        format!(
            "[Unit]\n\
             Description=Resume Plesk distribution upgrade after reboot\n\
             After=network-online.target\n\
             Wants=network-online.target\n\
             \n\
             [Service]\n\
             Type=oneshot\n\
             ExecStart={} --resume --status-flag-path {}\n\
             TimeoutStartSec=infinity\n\
             StandardOutput=journal+console\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            self.bin_path.display(),
            self.status_flag_path.display()
        )
    }

    fn remove(&self, host: &mut dyn Host) -> Result<()> {
        if !host.exists(&self.unit_path) {
            return Ok(());
        }
        host.run("systemctl", &["disable", SERVICE_NAME])?;
        host.remove_file(&self.unit_path)?;
        host.run("systemctl", &["daemon-reload"])?;
        info!("Removed resume service {}", SERVICE_NAME);
        Ok(())
    }
}

impl Action for AddUpgradeSystemdService {
    fn name(&self) -> &str {
        "AddUpgradeSystemdService"
    }

    fn description(&self) -> String {
        format!(
            "Install {} to resume the upgrade after reboot",
            self.unit_path.display()
        )
    }

    fn prepare(&self, host: &mut dyn Host) -> Result<()> {
        host.write_file(&self.unit_path, &self.unit_content())?;
        host.run("systemctl", &["daemon-reload"])?;
        host.run("systemctl", &["enable", SERVICE_NAME])?;
        info!("Installed resume service {}", SERVICE_NAME);
        Ok(())
    }

    fn finish(&self, host: &mut dyn Host) -> Result<()> {
        self.remove(host)
    }

    fn revert(&self, host: &mut dyn Host) -> Result<()> {
        self.remove(host)
    }
}
