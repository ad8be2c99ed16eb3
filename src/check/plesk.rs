//! Plesk-specific pre-flight checks.

use std::io;
use std::path::Path;

use tracing::{debug, warn};

use super::CheckAction;
use crate::host::{HostProbe, list_dir_if_exists};
use crate::version::DottedVersion;

pub const PLESK_VERSION_FILE: &str = "/usr/local/psa/version";
pub const PLESK_PHP_DIR: &str = "/opt/plesk/php";

/// Installed Plesk must be at least `min_version`.
pub struct AssertMinPleskVersion {
    min_version: String,
}

impl AssertMinPleskVersion {
    pub fn new(min_version: impl Into<String>) -> Self {
        Self {
            min_version: min_version.into(),
        }
    }
}

impl CheckAction for AssertMinPleskVersion {
    fn name(&self) -> &str {
        "AssertMinPleskVersion"
    }

    fn description(&self) -> String {
        format!(
            "Plesk version {} or later is required. Update Plesk before upgrading the OS.",
            self.min_version
        )
    }

    fn evaluate(&self, probe: &dyn HostProbe) -> bool {
        let Ok(minimum) = DottedVersion::parse(&self.min_version) else {
            warn!("Invalid minimum Plesk version '{}'", self.min_version);
            return false;
        };
        let installed = probe
            .read_file(Path::new(PLESK_VERSION_FILE))
            .ok()
            .and_then(|content| DottedVersion::find_in(&content));
        match installed {
            Some(version) => {
                debug!("Installed Plesk version: {}", version);
                version >= minimum
            }
            None => false,
        }
    }
}

/// No Plesk installer run may be in progress.
pub struct AssertPleskInstallerNotInProgress;

impl CheckAction for AssertPleskInstallerNotInProgress {
    fn name(&self) -> &str {
        "AssertPleskInstallerNotInProgress"
    }

    fn description(&self) -> String {
        "The Plesk installer is running. Wait until it finishes and try again.".to_string()
    }

    fn evaluate(&self, probe: &dyn HostProbe) -> bool {
        // pgrep exits 1 when nothing matches; anything else is not a clean "no".
        match probe.query("pgrep", &["-f", "autoinstaller"]) {
            Ok(output) => output.status == Some(1),
            Err(_) => false,
        }
    }
}

/// Every installed Plesk PHP handler must be at least `min_version`.
pub struct AssertMinPhpVersion {
    min_version: String,
}

impl AssertMinPhpVersion {
    pub fn new(min_version: impl Into<String>) -> Self {
        Self {
            min_version: min_version.into(),
        }
    }

    fn installed(probe: &dyn HostProbe) -> io::Result<Vec<String>> {
        Ok(list_dir_if_exists(probe, Path::new(PLESK_PHP_DIR))?
            .iter()
            .filter_map(|path| path.file_name()?.to_str().map(str::to_string))
            .collect())
    }
}

impl CheckAction for AssertMinPhpVersion {
    fn name(&self) -> &str {
        "AssertMinPhpVersion"
    }

    fn description(&self) -> String {
        format!(
            "PHP versions below {} are installed. Remove them in Tools & Settings > Updates before upgrading.",
            self.min_version
        )
    }

    fn evaluate(&self, probe: &dyn HostProbe) -> bool {
        let Ok(minimum) = DottedVersion::parse(&self.min_version) else {
            return false;
        };
        let installed = match Self::installed(probe) {
            Ok(installed) => installed,
            Err(e) => {
                debug!("Cannot list {}: {}", PLESK_PHP_DIR, e);
                return false;
            }
        };
        installed.iter().all(|name| {
            match DottedVersion::parse(name) {
                Ok(version) => version >= minimum,
                Err(_) => {
                    debug!("Ignoring {}/{}", PLESK_PHP_DIR, name);
                    true
                }
            }
        })
    }
}
