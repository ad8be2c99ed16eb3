//! Host-level pre-flight checks.

use std::path::Path;

use super::CheckAction;
use crate::host::HostProbe;

pub const DPKG_LOCK_FILES: [&str; 3] = [
    "/var/lib/dpkg/lock",
    "/var/lib/dpkg/lock-frontend",
    "/var/lib/apt/lists/lock",
];

const CONTAINER_MARKERS: [&str; 2] = ["/.dockerenv", "/run/.containerenv"];

/// No process may hold the dpkg or apt locks.
pub struct AssertDpkgNotLocked;

impl CheckAction for AssertDpkgNotLocked {
    fn name(&self) -> &str {
        "AssertDpkgNotLocked"
    }

    fn description(&self) -> String {
        "The package manager is locked by another process. Wait until it finishes and try again."
            .to_string()
    }

    fn evaluate(&self, probe: &dyn HostProbe) -> bool {
        // fuser exits 1 when no process has any of the files open.
        match probe.query("fuser", &DPKG_LOCK_FILES) {
            Ok(output) => output.status == Some(1),
            Err(_) => false,
        }
    }
}

/// The upgrade needs a full machine; containers cannot reboot into a new
/// kernel.
pub struct AssertNotInContainer;

impl CheckAction for AssertNotInContainer {
    fn name(&self) -> &str {
        "AssertNotInContainer"
    }

    fn description(&self) -> String {
        "The server runs inside a container. Distribution upgrades are only supported on \
         physical or virtual machines."
            .to_string()
    }

    fn evaluate(&self, probe: &dyn HostProbe) -> bool {
        if CONTAINER_MARKERS
            .iter()
            .any(|marker| probe.exists(Path::new(marker)))
        {
            return false;
        }
        match probe.query("systemd-detect-virt", &["--container"]) {
            // Exit 0 means a container was detected; "none" comes with exit 1.
            Ok(output) => !output.success() && output.stdout.trim() == "none",
            Err(_) => false,
        }
    }
}
