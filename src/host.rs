//! Narrow contract between upgrade steps and the machine they run on.
//!
//! Checks only ever see a [`HostProbe`], which has no mutating methods.
//! Actions get the full [`Host`].

#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod system;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[cfg(any(test, feature = "test-util"))]
pub use fake::FakeHost;
pub use system::SystemHost;

/// Captured result of a read-only command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: i32) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Read-only view of the host.
pub trait HostProbe {
    fn read_file(&self, path: &Path) -> io::Result<String>;

    fn exists(&self, path: &Path) -> bool;

    /// Direct children of `path`, sorted.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Run a command that must not change the system and capture its output.
    fn query(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput>;
}

/// Mutable view of the host.
pub trait Host: HostProbe {
    /// Run a command, failing on a non-zero exit status.
    fn run(&mut self, program: &str, args: &[&str]) -> Result<()>;

    fn write_file(&mut self, path: &Path, contents: &str) -> Result<()>;

    /// Remove a file. A missing file is not an error.
    fn remove_file(&mut self, path: &Path) -> Result<()>;

    fn rename(&mut self, from: &Path, to: &Path) -> Result<()>;

    /// Ask the OS to reboot. The current process is expected to end soon
    /// after this returns.
    fn reboot(&mut self) -> Result<()>;
}

/// Read `path`, or `None` if it does not exist. Any other error is returned.
pub fn read_if_exists(probe: &dyn HostProbe, path: &Path) -> Result<Option<String>> {
    match probe.read_file(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Children of `path`, empty if the directory does not exist.
pub fn list_dir_if_exists(probe: &dyn HostProbe, path: &Path) -> io::Result<Vec<PathBuf>> {
    match probe.list_dir(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        other => other,
    }
}

/// Format a command line for logs and error messages.
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        assert_eq!(command_line("apt-get", &["-y", "update"]), "apt-get -y update");
        assert_eq!(command_line("true", &[]), "true");
    }

    #[test]
    fn test_missing_paths_are_empty() {
        let host = FakeHost::new();
        assert_eq!(read_if_exists(&host, Path::new("/etc/motd")).unwrap(), None);
        assert!(list_dir_if_exists(&host, Path::new("/opt/plesk/php")).unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_paths_are_errors() {
        let host = FakeHost::new()
            .with_file("/etc/motd", "Welcome\n")
            .with_dir("/opt/plesk/php/8.2")
            .deny("/etc/motd")
            .deny("/opt/plesk/php");
        let err = read_if_exists(&host, Path::new("/etc/motd")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read /etc/motd"));
        let err = list_dir_if_exists(&host, Path::new("/opt/plesk/php")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_command_output_success() {
        assert!(CommandOutput::ok("fine").success());
        assert!(!CommandOutput::failed(1).success());
        assert!(!CommandOutput::default().success());
    }
}
