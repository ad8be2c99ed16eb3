//! Host implementation backed by the real filesystem and processes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use super::{CommandOutput, Host, HostProbe, command_line};
use crate::state::write_atomic;

/// Host running commands through `std::process`.
///
/// Every command gets `DEBIAN_FRONTEND=noninteractive` so apt and dpkg never
/// wait for a terminal.
#[derive(Debug, Default)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }

    fn command(program: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .env("DEBIAN_FRONTEND", "noninteractive")
            .stdin(Stdio::null());
        cmd
    }
}

impl HostProbe for SystemHost {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }

    fn query(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        debug!("Querying: {}", command_line(program, args));
        let output = Self::command(program, args).output()?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl Host for SystemHost {
    fn run(&mut self, program: &str, args: &[&str]) -> Result<()> {
        let line = command_line(program, args);
        info!("Running: {}", line);
        let status = Self::command(program, args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("Failed to start `{line}`"))?;
        if !status.success() {
            bail!("`{line}` exited with {status}");
        }
        Ok(())
    }

    fn write_file(&mut self, path: &Path, contents: &str) -> Result<()> {
        write_atomic(path, contents.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn remove_file(&mut self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to)
            .with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))
    }

    fn reboot(&mut self) -> Result<()> {
        info!("Requesting system reboot");
        self.run("systemctl", &["reboot"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_read_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/file.txt");
        let mut host = SystemHost::new();

        host.write_file(&path, "hello").unwrap();
        assert!(host.exists(&path));
        assert_eq!(host.read_file(&path).unwrap(), "hello");

        host.remove_file(&path).unwrap();
        host.remove_file(&path).unwrap();
        assert!(!host.exists(&path));
    }

    #[test]
    fn test_overwrite_keeps_mode_and_leaves_no_temp_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("50-server.cnf");
        let mut host = SystemHost::new();
        host.write_file(&path, "[mysqld]\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        host.write_file(&path, "[mysqld]\nport = 3306\n").unwrap();
        assert_eq!(host.read_file(&path).unwrap(), "[mysqld]\nport = 3306\n");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(host.list_dir(dir.path()).unwrap(), vec![path]);
    }

    #[test]
    fn test_list_dir_sorted() {
        let dir = tempdir().unwrap();
        let mut host = SystemHost::new();
        host.write_file(&dir.path().join("b.list"), "").unwrap();
        host.write_file(&dir.path().join("a.list"), "").unwrap();

        let entries = host.list_dir(dir.path()).unwrap();
        assert_eq!(
            entries,
            vec![dir.path().join("a.list"), dir.path().join("b.list")]
        );
    }

    #[test]
    fn test_rename() {
        let dir = tempdir().unwrap();
        let mut host = SystemHost::new();
        let from = dir.path().join("from");
        let to = dir.path().join("to");
        host.write_file(&from, "x").unwrap();
        host.rename(&from, &to).unwrap();
        assert!(!host.exists(&from));
        assert!(host.exists(&to));
    }
}
