//! In-memory host for exercising plans without touching the machine.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use super::{CommandOutput, Host, HostProbe, command_line};

/// Host double with a map-backed filesystem and scripted command results.
///
/// Commands passed to [`Host::run`] are recorded in order and succeed unless
/// registered with [`FakeHost::fail_command`]. Queries answer with the output
/// registered through [`FakeHost::respond`], or a failure with status 1.
#[derive(Debug, Default)]
pub struct FakeHost {
    pub files: BTreeMap<PathBuf, String>,
    pub dirs: BTreeSet<PathBuf>,
    pub commands: Vec<String>,
    pub reboots: usize,
    denied: BTreeSet<PathBuf>,
    responses: HashMap<String, CommandOutput>,
    failing: HashSet<String>,
    queries: RefCell<Vec<String>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    pub fn with_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.dirs.insert(path.into());
        self
    }

    /// Make reads and listings of `path` fail with `PermissionDenied`.
    pub fn deny(mut self, path: impl Into<PathBuf>) -> Self {
        self.denied.insert(path.into());
        self
    }

    fn check_access(&self, path: &Path) -> io::Result<()> {
        if self.denied.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                path.display().to_string(),
            ));
        }
        Ok(())
    }

    /// Answer `command_line` queries with `output`.
    pub fn respond(mut self, command_line: &str, output: CommandOutput) -> Self {
        self.responses.insert(command_line.to_string(), output);
        self
    }

    /// Make `run` fail for the given command line.
    pub fn fail_command(&mut self, command_line: &str) {
        self.failing.insert(command_line.to_string());
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(Path::new(path)).map(String::as_str)
    }

    /// Queries issued so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.borrow().clone()
    }

    /// Whether a recorded command starts with `prefix`.
    pub fn ran(&self, prefix: &str) -> bool {
        self.commands.iter().any(|c| c.starts_with(prefix))
    }
}

impl HostProbe for FakeHost {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        self.check_access(path)?;
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
            || self.dirs.contains(path)
            || self.files.keys().any(|p| p.starts_with(path))
            || self.dirs.iter().any(|p| p.starts_with(path))
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.check_access(path)?;
        if !self.exists(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                path.display().to_string(),
            ));
        }
        let children: BTreeSet<PathBuf> = self
            .files
            .keys()
            .chain(self.dirs.iter())
            .filter_map(|p| {
                let rest = p.strip_prefix(path).ok()?;
                let first = rest.components().next()?;
                Some(path.join(first))
            })
            .collect();
        Ok(children.into_iter().collect())
    }

    fn query(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        let line = command_line(program, args);
        self.queries.borrow_mut().push(line.clone());
        Ok(self
            .responses
            .get(&line)
            .cloned()
            .unwrap_or_else(|| CommandOutput::failed(1)))
    }
}

impl Host for FakeHost {
    fn run(&mut self, program: &str, args: &[&str]) -> Result<()> {
        let line = command_line(program, args);
        self.commands.push(line.clone());
        if self.failing.contains(&line) {
            bail!("`{line}` exited with exit status: 100");
        }
        Ok(())
    }

    fn write_file(&mut self, path: &Path, contents: &str) -> Result<()> {
        self.files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn remove_file(&mut self, path: &Path) -> Result<()> {
        self.files.remove(path);
        Ok(())
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<()> {
        let Some(contents) = self.files.remove(from) else {
            bail!("{} does not exist", from.display());
        };
        self.files.insert(to.to_path_buf(), contents);
        Ok(())
    }

    fn reboot(&mut self) -> Result<()> {
        self.reboots += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_dir_returns_direct_children() {
        let host = FakeHost::new()
            .with_file("/etc/apt/sources.list", "")
            .with_file("/etc/apt/sources.list.d/plesk.list", "")
            .with_dir("/etc/apt/trusted.gpg.d");

        let entries = host.list_dir(Path::new("/etc/apt")).unwrap();
        assert_eq!(
            entries,
            vec![
                PathBuf::from("/etc/apt/sources.list"),
                PathBuf::from("/etc/apt/sources.list.d"),
                PathBuf::from("/etc/apt/trusted.gpg.d"),
            ]
        );
        assert!(host.list_dir(Path::new("/nope")).is_err());
    }

    #[test]
    fn test_run_records_and_fails_on_demand() {
        let mut host = FakeHost::new();
        host.fail_command("false");
        host.run("apt-get", &["update"]).unwrap();
        assert!(host.run("false", &[]).is_err());
        assert_eq!(host.commands, vec!["apt-get update", "false"]);
        assert!(host.ran("apt-get"));
    }

    #[test]
    fn test_query_uses_scripted_response() {
        let host = FakeHost::new().respond("pgrep -f autoinstaller", CommandOutput::failed(1));
        assert!(!host.query("pgrep", &["-f", "autoinstaller"]).unwrap().success());
        assert!(!host.query("unknown", &[]).unwrap().success());
        assert_eq!(host.queries().len(), 2);
    }

    #[test]
    fn test_rename_missing_file_fails() {
        let mut host = FakeHost::new();
        assert!(host.rename(Path::new("/a"), Path::new("/b")).is_err());
    }
}
