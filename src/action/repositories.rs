//! Apt repository retargeting.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::Action;
use crate::host::{Host, HostProbe, list_dir_if_exists};
use crate::phase::Phase;
use crate::rewrite::{RewritePipeline, RewriteRule};

pub const SOURCES_LIST: &str = "/etc/apt/sources.list";
pub const SOURCES_LIST_DIR: &str = "/etc/apt/sources.list.d";
pub const BACKUP_SUFFIX: &str = "distup-backup";

/// Which repository files an action owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositorySource {
    /// `sources.list` and every drop-in not provided by Plesk.
    Debian,
    /// Drop-ins whose file name starts with `plesk`.
    Plesk,
}

impl RepositorySource {
    fn owns(self, file_name: &str) -> bool {
        let plesk = file_name.starts_with("plesk");
        match self {
            Self::Debian => !plesk,
            Self::Plesk => plesk,
        }
    }

    /// Repository files of this source present on the host, in a stable order.
    pub fn discover(self, probe: &dyn HostProbe) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let main = Path::new(SOURCES_LIST);
        if self == Self::Debian && probe.exists(main) {
            files.push(main.to_path_buf());
        }
        let entries = list_dir_if_exists(probe, Path::new(SOURCES_LIST_DIR))
            .with_context(|| format!("Failed to list {SOURCES_LIST_DIR}"))?;
        files.extend(entries.into_iter().filter(|path| {
            let is_source = path
                .extension()
                .is_some_and(|ext| ext == "list" || ext == "sources");
            let owned = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| self.owns(name));
            is_source && owned
        }));
        Ok(files)
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Rewrites every repository line of one [`RepositorySource`] through an
/// ordered rule list.
pub struct RewriteRepositories {
    name: String,
    source: RepositorySource,
    rules: Vec<RewriteRule>,
}

impl RewriteRepositories {
    pub fn new(name: impl Into<String>, source: RepositorySource, rules: Vec<RewriteRule>) -> Self {
        Self {
            name: name.into(),
            source,
            rules,
        }
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    pub fn source(&self) -> RepositorySource {
        self.source
    }
}

impl Action for RewriteRepositories {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        let rules: Vec<String> = self.rules.iter().map(ToString::to_string).collect();
        format!("Rewrite {:?} repositories: {}", self.source, rules.join(", "))
    }

    fn prepare(&self, host: &mut dyn Host) -> Result<()> {
        let pipeline = RewritePipeline::new(&self.rules);
        for path in self.source.discover(host)? {
            let backup = backup_path(&path);
            // Rewrite from the backup so a replayed stage sees the original.
            let original = if host.exists(&backup) {
                host.read_file(&backup)?
            } else {
                let content = host.read_file(&path)?;
                host.write_file(&backup, &content)?;
                content
            };
            let rewritten = pipeline.apply_to_sources(&original);
            if rewritten == host.read_file(&path)? {
                debug!("{} is already up to date", path.display());
                continue;
            }
            host.write_file(&path, &rewritten)?;
            info!("Rewrote repositories in {}", path.display());
        }
        Ok(())
    }

    fn revert(&self, host: &mut dyn Host) -> Result<()> {
        for path in self.source.discover(host)? {
            let backup = backup_path(&path);
            if host.exists(&backup) {
                host.rename(&backup, &path)?;
                info!("Restored {}", path.display());
            }
        }
        Ok(())
    }
}

/// Drops the backups [`RewriteRepositories`] left next to the repository
/// files once the upgraded system is up.
pub struct RemoveRepositoryBackups {
    sources: Vec<RepositorySource>,
}

impl RemoveRepositoryBackups {
    pub fn new(sources: impl IntoIterator<Item = RepositorySource>) -> Self {
        Self {
            sources: sources.into_iter().collect(),
        }
    }
}

impl Action for RemoveRepositoryBackups {
    fn name(&self) -> &str {
        "RemoveRepositoryBackups"
    }

    fn description(&self) -> String {
        "Remove backups of the original repository files".to_string()
    }

    fn restricted_to_phase(&self) -> Option<Phase> {
        Some(Phase::Finish)
    }

    fn prepare(&self, _host: &mut dyn Host) -> Result<()> {
        Ok(())
    }

    fn finish(&self, host: &mut dyn Host) -> Result<()> {
        for source in &self.sources {
            for path in source.discover(host)? {
                let backup = backup_path(&path);
                if host.exists(&backup) {
                    host.remove_file(&backup)?;
                    debug!("Removed {}", backup.display());
                }
            }
        }
        Ok(())
    }
}
