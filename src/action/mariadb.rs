//! MariaDB server configuration adjustments.
//!
//! The server config is an ini file. Edits are made line by line so comments,
//! ordering and unrelated keys survive untouched.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info};

use super::Action;
use crate::host::{Host, read_if_exists};

pub const MARIADB_SERVER_CONFIG: &str = "/etc/mysql/mariadb.conf.d/50-server.cnf";

/// Conditional value change: applies only when the current value is
/// `old_value`. `None` stands for an absent key on either side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValueReplacer {
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl ConfigValueReplacer {
    pub fn new(old_value: Option<&str>, new_value: Option<&str>) -> Self {
        Self {
            old_value: old_value.map(str::to_string),
            new_value: new_value.map(str::to_string),
        }
    }

    /// The replacer that undoes this one.
    pub fn reversed(&self) -> Self {
        Self {
            old_value: self.new_value.clone(),
            new_value: self.old_value.clone(),
        }
    }

    /// New value for `current`, or `None` if this replacer does not apply.
    fn replacement(&self, current: Option<&str>) -> Option<Option<&str>> {
        (current == self.old_value.as_deref()).then_some(self.new_value.as_deref())
    }
}

/// A `section.key` setting with the change applied in the forward pass and
/// the change applied on revert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MariadbOption {
    pub section: String,
    pub key: String,
    pub on_prepare: ConfigValueReplacer,
    pub on_revert: ConfigValueReplacer,
}

impl MariadbOption {
    /// `name` is `section.key`; a name without a dot refers to `mysqld`.
    pub fn new(name: &str, on_prepare: ConfigValueReplacer) -> Self {
        let (section, key) = name.split_once('.').unwrap_or(("mysqld", name));
        Self {
            section: section.to_string(),
            key: key.to_string(),
            on_revert: on_prepare.reversed(),
            on_prepare,
        }
    }

    pub fn name(&self) -> String {
        format!("{}.{}", self.section, self.key)
    }
}

/// Applies a set of [`MariadbOption`]s to the MariaDB server config.
pub struct ConfigureMariadb {
    options: Vec<MariadbOption>,
    config_path: PathBuf,
}

impl ConfigureMariadb {
    pub fn new(options: Vec<MariadbOption>) -> Self {
        Self {
            options,
            config_path: PathBuf::from(MARIADB_SERVER_CONFIG),
        }
    }

    pub fn options(&self) -> &[MariadbOption] {
        &self.options
    }

    fn apply(
        &self,
        host: &mut dyn Host,
        pick: impl Fn(&MariadbOption) -> &ConfigValueReplacer,
    ) -> Result<()> {
        let Some(original) = read_if_exists(host, &self.config_path)? else {
            debug!(
                "{} not found, skipping MariaDB configuration",
                self.config_path.display()
            );
            return Ok(());
        };

        let mut content = original.clone();
        for option in &self.options {
            content = replace_value(&content, &option.section, &option.key, pick(option));
        }
        if content != original {
            host.write_file(&self.config_path, &content)?;
            info!("Updated {}", self.config_path.display());
        }
        Ok(())
    }
}

impl Action for ConfigureMariadb {
    fn name(&self) -> &str {
        "ConfigureMariadb"
    }

    fn description(&self) -> String {
        let names: Vec<String> = self.options.iter().map(MariadbOption::name).collect();
        format!(
            "Adjust MariaDB settings in {}: {}",
            self.config_path.display(),
            names.join(", ")
        )
    }

    fn prepare(&self, host: &mut dyn Host) -> Result<()> {
        self.apply(host, |option| &option.on_prepare)
    }

    fn revert(&self, host: &mut dyn Host) -> Result<()> {
        self.apply(host, |option| &option.on_revert)
    }
}

// ============================================================================
// Ini editing
// ============================================================================

fn section_header(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
}

/// Split an active `key = value` line. Comments and headers yield `None`.
fn key_value(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    if section_header(trimmed).is_some() {
        return None;
    }
    match trimmed.split_once('=') {
        Some((key, value)) => Some((key.trim(), value.trim())),
        None => Some((trimmed, "")),
    }
}

/// Current value of `key` in `section`, the last occurrence winning.
pub fn get_value<'a>(content: &'a str, section: &str, key: &str) -> Option<&'a str> {
    let mut current_section: Option<&str> = None;
    let mut found = None;
    for line in content.lines() {
        if let Some(name) = section_header(line) {
            current_section = Some(name);
            continue;
        }
        if current_section != Some(section) {
            continue;
        }
        if let Some((k, v)) = key_value(line)
            && k == key
        {
            found = Some(v);
        }
    }
    found
}

/// Apply `replacer` to `key` in `section` and return the new content.
///
/// Unchanged input is returned as is when the replacer does not apply. A key
/// added to a missing section creates that section at the end of the file.
pub fn replace_value(
    content: &str,
    section: &str,
    key: &str,
    replacer: &ConfigValueReplacer,
) -> String {
    let current = get_value(content, section, key);
    let Some(new_value) = replacer.replacement(current) else {
        return content.to_string();
    };
    if new_value == current {
        return content.to_string();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current_section: Option<&str> = None;
    let mut section_end: Option<usize> = None;
    for line in content.lines() {
        if let Some(name) = section_header(line) {
            current_section = Some(name);
            lines.push(line.to_string());
            if name == section {
                section_end = Some(lines.len());
            }
            continue;
        }
        let in_section = current_section == Some(section);
        if in_section
            && let Some((k, _)) = key_value(line)
            && k == key
        {
            if let Some(value) = new_value {
                lines.push(format!("{key} = {value}"));
                section_end = Some(lines.len());
            }
            continue;
        }
        lines.push(line.to_string());
        if in_section && !line.trim().is_empty() {
            section_end = Some(lines.len());
        }
    }

    if let Some(value) = new_value
        && current.is_none()
    {
        let entry = format!("{key} = {value}");
        match section_end {
            Some(index) => lines.insert(index, entry),
            None => {
                if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                    lines.push(String::new());
                }
                lines.push(format!("[{section}]"));
                lines.push(entry);
            }
        }
    }

    let mut result = lines.join("\n");
    if content.ends_with('\n') || content.is_empty() {
        result.push('\n');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FakeHost;

    const CONFIG: &str = "\
[server]

[mysqld]
user = mysql
bind-address = ::ffff:127.0.0.1
# innodb_fast_shutdown = 1

[embedded]
";

    fn replacer(old: Option<&str>, new: Option<&str>) -> ConfigValueReplacer {
        ConfigValueReplacer::new(old, new)
    }

    fn plesk_options() -> Vec<MariadbOption> {
        vec![
            MariadbOption::new(
                "mysqld.bind-address",
                replacer(Some("::ffff:127.0.0.1"), Some("127.0.0.1")),
            ),
            MariadbOption::new("mysqld.innodb_fast_shutdown", replacer(None, Some("0"))),
        ]
    }

    #[test]
    fn test_get_value_ignores_comments_and_other_sections() {
        assert_eq!(get_value(CONFIG, "mysqld", "user"), Some("mysql"));
        assert_eq!(get_value(CONFIG, "mysqld", "innodb_fast_shutdown"), None);
        assert_eq!(get_value(CONFIG, "server", "user"), None);
    }

    #[test]
    fn test_replace_only_when_old_value_matches() {
        let unchanged = replace_value(
            CONFIG,
            "mysqld",
            "bind-address",
            &replacer(Some("0.0.0.0"), Some("127.0.0.1")),
        );
        assert_eq!(unchanged, CONFIG);

        let changed = replace_value(
            CONFIG,
            "mysqld",
            "bind-address",
            &replacer(Some("::ffff:127.0.0.1"), Some("127.0.0.1")),
        );
        assert_eq!(get_value(&changed, "mysqld", "bind-address"), Some("127.0.0.1"));
        assert!(changed.contains("# innodb_fast_shutdown = 1"));
    }

    #[test]
    fn test_add_key_inside_section() {
        let changed = replace_value(
            CONFIG,
            "mysqld",
            "innodb_fast_shutdown",
            &replacer(None, Some("0")),
        );
        assert_eq!(get_value(&changed, "mysqld", "innodb_fast_shutdown"), Some("0"));
        assert_eq!(get_value(&changed, "embedded", "innodb_fast_shutdown"), None);
    }

    #[test]
    fn test_remove_key() {
        let changed = replace_value(CONFIG, "mysqld", "user", &replacer(Some("mysql"), None));
        assert_eq!(get_value(&changed, "mysqld", "user"), None);
        assert!(changed.contains("bind-address"));
    }

    #[test]
    fn test_add_key_to_missing_section() {
        let changed = replace_value("[client]\n", "mysqld", "port", &replacer(None, Some("3306")));
        assert_eq!(changed, "[client]\n\n[mysqld]\nport = 3306\n");
    }

    #[test]
    fn test_prepare_then_revert_restores_values() {
        let mut host = FakeHost::new().with_file(MARIADB_SERVER_CONFIG, CONFIG);
        let action = ConfigureMariadb::new(plesk_options());

        action.prepare(&mut host).unwrap();
        let prepared = host.file(MARIADB_SERVER_CONFIG).unwrap().to_string();
        assert_eq!(get_value(&prepared, "mysqld", "bind-address"), Some("127.0.0.1"));
        assert_eq!(get_value(&prepared, "mysqld", "innodb_fast_shutdown"), Some("0"));

        action.prepare(&mut host).unwrap();
        assert_eq!(host.file(MARIADB_SERVER_CONFIG).unwrap(), prepared);

        action.revert(&mut host).unwrap();
        let reverted = host.file(MARIADB_SERVER_CONFIG).unwrap();
        assert_eq!(
            get_value(reverted, "mysqld", "bind-address"),
            Some("::ffff:127.0.0.1")
        );
        assert_eq!(get_value(reverted, "mysqld", "innodb_fast_shutdown"), None);
    }

    #[test]
    fn test_missing_config_is_noop() {
        let mut host = FakeHost::new();
        ConfigureMariadb::new(plesk_options())
            .prepare(&mut host)
            .unwrap();
        assert!(host.files.is_empty());
    }

    #[test]
    fn test_unreadable_config_fails() {
        let mut host = FakeHost::new()
            .with_file(MARIADB_SERVER_CONFIG, "[mysqld]\n")
            .deny(MARIADB_SERVER_CONFIG);
        let err = ConfigureMariadb::new(plesk_options())
            .prepare(&mut host)
            .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read"));
        assert_eq!(host.file(MARIADB_SERVER_CONFIG), Some("[mysqld]\n"));
    }

    #[test]
    fn test_option_name_defaults_to_mysqld() {
        let option = MariadbOption::new("port", replacer(None, Some("3306")));
        assert_eq!(option.name(), "mysqld.port");
        assert_eq!(option.on_revert, replacer(Some("3306"), None));
    }
}
