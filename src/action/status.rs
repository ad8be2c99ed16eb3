//! Conversion status handling: the completion flag.

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use super::Action;
use crate::host::Host;
use crate::state::CompletionRecord;

/// Clears a stale completion flag when a run starts and writes the success
/// record once the finish pass gets this far.
pub struct HandleConversionStatus {
    upgrader: String,
    completion_flag_path: PathBuf,
    new_os: String,
}

impl HandleConversionStatus {
    pub fn new(
        upgrader: impl Into<String>,
        completion_flag_path: impl Into<PathBuf>,
        new_os: impl Into<String>,
    ) -> Self {
        Self {
            upgrader: upgrader.into(),
            completion_flag_path: completion_flag_path.into(),
            new_os: new_os.into(),
        }
    }
}

impl Action for HandleConversionStatus {
    fn name(&self) -> &str {
        "HandleConversionStatus"
    }

    fn description(&self) -> String {
        format!(
            "Track conversion status in {}",
            self.completion_flag_path.display()
        )
    }

    fn prepare(&self, host: &mut dyn Host) -> Result<()> {
        host.remove_file(&self.completion_flag_path)
    }

    fn finish(&self, host: &mut dyn Host) -> Result<()> {
        let record = CompletionRecord::success(
            &self.upgrader,
            format!("The server has been upgraded to {}", self.new_os),
        );
        host.write_file(&self.completion_flag_path, &record.to_json()?)?;
        info!(
            "Conversion recorded as successful in {}",
            self.completion_flag_path.display()
        );
        Ok(())
    }

    fn revert(&self, host: &mut dyn Host) -> Result<()> {
        host.remove_file(&self.completion_flag_path)
    }
}
