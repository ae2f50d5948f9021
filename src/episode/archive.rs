use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};

/// Extracts an episode pack archive into a directory.
pub trait ArchiveExtractor {
    /// Extract all entries of `archive` into `destination`.
    ///
    /// # Errors
    /// Returns an error if the archive is invalid or extraction fails.
    fn extract(&self, archive: &Path, destination: &Path) -> Result<()>;
}

/// Extract zip archives with the system `unzip` tool.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnzipCommand;

impl ArchiveExtractor for UnzipCommand {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        let output = Command::new("unzip")
            .args(["-o", "-q"])
            .arg(archive)
            .arg("-d")
            .arg(destination)
            .output()
            .context("Failed to execute unzip. Make sure it is installed and in PATH")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("unzip failed: {}", stderr.trim());
        }
        Ok(())
    }
}
