use std::fmt;
use std::fs::{self, File, FileTimes};
use std::io;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use serde::Deserialize;

use crate::{path_to_string_relative, print_error, print_warning};

/// How files are transferred to their destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Move files
    #[default]
    Move,
    /// Copy files with their metadata
    Copy,
    /// Create hardlinks, copies across filesystems
    #[value(name = "link")]
    #[serde(rename = "link", alias = "hardlink")]
    Hardlink,
    /// Copy-on-write clone, falls back to copy
    Reflink,
}

/// A single way of putting a file at its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Rename,
    CopyAndRemove,
    Copy,
    Hardlink,
    Reflink,
}

/// Ordered strategies to try for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub mode: TransferMode,
    pub strategies: Vec<Strategy>,
    /// Hardlink was replaced with copy before anything was tried.
    pub downgraded: bool,
}

/// Result of transferring one file. Transfers never return an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// File was transferred. `fallback` is set when the first strategy did not succeed.
    Completed { strategy: Strategy, fallback: bool },
    /// Nothing was touched.
    DryRun { strategy: Strategy },
    Failed { error: String },
}

impl TransferMode {
    /// Strategies for this mode in the order they are tried.
    #[must_use]
    pub fn strategies(self) -> Vec<Strategy> {
        match self {
            Self::Move => vec![Strategy::Rename, Strategy::CopyAndRemove],
            Self::Copy => vec![Strategy::Copy],
            Self::Hardlink => vec![Strategy::Hardlink],
            Self::Reflink => vec![Strategy::Reflink, Strategy::Copy],
        }
    }
}

impl Strategy {
    const fn label(self) -> &'static str {
        match self {
            Self::Rename | Self::CopyAndRemove => "MOVE",
            Self::Copy => "COPY",
            Self::Hardlink => "LINK",
            Self::Reflink => "REFLINK",
        }
    }

    fn attempt(self, source: &Path, destination: &Path) -> Result<()> {
        match self {
            Self::Rename => fs::rename(source, destination).context("Rename failed"),
            Self::CopyAndRemove => {
                copy_with_metadata(source, destination)?;
                fs::remove_file(source).context("Failed to remove source after copy")
            }
            Self::Copy => copy_with_metadata(source, destination),
            Self::Hardlink => fs::hard_link(source, destination).context("Hardlink failed"),
            Self::Reflink => reflink(source, destination),
        }
    }

    /// Whether the next strategy may be tried after this one failed.
    fn allows_fallback(self, error: &anyhow::Error) -> bool {
        match self {
            Self::Reflink => true,
            Self::Rename => error.chain().any(|cause| {
                cause
                    .downcast_ref::<io::Error>()
                    .is_some_and(|e| e.kind() == io::ErrorKind::CrossesDevices)
            }),
            Self::CopyAndRemove | Self::Copy | Self::Hardlink => false,
        }
    }
}

impl TransferPlan {
    /// Plan a transfer of `source` into `dest_dir`.
    /// Hardlinks are downgraded to copy when the two are on different devices.
    #[must_use]
    pub fn new(mode: TransferMode, source: &Path, dest_dir: &Path) -> Self {
        let same_device = mode != TransferMode::Hardlink || is_same_device(source, dest_dir);
        Self::for_device(mode, same_device)
    }

    #[must_use]
    pub fn for_device(mode: TransferMode, same_device: bool) -> Self {
        if mode == TransferMode::Hardlink && !same_device {
            Self {
                mode,
                strategies: TransferMode::Copy.strategies(),
                downgraded: true,
            }
        } else {
            Self {
                mode,
                strategies: mode.strategies(),
                downgraded: false,
            }
        }
    }

    /// Run the plan, falling back through the strategies where allowed.
    pub fn execute(&self, source: &Path, destination: &Path, dryrun: bool) -> TransferOutcome {
        let Some(&first) = self.strategies.first() else {
            return TransferOutcome::Failed {
                error: "No transfer strategy".to_string(),
            };
        };

        if dryrun {
            println!(
                "{} {}: {} -> {}",
                "DRYRUN".bold().cyan(),
                first.label(),
                path_to_string_relative(source),
                path_to_string_relative(destination)
            );
            return TransferOutcome::DryRun { strategy: first };
        }

        if let Some(parent) = destination.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            print_error!("Failed to create directory {}: {e}", parent.display());
            return TransferOutcome::Failed { error: e.to_string() };
        }

        let mut last_error = String::new();
        for (index, &strategy) in self.strategies.iter().enumerate() {
            match strategy.attempt(source, destination) {
                Ok(()) => {
                    println!(
                        "{}: {} -> {}",
                        strategy.label().green(),
                        path_to_string_relative(source),
                        path_to_string_relative(destination)
                    );
                    return TransferOutcome::Completed {
                        strategy,
                        fallback: index > 0,
                    };
                }
                Err(e) => {
                    last_error = format!("{e:#}");
                    let next = self.strategies.get(index + 1);
                    match next {
                        Some(next) if strategy.allows_fallback(&e) => {
                            print_warning!("{} failed, falling back to {}: {last_error}", strategy, next);
                        }
                        _ => break,
                    }
                }
            }
        }

        print_error!(
            "{} failed: {} -> {}: {last_error}",
            self.mode,
            source.display(),
            destination.display()
        );
        TransferOutcome::Failed { error: last_error }
    }
}

impl TransferOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Strategy that performed, or would perform, the transfer.
    #[must_use]
    pub const fn strategy(&self) -> Option<Strategy> {
        match self {
            Self::Completed { strategy, .. } | Self::DryRun { strategy } => Some(*strategy),
            Self::Failed { .. } => None,
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Move => "move",
            Self::Copy => "copy",
            Self::Hardlink => "link",
            Self::Reflink => "reflink",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rename => "rename",
            Self::CopyAndRemove => "copy and remove",
            Self::Copy => "copy",
            Self::Hardlink => "hardlink",
            Self::Reflink => "reflink",
        };
        write!(f, "{name}")
    }
}

/// Check if `destination` already holds the file at `source`.
///
/// True for the same inode, or for a file with the same size and modification time.
/// Copies keep the source modification time, so files from earlier copy runs are found too.
#[must_use]
pub fn is_already_placed(source: &Path, destination: &Path) -> bool {
    let (Ok(source_metadata), Ok(destination_metadata)) = (fs::metadata(source), fs::metadata(destination)) else {
        return false;
    };
    if !destination_metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if source_metadata.dev() == destination_metadata.dev() && source_metadata.ino() == destination_metadata.ino() {
            return true;
        }
    }
    match (source_metadata.modified(), destination_metadata.modified()) {
        (Ok(source_time), Ok(destination_time)) => {
            source_metadata.len() == destination_metadata.len() && source_time == destination_time
        }
        _ => false,
    }
}

/// Copy file contents, permissions and timestamps.
///
/// Never overwrites an existing destination.
/// Times and permissions are set through the open handle so read-only sources copy fine.
fn copy_with_metadata(source: &Path, destination: &Path) -> Result<()> {
    let mut reader = File::open(source).context("Failed to open source")?;
    let metadata = reader.metadata().context("Failed to read source metadata")?;
    let mut writer = File::options()
        .write(true)
        .create_new(true)
        .open(destination)
        .context("Failed to create destination")?;
    io::copy(&mut reader, &mut writer).context("Copy failed")?;

    let mut times = FileTimes::new();
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    writer.set_times(times).context("Failed to set file times")?;
    writer
        .set_permissions(metadata.permissions())
        .context("Failed to set file permissions")
}

/// Copy-on-write clone using `cp --reflink=always`.
/// A destination left behind by a failed clone is removed so the copy fallback can create it.
fn reflink(source: &Path, destination: &Path) -> Result<()> {
    let existed = destination.exists();
    let output = Command::new("cp")
        .args(["--reflink=always", "--preserve=all"])
        .arg(source)
        .arg(destination)
        .output()
        .context("Failed to execute cp")?;

    if !output.status.success() {
        if !existed && destination.exists() {
            let _ = fs::remove_file(destination);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("cp --reflink failed: {}", stderr.trim());
    }
    Ok(())
}

/// Check if `source` and the directory `dest_dir` live on the same device.
/// Missing destination directories are resolved to their closest existing ancestor.
#[cfg(unix)]
#[must_use]
pub fn is_same_device(source: &Path, dest_dir: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Ok(source_metadata) = fs::metadata(source) else {
        return true;
    };
    dest_dir
        .ancestors()
        .find_map(|dir| fs::metadata(dir).ok())
        .is_none_or(|dest_metadata| dest_metadata.dev() == source_metadata.dev())
}

#[cfg(not(unix))]
#[must_use]
pub const fn is_same_device(_source: &Path, _dest_dir: &Path) -> bool {
    true
}
