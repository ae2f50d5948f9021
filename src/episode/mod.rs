//! Episode sorting module.
//!
//! Classifies loosely named episode files, groups them with their sidecar files,
//! builds canonical `Show - S01E001 - Title - Tech.ext` names,
//! and transfers them into a season folder layout.

pub mod archive;
pub mod group;
pub mod naming;
pub mod parse;
pub mod pipeline;
pub mod season;
pub mod stats;
pub mod transfer;

pub use archive::{ArchiveExtractor, UnzipCommand};
pub use group::{StemIndex, StemKey};
pub use naming::{build_basename, existing_destinations, unique_destination};
pub use parse::{EpisodeMatch, ParsedIdentity, parse_episode_number, sanitize_tech, split_tech_block};
pub use pipeline::{DeviceCheck, Pipeline, PipelineOptions};
pub use season::{SeasonConfig, SeasonIndex};
pub use stats::RunStats;
pub use transfer::{Strategy, TransferMode, TransferOutcome, TransferPlan};

/// Video file extensions recognized as primary episode files.
pub const MEDIA_EXTENSIONS: &[&str] = &["mkv", "mp4"];

/// Extensions of files that accompany an episode: subtitles, thumbnails and metadata.
pub const SIDECAR_EXTENSIONS: &[&str] = &[
    "ass", "idx", "jpeg", "jpg", "nfo", "png", "srt", "sub", "vtt", "webp",
];

/// Marker used by thumbnail sidecars just before the extension.
pub const THUMB_SUFFIX: &str = "-thumb";
