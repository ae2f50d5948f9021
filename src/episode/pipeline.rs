use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use itertools::Itertools;
use walkdir::WalkDir;

use crate::episode::archive::{ArchiveExtractor, UnzipCommand};
use crate::episode::group::{StemIndex, split_thumb_suffix};
use crate::episode::naming::{
    build_basename, destination_file_name, destination_stem, existing_destinations, unique_destination,
};
use crate::episode::parse::{ParsedIdentity, has_season_episode_token};
use crate::episode::season::SeasonIndex;
use crate::episode::stats::RunStats;
use crate::episode::transfer::{TransferMode, TransferPlan, is_already_placed, is_same_device};
use crate::{
    get_normalized_file_name_and_extension, get_relative_path_or_filename, is_hidden, path_to_filename_string,
    print_bold, print_error, print_green, print_warning,
};

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory containing the archive and the source directories.
    pub root: PathBuf,
    /// Archive file name relative to root.
    pub archive: Option<String>,
    pub staging_dir: PathBuf,
    pub show_root: PathBuf,
    /// Lowercase media extensions without the leading dot.
    pub extensions: Vec<String>,
    /// Name prefix of the directories files are collected from.
    pub source_prefix: String,
    pub mode: TransferMode,
    pub dryrun: bool,
    pub verbose: bool,
}

/// Season for an episode file, or the reason it cannot be sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Route { season: u32, identity: ParsedIdentity },
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoEpisodeNumber,
    OutsideRanges { episode: u32 },
}

/// File name split into the parts used for renaming.
struct NameParts {
    /// Stem with any `-thumb` marker removed.
    base: String,
    extension: String,
    thumb: bool,
}

/// Tells whether a source file and a destination directory share a device.
pub type DeviceCheck = fn(&Path, &Path) -> bool;

/// Collects, classifies and sorts episode files into season folders.
pub struct Pipeline {
    options: PipelineOptions,
    seasons: SeasonIndex,
    extractor: Box<dyn ArchiveExtractor>,
    same_device: DeviceCheck,
}

impl Pipeline {
    #[must_use]
    pub fn new(options: PipelineOptions, seasons: SeasonIndex) -> Self {
        Self {
            options,
            seasons,
            extractor: Box::new(UnzipCommand),
            same_device: is_same_device,
        }
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replace the check that decides if hardlinks are possible.
    #[must_use]
    pub fn with_device_check(mut self, same_device: DeviceCheck) -> Self {
        self.same_device = same_device;
        self
    }

    /// Run all steps in order and return the tallies.
    pub fn run(&self) -> Result<RunStats> {
        let mut stats = RunStats::default();
        self.extract_archive();
        self.collect(&mut stats)?;
        self.ensure_dir(&self.options.show_root)?;
        self.classify_and_route(&mut stats)?;
        self.normalize_stragglers(&mut stats)?;
        Ok(stats)
    }

    /// Extract the episode pack if one was given and exists.
    pub fn extract_archive(&self) {
        let Some(name) = self.options.archive.as_deref() else {
            return;
        };
        let archive = self.options.root.join(name);
        if !archive.is_file() {
            println!("Archive not found, skipping extraction: {name}");
            return;
        }
        if self.options.dryrun {
            println!("{} extract: {name} -> {}", "DRYRUN".bold().cyan(), self.options.root.display());
            return;
        }
        println!("Extracting: {name}");
        match self.extractor.extract(&archive, &self.options.root) {
            Ok(()) => print_green!("Extraction done"),
            Err(e) => print_warning!("Skipping invalid archive {name}: {e:#}"),
        }
    }

    /// Pass 1: gather media files from the source directories into the staging directory.
    pub fn collect(&self, stats: &mut RunStats) -> Result<()> {
        let source_dirs = self.source_directories()?;
        if source_dirs.is_empty() {
            print_warning!(
                "No '{}*' directories found in {} (already collected?)",
                self.options.source_prefix,
                self.options.root.display()
            );
            return Ok(());
        }

        print_bold!("Found {} source director(ies):", source_dirs.len());
        for dir in &source_dirs {
            println!("  {}", path_to_filename_string(dir));
        }

        self.ensure_dir(&self.options.staging_dir)?;

        for dir in &source_dirs {
            for file in self.media_files(dir) {
                let (stem, extension) = match get_normalized_file_name_and_extension(&file) {
                    Ok(name) => name,
                    Err(e) => {
                        print_error!("{e}");
                        stats.collect_failed += 1;
                        continue;
                    }
                };

                if self.options.mode != TransferMode::Move
                    && find_placed(&file, &self.options.staging_dir, &stem, &extension).is_some()
                {
                    if self.options.verbose {
                        println!("Already collected: {}", path_to_filename_string(&file));
                    }
                    stats.already_placed += 1;
                    continue;
                }

                let target = unique_destination(&self.options.staging_dir, &stem, &extension);
                if self.transfer(&file, &target, &self.options.staging_dir) {
                    stats.collected += 1;
                } else {
                    stats.collect_failed += 1;
                }
            }
        }

        println!(
            "Collected: {} | Failed: {}",
            stats.collected.to_string().green(),
            stats.collect_failed
        );
        Ok(())
    }

    /// Pass 2: rename staged episodes and their sidecars into the season folders.
    pub fn classify_and_route(&self, stats: &mut RunStats) -> Result<()> {
        let staging = &self.options.staging_dir;
        if !staging.is_dir() {
            if self.options.verbose {
                println!("Staging directory does not exist: {}", staging.display());
            }
            return Ok(());
        }

        let files: Vec<PathBuf> = WalkDir::new(staging)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .sorted()
            .collect();

        let index = StemIndex::new(&files);
        let videos: Vec<&PathBuf> = files.iter().filter(|path| self.is_media_file(path)).collect();
        print_bold!("Sorting {} episode file(s) from {}", videos.len(), staging.display());

        let mut handled: HashSet<PathBuf> = HashSet::new();
        for video in videos {
            if handled.contains(video) {
                continue;
            }
            let parts = match name_parts(video) {
                Ok(parts) => parts,
                Err(e) => {
                    print_error!("{e}");
                    stats.failed += 1;
                    continue;
                }
            };

            let (season, identity) = match self.classify(&parts.base) {
                Classification::Route { season, identity } => (season, identity),
                Classification::Skip(reason) => {
                    Self::warn_skip(reason, video);
                    stats.skipped += 1;
                    continue;
                }
            };

            let basename = build_basename(
                self.seasons.show_name(),
                season,
                identity.episode,
                identity.title.as_deref(),
                identity.tech.as_deref(),
            );
            let dest_dir = self.options.show_root.join(self.seasons.folder_for_season(season));
            let group = index.group_for(video);
            if let Err(e) = self.ensure_dir(&dest_dir) {
                print_error!("{e:#}");
                stats.failed += group.len();
                handled.extend(group);
                continue;
            }

            for member in group {
                self.route_member(&member, &basename, &dest_dir, stats);
                handled.insert(member);
            }
        }
        Ok(())
    }

    /// Pass 3: rename files in the season folders that still lack an `SxxEyyy` token.
    /// Existing destinations are never overwritten.
    pub fn normalize_stragglers(&self, stats: &mut RunStats) -> Result<()> {
        print_bold!("Normalizing remaining files in season folders");
        for (season, folder) in self.seasons.seasons() {
            let season_dir = self.options.show_root.join(folder);
            if !season_dir.is_dir() {
                continue;
            }

            let files: Vec<PathBuf> = fs::read_dir(&season_dir)
                .with_context(|| format!("Failed to read directory: {}", season_dir.display()))?
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_ok_and(|file_type| file_type.is_file()))
                .map(|entry| entry.path())
                .filter(|path| !path_to_filename_string(path).starts_with('.'))
                .sorted()
                .collect();

            for file in files {
                let file_name = path_to_filename_string(&file);
                if has_season_episode_token(&file_name) {
                    continue;
                }
                let Ok(parts) = name_parts(&file) else {
                    continue;
                };
                let Some(identity) = ParsedIdentity::parse(&parts.base) else {
                    continue;
                };
                let episode_season = self.seasons.season_for_episode(identity.episode).unwrap_or(season);
                let basename = build_basename(
                    self.seasons.show_name(),
                    episode_season,
                    identity.episode,
                    identity.title.as_deref(),
                    identity.tech.as_deref(),
                );
                let new_name = destination_file_name(&basename, &parts.extension, parts.thumb);
                let target = season_dir.join(&new_name);
                if target.exists() {
                    continue;
                }

                crate::show_diff(&file_name, &new_name);
                let outcome =
                    TransferPlan::for_device(TransferMode::Move, true).execute(&file, &target, self.options.dryrun);
                if outcome.is_success() {
                    stats.renamed += 1;
                } else {
                    stats.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Resolve the season for a file name stem.
    /// A season in the name wins over the configured episode ranges.
    #[must_use]
    pub fn classify(&self, name: &str) -> Classification {
        let Some(identity) = ParsedIdentity::parse(name) else {
            return Classification::Skip(SkipReason::NoEpisodeNumber);
        };
        let season = identity
            .season_hint
            .or_else(|| self.seasons.season_for_episode(identity.episode));
        match season {
            Some(season) => Classification::Route { season, identity },
            None => Classification::Skip(SkipReason::OutsideRanges {
                episode: identity.episode,
            }),
        }
    }

    fn route_member(&self, member: &Path, basename: &str, dest_dir: &Path, stats: &mut RunStats) {
        let parts = match name_parts(member) {
            Ok(parts) => parts,
            Err(e) => {
                print_error!("{e}");
                stats.failed += 1;
                return;
            }
        };
        // Only sidecars carry the thumbnail marker over.
        let thumb = parts.thumb && !self.is_media_file(member);
        let stem = destination_stem(basename, &parts.extension, thumb);

        if self.options.mode != TransferMode::Move
            && let Some(existing) = find_placed(member, dest_dir, &stem, &parts.extension)
        {
            if self.options.verbose {
                println!("Already in place: {}", path_to_filename_string(&existing));
            }
            stats.already_placed += 1;
            return;
        }

        let target = unique_destination(dest_dir, &stem, &parts.extension);
        if self.transfer(member, &target, dest_dir) {
            stats.routed += 1;
        } else {
            stats.failed += 1;
        }
    }

    fn transfer(&self, source: &Path, target: &Path, dest_dir: &Path) -> bool {
        let same_device = self.options.mode != TransferMode::Hardlink || (self.same_device)(source, dest_dir);
        let plan = TransferPlan::for_device(self.options.mode, same_device);
        if plan.downgraded {
            println!(
                "Hardlink not possible across filesystems, copying instead: {}",
                path_to_filename_string(source)
            );
        }
        plan.execute(source, target, self.options.dryrun).is_success()
    }

    /// Directories in root whose name starts with the source prefix, sorted by name.
    fn source_directories(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.options.root)
            .with_context(|| format!("Failed to read directory: {}", self.options.root.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path();
            if path_to_filename_string(&path).starts_with(&self.options.source_prefix) {
                dirs.push(path);
            } else if self.options.verbose {
                println!(
                    "Skipping directory: {}",
                    get_relative_path_or_filename(&path, &self.options.root)
                );
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Media files under a directory, recursively and in sorted order.
    fn media_files(&self, dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| self.is_media_file(path))
            .collect()
    }

    fn is_media_file(&self, path: &Path) -> bool {
        let extension = crate::path_to_file_extension_string(path);
        self.options.extensions.contains(&extension)
    }

    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if dir.is_dir() {
            return Ok(());
        }
        if self.options.dryrun {
            println!("{} mkdir: {}", "DRYRUN".bold().cyan(), dir.display());
            return Ok(());
        }
        if self.options.verbose {
            println!("Creating directory: {}", dir.display());
        }
        fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))
    }

    fn warn_skip(reason: SkipReason, path: &Path) {
        let name = path_to_filename_string(path);
        match reason {
            SkipReason::NoEpisodeNumber => print_warning!("No episode number found: {name}"),
            SkipReason::OutsideRanges { episode } => {
                print_warning!("Episode {episode:03} is outside the configured ranges: {name}");
            }
        }
    }
}

/// Earlier transfer of `source` into `dest_dir` under `stem` or one of its numbered variants.
fn find_placed(source: &Path, dest_dir: &Path, stem: &str, extension: &str) -> Option<PathBuf> {
    existing_destinations(dest_dir, stem, extension).find(|existing| is_already_placed(source, existing))
}

fn name_parts(path: &Path) -> Result<NameParts> {
    let (stem, extension) = get_normalized_file_name_and_extension(path)?;
    let (base, thumb) = split_thumb_suffix(&stem);
    Ok(NameParts {
        base: base.to_string(),
        extension,
        thumb,
    })
}


#[cfg(test)]
mod pipeline_pass_tests {
    use super::*;

    use std::fs::File;

    use tempfile::{TempDir, tempdir};

    const SEASONS: &str = r#"{
        "show_name": "One Piece Kai",
        "seasons": [
            { "season": 1, "folder": "Saison 1", "range": [1, 10] },
            { "season": 2, "folder": "Saison 2", "range": [11, 20] }
        ]
    }"#;

    fn pipeline(root: &Path, mode: TransferMode, dryrun: bool) -> Pipeline {
        let options = PipelineOptions {
            root: root.to_path_buf(),
            archive: None,
            staging_dir: root.join("Episodes"),
            show_root: root.join("One Piece Kai"),
            extensions: vec!["mkv".to_string(), "mp4".to_string()],
            source_prefix: "Saga".to_string(),
            mode,
            dryrun,
            verbose: true,
        };
        Pipeline::new(options, SeasonIndex::from_json_str(SEASONS).expect("should parse"))
    }

    fn create_file(dir: &Path, name: &str) -> PathBuf {
        fs::create_dir_all(dir).expect("Failed to create directory");
        let path = dir.join(name);
        File::create(&path).expect("Failed to create test file");
        path
    }

    fn setup() -> TempDir {
        tempdir().expect("Failed to create temp dir")
    }

    #[test]
    fn collect_gathers_media_from_source_directories() {
        let dir = setup();
        let root = dir.path();
        create_file(&root.join("Saga 01 - East Blue"), "001 - Romance Dawn.mkv");
        create_file(&root.join("Saga 01 - East Blue").join("Arc"), "002.mp4");
        create_file(&root.join("Saga 01 - East Blue"), "001 - Romance Dawn.nfo");
        create_file(&root.join("Other"), "003.mkv");

        let mut stats = RunStats::default();
        pipeline(root, TransferMode::Move, false)
            .collect(&mut stats)
            .expect("collect should succeed");

        assert_eq!(stats.collected, 2);
        assert!(root.join("Episodes").join("001 - Romance Dawn.mkv").exists());
        assert!(root.join("Episodes").join("002.mp4").exists());
        assert!(!root.join("Episodes").join("001 - Romance Dawn.nfo").exists());
        assert!(root.join("Other").join("003.mkv").exists());
    }

    #[test]
    fn collect_renames_duplicate_names() {
        let dir = setup();
        let root = dir.path();
        create_file(&root.join("Saga 1"), "001.mkv");
        create_file(&root.join("Saga 2"), "001.mkv");

        let mut stats = RunStats::default();
        pipeline(root, TransferMode::Move, false)
            .collect(&mut stats)
            .expect("collect should succeed");

        assert_eq!(stats.collected, 2);
        assert!(root.join("Episodes").join("001.mkv").exists());
        assert!(root.join("Episodes").join("001 (1).mkv").exists());
    }

    #[test]
    fn collect_without_source_directories_does_nothing() {
        let dir = setup();
        let mut stats = RunStats::default();
        pipeline(dir.path(), TransferMode::Move, false)
            .collect(&mut stats)
            .expect("collect should succeed");
        assert_eq!(stats, RunStats::default());
        assert!(!dir.path().join("Episodes").exists());
    }

    #[test]
    fn route_moves_group_into_season_folder() {
        let dir = setup();
        let root = dir.path();
        let staging = root.join("Episodes");
        create_file(&staging, "005 - Romance Dawn - 1080p.mkv");
        create_file(&staging, "005 - Romance Dawn - 1080p-thumb.jpg");
        create_file(&staging, "005 - Romance Dawn - 1080p.srt");

        let mut stats = RunStats::default();
        pipeline(root, TransferMode::Move, false)
            .classify_and_route(&mut stats)
            .expect("route should succeed");

        let season_dir = root.join("One Piece Kai").join("Saison 1");
        assert_eq!(stats.routed, 3);
        assert!(season_dir.join("One Piece Kai - S01E005 - Romance Dawn - 1080p.mkv").exists());
        assert!(season_dir.join("One Piece Kai - S01E005 - Romance Dawn - 1080p-thumb.jpg").exists());
        assert!(season_dir.join("One Piece Kai - S01E005 - Romance Dawn - 1080p.srt").exists());
        assert_eq!(fs::read_dir(&staging).expect("should read").count(), 0);
    }

    #[test]
    fn route_skips_unclassifiable_files() {
        let dir = setup();
        let root = dir.path();
        let staging = root.join("Episodes");
        create_file(&staging, "Bonus.mkv");
        create_file(&staging, "150.mkv");

        let mut stats = RunStats::default();
        pipeline(root, TransferMode::Move, false)
            .classify_and_route(&mut stats)
            .expect("route should succeed");

        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.failed, 0);
        assert!(staging.join("Bonus.mkv").exists());
        assert!(staging.join("150.mkv").exists());
    }

    #[test]
    fn route_uses_season_hint_folder() {
        let dir = setup();
        let root = dir.path();
        create_file(&root.join("Episodes"), "Kai S03E005.mkv");

        let mut stats = RunStats::default();
        pipeline(root, TransferMode::Move, false)
            .classify_and_route(&mut stats)
            .expect("route should succeed");

        assert!(
            root.join("One Piece Kai")
                .join("Saison 3")
                .join("One Piece Kai - S03E005.mkv")
                .exists()
        );
    }

    #[test]
    fn route_handles_two_videos_with_same_stem_once() {
        let dir = setup();
        let root = dir.path();
        create_file(&root.join("Episodes"), "007.mkv");
        create_file(&root.join("Episodes"), "007.mp4");

        let mut stats = RunStats::default();
        pipeline(root, TransferMode::Move, false)
            .classify_and_route(&mut stats)
            .expect("route should succeed");

        let season_dir = root.join("One Piece Kai").join("Saison 1");
        assert_eq!(stats.routed, 2);
        assert_eq!(stats.failed, 0);
        assert!(season_dir.join("One Piece Kai - S01E007.mkv").exists());
        assert!(season_dir.join("One Piece Kai - S01E007.mp4").exists());
    }

    #[test]
    fn route_does_not_overwrite_existing_destination() {
        let dir = setup();
        let root = dir.path();
        let season_dir = root.join("One Piece Kai").join("Saison 1");
        fs::create_dir_all(&season_dir).expect("Failed to create directory");
        fs::write(season_dir.join("One Piece Kai - S01E001.mkv"), "old").expect("Failed to write");
        fs::create_dir_all(root.join("Episodes")).expect("Failed to create directory");
        fs::write(root.join("Episodes").join("001.mkv"), "new episode").expect("Failed to write");

        let mut stats = RunStats::default();
        pipeline(root, TransferMode::Move, false)
            .classify_and_route(&mut stats)
            .expect("route should succeed");

        assert_eq!(
            fs::read_to_string(season_dir.join("One Piece Kai - S01E001.mkv")).expect("should read"),
            "old"
        );
        assert_eq!(
            fs::read_to_string(season_dir.join("One Piece Kai - S01E001 (1).mkv")).expect("should read"),
            "new episode"
        );
    }

    #[test]
    fn stragglers_are_renamed_in_place() {
        let dir = setup();
        let root = dir.path();
        let season_dir = root.join("One Piece Kai").join("Saison 1");
        create_file(&season_dir, "005 - Romance Dawn - 1080p-thumb.jpg");
        create_file(&season_dir, "One Piece Kai - S01E006.mkv");
        create_file(&season_dir, "poster.jpg");

        let mut stats = RunStats::default();
        pipeline(root, TransferMode::Copy, false)
            .normalize_stragglers(&mut stats)
            .expect("normalize should succeed");

        assert_eq!(stats.renamed, 1);
        assert!(season_dir.join("One Piece Kai - S01E005 - Romance Dawn - 1080p-thumb.jpg").exists());
        assert!(!season_dir.join("005 - Romance Dawn - 1080p-thumb.jpg").exists());
        assert!(season_dir.join("One Piece Kai - S01E006.mkv").exists());
        assert!(season_dir.join("poster.jpg").exists());
    }

    #[test]
    fn stragglers_never_overwrite() {
        let dir = setup();
        let root = dir.path();
        let season_dir = root.join("One Piece Kai").join("Saison 1");
        create_file(&season_dir, "005.nfo");
        create_file(&season_dir, "One Piece Kai - S01E005.nfo");

        let mut stats = RunStats::default();
        pipeline(root, TransferMode::Move, false)
            .normalize_stragglers(&mut stats)
            .expect("normalize should succeed");

        assert_eq!(stats.renamed, 0);
        assert!(season_dir.join("005.nfo").exists());
    }

    #[test]
    fn dryrun_changes_nothing() {
        let dir = setup();
        let root = dir.path();
        create_file(&root.join("Saga 1"), "001.mkv");
        create_file(&root.join("Episodes"), "002 - Title.mkv");
        create_file(&root.join("One Piece Kai").join("Saison 1"), "003.srt");

        let stats = pipeline(root, TransferMode::Move, true).run().expect("run should succeed");

        assert_eq!(stats.collected, 1);
        assert_eq!(stats.routed, 1);
        assert_eq!(stats.renamed, 1);
        assert!(root.join("Saga 1").join("001.mkv").exists());
        assert!(root.join("Episodes").join("002 - Title.mkv").exists());
        assert!(root.join("One Piece Kai").join("Saison 1").join("003.srt").exists());
        assert!(!root.join("One Piece Kai").join("Saison 1").join("One Piece Kai - S01E002 - Title.mkv").exists());
    }
}
