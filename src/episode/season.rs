use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::print_warning;

/// One season entry from the season config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeasonConfig {
    pub season: u32,
    #[serde(rename = "folder")]
    pub folder_name: String,
    /// Inclusive episode range `[start, end]`.
    #[serde(rename = "range")]
    pub episode_range: (u32, u32),
}

/// Season config file contents.
#[derive(Debug, Deserialize)]
struct SeasonFile {
    show_name: String,
    seasons: Vec<SeasonConfig>,
}

/// Read-only lookup from episode number to season and from season to folder name.
#[derive(Debug, Clone, Default)]
pub struct SeasonIndex {
    show_name: String,
    episode_to_season: HashMap<u32, u32>,
    season_to_folder: BTreeMap<u32, String>,
}

impl SeasonIndex {
    /// Read and parse the season config JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read season config: {}", path.display()))?;
        Self::from_json_str(&content).with_context(|| format!("Invalid season config: {}", path.display()))
    }

    /// Parse season config from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the JSON is invalid or a range starts after it ends.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: SeasonFile = serde_json::from_str(json).context("Failed to parse season config JSON")?;
        Self::new(file.show_name, file.seasons)
    }

    /// Build the index by expanding every episode range.
    /// Later entries win when ranges overlap.
    pub fn new(show_name: String, seasons: Vec<SeasonConfig>) -> Result<Self> {
        let mut episode_to_season: HashMap<u32, u32> = HashMap::new();
        let mut season_to_folder = BTreeMap::new();
        let mut reassigned = 0;

        for entry in seasons {
            let (start, end) = entry.episode_range;
            if start > end {
                anyhow::bail!(
                    "Season {} has an invalid episode range: {start} > {end}",
                    entry.season
                );
            }
            for episode in start..=end {
                if episode_to_season
                    .insert(episode, entry.season)
                    .is_some_and(|previous| previous != entry.season)
                {
                    reassigned += 1;
                }
            }
            season_to_folder.insert(entry.season, entry.folder_name);
        }

        if reassigned > 0 {
            print_warning!("Season config has overlapping ranges: {reassigned} episode(s) assigned to a later season");
        }

        Ok(Self {
            show_name,
            episode_to_season,
            season_to_folder,
        })
    }

    #[must_use]
    pub fn show_name(&self) -> &str {
        &self.show_name
    }

    /// Season that owns the given episode number, if any range covers it.
    #[must_use]
    pub fn season_for_episode(&self, episode: u32) -> Option<u32> {
        self.episode_to_season.get(&episode).copied()
    }

    /// Folder name for a season.
    /// Seasons missing from the config fall back to `Saison <n>`.
    #[must_use]
    pub fn folder_for_season(&self, season: u32) -> String {
        self.season_to_folder
            .get(&season)
            .cloned()
            .unwrap_or_else(|| format!("Saison {season}"))
    }

    /// Configured seasons and their folder names in season order.
    pub fn seasons(&self) -> impl Iterator<Item = (u32, &str)> {
        self.season_to_folder
            .iter()
            .map(|(season, folder)| (*season, folder.as_str()))
    }

    #[must_use]
    pub fn season_count(&self) -> usize {
        self.season_to_folder.len()
    }
}
