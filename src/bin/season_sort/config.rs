use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;
use itertools::Itertools;
use serde::Deserialize;

use season_sort::episode::{PipelineOptions, SeasonIndex, TransferMode};
use season_sort::{print_error, resolve_relative_to};

use crate::SeasonSortArgs;

const DEFAULT_SEASON_CONFIG: &str = "seasons_config.json";
const DEFAULT_SOURCE_PREFIX: &str = "Saga";
const DEFAULT_EXTENSIONS: [&str; 2] = ["mkv", "mp4"];

/// Final config combined from CLI arguments and user config file.
#[derive(Debug)]
pub struct Config {
    pub(crate) archive: Option<String>,
    pub(crate) debug: bool,
    pub(crate) dryrun: bool,
    pub(crate) extensions: Vec<String>,
    pub(crate) mode: TransferMode,
    pub(crate) season_config: String,
    pub(crate) show_root: Option<String>,
    pub(crate) source_prefix: String,
    pub(crate) staging: Option<String>,
    pub(crate) verbose: bool,
}

/// Config from the user config file
#[derive(Debug, Default, Deserialize)]
struct SeasonSortConfig {
    #[serde(default)]
    archive: Option<String>,
    #[serde(default)]
    config: Option<String>,
    #[serde(default)]
    debug: bool,
    #[serde(default)]
    dryrun: bool,
    #[serde(default)]
    extensions: Vec<String>,
    #[serde(default)]
    mode: Option<TransferMode>,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    show_root: Option<String>,
    #[serde(default)]
    staging: Option<String>,
    #[serde(default)]
    verbose: bool,
}

/// Wrapper needed for parsing the user config file section.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    season_sort: SeasonSortConfig,
}

impl SeasonSortConfig {
    /// Try to read user config from the file if it exists.
    /// Otherwise, fall back to default config.
    fn get_user_config() -> Self {
        season_sort::config::CONFIG_PATH
            .as_deref()
            .filter(|path| path.exists())
            .and_then(|path| {
                fs::read_to_string(path)
                    .map_err(|e| {
                        print_error!("Error reading config file {}: {e}", path.display());
                    })
                    .ok()
            })
            .and_then(|config_string| {
                Self::from_toml_str(&config_string)
                    .map_err(|e| {
                        print_error!("Error reading config file: {e}");
                    })
                    .ok()
            })
            .unwrap_or_default()
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML string is invalid.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str::<UserConfig>(toml_str)
            .map(|config| config.season_sort)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {e}"))
    }
}

impl Config {
    /// Create config from given command line args and user config file.
    pub fn from_args(args: &SeasonSortArgs) -> Self {
        Self::from_parts(args, SeasonSortConfig::get_user_config())
    }

    fn from_parts(args: &SeasonSortArgs, user_config: SeasonSortConfig) -> Self {
        let mut extensions = parse_extensions(user_config.extensions.iter().chain(&args.extensions));
        if extensions.is_empty() {
            extensions = DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect();
        }

        Self {
            archive: non_empty(args.archive.clone().or(user_config.archive)),
            debug: args.debug || user_config.debug,
            dryrun: args.print || user_config.dryrun,
            extensions,
            mode: args.mode.or(user_config.mode).unwrap_or_default(),
            season_config: non_empty(args.config.clone().or(user_config.config))
                .unwrap_or_else(|| DEFAULT_SEASON_CONFIG.to_string()),
            show_root: non_empty(args.show_root.clone().or(user_config.show_root)),
            source_prefix: non_empty(args.prefix.clone().or(user_config.prefix))
                .unwrap_or_else(|| DEFAULT_SOURCE_PREFIX.to_string()),
            staging: non_empty(args.staging.clone().or(user_config.staging)),
            verbose: args.verbose || user_config.verbose,
        }
    }

    /// Location of the season JSON file.
    #[must_use]
    pub fn season_config_path(&self, root: &Path) -> PathBuf {
        resolve_relative_to(root, &self.season_config)
    }

    /// Resolve directories against the root and the show name from the season file.
    #[must_use]
    pub fn pipeline_options(&self, root: &Path, seasons: &SeasonIndex) -> PipelineOptions {
        let show_name = seasons.show_name();
        let staging = self
            .staging
            .clone()
            .unwrap_or_else(|| format!("{show_name} - Episodes"));
        let show_root = self.show_root.clone().unwrap_or_else(|| show_name.to_string());

        PipelineOptions {
            root: root.to_path_buf(),
            archive: self.archive.clone(),
            staging_dir: resolve_relative_to(root, &staging),
            show_root: resolve_relative_to(root, &show_root),
            extensions: self.extensions.clone(),
            source_prefix: self.source_prefix.clone(),
            mode: self.mode,
            dryrun: self.dryrun,
            verbose: self.verbose,
        }
    }

    pub fn print(&self, root: &Path) {
        println!("{}", "Config:".bold());
        println!("  root:          {}", root.display());
        println!("  archive:       {}", self.archive.as_deref().unwrap_or("-"));
        println!("  season config: {}", self.season_config);
        println!("  staging:       {}", self.staging.as_deref().unwrap_or("<show> - Episodes"));
        println!("  show root:     {}", self.show_root.as_deref().unwrap_or("<show>"));
        println!("  extensions:    {}", self.extensions.join(", "));
        println!("  prefix:        {}", self.source_prefix);
        println!("  mode:          {}", self.mode);
        println!("  dryrun:        {}", self.dryrun);
        println!("  verbose:       {}", self.verbose);
    }
}

/// Normalize extension arguments.
///
/// Accepts comma separated lists, with or without the leading dot.
fn parse_extensions<'a>(values: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    values
        .into_iter()
        .flat_map(|value| value.split(','))
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .unique()
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod season_sort_config_tests {
    use super::*;

    use clap::Parser;

    fn args(cli: &[&str]) -> SeasonSortArgs {
        SeasonSortArgs::try_parse_from(std::iter::once("seasort").chain(cli.iter().copied()))
            .expect("should parse args")
    }

    #[test]
    fn from_toml_str_parses_empty_config() {
        let config = SeasonSortConfig::from_toml_str("").expect("should parse empty config");
        assert!(!config.debug);
        assert!(!config.dryrun);
        assert!(!config.verbose);
        assert!(config.extensions.is_empty());
        assert!(config.mode.is_none());
        assert!(config.archive.is_none());
    }

    #[test]
    fn from_toml_str_parses_season_sort_section() {
        let toml = r#"
[season_sort]
archive = "One Piece Kai.zip"
config = "kai.json"
staging = "Incoming"
show_root = "/media/anime/One Piece Kai"
extensions = ["mkv", ".avi"]
prefix = "Arc"
mode = "link"
dryrun = true
verbose = true
"#;
        let config = SeasonSortConfig::from_toml_str(toml).expect("should parse config");
        assert_eq!(config.archive.as_deref(), Some("One Piece Kai.zip"));
        assert_eq!(config.config.as_deref(), Some("kai.json"));
        assert_eq!(config.staging.as_deref(), Some("Incoming"));
        assert_eq!(config.show_root.as_deref(), Some("/media/anime/One Piece Kai"));
        assert_eq!(config.extensions, vec!["mkv", ".avi"]);
        assert_eq!(config.prefix.as_deref(), Some("Arc"));
        assert_eq!(config.mode, Some(TransferMode::Hardlink));
        assert!(config.dryrun);
        assert!(config.verbose);
    }

    #[test]
    fn from_toml_str_invalid_mode_returns_error() {
        let toml = r#"
[season_sort]
mode = "teleport"
"#;
        assert!(SeasonSortConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn from_toml_str_ignores_other_sections() {
        let toml = r"
[dirmove]
verbose = true

[season_sort]
debug = true
";
        let config = SeasonSortConfig::from_toml_str(toml).expect("should parse config");
        assert!(config.debug);
        assert!(!config.verbose);
    }

    #[test]
    fn defaults_without_args_or_user_config() {
        let config = Config::from_parts(&args(&[]), SeasonSortConfig::default());
        assert_eq!(config.extensions, vec!["mkv", "mp4"]);
        assert_eq!(config.season_config, "seasons_config.json");
        assert_eq!(config.source_prefix, "Saga");
        assert_eq!(config.mode, TransferMode::Move);
        assert!(config.archive.is_none());
        assert!(!config.dryrun);
    }

    #[test]
    fn cli_values_override_user_config() {
        let user_config = SeasonSortConfig {
            mode: Some(TransferMode::Copy),
            prefix: Some("Arc".to_string()),
            staging: Some("Incoming".to_string()),
            ..Default::default()
        };
        let config = Config::from_parts(
            &args(&["--mode", "reflink", "--prefix", "Saga", "--print"]),
            user_config,
        );
        assert_eq!(config.mode, TransferMode::Reflink);
        assert_eq!(config.source_prefix, "Saga");
        assert_eq!(config.staging.as_deref(), Some("Incoming"));
        assert!(config.dryrun);
    }

    #[test]
    fn extensions_are_merged_and_normalized() {
        let user_config = SeasonSortConfig {
            extensions: vec!["MKV".to_string()],
            ..Default::default()
        };
        let config = Config::from_parts(&args(&["--ext", ".mp4, avi,mkv"]), user_config);
        assert_eq!(config.extensions, vec!["mkv", "mp4", "avi"]);
    }

    #[test]
    fn pipeline_options_use_show_name_defaults() {
        let seasons = SeasonIndex::from_json_str(
            r#"{ "show_name": "One Piece Kai", "seasons": [{ "season": 1, "folder": "Saison 1", "range": [1, 10] }] }"#,
        )
        .expect("should parse");
        let config = Config::from_parts(&args(&[]), SeasonSortConfig::default());
        let root = Path::new("/media/anime");
        let options = config.pipeline_options(root, &seasons);
        assert_eq!(options.staging_dir, root.join("One Piece Kai - Episodes"));
        assert_eq!(options.show_root, root.join("One Piece Kai"));
        assert_eq!(config.season_config_path(root), root.join("seasons_config.json"));
    }
}
