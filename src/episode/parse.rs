use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;

use crate::episode::{MEDIA_EXTENSIONS, SIDECAR_EXTENSIONS};

/// Season and episode token like `S01E005`, bounded by a separator or the string edges.
static RE_SEASON_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[\s_-])S(?P<season>[0-9]{2})E(?P<episode>[0-9]{3})(?:[^0-9]|$)")
        .expect("Invalid season episode regex")
});

/// Standalone three digit episode number.
static RE_EPISODE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s_-])(?P<episode>[0-9]{3})(?:[^0-9]|$)").expect("Invalid episode number regex")
});

static RE_TITLE_AFTER_SEASON_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"S[0-9]{2}E[0-9]{3}\s*-\s*(?P<title>[^-]+)").expect("Invalid season episode title regex")
});

static RE_TITLE_AFTER_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9])[0-9]{3}\s*-\s*(?P<title>[^-]+)").expect("Invalid episode number title regex")
});

/// Alternation of all known extensions without the leading dot.
static EXTENSION_PATTERN: LazyLock<String> = LazyLock::new(|| {
    MEDIA_EXTENSIONS
        .iter()
        .chain(SIDECAR_EXTENSIONS)
        .sorted()
        .map(|ext| regex::escape(ext))
        .join("|")
});

/// Trailing `-thumb.<ext>`, optionally preceded by a ` - ` separator.
/// A bare `thumb.<ext>` is accepted when it is all that is left of the string.
static RE_TRAILING_THUMB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:^|(?:\s*-\s*)?-)thumb\.(?:{})\s*$",
        *EXTENSION_PATTERN
    ))
    .expect("Invalid thumb suffix regex")
});

static RE_TRAILING_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\.(?:{})\s*$", *EXTENSION_PATTERN)).expect("Invalid extension suffix regex")
});

const SEPARATOR_CHARS: &[char] = &[' ', '-', '_', '.'];

/// Episode identity found in a file name.
///
/// Callers have to handle the unparseable case explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeMatch {
    /// Explicit `SxxEyyy` token. The season overrides the configured episode ranges.
    WithSeason { season: u32, episode: u32 },
    /// Bare three digit number, the season has to come from the range table.
    EpisodeOnly { episode: u32 },
    /// No episode number in the name.
    Unparseable,
}

/// Everything that can be read from a single file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIdentity {
    pub episode: u32,
    pub season_hint: Option<u32>,
    pub title: Option<String>,
    pub tech: Option<String>,
}

impl EpisodeMatch {
    #[must_use]
    pub const fn episode(&self) -> Option<u32> {
        match self {
            Self::WithSeason { episode, .. } | Self::EpisodeOnly { episode } => Some(*episode),
            Self::Unparseable => None,
        }
    }

    #[must_use]
    pub const fn season_hint(&self) -> Option<u32> {
        match self {
            Self::WithSeason { season, .. } => Some(*season),
            Self::EpisodeOnly { .. } | Self::Unparseable => None,
        }
    }
}

impl ParsedIdentity {
    /// Parse episode number, season hint, title and tech block from a file name.
    /// Returns `None` if the name does not contain an episode number.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let found = parse_episode_number(name);
        let episode = found.episode()?;
        let (title, tech) = split_tech_block(name);
        Some(Self {
            episode,
            season_hint: found.season_hint(),
            title,
            tech,
        })
    }
}

/// Extract the episode number and optional season hint from a file name.
///
/// An `SxxEyyy` token takes priority over a standalone three digit number.
#[must_use]
pub fn parse_episode_number(name: &str) -> EpisodeMatch {
    if let Some(captures) = RE_SEASON_EPISODE.captures(name) {
        let season = captures.name("season").and_then(|m| m.as_str().parse().ok());
        let episode = captures.name("episode").and_then(|m| m.as_str().parse().ok());
        if let (Some(season), Some(episode)) = (season, episode) {
            return EpisodeMatch::WithSeason { season, episode };
        }
    }
    RE_EPISODE_NUMBER
        .captures(name)
        .and_then(|captures| captures.name("episode"))
        .and_then(|m| m.as_str().parse().ok())
        .map_or(EpisodeMatch::Unparseable, |episode| EpisodeMatch::EpisodeOnly { episode })
}

/// Check if the name already contains a canonical `SxxEyyy` token.
#[must_use]
pub fn has_season_episode_token(name: &str) -> bool {
    RE_SEASON_EPISODE.is_match(name)
}

/// Extract the human title following the episode token and a ` - ` separator.
///
/// The title runs up to the next hyphen.
#[must_use]
pub fn extract_title(name: &str) -> Option<String> {
    RE_TITLE_AFTER_SEASON_EPISODE
        .captures(name)
        .or_else(|| RE_TITLE_AFTER_NUMBER.captures(name))
        .and_then(|captures| captures.name("title"))
        .map(|m| m.as_str().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Split a file name into title and technical tag block.
///
/// The tech block is only recognized after a title.
#[must_use]
pub fn split_tech_block(name: &str) -> (Option<String>, Option<String>) {
    let Some(title) = extract_title(name) else {
        return (None, None);
    };
    let Some(index) = name.find(&title) else {
        return (Some(title), None);
    };
    let after = name[index + title.len()..].trim_start_matches([' ', '-']);
    let tech = sanitize_tech(after.trim_matches([' ', '-']));
    (Some(title), tech)
}

/// Remove a trailing extension and `-thumb` marker from a tech block.
///
/// Stripping repeats until nothing changes so the result is stable.
#[must_use]
pub fn sanitize_tech(tech: &str) -> Option<String> {
    let mut current = tech.trim().to_string();
    loop {
        let stripped = RE_TRAILING_THUMB.replace(&current, "");
        let stripped = RE_TRAILING_EXTENSION.replace(&stripped, "");
        let stripped = stripped.trim_matches(SEPARATOR_CHARS).to_string();
        if stripped == current {
            break;
        }
        current = stripped;
    }
    if current.is_empty() { None } else { Some(current) }
}
