use std::collections::HashMap;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use unicode_normalization::UnicodeNormalization;

use crate::episode::THUMB_SUFFIX;
use crate::path_to_file_stem_string;

/// Grouping key for an episode file and its sidecars.
///
/// Files in different directories never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StemKey {
    pub stem: String,
    pub parent: PathBuf,
}

/// Files under one directory tree indexed by their stem key.
#[derive(Debug, Default)]
pub struct StemIndex {
    groups: HashMap<StemKey, Vec<PathBuf>>,
}

impl StemKey {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        let file_stem = path_to_file_stem_string(path);
        let (base, _) = split_thumb_suffix(&file_stem);
        let stem = base
            .nfc()
            .collect::<String>()
            .split_whitespace()
            .join(" ")
            .to_lowercase();
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self { stem, parent }
    }
}

impl StemIndex {
    #[must_use]
    pub fn new(files: &[PathBuf]) -> Self {
        let mut groups: HashMap<StemKey, Vec<PathBuf>> = HashMap::new();
        for file in files {
            groups.entry(StemKey::new(file)).or_default().push(file.clone());
        }
        for members in groups.values_mut() {
            members.sort();
        }
        Self { groups }
    }

    /// All files sharing the stem key of the given file.
    /// A file that was not indexed forms a group of its own.
    #[must_use]
    pub fn group_for(&self, path: &Path) -> Vec<PathBuf> {
        self.groups
            .get(&StemKey::new(path))
            .cloned()
            .unwrap_or_else(|| vec![path.to_path_buf()])
    }
}

/// Split a trailing `-thumb` marker from a file stem, ignoring case.
///
/// ```rust
/// use season_sort::episode::group::split_thumb_suffix;
///
/// assert_eq!(split_thumb_suffix("005 - Title-thumb"), ("005 - Title", true));
/// assert_eq!(split_thumb_suffix("005 - Title-THUMB"), ("005 - Title", true));
/// assert_eq!(split_thumb_suffix("005 - Title"), ("005 - Title", false));
/// ```
#[must_use]
pub fn split_thumb_suffix(stem: &str) -> (&str, bool) {
    let split_index = stem.len().checked_sub(THUMB_SUFFIX.len());
    match split_index {
        Some(index)
            if stem.is_char_boundary(index) && stem[index..].eq_ignore_ascii_case(THUMB_SUFFIX) =>
        {
            (&stem[..index], true)
        }
        _ => (stem, false),
    }
}
