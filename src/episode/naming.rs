use std::path::{Path, PathBuf};

use crate::episode::THUMB_SUFFIX;

/// Build the canonical file name without extension.
///
/// ```rust
/// use season_sort::episode::build_basename;
///
/// assert_eq!(
///     build_basename("One Piece Kai", 1, 5, Some("Romance Dawn"), Some("1080p")),
///     "One Piece Kai - S01E005 - Romance Dawn - 1080p"
/// );
/// assert_eq!(build_basename("One Piece Kai", 2, 12, None, None), "One Piece Kai - S02E012");
/// ```
#[must_use]
pub fn build_basename(show_name: &str, season: u32, episode: u32, title: Option<&str>, tech: Option<&str>) -> String {
    let mut name = format!("{show_name} - S{season:02}E{episode:03}");
    for segment in [title, tech].into_iter().flatten() {
        let segment = segment.trim();
        if !segment.is_empty() {
            name.push_str(" - ");
            name.push_str(segment);
        }
    }
    name
}

/// File stem for one member of an episode group.
///
/// Thumbnails keep their `-thumb` marker.
/// A stem that still ends with the extension loses it, so the final name never repeats it.
#[must_use]
pub fn destination_stem(basename: &str, extension: &str, thumb: bool) -> String {
    let suffix = if thumb { THUMB_SUFFIX } else { "" };
    let stem = format!("{basename}{suffix}");
    if extension.is_empty() {
        return stem;
    }
    let dotted = format!(".{extension}").to_lowercase();
    if stem.to_lowercase().ends_with(&dotted) {
        let keep = stem.len() - dotted.len();
        if stem.is_char_boundary(keep) {
            return stem[..keep].to_string();
        }
    }
    stem
}

/// Final file name for one member of an episode group.
#[must_use]
pub fn destination_file_name(basename: &str, extension: &str, thumb: bool) -> String {
    let stem = destination_stem(basename, extension, thumb);
    if extension.is_empty() {
        stem
    } else {
        format!("{stem}.{extension}")
    }
}

/// Return a path in `dest_dir` that does not exist yet.
///
/// Tries `stem.ext` first, then `stem (1).ext`, `stem (2).ext` and so on.
/// Checked against the filesystem on every call.
#[must_use]
pub fn unique_destination(dest_dir: &Path, stem: &str, extension: &str) -> PathBuf {
    (0..)
        .map(|index| numbered_destination(dest_dir, stem, extension, index))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| dest_dir.join(stem))
}

/// Existing paths that [`unique_destination`] would have skipped, in probe order.
pub fn existing_destinations(dest_dir: &Path, stem: &str, extension: &str) -> impl Iterator<Item = PathBuf> {
    (0..)
        .map(move |index| numbered_destination(dest_dir, stem, extension, index))
        .take_while(|candidate| candidate.exists())
}

/// `stem.ext` for index zero, `stem (index).ext` otherwise.
fn numbered_destination(dest_dir: &Path, stem: &str, extension: &str, index: u32) -> PathBuf {
    let suffix = if index == 0 {
        String::new()
    } else {
        format!(" ({index})")
    };
    if extension.is_empty() {
        dest_dir.join(format!("{stem}{suffix}"))
    } else {
        dest_dir.join(format!("{stem}{suffix}.{extension}"))
    }
}
