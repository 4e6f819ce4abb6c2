//! Release naming from source tags
//!
//! Output directories default to `{Artist} - {Album} - ({Year})`, built from
//! the tags of every source in the tree.

/// Fallback when a source has no artist tag
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
/// Fallback when a source has no album tag
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
/// Fallback when a source has no year tag
pub const UNKNOWN_YEAR: &str = "0000";
/// Used when three or more distinct artists appear
pub const VARIOUS_ARTISTS: &str = "Various Artists";

/// Release-level tags of one source file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseTags {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
}

/// Build the release name for a set of sources.
///
/// Artists are collected across all files: one distinct artist is used as
/// is, two are joined with ", " and three or more become "Various Artists".
/// Album and year come from the last file.
pub fn release_name(tags: &[ReleaseTags]) -> String {
    let mut artists: Vec<&str> = Vec::new();
    for tag in tags {
        let artist = tag.artist.as_deref().unwrap_or(UNKNOWN_ARTIST);
        if !artists.contains(&artist) {
            artists.push(artist);
        }
    }

    let artist = match artists.len() {
        0 | 1 => artists.first().copied().unwrap_or(UNKNOWN_ARTIST).to_string(),
        2 => artists.join(", "),
        _ => VARIOUS_ARTISTS.to_string(),
    };

    let last = tags.last();
    let album = last
        .and_then(|t| t.album.as_deref())
        .unwrap_or(UNKNOWN_ALBUM);
    let year = last
        .and_then(|t| t.year)
        .map_or_else(|| UNKNOWN_YEAR.to_string(), |y| y.to_string());

    format!("{} - {} - ({})", artist, album, year)
}
