//! Suggested relative file paths for synced songs.

use lazy_static::lazy_static;
use regex::Regex;

/// Stands in for a missing artist list.
pub const UNKNOWN_ARTIST: &str = "(Unknown)";

lazy_static! {
    static ref ILLEGAL_FILENAME_CHARS: Regex =
        Regex::new(r#"[/\\:;&*"?<>{}\[\]|%#@=^]"#).expect("valid filename regex");
}

/// Make `name` usable as a single path component on common filesystems.
pub fn sanitize_filename(name: &str) -> String {
    ILLEGAL_FILENAME_CHARS
        .replace_all(name.trim(), "_")
        .into_owned()
}

fn artists_component(artist_names: &[String]) -> String {
    if artist_names.is_empty() {
        sanitize_filename(UNKNOWN_ARTIST)
    } else {
        artist_names
            .iter()
            .map(|name| sanitize_filename(name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// `<album artists>/<album>/<NN - ><song><ext>`
pub fn albumed_song_path(
    album_artist_names: &[String],
    album_name: &str,
    track_number: Option<i64>,
    song_name: &str,
    extension: &str,
) -> String {
    let track_prefix = track_number
        .map(|n| format!("{:02} - ", n))
        .unwrap_or_default();
    format!(
        "{}/{}/{}{}{}",
        artists_component(album_artist_names),
        sanitize_filename(album_name),
        track_prefix,
        sanitize_filename(song_name),
        extension
    )
}

/// `<song artists> - <song><ext>`
pub fn unalbumed_song_path(artist_names: &[String], song_name: &str, extension: &str) -> String {
    format!(
        "{} - {}{}",
        artists_component(artist_names),
        sanitize_filename(song_name),
        extension
    )
}
