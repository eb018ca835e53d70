//! Delta reports for catching clients up with the library.

mod file_path;
mod report;

pub use file_path::{albumed_song_path, sanitize_filename, unalbumed_song_path, UNKNOWN_ARTIST};
pub use report::{FileSyncReport, FileSyncSong, SyncReport};
