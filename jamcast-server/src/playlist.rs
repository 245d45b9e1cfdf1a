//! Playlist built once at start-up from the music folder
//!
//! Tracks are the files carrying the configured extension, sorted by file
//! name. The order never changes at runtime; only the current index moves,
//! always forward and wrapping at the end.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One playable file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// File name, used as the track identifier
    pub name: String,
    /// Full path handed to the decoder
    pub path: PathBuf,
    /// Position in the playlist
    pub ordinal: usize,
}

/// Ordered track list with a current-track cursor
#[derive(Debug, Clone)]
pub struct Playlist {
    tracks: Vec<Track>,
    current: usize,
}

impl Playlist {
    /// Enumerate `folder` for files ending in `.{extension}` (case-insensitive)
    ///
    /// # Errors
    /// - `Error::Io` if the folder cannot be read
    /// - `Error::EmptyLibrary` if no file matches
    pub fn load(folder: &Path, extension: &str) -> Result<Self> {
        let wanted = extension.trim_start_matches('.').to_ascii_lowercase();
        let mut paths = Vec::new();

        for entry in std::fs::read_dir(folder)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase() == wanted)
                .unwrap_or(false);
            if matches {
                paths.push(path);
            } else {
                debug!("Skipping non-track file {}", path.display());
            }
        }

        let playlist = Self::from_paths(paths)
            .map_err(|_| Error::EmptyLibrary(folder.display().to_string()))?;

        info!(
            "Playlist loaded from {}: {:?}",
            folder.display(),
            playlist.tracks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );
        Ok(playlist)
    }

    /// Build a playlist from explicit paths, sorted by file name
    pub fn from_paths(mut paths: Vec<PathBuf>) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::EmptyLibrary("<no paths>".to_string()));
        }

        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let tracks = paths
            .into_iter()
            .enumerate()
            .map(|(ordinal, path)| Track {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path,
                ordinal,
            })
            .collect();

        Ok(Self { tracks, current: 0 })
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Always false: an empty playlist cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> &Track {
        &self.tracks[index % self.tracks.len()]
    }

    pub fn index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &Track {
        &self.tracks[self.current]
    }

    /// Index the next advance would land on
    pub fn peek_next(&self) -> usize {
        (self.current + 1) % self.tracks.len()
    }

    /// Move the cursor to `index` (wrapped)
    pub fn set_current(&mut self, index: usize) {
        self.current = index % self.tracks.len();
    }

    /// Move the cursor one track forward, wrapping at the end
    pub fn advance(&mut self) -> &Track {
        self.current = self.peek_next();
        self.current()
    }
}
