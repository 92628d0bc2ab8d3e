//! Audio file discovery
//!
//! Recursive scan for catalog-eligible audio files: extension filter first
//! (cheap), magic-byte verification second (reliable). Unrecognized files
//! are ignored, not errors. Results are sorted so catalog order is
//! reproducible across runs.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Audio file scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Cannot access file
    #[error("File access error {0}: {1}")]
    FileAccessError(PathBuf, String),
}

/// Audio file scanner
pub struct AudioScanner {
    ignore_patterns: Vec<String>,
    max_depth: Option<usize>,
}

impl AudioScanner {
    /// Create new scanner with default ignore patterns
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
            ],
            max_depth: None,
        }
    }

    /// Scan directory for catalog-eligible audio files, sorted by path
    pub fn scan(&self, root_path: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root_path.exists() {
            return Err(ScanError::PathNotFound(root_path.to_path_buf()));
        }
        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        let mut symlink_visited = HashSet::new();
        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .max_depth(self.max_depth.unwrap_or(usize::MAX))
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        let mut audio_files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match self.is_audio_file(entry.path()) {
                Ok(true) => audio_files.push(entry.path().to_path_buf()),
                Ok(false) => {}
                Err(e) => tracing::warn!("Error verifying {}: {}", entry.path().display(), e),
            }
        }

        audio_files.sort();
        tracing::debug!(
            "Scan of {} found {} audio files",
            root_path.display(),
            audio_files.len()
        );
        Ok(audio_files)
    }

    /// Check if entry should be processed
    fn should_process_entry(
        &self,
        entry: &DirEntry,
        symlink_visited: &mut HashSet<PathBuf>,
    ) -> bool {
        let file_name = entry.file_name().to_string_lossy();
        for pattern in &self.ignore_patterns {
            if file_name.contains(pattern) {
                return false;
            }
        }

        // Detect symlink loops
        if entry.file_type().is_symlink() {
            if let Ok(canonical) = entry.path().canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", entry.path().display());
                    return false;
                }
            }
        }

        true
    }

    /// Check if file is a recognized audio container
    fn is_audio_file(&self, path: &Path) -> Result<bool, ScanError> {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.is_audio_extension(&ext_lower) {
                return self.verify_magic_bytes(path);
            }
        }
        Ok(false)
    }

    /// Check if extension is a recognized audio container type
    fn is_audio_extension(&self, ext: &str) -> bool {
        matches!(ext, "mp3" | "wav" | "flac" | "ogg" | "oga")
    }

    /// Verify file type using magic bytes
    fn verify_magic_bytes(&self, path: &Path) -> Result<bool, ScanError> {
        let mut file = File::open(path)
            .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))?;

        let mut buffer = [0u8; 12];
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))?;

        if bytes_read < 4 {
            return Ok(false); // Too small to be audio
        }

        let is_audio = match &buffer[..bytes_read] {
            // MP3
            [0xFF, 0xFB, ..] | [0xFF, 0xF3, ..] | [0xFF, 0xF2, ..] => true,
            [b'I', b'D', b'3', ..] => true, // MP3 with ID3 tag

            // FLAC
            [b'f', b'L', b'a', b'C', ..] => true,

            // OGG (Vorbis)
            [b'O', b'g', b'g', b'S', ..] => true,

            // WAV
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E'] => true,

            _ => false,
        };

        Ok(is_audio)
    }
}

impl Default for AudioScanner {
    fn default() -> Self {
        Self::new()
    }
}
