//! Content-addressed view of the files already present on disk.
//!
//! The index is built once at engine startup from the temp and output
//! directories and treated as read-only for the rest of the run.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

use crate::audio::fingerprint::extract_fingerprint;
use crate::error::Result;

/// Answer to "does this file need to be produced?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    /// A file with the desired basename already exists.
    Exists,
    /// No file with the desired name, but one carrying the same fingerprint;
    /// the caller copies it to the desired name.
    Duplicate(PathBuf),
    /// The job has to run.
    Miss,
}

pub struct FileCache {
    by_fingerprint: HashMap<String, Vec<PathBuf>>,
}

impl FileCache {
    /// Indexes the top-level files of the given directories, in sorted
    /// filename order so duplicate resolution is reproducible.
    pub fn index(dirs: &[&Path]) -> Result<Self> {
        let mut by_fingerprint: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for dir in dirs {
            for path in list_files(dir)? {
                let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned())
                else {
                    continue;
                };
                by_fingerprint
                    .entry(extract_fingerprint(&name))
                    .or_default()
                    .push(path);
            }
        }
        Ok(Self { by_fingerprint })
    }

    /// Decides whether the desired output file exists, can be duplicated
    /// from an equal-fingerprint file, or is missing.
    ///
    /// Basenames are compared NFC-normalized: some tools write names in
    /// decomposed form while in-memory strings are composed.
    pub fn lookup(&self, desired_basename: &str) -> CacheStatus {
        let want: String = desired_basename.nfc().collect();
        for paths in self.by_fingerprint.values() {
            for path in paths {
                let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
                    continue;
                };
                if name.nfc().collect::<String>() == want {
                    return CacheStatus::Exists;
                }
            }
        }

        if let Some(first) = self
            .by_fingerprint
            .get(&extract_fingerprint(desired_basename))
            .and_then(|paths| paths.first())
        {
            return CacheStatus::Duplicate(first.clone());
        }
        CacheStatus::Miss
    }
}

/// Lists the plain files directly inside `dir`, skipping dotfiles and
/// subdirectories, sorted by name.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        files.push(entry.into_path());
    }
    Ok(files)
}
