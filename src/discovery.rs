// src/discovery.rs
// Sibling discovery: which files in a directory belong to the same capture

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::isf_tools::{IsfError, Result};

/// Extension of the supported waveform format, matched case-insensitively.
pub const ISF_EXTENSION: &str = "isf";

/// Decides whether a candidate file stem names another channel of the
/// capture the target stem belongs to.
pub trait SiblingMatcher {
    fn is_sibling(&self, target_stem: &str, candidate_stem: &str) -> bool;
}

impl<F> SiblingMatcher for F
where
    F: Fn(&str, &str) -> bool,
{
    fn is_sibling(&self, target_stem: &str, candidate_stem: &str) -> bool {
        self(target_stem, candidate_stem)
    }
}

/// Channel files share their name up to a trailing channel index, e.g.
/// `tek0000CH1` and `tek0000CH2`. The last character of the target stem is
/// dropped and every candidate starting with the remainder matches.
#[derive(Default, Clone, Copy, Debug)]
pub struct TrimmedStemMatcher;

impl SiblingMatcher for TrimmedStemMatcher {
    fn is_sibling(&self, target_stem: &str, candidate_stem: &str) -> bool {
        let prefix = match target_stem.char_indices().last() {
            Some((idx, _)) => &target_stem[..idx],
            None => target_stem,
        };
        candidate_stem.starts_with(prefix)
    }
}

/// Ordered channel files of one capture.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileSet {
    paths: Vec<PathBuf>,
}

impl FileSet {
    pub fn single<P: Into<PathBuf>>(path: P) -> Self {
        FileSet {
            paths: vec![path.into()],
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.paths.iter()
    }
}

/// Locates the channel files of a capture.
pub struct FileSetDiscovery {
    matcher: Box<dyn SiblingMatcher + Send + Sync>,
}

impl Default for FileSetDiscovery {
    fn default() -> Self {
        FileSetDiscovery::new(TrimmedStemMatcher)
    }
}

impl std::fmt::Debug for FileSetDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSetDiscovery").finish_non_exhaustive()
    }
}

impl FileSetDiscovery {
    pub fn new<M>(matcher: M) -> Self
    where
        M: SiblingMatcher + Send + Sync + 'static,
    {
        FileSetDiscovery {
            matcher: Box::new(matcher),
        }
    }

    /// Build the file set for `path`.
    ///
    /// The extension is checked before anything touches the filesystem. With
    /// `siblings` disabled the set is exactly `path`; otherwise the containing
    /// directory is listed and every entry with the same extension (as
    /// written, case-sensitive) whose stem the matcher accepts is returned,
    /// sorted by file name.
    pub fn discover(&self, path: &Path, siblings: bool) -> Result<FileSet> {
        let (dir, stem, ext) = split_isf_path(path)?;

        if !siblings {
            return Ok(FileSet::single(path));
        }

        let entries = fs::read_dir(dir).map_err(|source| IsfError::DirectoryUnreadable {
            path: dir.to_path_buf(),
            source,
        })?;

        let suffix = format!(".{ext}");
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| IsfError::DirectoryUnreadable {
                path: dir.to_path_buf(),
                source,
            })?;
            if is_directory(dir, entry.file_type())? {
                continue;
            }

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(candidate_stem) = name.strip_suffix(suffix.as_str()) {
                if self.matcher.is_sibling(stem, candidate_stem) {
                    names.push(name.to_string());
                }
            }
        }

        if names.is_empty() {
            return Err(IsfError::NoFiles(path.to_path_buf()));
        }

        names.sort();
        debug!("discovered {} file(s) for {}: {:?}", names.len(), path.display(), names);

        Ok(FileSet {
            paths: names.into_iter().map(|name| dir.join(name)).collect(),
        })
    }
}

fn is_directory(dir: &Path, file_type: io::Result<fs::FileType>) -> Result<bool> {
    file_type
        .map(|t| t.is_dir())
        .map_err(|source| IsfError::DirectoryUnreadable {
            path: dir.to_path_buf(),
            source,
        })
}

/// Split a path into directory, stem and extension, rejecting anything that
/// is not an ISF file.
fn split_isf_path(path: &Path) -> Result<(&Path, &str, &str)> {
    let unsupported = || IsfError::UnsupportedFormat(path.to_path_buf());

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(unsupported)?;
    if !ext.eq_ignore_ascii_case(ISF_EXTENSION) {
        return Err(unsupported());
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(unsupported)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    Ok((dir, stem, ext))
}
