//! On-disk content store
//!
//! Every pull request download lives under
//! `{root}/downloads/{owner}/{repo}/pulls/{number}/{head_sha}/`:
//!
//! ```text
//! pr.zip                              assembled archive (or provider-assigned *.zip)
//! objects/{content_hash}/{filename}   fetched file bodies, content addressed
//! ```
//!
//! The directory layout is the only record of a download's identity. There is no
//! index file; [`ContentStore::find_finished`] rebuilds the finished downloads by
//! decoding archive paths.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::error::{Error, Result};
use crate::types::{
    DownloadedFile, FileDownload, PullRequestCoordinates, PullRequestDownload, RepositoryName,
};


/// Directory below the root holding every download
const DOWNLOADS_DIR: &str = "downloads";

/// Fixed path segment between repository and pull request number
const PULLS_DIR: &str = "pulls";

/// Directory below a revision holding the fetched file bodies
const OBJECTS_DIR: &str = "objects";

/// Archive name used for assembled per-file downloads
const ARCHIVE_NAME: &str = "pr.zip";

/// Suffix of an archive that is still being written
const PARTIAL_SUFFIX: &str = ".partial";

/// Depth of an archive below `downloads/`: owner, repo, pulls, number, sha, archive
const ARCHIVE_DEPTH: usize = 6;

// Component offsets within an archive path relative to `downloads/`
const OFFSET_OWNER: usize = 0;
const OFFSET_REPO: usize = 1;
const OFFSET_PULLS: usize = 2;
const OFFSET_NUMBER: usize = 3;
const OFFSET_HEAD_SHA: usize = 4;
const OFFSET_ARCHIVE: usize = 5;

/// Maps download keys to filesystem paths below a single root
#[derive(Clone, Debug)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open (and create, if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| Error::storage(&root, e))?;
        tracing::debug!(root = %root.display(), "content store ready");
        Ok(Self { root })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one pull request revision, created on demand.
    pub fn revision_dir(&self, key: &PullRequestDownload) -> Result<PathBuf> {
        let dir = self.revision_path(key)?;
        create_dirs(&dir)?;
        Ok(dir)
    }

    /// Content-addressed target for one file body, with its parent directories created.
    ///
    /// `{revision}/objects/{content_hash}/{filename}`; calling it twice yields the same path.
    pub fn path_for_file(&self, file: &FileDownload) -> Result<PathBuf> {
        let mut path = self.revision_path(&file.parent)?;
        path.push(OBJECTS_DIR);
        path.push(plain_segment(&file.content_hash, "content hash", &path)?);
        for component in filename_components(&file.filename, &path)? {
            path.push(component);
        }
        if let Some(parent) = path.parent() {
            create_dirs(parent)?;
        }
        Ok(path)
    }

    /// Target of the assembled archive, with its parent directories created.
    pub fn path_for_archive(&self, key: &PullRequestDownload) -> Result<PathBuf> {
        Ok(self.revision_dir(key)?.join(ARCHIVE_NAME))
    }

    /// Zip `files` into the key's archive.
    ///
    /// Entries are named after each file's repository path, not its on-disk
    /// location. The archive is written next to its target and renamed into
    /// place once complete, so a failed assembly never leaves a `pr.zip` behind.
    pub fn assemble_archive(
        &self,
        key: &PullRequestDownload,
        files: &[DownloadedFile],
    ) -> Result<PathBuf> {
        let target = self.path_for_archive(key)?;
        let mut partial = target.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        if let Err(e) = write_archive(&partial, files) {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }
        std::fs::rename(&partial, &target).map_err(|e| Error::storage(&target, e))?;

        tracing::info!(
            download = %key,
            path = %target.display(),
            entries = files.len(),
            "archive assembled"
        );
        Ok(target)
    }

    /// Archive of a download, if one exists.
    ///
    /// Any `*.zip` directly inside the revision directory counts, so archives
    /// named by the provider are found as well as `pr.zip`.
    pub fn find_archive(&self, key: &PullRequestDownload) -> Option<PathBuf> {
        let dir = self.revision_path(key).ok()?;
        let preferred = dir.join(ARCHIVE_NAME);
        if preferred.is_file() {
            return Some(preferred);
        }

        let entries = std::fs::read_dir(&dir).ok()?;
        let mut archives: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_archive(path))
            .collect();
        archives.sort();
        archives.into_iter().next()
    }

    /// Delete a download's archive; returns whether a file was removed.
    pub fn remove_archive(&self, key: &PullRequestDownload) -> Result<bool> {
        let Some(path) = self.find_archive(key) else {
            return Ok(false);
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(download = %key, path = %path.display(), "archive removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::storage(&path, e)),
        }
    }

    /// Rebuild every finished download from the archives on disk.
    ///
    /// Paths that do not decode to a download key are logged and skipped.
    pub fn find_finished(&self) -> Vec<PullRequestDownload> {
        let downloads = self.root.join(DOWNLOADS_DIR);
        if !downloads.is_dir() {
            return Vec::new();
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(&downloads).min_depth(1).max_depth(ARCHIVE_DEPTH) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!(error = %e, "unable to read store entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_archive(entry.path()) {
                continue;
            }

            let relative = match entry.path().strip_prefix(&downloads) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            match try_reconstruct_download(relative) {
                Some(key) => found.push(key),
                None => tracing::warn!(
                    path = %entry.path().display(),
                    "skipping archive that does not match the store layout"
                ),
            }
        }

        found.sort();
        found.dedup();
        tracing::debug!(count = found.len(), "scanned store for finished downloads");
        found
    }

    fn revision_path(&self, key: &PullRequestDownload) -> Result<PathBuf> {
        let coordinates = &key.coordinates;
        let mut path = self.root.join(DOWNLOADS_DIR);
        path.push(plain_segment(coordinates.repository_name.owner(), "owner", &path)?);
        path.push(plain_segment(coordinates.repository_name.repo(), "repo", &path)?);
        path.push(PULLS_DIR);
        path.push(coordinates.number.to_string());
        path.push(plain_segment(&key.head_sha, "head revision", &path)?);
        Ok(path)
    }
}

/// Decode a download key from an archive path relative to `downloads/`.
pub(crate) fn try_reconstruct_download(relative: &Path) -> Option<PullRequestDownload> {
    let parts: Vec<&str> = relative
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;

    if parts.len() != ARCHIVE_DEPTH || parts[OFFSET_PULLS] != PULLS_DIR {
        return None;
    }
    if !is_archive(Path::new(parts[OFFSET_ARCHIVE])) {
        return None;
    }

    let repository = RepositoryName::new(parts[OFFSET_OWNER], parts[OFFSET_REPO])?;
    let number = parts[OFFSET_NUMBER].parse::<u64>().ok().filter(|n| *n >= 1)?;
    let head_sha = parts[OFFSET_HEAD_SHA];
    if head_sha.is_empty() {
        return None;
    }

    Some(PullRequestDownload::new(
        PullRequestCoordinates::new(repository, number),
        head_sha,
    ))
}

fn write_archive(target: &Path, files: &[DownloadedFile]) -> Result<()> {
    let file = File::create(target).map_err(|e| Error::storage(target, e))?;
    let mut writer = zip::ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for downloaded in files {
        let name = &downloaded.descriptor.filename;
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| Error::storage(target, format!("failed to add entry {}: {}", name, e)))?;
        let mut source = File::open(&downloaded.local_path)
            .map_err(|e| Error::storage(&downloaded.local_path, e))?;
        std::io::copy(&mut source, &mut writer)
            .map_err(|e| Error::storage(target, format!("failed to write entry {}: {}", name, e)))?;
    }

    let mut inner = writer
        .finish()
        .map_err(|e| Error::storage(target, format!("failed to finish archive: {}", e)))?;
    inner.flush().map_err(|e| Error::storage(target, e))?;
    Ok(())
}

fn create_dirs(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        tracing::error!(path = %dir.display(), error = %e, "unable to create directory");
        Error::storage(dir, e)
    })
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// A single path segment that cannot escape its parent.
fn plain_segment<'a>(value: &'a str, what: &str, parent: &Path) -> Result<&'a str> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !value.contains(['/', '\\']) => Ok(value),
        _ => Err(Error::storage(
            parent,
            format!("invalid {} path segment {:?}", what, value),
        )),
    }
}

/// Components of a repository file path; every one must be a plain name.
fn filename_components<'a>(filename: &'a str, parent: &Path) -> Result<Vec<&'a str>> {
    let parts: Vec<&str> = filename.split('/').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(Error::storage(
            parent,
            format!("invalid file name {:?}", filename),
        ));
    }
    parts
        .into_iter()
        .map(|part| plain_segment(part, "file name", parent))
        .collect()
}
