//! Ordered, mutable view of the image folder with a persisted cursor.
//!
//! Every public method takes the catalog lock for its whole
//! read-modify-write, so concurrent callers always observe a list and cursor
//! that belong together. Decoding happens outside the lock.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use image::RgbaImage;
use serde_yaml::Value;
use tracing::{debug, info, warn};

use crate::cache::ImageCache;
use crate::config::{self, ConfigStore, keys};
use crate::error::CatalogError;
use crate::scan::{self, ScannedFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
}

impl From<ScannedFile> for CatalogEntry {
    fn from(file: ScannedFile) -> Self {
        Self {
            name: file.name,
            path: file.path,
            modified: file.modified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    fn offset(self) -> isize {
        match self {
            Self::Forward => 1,
            Self::Backward => -1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub entry: CatalogEntry,
    pub image: Arc<RgbaImage>,
}

/// Result of resolving a catalog position to pixels.
#[derive(Debug, Clone)]
pub enum CatalogImage {
    Found(LoadedImage),
    /// The catalog has no entries.
    Empty,
    /// The entry exists but could not be decoded.
    Unreadable(CatalogEntry),
}

impl CatalogImage {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Found(loaded) => Some(&loaded.entry.name),
            Self::Unreadable(entry) => Some(&entry.name),
            Self::Empty => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RescanReport {
    pub entries: usize,
    pub added: usize,
    pub removed: usize,
}

#[derive(Debug, Default)]
struct CatalogState {
    entries: Vec<CatalogEntry>,
    cursor: Option<usize>,
}

impl CatalogState {
    fn wrapped(&self, offset: isize) -> Option<&CatalogEntry> {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }
        let cursor = self.cursor.unwrap_or(0) as isize;
        let idx = (cursor + offset).rem_euclid(len as isize) as usize;
        self.entries.get(idx)
    }

    /// Bring the cursor back into range. Returns whether it moved.
    fn clamp_cursor(&mut self) -> bool {
        let clamped = match (self.entries.len(), self.cursor) {
            (0, _) => None,
            (len, Some(cursor)) if cursor < len => Some(cursor),
            _ => Some(0),
        };
        let moved = clamped != self.cursor;
        self.cursor = clamped;
        moved
    }
}

pub struct Catalog {
    folder: PathBuf,
    cache: Arc<ImageCache>,
    config: Arc<dyn ConfigStore>,
    state: Mutex<CatalogState>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Catalog")
            .field("folder", &self.folder)
            .field("entries", &state.entries.len())
            .field("cursor", &state.cursor)
            .finish()
    }
}

impl Catalog {
    /// Open the catalog over `folder`, creating it if needed, and resume at
    /// the persisted cursor.
    ///
    /// # Errors
    /// [`CatalogError::CreateFolder`] when the folder cannot be created and
    /// [`CatalogError::CorruptCursor`] when the stored cursor is not a
    /// non-negative integer.
    pub fn open(
        folder: impl Into<PathBuf>,
        cache: Arc<ImageCache>,
        config: Arc<dyn ConfigStore>,
    ) -> Result<Self, CatalogError> {
        let folder = folder.into();
        fs::create_dir_all(&folder).map_err(|source| CatalogError::CreateFolder {
            path: folder.clone(),
            source,
        })?;
        let saved = config::get_strict::<u64>(&*config, keys::CURRENT_IMAGE_INDEX)
            .map_err(|err| CatalogError::CorruptCursor(err.to_string()))?;

        let catalog = Self {
            folder,
            cache,
            config,
            state: Mutex::new(CatalogState {
                entries: Vec::new(),
                cursor: saved.map(|c| usize::try_from(c).unwrap_or(usize::MAX)),
            }),
        };
        let report = catalog.rescan();
        info!(
            folder = %catalog.folder.display(),
            images = report.entries,
            cursor = ?catalog.cursor(),
            "catalog opened"
        );
        Ok(catalog)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-derive the entry list from the folder.
    ///
    /// Never fails: a folder that cannot be read yields an empty catalog.
    pub fn rescan(&self) -> RescanReport {
        let mut state = self.lock();
        self.rescan_locked(&mut state)
    }

    fn rescan_locked(&self, state: &mut CatalogState) -> RescanReport {
        let scanned: Vec<CatalogEntry> = self.scan().into_iter().map(Into::into).collect();

        let mut removed = 0;
        for old in &state.entries {
            match scanned.iter().find(|e| e.name == old.name) {
                Some(new) if new.modified == old.modified => {}
                Some(_) => {
                    debug!(name = %old.name, "image changed on disk");
                    self.cache.invalidate(&old.path);
                }
                None => {
                    removed += 1;
                    self.cache.invalidate(&old.path);
                }
            }
        }
        let added = scanned
            .iter()
            .filter(|new| !state.entries.iter().any(|old| old.name == new.name))
            .count();

        state.entries = scanned;
        if state.clamp_cursor() {
            self.persist_cursor(state.cursor);
        }

        let report = RescanReport {
            entries: state.entries.len(),
            added,
            removed,
        };
        if added > 0 || removed > 0 {
            info!(
                images = report.entries,
                added,
                removed,
                cursor = ?state.cursor,
                "catalog membership changed"
            );
        } else {
            debug!(images = report.entries, "catalog rescanned; no changes");
        }
        report
    }

    fn scan(&self) -> Vec<ScannedFile> {
        if !self.folder.exists() {
            warn!(folder = %self.folder.display(), "image folder missing; creating it");
            if let Err(err) = fs::create_dir_all(&self.folder) {
                warn!(folder = %self.folder.display(), %err, "failed to create image folder");
            }
            return Vec::new();
        }
        match scan::scan_folder(&self.folder) {
            Ok(files) => files,
            Err(err) => {
                warn!(folder = %self.folder.display(), %err, "failed to read image folder");
                Vec::new()
            }
        }
    }

    fn persist_cursor(&self, cursor: Option<usize>) {
        let value = Value::from(cursor.unwrap_or(0) as u64);
        if let Err(err) = self
            .config
            .set(keys::CURRENT_IMAGE_INDEX, value, true)
        {
            warn!(?cursor, "failed to persist cursor: {err:#}");
        }
    }

    /// Copy `source` into the folder as `declared_name`, suffixing the name
    /// when it is already taken.
    pub fn add(&self, source: &Path, declared_name: &str) -> Result<CatalogEntry, CatalogError> {
        scan::validate_image_name(declared_name)?;
        if !source.is_file() {
            return Err(CatalogError::MissingSource(source.to_path_buf()));
        }

        let mut state = self.lock();
        fs::create_dir_all(&self.folder)?;
        let name = scan::unique_name(&self.folder, declared_name);
        self.copy_into_folder(source, &name)?;
        self.rescan_locked(&mut state);

        let entry = state
            .entries
            .iter()
            .find(|e| e.name == name)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(name.clone()))?;
        info!(name = %entry.name, declared = declared_name, "image added");
        Ok(entry)
    }

    // Copies land under a hidden name first, which scans skip, so a failed
    // copy never shows up as a catalog entry.
    fn copy_into_folder(&self, source: &Path, name: &str) -> Result<(), CatalogError> {
        let partial = self.folder.join(format!(".{name}.part"));
        let copied = fs::copy(source, &partial)
            .and_then(|_| fs::rename(&partial, self.folder.join(name)));
        if let Err(err) = copied {
            if let Err(cleanup) = fs::remove_file(&partial)
                && cleanup.kind() != ErrorKind::NotFound
            {
                warn!(path = %partial.display(), %cleanup, "failed to remove partial copy");
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Delete the image called `name`.
    pub fn remove(&self, name: &str) -> Result<(), CatalogError> {
        scan::validate_image_name(name)?;
        let mut state = self.lock();
        let path = self.folder.join(name);
        if !path.is_file() {
            return Err(CatalogError::NotFound(name.to_string()));
        }
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(CatalogError::NotFound(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        self.cache.invalidate(&path);
        self.rescan_locked(&mut state);
        info!(name, cursor = ?state.cursor, "image removed");
        Ok(())
    }

    /// Delete every image in the catalog. Returns how many were removed.
    pub fn remove_all(&self) -> Result<usize, CatalogError> {
        let mut state = self.lock();
        self.rescan_locked(&mut state);

        let mut removed = 0;
        let mut first_error = None;
        for entry in &state.entries {
            match fs::remove_file(&entry.path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(name = %entry.name, %err, "failed to remove image");
                    first_error.get_or_insert(err);
                }
            }
        }
        self.cache.clear();
        self.rescan_locked(&mut state);
        info!(removed, "removed all images");

        match first_error {
            Some(err) if removed == 0 => Err(err.into()),
            _ => Ok(removed),
        }
    }

    /// Point the cursor at `name`. Returns `false` (and changes nothing) when
    /// no entry has that name.
    pub fn set_current(&self, name: &str) -> bool {
        let mut state = self.lock();
        let Some(idx) = state.entries.iter().position(|e| e.name == name) else {
            debug!(name, "set_current: no such image");
            return false;
        };
        state.cursor = Some(idx);
        self.persist_cursor(state.cursor);
        info!(name, cursor = idx, "current image set");
        true
    }

    /// Move the cursor one step, wrapping at both ends. Returns the new cursor,
    /// or `None` when the catalog is empty.
    pub fn advance(&self, direction: Direction) -> Option<usize> {
        let mut state = self.lock();
        let len = state.entries.len();
        if len == 0 {
            return None;
        }
        let cursor = state.cursor.unwrap_or(0) as isize;
        let next = (cursor + direction.offset()).rem_euclid(len as isize) as usize;
        state.cursor = Some(next);
        self.persist_cursor(state.cursor);
        debug!(?direction, cursor = next, "cursor advanced");
        Some(next)
    }

    pub fn current_image(&self) -> CatalogImage {
        self.resolve(0)
    }

    pub fn peek_next(&self) -> CatalogImage {
        self.resolve(1)
    }

    pub fn peek_previous(&self) -> CatalogImage {
        self.resolve(-1)
    }

    fn resolve(&self, offset: isize) -> CatalogImage {
        let Some(entry) = self.lock().wrapped(offset).cloned() else {
            return CatalogImage::Empty;
        };
        match self.cache.get(&entry.path) {
            Some(image) => CatalogImage::Found(LoadedImage { entry, image }),
            None => CatalogImage::Unreadable(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.lock().cursor
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.lock().entries.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn current_entry(&self) -> Option<CatalogEntry> {
        self.lock().wrapped(0).cloned()
    }
}
