//! Folder scanning and filename rules for the image catalog.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::error::CatalogError;

/// Extensions (lowercase, without dot) the catalog accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "ico",
];

/// A file discovered in the image folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub name: String,
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
}

/// Lowercased extension of `name`, if it has one.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)
}

/// Return `true` if `path` has an allowed image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
}

/// Reject anything that is not a bare filename.
///
/// # Errors
/// Returns [`CatalogError::InvalidName`] for empty names, `.`/`..`, and names
/// containing a directory separator or any other path component.
pub fn validate_name(name: &str) -> Result<(), CatalogError> {
    let invalid = || CatalogError::InvalidName(name.to_string());
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(invalid());
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == OsStr::new(name) => Ok(()),
        _ => Err(invalid()),
    }
}

/// Validate `name` and check its extension against the allow-list.
pub fn validate_image_name(name: &str) -> Result<(), CatalogError> {
    validate_name(name)?;
    match extension_of(name) {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        ext => Err(CatalogError::UnsupportedExtension {
            name: name.to_string(),
            ext: ext.unwrap_or_default(),
        }),
    }
}

/// List supported images directly inside `folder`, sorted by filename.
///
/// Subdirectories and hidden files are ignored. Symlinks are followed, so a
/// link to an image counts as an image; dangling links are skipped.
///
/// # Errors
/// Returns the underlying walk error when `folder` itself cannot be read.
pub fn scan_folder(folder: &Path) -> Result<Vec<ScannedFile>, walkdir::Error> {
    let mut out = Vec::new();
    for entry in WalkDir::new(folder)
        .follow_links(true)
        .min_depth(1)
        .max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            // Failing on the root means the folder is unreadable; anything
            // below it is a single bad file.
            Err(err) if err.depth() == 0 => return Err(err),
            Err(err) => {
                tracing::debug!(%err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if name.starts_with('.') || !is_supported_image(entry.path()) {
            continue;
        }
        let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
        out.push(ScannedFile {
            name: name.to_string(),
            path: entry.path().to_path_buf(),
            modified,
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

/// First free filename in `folder` for `name`: `name`, then `stem_1.ext`,
/// `stem_2.ext`, and so on.
pub fn unique_name(folder: &Path, name: &str) -> String {
    if !folder.join(name).exists() {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or(name);
    let ext = path.extension().and_then(OsStr::to_str);
    (1..)
        .map(|n| match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        })
        .find(|candidate| !folder.join(candidate).exists())
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn accepts_plain_names_only() {
        assert!(validate_name("photo.png").is_ok());
        assert!(validate_name("with space.jpg").is_ok());
        for bad in ["", ".", "..", "../x.png", "a/b.png", "/etc/passwd", "dir\\x.png"] {
            assert!(
                matches!(validate_name(bad), Err(CatalogError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(validate_image_name("IMG_001.JPG").is_ok());
        assert!(validate_image_name("scan.TIF").is_ok());
        let err = validate_image_name("notes.txt").unwrap_err();
        assert!(matches!(
            err,
            CatalogError::UnsupportedExtension { ref ext, .. } if ext == "txt"
        ));
        assert!(matches!(
            validate_image_name("README"),
            Err(CatalogError::UnsupportedExtension { .. })
        ));
    }

    #[test]
    fn scan_is_sorted_flat_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.png", "a.jpg", "b.webp", "notes.txt", ".hidden.png"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("d.png"), b"x").unwrap();

        let names: Vec<String> = scan_folder(dir.path())
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.webp", "c.png"]);
    }

    #[cfg(unix)]
    #[test]
    fn scan_follows_symlinked_images() {
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let target = elsewhere.path().join("real.png");
        fs::write(&target, b"x").unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("linked.png")).unwrap();
        std::os::unix::fs::symlink(
            elsewhere.path().join("gone.png"),
            dir.path().join("dangling.png"),
        )
        .unwrap();

        let files = scan_folder(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "linked.png");
        assert_eq!(files[0].path, dir.path().join("linked.png"));
        assert!(files[0].modified.is_some());
    }

    #[test]
    fn scan_of_missing_folder_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_folder(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn unique_name_suffixes_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(unique_name(dir.path(), "cat.png"), "cat.png");
        fs::write(dir.path().join("cat.png"), b"x").unwrap();
        assert_eq!(unique_name(dir.path(), "cat.png"), "cat_1.png");
        fs::write(dir.path().join("cat_1.png"), b"x").unwrap();
        assert_eq!(unique_name(dir.path(), "cat.png"), "cat_2.png");
    }
}
