//! Configuration store consumed by the refresh engine.
//!
//! The engine only talks to configuration through [`ConfigStore`]: untyped
//! `get`/`set` on kebab-case keys. Typed views ([`DisplaySettings`],
//! [`CacheSettings`], [`EnhancementSettings`]) are re-read whenever they are
//! needed so edits made by other callers take effect without a restart.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use crate::error::ValidationError;

/// Keys understood by the engine.
pub mod keys {
    pub const IMAGE_FOLDER: &str = "image-folder";
    pub const REFRESH_INTERVAL: &str = "refresh-interval";
    pub const ORIENTATION: &str = "orientation";
    pub const PORTRAIT_ROTATION: &str = "portrait-rotation";
    pub const CROP_MODE: &str = "crop-mode";
    pub const INVERTED_IMAGE: &str = "inverted-image";
    pub const CURRENT_IMAGE_INDEX: &str = "current-image-index";
    pub const IMAGE_SETTINGS: &str = "image-settings";
    pub const RESOLUTION: &str = "resolution";
    pub const CACHE: &str = "cache";
    pub const ERROR_BACKOFF: &str = "error-backoff";
}

pub const DEFAULT_IMAGE_FOLDER: &str = "images";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 900;
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 60;
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_PORTRAIT_ROTATION: u16 = 90;
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(10);

/// Narrow key/value view of the configuration.
pub trait ConfigStore: Send + Sync {
    /// Current value for `key`, if any.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`, writing it through to durable storage when
    /// `persist` is set.
    fn set(&self, key: &str, value: Value, persist: bool) -> Result<()>;

    /// Directory relative paths in the configuration are resolved against.
    fn base_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// Typed read of `key`, falling back to `default` when the key is absent or
/// holds a value of the wrong shape.
pub fn get_or<T: DeserializeOwned>(store: &dyn ConfigStore, key: &str, default: T) -> T {
    match store.get(key) {
        None | Some(Value::Null) => default,
        Some(value) => match serde_yaml::from_value(value) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(key, %err, "ignoring malformed configuration value");
                default
            }
        },
    }
}

/// Typed read of `key` that reports a malformed value instead of hiding it.
pub fn get_strict<T: DeserializeOwned>(
    store: &dyn ConfigStore,
    key: &str,
) -> Result<Option<T>, serde_yaml::Error> {
    match store.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_yaml::from_value(value).map(Some),
    }
}

/// Refresh interval for the next loop iteration, never shorter than a second.
pub fn refresh_interval(store: &dyn ConfigStore) -> Duration {
    let secs = get_or(store, keys::REFRESH_INTERVAL, DEFAULT_REFRESH_INTERVAL_SECS);
    Duration::from_secs(secs.max(1))
}

#[derive(Deserialize)]
#[serde(transparent)]
struct HumanDuration(#[serde(with = "humantime_serde")] Duration);

/// Pause after a failed refresh before the loop tries again.
pub fn error_backoff(store: &dyn ConfigStore) -> Duration {
    get_or(store, keys::ERROR_BACKOFF, HumanDuration(DEFAULT_ERROR_BACKOFF)).0
}

/// Image folder, with relative paths anchored at the store's base directory.
pub fn image_folder(store: &dyn ConfigStore) -> PathBuf {
    let folder: PathBuf = get_or(
        store,
        keys::IMAGE_FOLDER,
        PathBuf::from(DEFAULT_IMAGE_FOLDER),
    );
    match store.base_dir() {
        Some(base) if folder.is_relative() => base.join(folder),
        _ => folder,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
}

impl FromStr for Orientation {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyOrientation);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "landscape" => Ok(Self::Landscape),
            "portrait" => Ok(Self::Portrait),
            _ => Err(ValidationError::Orientation(raw.to_string())),
        }
    }
}

/// How the crop window is placed when the source is wider than the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CropMode {
    #[default]
    Center,
    /// Anchor the crop window at the left edge instead of centering it.
    KeepWidth,
}

/// Multipliers applied by the enhancement stage; 1.0 leaves the image untouched.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EnhancementSettings {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub sharpness: f32,
}

impl EnhancementSettings {
    pub const IDENTITY: Self = Self {
        brightness: 1.0,
        contrast: 1.0,
        saturation: 1.0,
        sharpness: 1.0,
    };
    pub const MIN: f32 = 0.0;
    pub const MAX: f32 = 2.0;

    /// Build settings from user input, rejecting anything outside [0.0, 2.0].
    pub fn try_new(
        brightness: f32,
        contrast: f32,
        saturation: f32,
        sharpness: f32,
    ) -> Result<Self, ValidationError> {
        for (setting, value) in [
            ("brightness", brightness),
            ("contrast", contrast),
            ("saturation", saturation),
            ("sharpness", sharpness),
        ] {
            if !(Self::MIN..=Self::MAX).contains(&value) {
                return Err(ValidationError::Enhancement { setting, value });
            }
        }
        Ok(Self {
            brightness,
            contrast,
            saturation,
            sharpness,
        })
    }

    /// Clamp every factor into range; non-finite values become identity.
    pub fn clamped(self) -> Self {
        fn clamp(value: f32) -> f32 {
            if value.is_finite() {
                value.clamp(EnhancementSettings::MIN, EnhancementSettings::MAX)
            } else {
                1.0
            }
        }
        Self {
            brightness: clamp(self.brightness),
            contrast: clamp(self.contrast),
            saturation: clamp(self.saturation),
            sharpness: clamp(self.sharpness),
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for EnhancementSettings {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Bounds for the decoded-image cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheSettings {
    pub capacity: usize,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl CacheSettings {
    pub fn load(store: &dyn ConfigStore) -> Self {
        let mut settings: Self = get_or(store, keys::CACHE, Self::default());
        if settings.capacity == 0 {
            warn!("cache capacity must be at least 1; using 1");
            settings.capacity = 1;
        }
        settings
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 8,
            ttl: Duration::from_secs(10 * 60),
        }
    }
}

/// Everything the transformation pipeline needs from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySettings {
    pub orientation: Orientation,
    /// Counter-clockwise rotation applied in portrait orientation.
    pub portrait_rotation: u16,
    pub crop_mode: CropMode,
    pub inverted: bool,
    pub enhancement: EnhancementSettings,
    /// Explicit target size; `None` means "ask the sink".
    pub resolution: Option<(u32, u32)>,
}

impl DisplaySettings {
    pub fn load(store: &dyn ConfigStore) -> Self {
        let mut portrait_rotation =
            get_or(store, keys::PORTRAIT_ROTATION, DEFAULT_PORTRAIT_ROTATION);
        if portrait_rotation % 90 != 0 {
            warn!(
                portrait_rotation,
                "portrait rotation must be a multiple of 90 degrees; using default"
            );
            portrait_rotation = DEFAULT_PORTRAIT_ROTATION;
        }

        let raw_enhancement: EnhancementSettings =
            get_or(store, keys::IMAGE_SETTINGS, EnhancementSettings::IDENTITY);
        let enhancement = raw_enhancement.clamped();
        if enhancement != raw_enhancement {
            warn!(?raw_enhancement, ?enhancement, "clamped image settings into range");
        }

        let resolution = get_or::<Option<(u32, u32)>>(store, keys::RESOLUTION, None)
            .filter(|&(w, h)| {
                let valid = w > 0 && h > 0;
                if !valid {
                    warn!(width = w, height = h, "ignoring zero-sized resolution");
                }
                valid
            });

        Self {
            orientation: get_or(store, keys::ORIENTATION, Orientation::default()),
            portrait_rotation,
            crop_mode: get_or(store, keys::CROP_MODE, CropMode::default()),
            inverted: get_or(store, keys::INVERTED_IMAGE, false),
            enhancement,
            resolution,
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            orientation: Orientation::Landscape,
            portrait_rotation: DEFAULT_PORTRAIT_ROTATION,
            crop_mode: CropMode::Center,
            inverted: false,
            enhancement: EnhancementSettings::IDENTITY,
            resolution: None,
        }
    }
}

pub fn validate_orientation(raw: &str) -> Result<Orientation, ValidationError> {
    raw.parse()
}

pub fn validate_refresh_interval(secs: u64) -> Result<Duration, ValidationError> {
    if secs < MIN_REFRESH_INTERVAL_SECS {
        return Err(ValidationError::IntervalTooSmall {
            min: MIN_REFRESH_INTERVAL_SECS,
        });
    }
    if secs > MAX_REFRESH_INTERVAL_SECS {
        return Err(ValidationError::IntervalTooLarge {
            max: MAX_REFRESH_INTERVAL_SECS,
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Default values merged under whatever the YAML file provides.
pub fn defaults() -> Mapping {
    let mut image_settings = Mapping::new();
    for name in ["brightness", "contrast", "saturation", "sharpness"] {
        image_settings.insert(name.into(), 1.0_f64.into());
    }
    let mut cache = Mapping::new();
    cache.insert("capacity".into(), 8_u64.into());
    cache.insert("ttl".into(), "10m".into());

    let mut values = Mapping::new();
    values.insert(keys::IMAGE_FOLDER.into(), DEFAULT_IMAGE_FOLDER.into());
    values.insert(
        keys::REFRESH_INTERVAL.into(),
        DEFAULT_REFRESH_INTERVAL_SECS.into(),
    );
    values.insert(keys::ORIENTATION.into(), "landscape".into());
    values.insert(
        keys::PORTRAIT_ROTATION.into(),
        u64::from(DEFAULT_PORTRAIT_ROTATION).into(),
    );
    values.insert(keys::CROP_MODE.into(), "center".into());
    values.insert(keys::INVERTED_IMAGE.into(), false.into());
    values.insert(keys::CURRENT_IMAGE_INDEX.into(), 0_u64.into());
    values.insert(keys::IMAGE_SETTINGS.into(), Value::Mapping(image_settings));
    values.insert(keys::CACHE.into(), Value::Mapping(cache));
    values.insert(keys::ERROR_BACKOFF.into(), "10s".into());
    values
}

/// [`ConfigStore`] backed by a YAML mapping, optionally persisted to a file.
#[derive(Debug)]
pub struct YamlConfigStore {
    path: Option<PathBuf>,
    values: Mutex<Mapping>,
}

impl YamlConfigStore {
    /// Unpersisted store seeded with [`defaults`].
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(defaults()),
        }
    }

    /// Read `path` (if it exists) and fill any missing keys from [`defaults`].
    pub fn load(path: &Path) -> Result<Self> {
        let mut values = if path.exists() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config at {}", path.display()))?;
            let parsed: Value = serde_yaml::from_str(&text)
                .with_context(|| format!("failed to parse config at {}", path.display()))?;
            match parsed {
                Value::Mapping(map) => map,
                Value::Null => Mapping::new(),
                other => bail!(
                    "config at {} must be a mapping, found {:?}",
                    path.display(),
                    other
                ),
            }
        } else {
            info!(path = %path.display(), "config file not found; starting from defaults");
            Mapping::new()
        };

        for (key, value) in defaults() {
            if !values.contains_key(&key) {
                values.insert(key, value);
            }
        }

        Ok(Self {
            path: Some(path.to_path_buf()),
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Mapping> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(path: &Path, values: &Mapping) -> Result<()> {
        let text = serde_yaml::to_string(values).context("failed to serialize configuration")?;
        let tmp = path.with_extension("yaml.tmp");
        fs::write(&tmp, text)
            .with_context(|| format!("failed to write config to {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace config at {}", path.display()))?;
        debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

impl ConfigStore for YamlConfigStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value, persist: bool) -> Result<()> {
        let mut values = self.lock();
        values.insert(Value::String(key.to_string()), value);
        if persist && let Some(path) = &self.path {
            Self::save(path, &values)?;
        }
        Ok(())
    }

    fn base_dir(&self) -> Option<PathBuf> {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
    }
}
