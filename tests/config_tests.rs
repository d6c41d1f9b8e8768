use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use pidash::config::{
    self, CacheSettings, ConfigStore, CropMode, DisplaySettings, EnhancementSettings,
    Orientation, YamlConfigStore, keys,
};
use pidash::ValidationError;
use serde_yaml::Value;
use tempfile::tempdir;

fn store_from_yaml(yaml: &str) -> (tempfile::TempDir, YamlConfigStore) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, yaml).unwrap();
    let store = YamlConfigStore::load(&path).unwrap();
    (dir, store)
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let store = YamlConfigStore::load(&dir.path().join("absent.yaml")).unwrap();
    assert_eq!(config::refresh_interval(&store), Duration::from_secs(900));
    assert_eq!(DisplaySettings::load(&store), DisplaySettings::default());
    assert_eq!(CacheSettings::load(&store), CacheSettings::default());
    assert_eq!(config::image_folder(&store), dir.path().join("images"));
}

#[test]
fn parse_kebab_case_config() {
    let (_dir, store) = store_from_yaml(
        r#"
image-folder: "/srv/pidash/images"
refresh-interval: 120
orientation: portrait
portrait-rotation: 270
crop-mode: keep-width
inverted-image: true
resolution: [600, 448]
image-settings:
  brightness: 1.2
  sharpness: 0.5
cache:
  capacity: 3
  ttl: 90s
"#,
    );
    assert_eq!(config::image_folder(&store), PathBuf::from("/srv/pidash/images"));
    assert_eq!(config::refresh_interval(&store), Duration::from_secs(120));

    let display = DisplaySettings::load(&store);
    assert_eq!(display.orientation, Orientation::Portrait);
    assert_eq!(display.portrait_rotation, 270);
    assert_eq!(display.crop_mode, CropMode::KeepWidth);
    assert!(display.inverted);
    assert_eq!(display.resolution, Some((600, 448)));
    assert!((display.enhancement.brightness - 1.2).abs() < f32::EPSILON);
    assert!((display.enhancement.contrast - 1.0).abs() < f32::EPSILON);
    assert!((display.enhancement.sharpness - 0.5).abs() < f32::EPSILON);

    let cache = CacheSettings::load(&store);
    assert_eq!(cache.capacity, 3);
    assert_eq!(cache.ttl, Duration::from_secs(90));
}

#[test]
fn relative_image_folder_resolves_against_config_dir() {
    let (dir, store) = store_from_yaml("image-folder: pictures\n");
    assert_eq!(config::image_folder(&store), dir.path().join("pictures"));
}

#[test]
fn unparsable_config_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "refresh-interval: [unclosed\n").unwrap();
    assert!(YamlConfigStore::load(&path).is_err());
}

#[test]
fn out_of_range_image_settings_are_clamped_on_read() {
    let (_dir, store) = store_from_yaml(
        r#"
image-settings:
  brightness: 3.5
  contrast: -1.0
"#,
    );
    let display = DisplaySettings::load(&store);
    assert!((display.enhancement.brightness - 2.0).abs() < f32::EPSILON);
    assert!(display.enhancement.contrast.abs() < f32::EPSILON);
}

#[test]
fn malformed_optional_values_fall_back_to_defaults() {
    let (_dir, store) = store_from_yaml(
        r#"
orientation: sideways
inverted-image: "maybe"
refresh-interval: soon
"#,
    );
    let display = DisplaySettings::load(&store);
    assert_eq!(display.orientation, Orientation::Landscape);
    assert!(!display.inverted);
    assert_eq!(config::refresh_interval(&store), Duration::from_secs(900));
}

#[test]
fn persisted_set_survives_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "refresh-interval: 300\n").unwrap();

    let store = YamlConfigStore::load(&path).unwrap();
    store
        .set(keys::CURRENT_IMAGE_INDEX, Value::from(4_u64), true)
        .unwrap();
    store
        .set(keys::ORIENTATION, Value::from("portrait"), false)
        .unwrap();

    let reloaded = YamlConfigStore::load(&path).unwrap();
    assert_eq!(
        config::get_or(&reloaded, keys::CURRENT_IMAGE_INDEX, 0_u64),
        4
    );
    assert_eq!(config::refresh_interval(&reloaded), Duration::from_secs(300));
    // Persisting writes the whole mapping, including unpersisted edits made earlier.
    assert_eq!(
        DisplaySettings::load(&reloaded).orientation,
        Orientation::Portrait
    );
    assert!(!path.with_extension("yaml.tmp").exists());
}

#[test]
fn in_memory_store_never_touches_disk() {
    let store = YamlConfigStore::in_memory();
    assert!(store.path().is_none());
    assert!(store.base_dir().is_none());
    store
        .set(keys::REFRESH_INTERVAL, Value::from(60_u64), true)
        .unwrap();
    assert_eq!(config::refresh_interval(&store), Duration::from_secs(60));
}

#[test]
fn orientation_validation_trims_and_ignores_case() {
    assert_eq!(config::validate_orientation("  Portrait "), Ok(Orientation::Portrait));
    assert_eq!(config::validate_orientation("LANDSCAPE"), Ok(Orientation::Landscape));
    assert_eq!(
        config::validate_orientation("   "),
        Err(ValidationError::EmptyOrientation)
    );
    assert!(matches!(
        config::validate_orientation("diagonal"),
        Err(ValidationError::Orientation(_))
    ));
}

#[test]
fn refresh_interval_validation_bounds() {
    assert_eq!(
        config::validate_refresh_interval(59),
        Err(ValidationError::IntervalTooSmall { min: 60 })
    );
    assert_eq!(
        config::validate_refresh_interval(86_401),
        Err(ValidationError::IntervalTooLarge { max: 86_400 })
    );
    assert_eq!(
        config::validate_refresh_interval(60),
        Ok(Duration::from_secs(60))
    );
    assert_eq!(
        config::validate_refresh_interval(86_400),
        Ok(Duration::from_secs(86_400))
    );
}

#[test]
fn enhancement_input_outside_range_is_rejected() {
    assert!(EnhancementSettings::try_new(1.0, 1.0, 1.0, 1.0).unwrap().is_identity());
    assert_eq!(
        EnhancementSettings::try_new(1.0, 2.5, 1.0, 1.0),
        Err(ValidationError::Enhancement {
            setting: "contrast",
            value: 2.5
        })
    );
    assert!(EnhancementSettings::try_new(-0.1, 1.0, 1.0, 1.0).is_err());
    assert!(EnhancementSettings::try_new(0.0, 2.0, 0.0, 2.0).is_ok());
}

#[test]
fn error_backoff_defaults_and_parses_humantime() {
    let store = YamlConfigStore::in_memory();
    assert_eq!(config::error_backoff(&store), Duration::from_secs(10));
    store
        .set(keys::ERROR_BACKOFF, Value::from("250ms"), false)
        .unwrap();
    assert_eq!(config::error_backoff(&store), Duration::from_millis(250));
    store
        .set(keys::ERROR_BACKOFF, Value::from("whenever"), false)
        .unwrap();
    assert_eq!(config::error_backoff(&store), Duration::from_secs(10));
}
