/*
 *  config.rs
 *
 *  calsign - calibration signage
 *  (c) 2020-26 Stuart Hunter
 *
 *  Command line, JSON configuration file and the shared config snapshot
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

use crate::color::Rgb;
use crate::constants::{self, RESERVED_CODES, RESERVED_WIDTH_CM};

/// Largest canvas edge we are willing to allocate.
const MAX_IMAGE_EDGE: u32 = 16_384;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config file not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// CLI options.
#[derive(Debug, Parser, Clone)]
#[command(name = "calsign", version, about = "Fullscreen calibration signage driven by a sensor code file")]
pub struct Cli {
    /// Path to the JSON config file (overrides search)
    #[arg(short = 'c', long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Sensor data file; its trimmed content is the code to display
    #[arg(short = 'd', long, default_value = constants::DEFAULT_DATA_FILE, value_hint = ValueHint::FilePath)]
    pub data_file: PathBuf,
    /// Directory holding the generated images
    #[arg(long, default_value = constants::DEFAULT_CACHE_DIR, value_hint = ValueHint::DirPath)]
    pub cache_dir: PathBuf,
    /// Minimum interval between accepted sensor updates
    #[arg(long, default_value_t = constants::DEFAULT_DEBOUNCE_MS)]
    pub debounce_ms: u64,
    /// UI tick; pending display updates are applied once per tick
    #[arg(long, default_value_t = constants::DEFAULT_TICK_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,
    /// Code shown at startup (first configured code otherwise)
    #[arg(short = 'i', long)]
    pub initial_code: Option<String>,
    /// Run in a window instead of fullscreen
    #[arg(long, action = ArgAction::SetTrue)]
    pub windowed: bool,
    /// Enable debug log level
    #[arg(short = 'v', long = "debug", alias = "verbose", action = ArgAction::SetTrue)]
    pub debug: bool,
    /// Append log output to this file instead of stderr
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,
    /// dump the effective config (after defaults) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Per-code calibration pattern. Widths are in centimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSpec {
    /// Reserved codes draw fixed text, so their entries may leave it out
    #[serde(default)]
    pub text: String,
    pub short_width: f32,
    pub long_width: f32,
}

/// The configuration file as written on disk. Every field is optional so the
/// same shape serves as the startup layer over defaults and as a reload patch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub images: Option<BTreeMap<String, ImageSpec>>,
    pub short_rectangle_height: Option<f32>,
    pub long_rectangle_height: Option<f32>,
    pub font_size: Option<f32>,
    pub font_path: Option<PathBuf>,
    pub image_size: Option<(u32, u32)>,
    pub background_color: Option<Rgb>,
    pub text_color: Option<Rgb>,
    pub rectangle_color: Option<Rgb>,
    pub px_per_cm: Option<f32>,
    pub height_shift: Option<f32>,
    pub transpose_x: Option<f32>,
    pub transpose_y: Option<f32>,
}

impl ConfigFile {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path)?;
        Self::parse(&s)
    }

    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Validated, immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub images: BTreeMap<String, ImageSpec>,
    /// cm
    pub short_rectangle_height: f32,
    /// cm
    pub long_rectangle_height: f32,
    pub font_size: f32,
    pub font_path: PathBuf,
    /// (width, height) in pixels
    pub image_size: (u32, u32),
    pub background_color: Rgb,
    pub text_color: Rgb,
    pub rectangle_color: Rgb,
    pub px_per_cm: f32,
    /// Accepted for compatibility with existing files; the rectangles are
    /// always stacked flush and this value does not move them
    pub height_shift: f32,
    pub transpose_x: f32,
    pub transpose_y: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            images: BTreeMap::new(),
            short_rectangle_height: 1.0,
            long_rectangle_height: 1.0,
            font_size: 48.0,
            font_path: PathBuf::from("arial.ttf"),
            image_size: (1920, 1080),
            background_color: Rgb::BLACK,
            text_color: Rgb::WHITE,
            rectangle_color: Rgb::WHITE,
            px_per_cm: 10.0,
            height_shift: 200.0,
            transpose_x: 0.0,
            transpose_y: 0.0,
        }
    }
}

impl Config {
    /// Defaults overlaid with the file, validated.
    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        Config::default().merged(file)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_file(ConfigFile::read(path)?)
    }

    /// Returns a new snapshot with `patch` merged over `self`.
    ///
    /// Fields present in the patch override; absent fields keep their current
    /// value. `images` merges per code: a code in the patch replaces that
    /// code's entry, codes missing from the patch are kept. The result is
    /// validated as a whole and `self` is never touched.
    pub fn merged(&self, patch: ConfigFile) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        merge(&mut next, patch);
        next.validate()?;
        Ok(next)
    }

    /// Reserved codes are always known.
    pub fn is_known(&self, code: &str) -> bool {
        constants::is_reserved(code) || self.images.contains_key(code)
    }

    /// Label drawn for `code`; reserved codes ignore the configured text.
    pub fn label_for(&self, code: &str) -> Option<&str> {
        constants::reserved_text(code).or_else(|| self.images.get(code).map(|spec| spec.text.as_str()))
    }

    /// (short, long) widths in cm.
    pub fn widths_for(&self, code: &str) -> Option<(f32, f32)> {
        match self.images.get(code) {
            Some(spec) => Some((spec.short_width, spec.long_width)),
            None if constants::is_reserved(code) => Some((RESERVED_WIDTH_CM, RESERVED_WIDTH_CM)),
            None => None,
        }
    }

    /// Configured codes followed by any reserved code not configured.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.images.keys().cloned().collect();
        for (reserved, _) in RESERVED_CODES {
            if !self.images.contains_key(reserved) {
                codes.push(reserved.to_string());
            }
        }
        codes
    }

    /// Put any invariants here (required fields, ranges, etc.)
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (w, h) = self.image_size;
        if w == 0 || h == 0 || w > MAX_IMAGE_EDGE || h > MAX_IMAGE_EDGE {
            return Err(ConfigError::Validation(format!(
                "image_size must be within 1..={MAX_IMAGE_EDGE}, got [{w}, {h}]"
            )));
        }
        positive("px_per_cm", self.px_per_cm)?;
        positive("font_size", self.font_size)?;
        if self.font_size > MAX_IMAGE_EDGE as f32 {
            return Err(ConfigError::Validation(format!(
                "font_size must be <= {MAX_IMAGE_EDGE}, got {}",
                self.font_size
            )));
        }
        non_negative("short_rectangle_height", self.short_rectangle_height)?;
        non_negative("long_rectangle_height", self.long_rectangle_height)?;
        finite("height_shift", self.height_shift)?;
        finite("transpose_x", self.transpose_x)?;
        finite("transpose_y", self.transpose_y)?;

        for (code, spec) in &self.images {
            if !is_valid_code(code) {
                return Err(ConfigError::Validation(format!(
                    "image code '{code}' cannot be used as a file name"
                )));
            }
            non_negative(&format!("images.{code}.short_width"), spec.short_width)?;
            non_negative(&format!("images.{code}.long_width"), spec.long_width)?;
        }
        Ok(())
    }
}

/// Codes double as cache file stems.
pub fn is_valid_code(code: &str) -> bool {
    !code.is_empty()
        && code != "."
        && code != ".."
        && !code.contains(['/', '\\', '\0'])
}

fn finite(name: &str, v: f32) -> Result<(), ConfigError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{name} must be a finite number")))
    }
}

fn positive(name: &str, v: f32) -> Result<(), ConfigError> {
    finite(name, v)?;
    if v > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{name} must be > 0, got {v}")))
    }
}

fn non_negative(name: &str, v: f32) -> Result<(), ConfigError> {
    finite(name, v)?;
    if v >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{name} must be >= 0, got {v}")))
    }
}

/// Merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: ConfigFile) {
    if let Some(images) = src.images {
        dst.images.extend(images);
    }
    if let Some(v) = src.short_rectangle_height { dst.short_rectangle_height = v; }
    if let Some(v) = src.long_rectangle_height  { dst.long_rectangle_height = v; }
    if let Some(v) = src.font_size              { dst.font_size = v; }
    if let Some(v) = src.font_path              { dst.font_path = v; }
    if let Some(v) = src.image_size             { dst.image_size = v; }
    if let Some(v) = src.background_color       { dst.background_color = v; }
    if let Some(v) = src.text_color             { dst.text_color = v; }
    if let Some(v) = src.rectangle_color        { dst.rectangle_color = v; }
    if let Some(v) = src.px_per_cm              { dst.px_per_cm = v; }
    if let Some(v) = src.height_shift           { dst.height_shift = v; }
    if let Some(v) = src.transpose_x            { dst.transpose_x = v; }
    if let Some(v) = src.transpose_y            { dst.transpose_y = v; }
}

/// Try common locations in order (first hit wins).
pub fn find_config_file() -> Option<PathBuf> {
    // project local
    let local = PathBuf::from(constants::DEFAULT_CONFIG_FILE);
    if local.exists() { return Some(local) }
    // XDG-style: ~/.config/calsign/config.json
    if let Some(home) = home_dir() {
        for candidate in &[".config/calsign/config.json", ".config/calsign.json"] {
            let p = home.join(candidate);
            if p.exists() { return Some(p) }
        }
    }
    None
}

/// An explicit path must exist; otherwise the search locations are tried.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(p) if p.exists() => Ok(p.to_path_buf()),
        Some(p) => Err(ConfigError::NotFound(p.display().to_string())),
        None => find_config_file()
            .ok_or_else(|| ConfigError::NotFound(constants::DEFAULT_CONFIG_FILE.to_string())),
    }
}

/// Holder of the current snapshot, shared between startup and the watcher.
///
/// Readers get an `Arc<Config>` they keep for the whole render; a reload
/// swaps in a complete new snapshot and never mutates the old one.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    current: Arc<RwLock<Arc<Config>>>,
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        Self { current: Arc::new(RwLock::new(Arc::new(config))) }
    }

    pub fn snapshot(&self) -> Arc<Config> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn publish(&self, config: Config) {
        let next = Arc::new(config);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(text: &str, short: f32, long: f32) -> ImageSpec {
        ImageSpec { text: text.to_string(), short_width: short, long_width: long }
    }

    #[test]
    fn test_defaults_applied_for_missing_fields() {
        let cfg = Config::from_file(ConfigFile::parse(r#"{"images": {}}"#).unwrap()).unwrap();
        assert_eq!(cfg.font_size, 48.0);
        assert_eq!(cfg.image_size, (1920, 1080));
        assert_eq!(cfg.background_color, Rgb::BLACK);
        assert_eq!(cfg.text_color, Rgb::WHITE);
        assert_eq!(cfg.px_per_cm, 10.0);
        assert_eq!(cfg.height_shift, 200.0);
    }

    #[test]
    fn test_full_file_parses() {
        let json = r##"{
            "images": {"A": {"text": "foo", "short_width": 10, "long_width": 20.5}},
            "short_rectangle_height": 2,
            "long_rectangle_height": 3,
            "font_size": 36,
            "font_path": "/usr/share/fonts/dejavu.ttf",
            "image_size": [800, 600],
            "background_color": "#101010",
            "text_color": "yellow",
            "rectangle_color": "white",
            "px_per_cm": 37.8,
            "height_shift": 12,
            "transpose_x": -5,
            "transpose_y": 7,
            "unrelated": true
        }"##;
        let cfg = Config::from_file(ConfigFile::parse(json).unwrap()).unwrap();
        assert_eq!(cfg.images["A"], spec("foo", 10.0, 20.5));
        assert_eq!(cfg.image_size, (800, 600));
        assert_eq!(cfg.background_color, Rgb::new(16, 16, 16));
        assert_eq!(cfg.text_color, Rgb::new(255, 255, 0));
        assert_eq!(cfg.transpose_x, -5.0);
        assert_eq!(cfg.font_path, PathBuf::from("/usr/share/fonts/dejavu.ttf"));
    }

    #[test]
    fn test_merge_keeps_codes_absent_from_patch() {
        let base = Config::from_file(
            ConfigFile::parse(r#"{"images": {"A": {"text": "foo", "short_width": 1, "long_width": 2}}}"#).unwrap(),
        )
        .unwrap();
        let merged = base
            .merged(ConfigFile::parse(r#"{"images": {"B": {"text": "bar", "short_width": 3, "long_width": 4}}}"#).unwrap())
            .unwrap();
        assert!(merged.is_known("A"));
        assert!(merged.is_known("B"));
        assert_eq!(merged.label_for("A"), Some("foo"));
        assert_eq!(merged.label_for("B"), Some("bar"));
        // the base snapshot is untouched
        assert!(!base.is_known("B"));
    }

    #[test]
    fn test_merge_replaces_whole_entry_and_scalars() {
        let base = Config::from_file(
            ConfigFile::parse(r#"{"images": {"A": {"text": "foo", "short_width": 1, "long_width": 2}}, "font_size": 20}"#)
                .unwrap(),
        )
        .unwrap();
        let merged = base
            .merged(
                ConfigFile::parse(r#"{"images": {"A": {"text": "baz", "short_width": 5, "long_width": 6}}, "px_per_cm": 4}"#)
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(merged.images["A"], spec("baz", 5.0, 6.0));
        assert_eq!(merged.px_per_cm, 4.0);
        assert_eq!(merged.font_size, 20.0);
    }

    #[test]
    fn test_invalid_merge_is_rejected() {
        let base = Config::default();
        let err = base.merged(ConfigFile::parse(r#"{"px_per_cm": 0}"#).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        let err = base.merged(ConfigFile::parse(r#"{"image_size": [0, 10]}"#).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_code_must_be_a_file_stem() {
        let patch = ConfigFile::parse(r#"{"images": {"../x": {"text": "t", "short_width": 1, "long_width": 1}}}"#).unwrap();
        assert!(Config::from_file(patch).is_err());
        assert!(is_valid_code("A-1_b"));
        assert!(!is_valid_code(""));
        assert!(!is_valid_code(".."));
        assert!(!is_valid_code("a/b"));
    }

    #[test]
    fn test_malformed_json_and_bad_color() {
        assert!(matches!(ConfigFile::parse("{not json"), Err(ConfigError::Json(_))));
        assert!(matches!(
            ConfigFile::parse(r#"{"background_color": "not-a-color"}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_reserved_codes_known_without_entry() {
        let cfg = Config::default();
        assert!(cfg.is_known("DEBUG1"));
        assert_eq!(cfg.label_for("DEBUG1"), Some("Read Error"));
        assert_eq!(cfg.label_for("DEBUG2"), Some("100x100 mm"));
        assert_eq!(cfg.widths_for("DEBUG2"), Some((RESERVED_WIDTH_CM, RESERVED_WIDTH_CM)));
        assert!(!cfg.is_known("nope"));
        assert_eq!(cfg.widths_for("nope"), None);
    }

    #[test]
    fn test_reserved_text_wins_over_configured_label() {
        let cfg = Config::from_file(
            ConfigFile::parse(r#"{"images": {"DEBUG1": {"text": "custom", "short_width": 3, "long_width": 4}}}"#).unwrap(),
        )
        .unwrap();
        assert_eq!(cfg.label_for("DEBUG1"), Some("Read Error"));
        assert_eq!(cfg.widths_for("DEBUG1"), Some((3.0, 4.0)));
        assert_eq!(cfg.codes(), vec!["DEBUG1".to_string(), "DEBUG2".to_string()]);
    }

    #[test]
    fn test_reserved_entry_needs_no_text() {
        let patch = ConfigFile::parse(
            r#"{"images": {"A": {"text": "foo", "short_width": 1, "long_width": 2},
                           "DEBUG1": {"short_width": 10, "long_width": 10}}}"#,
        )
        .unwrap();
        let cfg = Config::from_file(patch).unwrap();
        assert_eq!(cfg.label_for("DEBUG1"), Some("Read Error"));
        assert_eq!(cfg.widths_for("DEBUG1"), Some((10.0, 10.0)));
        assert_eq!(cfg.label_for("A"), Some("foo"));
    }

    #[test]
    fn test_font_size_is_bounded() {
        let base = Config::default();
        let err = base.merged(ConfigFile::parse(r#"{"font_size": 1e10}"#).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(base.merged(ConfigFile::parse(r#"{"font_size": 16384}"#).unwrap()).is_ok());
    }

    #[test]
    fn test_store_publishes_whole_snapshots() {
        let store = ConfigStore::new(Config::default());
        let before = store.snapshot();
        let mut next = Config::default();
        next.font_size = 12.0;
        store.publish(next);
        assert_eq!(before.font_size, 48.0);
        assert_eq!(store.snapshot().font_size, 12.0);
    }

    #[test]
    fn test_resolve_missing_explicit_path() {
        let err = resolve_config_path(Some(Path::new("/definitely/not/here.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
