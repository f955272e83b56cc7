/*
 *  generator/mod.rs
 *
 *  calsign - calibration signage
 *  (c) 2020-26 Stuart Hunter
 *
 *  Calibration image rendering and the on-disk PNG cache
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

pub mod font;
pub mod layout;
pub mod target;

use log::{debug, error, info};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tiny_skia::{Paint, Pixmap, Transform};

use crate::config::Config;
use crate::constants::{self, ALERT_COLOR, IMAGE_EXTENSION, TEXT_PADDING_X, TEXT_PADDING_Y};

pub use font::{FontError, FontStore, LabelFont};
pub use layout::{Bar, CalibrationLayout};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("unknown code '{0}'")]
    UnknownCode(String),
    #[error("cannot allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },
    #[error("PNG encode failed: {0}")]
    Encode(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders codes into images and keeps them under `cache_dir` as `<code>.png`.
pub struct ImageGenerator {
    cache_dir: PathBuf,
    fonts: FontStore,
}

impl ImageGenerator {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self { cache_dir: cache_dir.into(), fonts: FontStore::new() }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where the image for `code` lives. The file may not exist yet.
    pub fn path_for(&self, code: &str, config: &Config) -> Option<PathBuf> {
        config
            .is_known(code)
            .then(|| self.cache_dir.join(format!("{code}.{IMAGE_EXTENSION}")))
    }

    /// Draw the calibration image for `code`. Same inputs, same pixels.
    pub fn render(&self, code: &str, config: &Config) -> Result<Pixmap, GenerateError> {
        let unknown = || GenerateError::UnknownCode(code.to_string());
        let label = config.label_for(code).ok_or_else(unknown)?;
        let (short_cm, long_cm) = config.widths_for(code).ok_or_else(unknown)?;

        let (width, height) = config.image_size;
        let mut pixmap = Pixmap::new(width, height).ok_or(GenerateError::Canvas { width, height })?;

        let background = if constants::is_reserved(code) { ALERT_COLOR } else { config.background_color };
        pixmap.fill(background.to_skia());

        let mut paint = Paint::default();
        paint.set_color(config.rectangle_color.to_skia());
        paint.anti_alias = false;
        for bar in CalibrationLayout::compute(config, short_cm, long_cm).bars() {
            if let Some(rect) = bar.to_rect() {
                pixmap.fill_rect(rect, &paint, Transform::identity(), None);
            }
        }

        let font = self.fonts.label_font(&config.font_path);
        font::draw_label(
            &mut pixmap,
            &font,
            label,
            config.font_size,
            config.text_color,
            (TEXT_PADDING_X, TEXT_PADDING_Y),
        );
        Ok(pixmap)
    }

    /// Render and write `code` to its cache path, replacing any older file.
    pub fn persist(&self, code: &str, config: &Config) -> Result<PathBuf, GenerateError> {
        let path = self
            .path_for(code, config)
            .ok_or_else(|| GenerateError::UnknownCode(code.to_string()))?;
        let png = self
            .render(code, config)?
            .encode_png()
            .map_err(|e| GenerateError::Encode(e.to_string()))?;

        fs::create_dir_all(&self.cache_dir)?;
        // write aside then rename so the display never decodes a partial file
        let tmp = path.with_extension(format!("{IMAGE_EXTENSION}.tmp"));
        fs::write(&tmp, &png)?;
        fs::rename(&tmp, &path)?;
        debug!("wrote {}", path.display());
        Ok(path)
    }

    /// Remove every cached image and make sure the directory exists.
    pub fn reset_cache(&self) -> Result<(), GenerateError> {
        if self.cache_dir.is_dir() {
            for entry in fs::read_dir(&self.cache_dir)? {
                let path = entry?.path();
                let cached = path
                    .extension()
                    .is_some_and(|ext| ext == IMAGE_EXTENSION || ext == "tmp");
                if cached && path.is_file() {
                    fs::remove_file(&path)?;
                }
            }
        }
        fs::create_dir_all(&self.cache_dir)?;
        Ok(())
    }

    /// Persist every known code. Returns the codes written; failures are logged.
    pub fn pre_generate(&self, config: &Config) -> Vec<String> {
        let mut written = Vec::new();
        for code in config.codes() {
            match self.persist(&code, config) {
                Ok(_) => written.push(code),
                Err(e) => error!("could not generate image for '{code}': {e}"),
            }
        }
        info!("generated {} image(s) in {}", written.len(), self.cache_dir.display());
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::config::ImageSpec;

    fn config() -> Config {
        let mut cfg = Config {
            image_size: (320, 200),
            px_per_cm: 10.0,
            font_path: PathBuf::from("/nonexistent/font.ttf"),
            font_size: 20.0,
            ..Config::default()
        };
        cfg.images.insert(
            "A".to_string(),
            ImageSpec { text: "foo".to_string(), short_width: 10.0, long_width: 20.0 },
        );
        cfg
    }

    fn rgb_at(pixmap: &Pixmap, x: u32, y: u32) -> Rgb {
        let p = pixmap.pixel(x, y).unwrap();
        Rgb::new(p.red(), p.green(), p.blue())
    }

    #[test]
    fn test_render_is_deterministic() {
        let generator = ImageGenerator::new("unused");
        let a = generator.render("A", &config()).unwrap();
        let b = generator.render("A", &config()).unwrap();
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_unknown_code() {
        let generator = ImageGenerator::new("unused");
        assert!(matches!(generator.render("Z", &config()), Err(GenerateError::UnknownCode(_))));
        assert!(generator.path_for("Z", &config()).is_none());
    }

    #[test]
    fn test_rectangles_and_background() {
        let cfg = Config { rectangle_color: Rgb::new(0, 255, 0), ..config() };
        let pixmap = ImageGenerator::new("unused").render("A", &cfg).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (320, 200));
        // short bar spans x 110..210, y 90..100; long bar x 60..260, y 100..110
        assert_eq!(rgb_at(&pixmap, 160, 95), Rgb::new(0, 255, 0));
        assert_eq!(rgb_at(&pixmap, 65, 105), Rgb::new(0, 255, 0));
        assert_eq!(rgb_at(&pixmap, 65, 95), Rgb::BLACK);
        assert_eq!(rgb_at(&pixmap, 319, 199), Rgb::BLACK);
    }

    #[test]
    fn test_reserved_code_uses_alert_background() {
        let pixmap = ImageGenerator::new("unused").render("DEBUG1", &config()).unwrap();
        assert_eq!(rgb_at(&pixmap, 319, 199), ALERT_COLOR);
        assert_eq!(rgb_at(&pixmap, 0, 0), ALERT_COLOR);
    }

    #[test]
    fn test_label_drawn_inside_padding() {
        let cfg = Config { text_color: Rgb::new(0, 0, 255), ..config() };
        let pixmap = ImageGenerator::new("unused").render("A", &cfg).unwrap();
        let blue = |x, y| rgb_at(&pixmap, x, y) == Rgb::new(0, 0, 255);
        assert!((50..90).any(|y| (50..90).any(|x| blue(x, y))));
        assert!(!(0..50).any(|y| (0..320).any(|x| blue(x, y))));
    }

    #[test]
    fn test_persist_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("images");
        let generator = ImageGenerator::new(&cache);
        let path = generator.persist("A", &config()).unwrap();
        assert_eq!(path, cache.join("A.png"));
        let decoded = Pixmap::decode_png(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(decoded.data(), generator.render("A", &config()).unwrap().data());

        fs::write(cache.join("notes.txt"), "keep").unwrap();
        generator.reset_cache().unwrap();
        assert!(!path.exists());
        assert!(cache.join("notes.txt").exists());
    }

    #[test]
    fn test_pre_generate_covers_reserved_codes() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ImageGenerator::new(dir.path());
        let written = generator.pre_generate(&config());
        assert_eq!(written, vec!["A", "DEBUG1", "DEBUG2"]);
        for code in &written {
            assert!(dir.path().join(format!("{code}.png")).is_file());
        }
    }
}
