/*
 *  generator/font.rs
 *
 *  calsign - calibration signage
 *  (c) 2020-26 Stuart Hunter
 *
 *  Label fonts: TrueType via rusttype, built-in bitmap fallback
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

use embedded_graphics::{
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    prelude::*,
    text::{Baseline, Text},
};
use log::{debug, warn};
use mini_moka::sync::Cache;
use rusttype::{point, Font, Scale};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tiny_skia::Pixmap;

use crate::color::Rgb;
use crate::generator::target::ScaledCanvas;

/// Cell height of the built-in font, used to scale it towards `font_size`.
const BUILTIN_HEIGHT: f32 = 20.0;

#[derive(Debug, Error)]
pub enum FontError {
    #[error("cannot read font {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not a usable TrueType/OpenType font")]
    Invalid(PathBuf),
}

#[derive(Clone)]
pub enum LabelFont {
    TrueType(Font<'static>),
    Builtin,
}

impl LabelFont {
    pub fn is_builtin(&self) -> bool {
        matches!(self, LabelFont::Builtin)
    }
}

/// Loaded fonts keyed by path; a reload naming the same font reuses it.
#[derive(Clone)]
pub struct FontStore {
    cache: Cache<PathBuf, Font<'static>>,
}

impl Default for FontStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FontStore {
    pub fn new() -> Self {
        Self { cache: Cache::new(8) }
    }

    pub fn load(&self, path: &Path) -> Result<Font<'static>, FontError> {
        let key = path.to_path_buf();
        if let Some(font) = self.cache.get(&key) {
            return Ok(font);
        }
        let bytes = std::fs::read(path).map_err(|source| FontError::Io { path: key.clone(), source })?;
        let font = Font::try_from_vec(bytes).ok_or_else(|| FontError::Invalid(key.clone()))?;
        debug!("loaded font {}", path.display());
        self.cache.insert(key, font.clone());
        Ok(font)
    }

    /// Never fails: an unusable font is reported and replaced by the built-in one.
    pub fn label_font(&self, path: &Path) -> LabelFont {
        match self.load(path) {
            Ok(font) => LabelFont::TrueType(font),
            Err(e) => {
                warn!("{e}; using built-in font");
                LabelFont::Builtin
            }
        }
    }
}

/// Draw `text` with its top-left corner at `origin`. Lines split on '\n'.
pub fn draw_label(pixmap: &mut Pixmap, font: &LabelFont, text: &str, size: f32, color: Rgb, origin: (i32, i32)) {
    match font {
        LabelFont::TrueType(f) => draw_truetype(pixmap, f, text, size, color, origin),
        LabelFont::Builtin => draw_builtin(pixmap, text, size, color, origin),
    }
}

fn draw_truetype(pixmap: &mut Pixmap, font: &Font<'static>, text: &str, size: f32, color: Rgb, origin: (i32, i32)) {
    let scale = Scale::uniform(size);
    let v_metrics = font.v_metrics(scale);
    let line_height = (v_metrics.ascent - v_metrics.descent + v_metrics.line_gap).ceil();
    let (width, height) = (pixmap.width() as i32, pixmap.height() as i32);
    let stride = pixmap.width() as usize;
    let data = pixmap.data_mut();

    for (n, line) in text.lines().enumerate() {
        let baseline = origin.1 as f32 + v_metrics.ascent + n as f32 * line_height;
        for glyph in font.layout(line, scale, point(origin.0 as f32, baseline)) {
            let Some(bb) = glyph.pixel_bounding_box() else { continue };
            glyph.draw(|gx, gy, coverage| {
                let px = bb.min.x + gx as i32;
                let py = bb.min.y + gy as i32;
                if px >= 0 && px < width && py >= 0 && py < height {
                    let i = (py as usize * stride + px as usize) * 4;
                    blend(&mut data[i..i + 4], color, coverage);
                }
            });
        }
    }
}

fn draw_builtin(pixmap: &mut Pixmap, text: &str, size: f32, color: Rgb, origin: (i32, i32)) {
    let scale = (size / BUILTIN_HEIGHT).round().max(1.0) as u32;
    let mut canvas = ScaledCanvas::new(pixmap, Point::new(origin.0, origin.1), scale);
    let style = MonoTextStyle::new(&FONT_10X20, color.to_rgb888());
    Text::with_baseline(text, Point::zero(), style, Baseline::Top)
        .draw(&mut canvas)
        .ok();
}

/// Coverage blend onto an opaque canvas pixel.
#[inline]
fn blend(px: &mut [u8], color: Rgb, coverage: f32) {
    let a = coverage.clamp(0.0, 1.0);
    for (dst, src) in px.iter_mut().zip([color.r, color.g, color.b]) {
        *dst = (src as f32 * a + *dst as f32 * (1.0 - a)).round() as u8;
    }
    px[3] = 255;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_colored(pixmap: &Pixmap, color: Rgb) -> usize {
        pixmap
            .pixels()
            .iter()
            .filter(|p| p.red() == color.r && p.green() == color.g && p.blue() == color.b)
            .count()
    }

    #[test]
    fn test_missing_font_is_io_error() {
        let store = FontStore::new();
        let err = store.load(Path::new("/no/such/font.ttf")).unwrap_err();
        assert!(matches!(err, FontError::Io { .. }));
        assert!(store.label_font(Path::new("/no/such/font.ttf")).is_builtin());
    }

    #[test]
    fn test_garbage_font_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"definitely not a font").unwrap();
        let err = FontStore::new().load(&path).unwrap_err();
        assert!(matches!(err, FontError::Invalid(_)));
    }

    #[test]
    fn test_builtin_text_lands_below_right_of_origin() {
        let mut pixmap = Pixmap::new(200, 120).unwrap();
        pixmap.fill(Rgb::BLACK.to_skia());
        draw_label(&mut pixmap, &LabelFont::Builtin, "AB\nC", 40.0, Rgb::WHITE, (50, 50));

        assert!(count_colored(&pixmap, Rgb::WHITE) > 0);
        for y in 0..120 {
            for x in 0..200 {
                if x < 50 || y < 50 {
                    assert_eq!(pixmap.pixel(x, y).unwrap().red(), 0, "ink at ({x},{y})");
                }
            }
        }
    }

    #[test]
    fn test_blend_extremes() {
        let mut px = [10, 20, 30, 255];
        blend(&mut px, Rgb::WHITE, 0.0);
        assert_eq!(px, [10, 20, 30, 255]);
        blend(&mut px, Rgb::WHITE, 1.0);
        assert_eq!(px, [255, 255, 255, 255]);
    }
}
