/*
 *  display/manager.rs
 *
 *  calsign - calibration signage
 *  (c) 2020-26 Stuart Hunter
 *
 *  Single-image kiosk canvas: holds, centers and re-centers the shown image
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

use log::debug;
use std::path::{Path, PathBuf};
use tiny_skia::{Pixmap, PixmapPaint, Transform};

use crate::color::Rgb;
use crate::display::error::DisplayError;

/// Decoded image currently on screen.
pub struct ShownImage {
    path: PathBuf,
    pixmap: Pixmap,
}

impl ShownImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }
}

pub enum Surface {
    Empty,
    Showing(ShownImage),
}

/// Top-left anchor that centers `image` on `canvas`. Floors toward negative
/// infinity, so an oversized image gets a negative offset and is clipped.
pub fn centered_offset(canvas: (u32, u32), image: (u32, u32)) -> (i32, i32) {
    let axis = |c: u32, i: u32| (c as i64 - i as i64).div_euclid(2) as i32;
    (axis(canvas.0, image.0), axis(canvas.1, image.1))
}

/// Owns the composed frame. At most one image is retained at any time.
pub struct DisplayManager {
    surface: Surface,
    canvas: Pixmap,
    background: Rgb,
    fullscreen: bool,
    offset: Option<(i32, i32)>,
    dirty: bool,
}

impl DisplayManager {
    pub fn new(width: u32, height: u32, background: Rgb, fullscreen: bool) -> Result<Self, DisplayError> {
        let canvas = Pixmap::new(width, height).ok_or(DisplayError::Canvas { width, height })?;
        let mut manager = Self {
            surface: Surface::Empty,
            canvas,
            background,
            fullscreen,
            offset: None,
            dirty: true,
        };
        manager.center();
        Ok(manager)
    }

    /// Decode `path` and make it the only visible image. On failure the
    /// previous image stays up.
    pub fn show(&mut self, path: &Path) -> Result<(), DisplayError> {
        let bytes = std::fs::read(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => DisplayError::NotFound(path.to_path_buf()),
            _ => DisplayError::Io { path: path.to_path_buf(), source },
        })?;
        let pixmap = Pixmap::decode_png(&bytes).map_err(|e| DisplayError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        // the old image is dropped here, before anything is drawn
        self.surface = Surface::Showing(ShownImage { path: path.to_path_buf(), pixmap });
        self.center();
        Ok(())
    }

    /// Clear to the background and draw the current image centered.
    pub fn center(&mut self) {
        self.canvas.fill(self.background.to_skia());
        self.offset = match &self.surface {
            Surface::Empty => None,
            Surface::Showing(image) => {
                let (x, y) = centered_offset(self.canvas_size(), image.size());
                self.canvas.draw_pixmap(
                    x,
                    y,
                    image.pixmap.as_ref(),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
                Some((x, y))
            }
        };
        self.dirty = true;
    }

    /// New canvas size; the image already in memory is re-centered.
    /// A zero-sized canvas (minimized window) is ignored.
    pub fn on_resize(&mut self, width: u32, height: u32) -> Result<(), DisplayError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        if (width, height) != self.canvas_size() {
            self.canvas = Pixmap::new(width, height).ok_or(DisplayError::Canvas { width, height })?;
            debug!("canvas resized to {width}x{height}");
        }
        self.center();
        Ok(())
    }

    /// Leave fullscreen. Returns true only when the mode actually changed.
    pub fn exit_fullscreen(&mut self) -> bool {
        std::mem::replace(&mut self.fullscreen, false)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        (self.canvas.width(), self.canvas.height())
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }

    /// RGBA bytes of the composed frame, row-major.
    pub fn frame(&self) -> &[u8] {
        self.canvas.data()
    }

    pub fn current_path(&self) -> Option<&Path> {
        match &self.surface {
            Surface::Empty => None,
            Surface::Showing(image) => Some(image.path()),
        }
    }

    pub fn offset(&self) -> Option<(i32, i32)> {
        self.offset
    }

    /// True once after every change to the frame.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}
