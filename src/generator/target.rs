/*
 *  generator/target.rs
 *
 *  calsign - calibration signage
 *  (c) 2020-26 Stuart Hunter
 *
 *  embedded-graphics draw target scaled onto a pixmap
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

use core::convert::Infallible;
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::*;
use tiny_skia::Pixmap;

/// Draws each logical pixel as a `scale`x`scale` block, offset by `origin`.
///
/// Lets the built-in bitmap font render at roughly the configured size.
pub struct ScaledCanvas<'a> {
    pixmap: &'a mut Pixmap,
    origin: Point,
    scale: u32,
}

impl<'a> ScaledCanvas<'a> {
    pub fn new(pixmap: &'a mut Pixmap, origin: Point, scale: u32) -> Self {
        Self { pixmap, origin, scale: scale.max(1) }
    }

    /// Map a logical point to the top-left canvas pixel of its block.
    #[inline]
    fn to_canvas(&self, p: Point) -> Point {
        self.origin + p * self.scale as i32
    }

    fn put_block(&mut self, top_left: Point, c: Rgb888) {
        let (w, h) = (self.pixmap.width() as i32, self.pixmap.height() as i32);
        let stride = w as usize;
        let s = self.scale as i32;
        let data = self.pixmap.data_mut();
        for y in top_left.y.max(0)..(top_left.y + s).min(h) {
            for x in top_left.x.max(0)..(top_left.x + s).min(w) {
                let i = (y as usize * stride + x as usize) * 4;
                data[i..i + 4].copy_from_slice(&[c.r(), c.g(), c.b(), 255]);
            }
        }
    }
}

impl OriginDimensions for ScaledCanvas<'_> {
    fn size(&self) -> Size {
        let free_w = (self.pixmap.width() as i32 - self.origin.x).max(0) as u32;
        let free_h = (self.pixmap.height() as i32 - self.origin.y).max(0) as u32;
        Size::new(free_w / self.scale, free_h / self.scale)
    }
}

impl DrawTarget for ScaledCanvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            let at = self.to_canvas(p);
            self.put_block(at, c);
        }
        Ok(())
    }
}
