/*
 *  generator/layout.rs
 *
 *  calsign - calibration signage
 *  (c) 2020-26 Stuart Hunter
 *
 *  Placement of the two calibration rectangles
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

use tiny_skia::Rect;

use crate::config::Config;

/// Axis-aligned bar in canvas pixels, top-left anchored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bar {
    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// None for an empty bar (zero width or height).
    pub fn to_rect(&self) -> Option<Rect> {
        Rect::from_xywh(self.x, self.y, self.width, self.height)
    }
}

/// Short rectangle stacked flush above the long one.
///
/// Both share the horizontal center `mid_x + transpose_x`. The pair is
/// centered on `mid_y + transpose_y`, so the short bar's bottom edge is the
/// long bar's top edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationLayout {
    pub short: Bar,
    pub long: Bar,
}

impl CalibrationLayout {
    pub fn compute(config: &Config, short_cm: f32, long_cm: f32) -> Self {
        let ppc = config.px_per_cm;
        let (w, h) = config.image_size;
        let cx = w as f32 / 2.0 + config.transpose_x;
        let cy = h as f32 / 2.0 + config.transpose_y;

        let short_w = short_cm * ppc;
        let long_w = long_cm * ppc;
        let short_h = config.short_rectangle_height * ppc;
        let long_h = config.long_rectangle_height * ppc;
        let top = cy - (short_h + long_h) / 2.0;
        let short = Bar { x: cx - short_w / 2.0, y: top, width: short_w, height: short_h };
        let long = Bar { x: cx - long_w / 2.0, y: short.bottom(), width: long_w, height: long_h };
        Self { short, long }
    }

    /// Vertical midpoint of the combined span of both bars.
    pub fn span_center_y(&self) -> f32 {
        (self.short.y + self.long.bottom()) / 2.0
    }

    pub fn bars(&self) -> [Bar; 2] {
        [self.short, self.long]
    }
}
