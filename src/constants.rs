//! This module contains global constants used across the generator, display and watcher.

use crate::color::Rgb;

/// Reserved diagnostic codes and their fixed label text.
/// These are always displayable, whatever the configuration holds.
pub const RESERVED_CODES: [(&str, &str); 2] = [
    ("DEBUG1", "Read Error"),
    ("DEBUG2", "100x100 mm"),
];

/// Background used for reserved diagnostic codes.
pub const ALERT_COLOR: Rgb = Rgb::RED;

/// Rectangle width (cm) used for a reserved code that has no `images` entry.
pub const RESERVED_WIDTH_CM: f32 = 10.0;

/// Label anchor, top-left corner with some padding.
pub const TEXT_PADDING_X: i32 = 50;
pub const TEXT_PADDING_Y: i32 = 50;

/// Cache entries are `<code>.<IMAGE_EXTENSION>`.
pub const IMAGE_EXTENSION: &str = "png";

/// Kiosk canvas fill behind the centered image.
pub const CANVAS_BACKGROUND: Rgb = Rgb::BLACK;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_DATA_FILE: &str = "Camera_Data.txt";
pub const DEFAULT_CACHE_DIR: &str = "images";

/// Minimum interval between accepted sensor events.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;
/// UI loop wake-up period; pending display requests are drained once per tick.
pub const DEFAULT_TICK_MS: u64 = 100;

/// Bounded queue between notify's thread and the watcher worker.
pub const WATCH_QUEUE_DEPTH: usize = 64;
/// Bounded queue between the watcher worker and the UI loop.
pub const DISPLAY_QUEUE_DEPTH: usize = 16;

/// Returns the fixed label for a reserved diagnostic code.
pub fn reserved_text(code: &str) -> Option<&'static str> {
    RESERVED_CODES
        .iter()
        .find(|(reserved, _)| *reserved == code)
        .map(|(_, text)| *text)
}

pub fn is_reserved(code: &str) -> bool {
    reserved_text(code).is_some()
}
