/*
 *  display/mod.rs
 *
 *  calsign - calibration signage
 *  (c) 2020-26 Stuart Hunter
 *
 *  Kiosk display: canvas state, update queue and the window loop
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

pub mod error;
pub mod manager;

#[cfg(feature = "window")]
pub mod window;

use log::{error, info};
use std::path::PathBuf;
use tokio::sync::mpsc::{error::TryRecvError, Receiver};

pub use error::DisplayError;
pub use manager::{centered_offset, DisplayManager, Surface};

/// Requests sent to the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayCommand {
    Show(PathBuf),
}

/// Apply every queued command in arrival order without blocking.
/// Returns how many were taken off the queue.
pub fn apply_pending(display: &mut DisplayManager, rx: &mut Receiver<DisplayCommand>) -> usize {
    let mut taken = 0;
    loop {
        match rx.try_recv() {
            Ok(DisplayCommand::Show(path)) => {
                taken += 1;
                match display.show(&path) {
                    Ok(()) => info!("showing {}", path.display()),
                    Err(e) => error!("{e}"),
                }
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    taken
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use tiny_skia::Pixmap;
    use tokio::sync::mpsc;

    #[test]
    fn test_apply_pending_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for name in ["one.png", "two.png"] {
            let path = dir.path().join(name);
            Pixmap::new(2, 2).unwrap().save_png(&path).unwrap();
            paths.push(path);
        }
        let mut display = DisplayManager::new(8, 8, Rgb::BLACK, true).unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        tx.try_send(DisplayCommand::Show(paths[0].clone())).unwrap();
        tx.try_send(DisplayCommand::Show(dir.path().join("missing.png"))).unwrap();
        tx.try_send(DisplayCommand::Show(paths[1].clone())).unwrap();

        assert_eq!(apply_pending(&mut display, &mut rx), 3);
        assert_eq!(display.current_path(), Some(paths[1].as_path()));
        assert_eq!(apply_pending(&mut display, &mut rx), 0);

        drop(tx);
        assert_eq!(apply_pending(&mut display, &mut rx), 0);
    }
}
