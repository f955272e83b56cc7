/*
 *  display/window.rs
 *
 *  calsign - calibration signage
 *  (c) 2020-26 Stuart Hunter
 *
 *  Kiosk window management
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

use log::{debug, error, info};
use pixels::{Pixels, SurfaceTexture};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::Receiver;
use winit::{
    dpi::LogicalSize,
    event::{Event, StartCause, VirtualKeyCode},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder},
    window::{Fullscreen, WindowBuilder},
};
use winit_input_helper::WinitInputHelper;

use crate::constants::CANVAS_BACKGROUND;
use crate::display::{apply_pending, DisplayCommand, DisplayError, DisplayManager};

/// Events injected into the UI loop from other threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEvent {
    Shutdown,
}

/// Kiosk window configuration
#[derive(Debug, Clone)]
pub struct KioskOptions {
    pub title: String,

    /// Start borderless fullscreen on the current monitor
    pub fullscreen: bool,

    /// How often queued display updates are applied
    pub tick: Duration,

    /// Shown immediately, before the first tick
    pub initial_image: Option<PathBuf>,
}

pub fn event_loop() -> EventLoop<UserEvent> {
    EventLoopBuilder::with_user_event().build()
}

/// Open the window and run the UI loop until shutdown. Never returns on success.
///
/// `on_shutdown` runs once, on the UI thread, as the loop is torn down.
pub fn run<F>(
    event_loop: EventLoop<UserEvent>,
    options: KioskOptions,
    mut updates: Receiver<DisplayCommand>,
    on_shutdown: F,
) -> Result<(), DisplayError>
where
    F: FnOnce() + 'static,
{
    let builder = WindowBuilder::new().with_title(&options.title);
    let builder = if options.fullscreen {
        builder.with_fullscreen(Some(Fullscreen::Borderless(None)))
    } else {
        builder.with_inner_size(LogicalSize::new(1280.0, 720.0))
    };
    let window = builder
        .build(&event_loop)
        .map_err(|e| DisplayError::Window(e.to_string()))?;

    let size = window.inner_size();
    let (width, height) = (size.width.max(1), size.height.max(1));
    let mut display = DisplayManager::new(width, height, CANVAS_BACKGROUND, options.fullscreen)?;
    if let Some(initial) = &options.initial_image {
        if let Err(e) = display.show(initial) {
            error!("{e}");
        }
    }

    let surface_texture = SurfaceTexture::new(width, height, &window);
    let mut pixels = Pixels::new(width, height, surface_texture)
        .map_err(|e| DisplayError::Window(e.to_string()))?;

    let mut input = WinitInputHelper::new();
    let mut on_shutdown = Some(on_shutdown);
    let tick = options.tick;
    info!("kiosk window {}x{} (fullscreen: {})", width, height, options.fullscreen);

    event_loop.run(move |event, _, control_flow| {
        match &event {
            Event::NewEvents(StartCause::Init) | Event::NewEvents(StartCause::ResumeTimeReached { .. }) => {
                apply_pending(&mut display, &mut updates);
                control_flow.set_wait_until(Instant::now() + tick);
            }
            Event::UserEvent(UserEvent::Shutdown) => {
                info!("shutdown requested");
                control_flow.set_exit();
            }
            Event::RedrawRequested(_) => {
                let frame = pixels.frame_mut();
                if frame.len() == display.frame().len() {
                    frame.copy_from_slice(display.frame());
                }
                if let Err(err) = pixels.render() {
                    error!("pixels.render() failed: {}", err);
                    control_flow.set_exit();
                    return;
                }
            }
            Event::LoopDestroyed => {
                if let Some(hook) = on_shutdown.take() {
                    hook();
                }
                return;
            }
            _ => {}
        }

        if input.update(&event) {
            if input.close_requested() || input.destroyed() {
                control_flow.set_exit();
                return;
            }

            if input.key_pressed(VirtualKeyCode::Escape) && display.exit_fullscreen() {
                debug!("leaving fullscreen");
                window.set_fullscreen(None);
            }

            if let Some(size) = input.window_resized() {
                if size.width > 0 && size.height > 0 {
                    let resized = pixels
                        .resize_surface(size.width, size.height)
                        .and_then(|_| pixels.resize_buffer(size.width, size.height));
                    if let Err(err) = resized {
                        error!("resize failed: {}", err);
                        control_flow.set_exit();
                        return;
                    }
                    if let Err(err) = display.on_resize(size.width, size.height) {
                        error!("{err}");
                    }
                }
            }

            if display.take_redraw() {
                window.request_redraw();
            }
        }
    });
}
