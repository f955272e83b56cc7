/*
 *  watcher/handler.rs
 *
 *  calsign - calibration signage
 *  (c) 2020-26 Stuart Hunter
 *
 *  Reactions to sensor and configuration file changes
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

use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{error::TrySendError, Sender};

use crate::config::{ConfigFile, ConfigStore};
use crate::display::DisplayCommand;
use crate::generator::ImageGenerator;
use crate::watcher::debounce::Debouncer;
use crate::watcher::{WatchEvent, WatchHandler, WatchTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorOutcome {
    /// Arrived inside the debounce window
    Debounced,
    /// File was empty, typically caught mid-write
    Empty,
    Recognized { code: String, path: PathBuf },
    Unrecognized(String),
    /// Read, render or hand-off to the display failed; already logged
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOutcome {
    /// Merged snapshot published; `changed` is false when the merge was a no-op
    Reloaded { changed: bool },
    /// Empty file, nothing to merge
    Ignored,
    /// Unreadable or invalid; previous snapshot kept
    Rejected,
}

/// Runs on the watcher worker thread. Owns the debounce state and talks to
/// the UI only through the display queue.
pub struct ChangeHandler {
    store: ConfigStore,
    generator: Arc<ImageGenerator>,
    debounce: Debouncer,
    display: Sender<DisplayCommand>,
    /// Codes whose cached image matches the current snapshot
    fresh: HashSet<String>,
}

impl ChangeHandler {
    pub fn new(
        store: ConfigStore,
        generator: Arc<ImageGenerator>,
        debounce: Duration,
        display: Sender<DisplayCommand>,
    ) -> Self {
        Self {
            store,
            generator,
            debounce: Debouncer::new(debounce),
            display,
            fresh: HashSet::new(),
        }
    }

    /// Mark codes already rendered against the current snapshot.
    pub fn with_fresh<I: IntoIterator<Item = String>>(mut self, codes: I) -> Self {
        self.fresh.extend(codes);
        self
    }

    pub fn on_sensor_change(&mut self, path: &Path, now: Instant) -> SensorOutcome {
        if !self.debounce.is_ready(now) {
            debug!("sensor update debounced");
            return SensorOutcome::Debounced;
        }
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                error!("cannot read {}: {e}", path.display());
                return SensorOutcome::Failed;
            }
        };
        let code = raw.trim();
        if code.is_empty() {
            debug!("{} is empty", path.display());
            return SensorOutcome::Empty;
        }
        self.debounce.stamp(now);

        let config = self.store.snapshot();
        let Some(image) = self.generator.path_for(code, &config) else {
            warn!("unrecognized code '{code}'");
            return SensorOutcome::Unrecognized(code.to_string());
        };
        info!("recognized code '{code}'");

        let image = if self.fresh.contains(code) && image.is_file() {
            image
        } else {
            match self.generator.persist(code, &config) {
                Ok(written) => {
                    self.fresh.insert(code.to_string());
                    written
                }
                Err(e) => {
                    error!("cannot generate image for '{code}': {e}");
                    return SensorOutcome::Failed;
                }
            }
        };

        match self.display.try_send(DisplayCommand::Show(image.clone())) {
            Ok(()) => SensorOutcome::Recognized { code: code.to_string(), path: image },
            Err(TrySendError::Full(_)) => {
                warn!("display queue full, dropping '{code}'");
                SensorOutcome::Failed
            }
            Err(TrySendError::Closed(_)) => {
                debug!("display has gone away");
                SensorOutcome::Failed
            }
        }
    }

    pub fn on_config_change(&mut self, path: &Path) -> ConfigOutcome {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                error!("config reload failed, keeping previous: {e}");
                return ConfigOutcome::Rejected;
            }
        };
        if raw.trim().is_empty() {
            debug!("{} is empty, reload skipped", path.display());
            return ConfigOutcome::Ignored;
        }
        let current = self.store.snapshot();
        let merged = ConfigFile::parse(&raw).and_then(|patch| current.merged(patch));
        match merged {
            Ok(next) => {
                let changed = next != *current;
                if changed {
                    // every cached image may now be out of date
                    self.fresh.clear();
                    self.store.publish(next);
                }
                info!("configuration reloaded from {}", path.display());
                ConfigOutcome::Reloaded { changed }
            }
            Err(e) => {
                error!("config reload failed, keeping previous: {e}");
                ConfigOutcome::Rejected
            }
        }
    }
}

impl WatchHandler for ChangeHandler {
    fn handle(&mut self, event: WatchEvent) {
        match event.target {
            WatchTarget::Sensor => {
                self.on_sensor_change(&event.path, event.at);
            }
            WatchTarget::Config => {
                self.on_config_change(&event.path);
            }
        }
    }
}
