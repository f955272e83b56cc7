/*
 *  watcher/debounce.rs
 *
 *  calsign - calibration signage
 *  (c) 2020-26 Stuart Hunter
 *
 *  Global debounce for sensor updates
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

use std::time::{Duration, Instant};

/// One timestamp shared by every code: a change to a different code is
/// debounced just like a repeat of the same one.
#[derive(Debug, Clone)]
pub struct Debouncer {
    interval: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    pub fn stamp(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// `is_ready` then `stamp`.
    pub fn accept(&mut self, now: Instant) -> bool {
        let ready = self.is_ready(now);
        if ready {
            self.stamp(now);
        }
        ready
    }
}
