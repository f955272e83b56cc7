/*
 *  watcher/mod.rs
 *
 *  calsign - calibration signage
 *  (c) 2020-26 Stuart Hunter
 *
 *  File observation: notify backend, event routing and the worker thread
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

pub mod debounce;
pub mod handler;

use log::{debug, error, info};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::constants::WATCH_QUEUE_DEPTH;

pub use debounce::Debouncer;
pub use handler::{ChangeHandler, ConfigOutcome, SensorOutcome};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file watch failed: {0}")]
    Notify(#[from] notify::Error),
    #[error("{0} has no usable parent directory")]
    BadPath(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchTarget {
    Sensor,
    Config,
}

/// A change to one of the watched files, stamped on arrival.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub target: WatchTarget,
    pub path: PathBuf,
    pub at: Instant,
}

pub struct WatchPaths {
    pub sensor: PathBuf,
    pub config: PathBuf,
}

/// Consumer of watch events, driven serially from the worker thread.
pub trait WatchHandler: Send + 'static {
    fn handle(&mut self, event: WatchEvent);
}

struct Watched {
    target: WatchTarget,
    dir: PathBuf,
    name: OsString,
}

/// Maps raw notify events onto the files we care about.
///
/// Parent directories are watched rather than the files so that editors and
/// writers that replace the file by rename are still seen.
pub(crate) struct Classifier {
    watched: Vec<Watched>,
}

impl Classifier {
    pub(crate) fn new(paths: &WatchPaths) -> Result<Self, WatchError> {
        let watched = [(WatchTarget::Sensor, &paths.sensor), (WatchTarget::Config, &paths.config)]
            .into_iter()
            .map(|(target, path)| -> Result<Watched, WatchError> {
                let name = path.file_name().ok_or_else(|| WatchError::BadPath(path.clone()))?;
                let dir = match path.parent() {
                    Some(p) if !p.as_os_str().is_empty() => p,
                    _ => Path::new("."),
                };
                let dir = dir.canonicalize().map_err(|_| WatchError::BadPath(path.clone()))?;
                Ok(Watched { target, dir, name: name.to_os_string() })
            })
            .collect::<Result<Vec<_>, WatchError>>()?;
        Ok(Self { watched })
    }

    /// Distinct directories to register with the backend.
    pub(crate) fn dirs(&self) -> Vec<&Path> {
        let mut dirs: Vec<&Path> = Vec::new();
        for w in &self.watched {
            if !dirs.contains(&w.dir.as_path()) {
                dirs.push(&w.dir);
            }
        }
        dirs
    }

    /// Where the target file lives as seen by the backend.
    pub(crate) fn path_of(&self, target: WatchTarget) -> Option<PathBuf> {
        self.watched
            .iter()
            .find(|w| w.target == target)
            .map(|w| w.dir.join(&w.name))
    }

    pub(crate) fn classify(&self, event: &Event, at: Instant) -> Vec<WatchEvent> {
        if !is_content_change(&event.kind) {
            return Vec::new();
        }
        let mut out: Vec<WatchEvent> = Vec::new();
        for path in &event.paths {
            for w in &self.watched {
                if !self.matches(w, path) || out.iter().any(|e| e.target == w.target) {
                    continue;
                }
                out.push(WatchEvent { target: w.target, path: w.dir.join(&w.name), at });
            }
        }
        out
    }

    fn matches(&self, w: &Watched, path: &Path) -> bool {
        if path.file_name() != Some(w.name.as_os_str()) {
            return false;
        }
        match path.parent() {
            Some(parent) if parent == w.dir => true,
            Some(parent) => parent.canonicalize().is_ok_and(|p| p == w.dir),
            None => false,
        }
    }
}

/// Content may have changed. Metadata-only and access events are ignored, as
/// is the source half of a rename.
fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => false,
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Name(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Other) => true,
        _ => false,
    }
}

enum WorkerMsg {
    Event(WatchEvent),
    Stop,
}

/// Watches the sensor and config files and feeds a single worker thread.
pub struct FileWatcher {
    watcher: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
    control: mpsc::Sender<WorkerMsg>,
    stopping: Arc<AtomicBool>,
}

impl FileWatcher {
    pub fn start<H: WatchHandler>(paths: &WatchPaths, mut handler: H) -> Result<Self, WatchError> {
        let classifier = Classifier::new(paths)?;
        let (tx, mut rx) = mpsc::channel::<WorkerMsg>(WATCH_QUEUE_DEPTH);
        let stopping = Arc::new(AtomicBool::new(false));

        let worker = std::thread::Builder::new()
            .name("calsign-watch".to_string())
            .spawn(move || {
                while let Some(msg) = rx.blocking_recv() {
                    match msg {
                        WorkerMsg::Event(event) => handler.handle(event),
                        WorkerMsg::Stop => break,
                    }
                }
                debug!("watch worker finished");
            })?;

        let dirs: Vec<PathBuf> = classifier.dirs().into_iter().map(Path::to_path_buf).collect();
        let notify_tx = tx.clone();
        let notify_stopping = Arc::clone(&stopping);
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if notify_stopping.load(Ordering::SeqCst) {
                return;
            }
            match res {
                Ok(event) => {
                    for change in classifier.classify(&event, Instant::now()) {
                        // blocks notify's thread when the worker falls behind
                        if notify_tx.blocking_send(WorkerMsg::Event(change)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => error!("watch error: {e}"),
            }
        });

        let mut watcher = match watcher {
            Ok(w) => w,
            Err(e) => {
                stop_worker(&tx, worker);
                return Err(e.into());
            }
        };
        for dir in &dirs {
            if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                drop(watcher);
                stop_worker(&tx, worker);
                return Err(e.into());
            }
            info!("watching {}", dir.display());
        }

        Ok(Self { watcher: Some(watcher), worker: Some(worker), control: tx, stopping })
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stop observing. Events already queued are handled before this returns;
    /// nothing is handled afterwards. Safe to call more than once.
    pub fn stop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        drop(self.watcher.take());
        if let Some(worker) = self.worker.take() {
            stop_worker(&self.control, worker);
            info!("file watcher stopped");
        }
    }
}

fn stop_worker(tx: &mpsc::Sender<WorkerMsg>, worker: JoinHandle<()>) {
    // a closed channel means the worker is already gone
    let _ = tx.blocking_send(WorkerMsg::Stop);
    if worker.join().is_err() {
        error!("watch worker panicked");
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind};
    use std::fs;

    fn setup() -> (tempfile::TempDir, WatchPaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = WatchPaths {
            sensor: dir.path().join("Camera_Data.txt"),
            config: dir.path().join("config.json"),
        };
        (dir, paths)
    }

    fn event(kind: EventKind, path: PathBuf) -> Event {
        Event::new(kind).add_path(path)
    }

    #[test]
    fn test_classifies_by_file_name() {
        let (_dir, paths) = setup();
        let classifier = Classifier::new(&paths).unwrap();
        assert_eq!(classifier.dirs().len(), 1);
        let sensor = classifier.path_of(WatchTarget::Sensor).unwrap();
        let config = classifier.path_of(WatchTarget::Config).unwrap();
        let now = Instant::now();

        let hits = classifier.classify(&event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), sensor.clone()), now);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target, WatchTarget::Sensor);
        assert_eq!(hits[0].path, sensor);

        let hits = classifier.classify(&event(EventKind::Create(CreateKind::File), config), now);
        assert_eq!(hits[0].target, WatchTarget::Config);

        let other = sensor.with_file_name("other.txt");
        assert!(classifier.classify(&event(EventKind::Create(CreateKind::File), other), now).is_empty());
    }

    #[test]
    fn test_ignores_non_content_events() {
        let (_dir, paths) = setup();
        let classifier = Classifier::new(&paths).unwrap();
        let sensor = classifier.path_of(WatchTarget::Sensor).unwrap();
        let now = Instant::now();
        for kind in [
            EventKind::Access(AccessKind::Any),
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            EventKind::Remove(notify::event::RemoveKind::File),
        ] {
            let ev = event(kind, sensor.clone());
            assert!(classifier.classify(&ev, now).is_empty(), "{:?}", ev.kind);
        }
        let renamed_in = EventKind::Modify(ModifyKind::Name(RenameMode::To));
        assert_eq!(classifier.classify(&event(renamed_in, sensor), now).len(), 1);
    }

    #[test]
    fn test_missing_directory_is_rejected() {
        let paths = WatchPaths {
            sensor: PathBuf::from("/no/such/dir/Camera_Data.txt"),
            config: PathBuf::from("/no/such/dir/config.json"),
        };
        assert!(matches!(Classifier::new(&paths), Err(WatchError::BadPath(_))));
    }

    struct Recorder(std::sync::mpsc::Sender<WatchEvent>);

    impl WatchHandler for Recorder {
        fn handle(&mut self, event: WatchEvent) {
            let _ = self.0.send(event);
        }
    }

    /// Takes its time with every event.
    struct Slow {
        seen: Arc<std::sync::Mutex<Vec<PathBuf>>>,
    }

    impl WatchHandler for Slow {
        fn handle(&mut self, event: WatchEvent) {
            std::thread::sleep(std::time::Duration::from_millis(50));
            self.seen.lock().unwrap().push(event.path);
        }
    }

    #[test]
    fn test_stop_drains_queued_events() {
        let (dir, paths) = setup();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut watcher = FileWatcher::start(&paths, Slow { seen: Arc::clone(&seen) }).unwrap();

        let queued: Vec<PathBuf> = (0..5).map(|i| dir.path().join(format!("queued-{i}"))).collect();
        for path in &queued {
            let event = WatchEvent { target: WatchTarget::Sensor, path: path.clone(), at: Instant::now() };
            watcher.control.blocking_send(WorkerMsg::Event(event)).unwrap();
        }
        watcher.stop();

        let handled: Vec<PathBuf> = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|p| queued.contains(p))
            .cloned()
            .collect();
        assert_eq!(handled, queued);
    }

    #[test]
    fn test_watcher_delivers_and_stops() {
        let (dir, paths) = setup();
        let (tx, rx) = std::sync::mpsc::channel();
        let mut watcher = FileWatcher::start(&paths, Recorder(tx)).unwrap();
        assert!(watcher.is_running());

        fs::write(&paths.sensor, "A").unwrap();
        let got = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(got.target, WatchTarget::Sensor);

        watcher.stop();
        assert!(!watcher.is_running());
        while rx.try_recv().is_ok() {}
        fs::write(dir.path().join("config.json"), "{}").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(rx.try_recv().is_err());
        watcher.stop();
    }
}
