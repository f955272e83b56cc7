//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use std::thread::ThreadId;

use calsign::config::{Config, ConfigFile};

/// Records every log line with the thread that emitted it, so parallel tests
/// only ever look at their own output.
struct Capture;

static CAPTURE: Capture = Capture;
static RECORDS: Mutex<Vec<(ThreadId, Level, String)>> = Mutex::new(Vec::new());
static INIT: Once = Once::new();

impl Log for Capture {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Ok(mut records) = RECORDS.lock() {
            records.push((std::thread::current().id(), record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

pub fn capture_logs() {
    INIT.call_once(|| {
        let _ = log::set_logger(&CAPTURE);
        log::set_max_level(LevelFilter::Debug);
    });
}

pub fn clear_thread_logs() {
    let me = std::thread::current().id();
    RECORDS.lock().unwrap().retain(|(thread, _, _)| *thread != me);
}

pub fn thread_logs(level: Level) -> Vec<String> {
    let me = std::thread::current().id();
    RECORDS
        .lock()
        .unwrap()
        .iter()
        .filter(|(thread, lvl, _)| *thread == me && *lvl == level)
        .map(|(_, _, msg)| msg.clone())
        .collect()
}

/// Two codes, small canvas, and a font path that never resolves so rendering
/// uses the built-in font.
pub fn two_code_config(dir: &Path) -> Config {
    let json = format!(
        r#"{{
            "images": {{
                "A": {{"text": "foo", "short_width": 4, "long_width": 8}},
                "B": {{"text": "bar", "short_width": 6, "long_width": 12}}
            }},
            "image_size": [160, 120],
            "px_per_cm": 10,
            "font_size": 20,
            "font_path": {:?}
        }}"#,
        dir.join("no-such-font.ttf").display().to_string()
    );
    Config::from_file(ConfigFile::parse(&json).unwrap()).unwrap()
}

pub fn write_config(path: &Path, json: &str) -> PathBuf {
    std::fs::write(path, json).unwrap();
    path.to_path_buf()
}
