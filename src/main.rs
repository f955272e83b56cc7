/*
 *  main.rs
 *
 *  calsign - calibration signage
 *  (c) 2020-26 Stuart Hunter
 *
 *  Calibration signage kiosk
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

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Env, Target};
use log::{error, info, warn};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver};

// always unix, as is the kiosk
use tokio::signal::unix::{signal, SignalKind};

use calsign::config::{self, Cli, Config, ConfigStore};
use calsign::constants::DISPLAY_QUEUE_DEPTH;
use calsign::display::DisplayCommand;
use calsign::generator::ImageGenerator;
use calsign::watcher::{ChangeHandler, FileWatcher, WatchPaths};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

fn init_logging(cli: &Cli) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        Env::default().default_filter_or(if cli.debug { "debug" } else { "info" }),
    );
    builder.format_timestamp_secs();
    if let Some(path) = &cli.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
async fn signal_handler() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

/// The image shown before the first sensor update: `--initial-code` when it
/// is known, else the first configured code.
fn initial_image(cli: &Cli, config: &Config, generator: &ImageGenerator) -> Option<PathBuf> {
    let code = match &cli.initial_code {
        Some(code) if config.is_known(code) => code.clone(),
        Some(code) => {
            warn!("initial code '{code}' is not configured");
            config.codes().into_iter().next()?
        }
        None => config.codes().into_iter().next()?,
    };
    match generator.path_for(&code, config) {
        Some(path) if path.is_file() => Some(path),
        _ => generator
            .persist(&code, config)
            .map_err(|e| error!("cannot generate initial image: {e}"))
            .ok(),
    }
}

#[cfg(feature = "window")]
fn run_kiosk(
    cli: &Cli,
    initial: Option<PathBuf>,
    updates: Receiver<DisplayCommand>,
    mut watcher: FileWatcher,
) -> Result<()> {
    use calsign::display::window::{self, KioskOptions, UserEvent};

    let event_loop = window::event_loop();
    let proxy = event_loop.create_proxy();

    // signals arrive on their own thread and are forwarded into the UI loop
    std::thread::Builder::new()
        .name("calsign-signals".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    error!("cannot start signal runtime: {e}");
                    return;
                }
            };
            match rt.block_on(signal_handler()) {
                Ok(()) => {
                    let _ = proxy.send_event(UserEvent::Shutdown);
                }
                Err(e) => error!("signal handler failed: {e}"),
            }
        })?;

    let options = KioskOptions {
        title: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        fullscreen: !cli.windowed,
        tick: Duration::from_millis(cli.tick_ms),
        initial_image: initial,
    };
    window::run(event_loop, options, updates, move || {
        watcher.stop();
        info!("shutdown complete");
    })?;
    Ok(())
}

#[cfg(not(feature = "window"))]
fn run_kiosk(
    _cli: &Cli,
    _initial: Option<PathBuf>,
    _updates: Receiver<DisplayCommand>,
    mut watcher: FileWatcher,
) -> Result<()> {
    watcher.stop();
    anyhow::bail!("{} was built without the 'window' feature", env!("CARGO_PKG_NAME"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    info!("This {} keeps the cameras honest", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let config_path = config::resolve_config_path(cli.config.as_deref())?;
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    info!("configuration loaded from {} ({} codes)", config_path.display(), config.images.len());

    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let generator = Arc::new(ImageGenerator::new(&cli.cache_dir));
    generator.reset_cache().context("preparing image cache")?;
    let fresh = generator.pre_generate(&config);
    let initial = initial_image(&cli, &config, &generator);

    let store = ConfigStore::new(config);
    let (display_tx, display_rx) = mpsc::channel(DISPLAY_QUEUE_DEPTH);
    let handler = ChangeHandler::new(
        store,
        Arc::clone(&generator),
        Duration::from_millis(cli.debounce_ms),
        display_tx,
    )
    .with_fresh(fresh);

    let paths = WatchPaths { sensor: cli.data_file.clone(), config: config_path };
    let watcher = FileWatcher::start(&paths, handler).context("starting file watcher")?;

    run_kiosk(&cli, initial, display_rx, watcher)
}
