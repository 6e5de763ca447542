//! Drishti - sonar and camera fusion daemon
//!
//! Starts the sonar and camera receivers and logs link statistics until
//! Ctrl-C. Optionally writes the final overlay frame as a PNG.
//!
//! # Usage
//!
//! ```bash
//! drishti --config drishti.toml
//! drishti --camera 0 --snapshot overlay.png --stats-interval 2
//! ```

use clap::Parser;
use drishti::camera::create_backend;
use drishti::{AppConfig, DropReason, Error, FusionContext, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Main loop poll period
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "drishti")]
#[command(about = "Overlay multicast sonar point clouds on a live camera feed")]
struct Args {
    /// Configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera device index, overrides the configuration
    #[arg(long)]
    camera: Option<u32>,

    /// Write the last overlay frame to this PNG on exit
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Seconds between statistics log lines
    #[arg(long, default_value = "5")]
    stats_interval: u64,
}

fn main() {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match AppConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => AppConfig::default(),
    };
    if let Some(index) = args.camera {
        config.camera.device_index = Some(index);
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    if let Err(e) = run(&args, &config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args, config: &AppConfig) -> Result<()> {
    log::info!("Drishti v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!(
        "Sonar: {}:{} ({}), camera backend: {}",
        config.sonar.multicast_addr,
        config.sonar.port,
        if config.sonar.enabled { "enabled" } else { "disabled" },
        config.camera.backend
    );

    let backend = create_backend(&config.camera)?;
    let mut context = FusionContext::start(config, backend)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    log::info!("Drishti running. Press Ctrl-C to stop.");

    let stats_interval = Duration::from_secs(args.stats_interval.max(1));
    let mut last_stats = Instant::now();
    while running.load(Ordering::Relaxed) {
        thread::sleep(POLL_INTERVAL);
        if last_stats.elapsed() >= stats_interval {
            log_stats(&context);
            last_stats = Instant::now();
        }
    }

    if let Some(path) = &args.snapshot {
        write_snapshot(&context, path)?;
    }

    context.shutdown();
    log::info!("Drishti stopped");
    Ok(())
}

fn log_stats(context: &FusionContext) {
    let sonar = context.sonar_stats();
    let camera = context.camera_stats();
    let age = sonar
        .last_rx_time_us
        .map(|t| format!("{} ms ago", drishti::core::timestamp_us().saturating_sub(t) / 1000))
        .unwrap_or_else(|| "never".to_string());

    log::info!(
        "Sonar: {} packets ({} decoded, {} dropped), last rx {}, {} | Camera: {} frames, {} read failures, device {:?}",
        sonar.packets_received,
        sonar.packets_decoded,
        sonar.total_dropped(),
        age,
        if sonar.connected { "connected" } else { "disconnected" },
        camera.frames_captured,
        camera.read_failures,
        camera.device_index
    );

    for reason in DropReason::ALL {
        let count = sonar.dropped(reason);
        if count > 0 {
            log::debug!("  dropped {}: {}", reason, count);
        }
    }
    if sonar.sequence.lost > 0 || sonar.sequence.duplicates > 0 {
        log::debug!(
            "  sequence: {} lost, {} duplicate, {} out of order, {} resets",
            sonar.sequence.lost,
            sonar.sequence.duplicates,
            sonar.sequence.out_of_order,
            sonar.sequence.resets
        );
    }
}

fn write_snapshot(context: &FusionContext, path: &Path) -> Result<()> {
    let Some(frame) = context.latest_frame_with_overlay() else {
        log::warn!("No camera frame available, snapshot not written");
        return Ok(());
    };
    frame
        .image
        .save(path)
        .map_err(|e| Error::Other(format!("Failed to write {}: {}", path.display(), e)))?;
    log::info!(
        "Overlay snapshot written to {} ({}x{})",
        path.display(),
        frame.width(),
        frame.height()
    );
    Ok(())
}
