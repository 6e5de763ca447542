//! Multicast sonar simulator.
//!
//! Sends RIP2 range-image datagrams of a synthetic wall + sphere scene so
//! the daemon can run without hardware.
//!
//! # Usage
//!
//! ```bash
//! sonar_sim --group 224.0.0.96 --port 4747 --rate 10
//! sonar_sim --seed 42 --noise 0.05 --count 100
//! ```

use clap::Parser;
use drishti::config::SonarConfig;
use drishti::sonar::packet;
use drishti::sonar::sim::{SimConfig, SonarSimulator};
use drishti::{Error, Result};
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "sonar-sim")]
#[command(about = "Multicast synthetic RIP2 range images")]
struct Args {
    /// Multicast group
    #[arg(long, default_value = "224.0.0.96")]
    group: String,

    /// UDP port
    #[arg(short, long, default_value = "4747")]
    port: u16,

    /// Images per second
    #[arg(short, long, default_value = "10")]
    rate: u32,

    /// Range image width (columns)
    #[arg(long, default_value = "64")]
    width: u32,

    /// Range image height (rows)
    #[arg(long, default_value = "32")]
    height: u32,

    /// Range noise standard deviation (meters)
    #[arg(long, default_value = "0.02")]
    noise: f32,

    /// RNG seed (0 = random)
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Stop after this many images (0 = until Ctrl-C)
    #[arg(long, default_value = "0")]
    count: u64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let target = SonarConfig {
        multicast_addr: args.group.clone(),
        port: args.port,
        enabled: true,
    }
    .group_socket_addr()?;

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.set_multicast_ttl_v4(1)?;
    socket.set_multicast_loop_v4(true)?;

    let mut sim = SonarSimulator::new(SimConfig {
        width: args.width.max(1),
        height: args.height.max(1),
        range_stddev_m: args.noise.max(0.0),
        seed: args.seed,
        ..Default::default()
    });

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let period = Duration::from_secs(1) / args.rate.max(1);
    log::info!(
        "Sending {}x{} range images to {} at {} Hz",
        sim.config().width,
        sim.config().height,
        target,
        args.rate.max(1)
    );

    let start = Instant::now();
    let mut next_send = start;
    let mut sequence: u32 = 0;
    let mut sent: u64 = 0;

    while running.load(Ordering::Relaxed) && (args.count == 0 || sent < args.count) {
        let image = sim.generate(start.elapsed().as_secs_f32());
        let datagram = packet::encode(&image, Some(sequence))?;

        match socket.send_to(&datagram, target) {
            Ok(_) => sent += 1,
            Err(e) => log::warn!("Send failed: {}", e),
        }
        sequence = sequence.wrapping_add(1);

        if sent > 0 && sent % 100 == 0 {
            log::info!("Sent {} images ({} bytes each)", sent, datagram.len());
        }

        next_send += period;
        let now = Instant::now();
        if next_send > now {
            thread::sleep(next_send - now);
        } else {
            next_send = now;
        }
    }

    log::info!("Simulator stopped after {} images", sent);
    Ok(())
}
