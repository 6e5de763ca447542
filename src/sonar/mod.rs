//! Sonar receiver: multicast RIP2 datagrams to point cloud snapshots.
//!
//! # Connection States
//!
//! ```text
//!            enabled && open ok
//! ┌──────────────┐ ───────────────▶ ┌───────────┐
//! │ DISCONNECTED │                  │ CONNECTED │──┐ recv timeout (500ms):
//! └──────────────┘ ◀─────────────── └───────────┘◀─┘ stay connected
//!   ▲  │ open failed:    socket error /
//!   └──┘ retry in 200ms  reconfiguration
//! ```
//!
//! # Data Flow
//!
//! Every datagram read bumps the packet counter and last-receive time
//! before decoding is attempted. Decode or conversion failures leave the
//! previous snapshot in place; success publishes a new [`PointCloud`] into
//! the shared [`SnapshotStore`] in one swap.
//!
//! The loop never exits on error. Each iteration yields a [`LoopStep`];
//! `Fatal` only drops the socket so the next iteration reconnects.

pub mod packet;
pub mod point_cloud;
pub mod proto;
pub mod sim;
pub mod socket;

use crate::config::SonarConfig;
use crate::core::SnapshotStore;
use crate::core::types::PointCloud;
use crate::error::{DropReason, Error, LoopStep, Result};
use packet::{SequenceStats, SequenceTracker};
use parking_lot::Mutex;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Delay before retrying a failed socket open (or while disabled)
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Delay after a socket error before reconnecting
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Packets between periodic debug statistics
const STATS_LOG_INTERVAL: u64 = 1000;

/// Receiver statistics snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SonarStats {
    /// Datagrams read from the socket (or injected), regardless of decode outcome
    pub packets_received: u64,
    /// Wall-clock time of the last datagram (µs since epoch)
    pub last_rx_time_us: Option<u64>,
    /// Datagrams that produced a point cloud snapshot
    pub packets_decoded: u64,
    /// Decoded range images with fewer samples than grid cells
    pub incomplete_images: u64,
    /// Drops per [`DropReason`], indexed like [`DropReason::ALL`]
    pub drops: [u64; 7],
    /// Header sequence accounting
    pub sequence: SequenceStats,
    /// Whether a socket is currently open
    pub connected: bool,
}

impl SonarStats {
    /// Drop count for one reason
    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.drops[reason.index()]
    }

    /// Drops across all reasons
    pub fn total_dropped(&self) -> u64 {
        self.drops.iter().sum()
    }
}

/// Settings shared with the loop; the generation bumps on every apply
#[derive(Debug)]
struct Settings {
    config: SonarConfig,
    generation: u64,
}

/// State shared between the receiver handle and its thread
#[derive(Debug)]
struct Shared {
    settings: Mutex<Settings>,
    store: Arc<SnapshotStore<PointCloud>>,
    sequence: Mutex<SequenceTracker>,
    packets_received: AtomicU64,
    last_rx_time_us: AtomicU64,
    packets_decoded: AtomicU64,
    incomplete_images: AtomicU64,
    drops: [AtomicU64; 7],
    connected: AtomicBool,
}

impl Shared {
    fn new(config: SonarConfig, store: Arc<SnapshotStore<PointCloud>>) -> Self {
        Self {
            settings: Mutex::new(Settings {
                config,
                generation: 0,
            }),
            store,
            sequence: Mutex::new(SequenceTracker::new()),
            packets_received: AtomicU64::new(0),
            last_rx_time_us: AtomicU64::new(0),
            packets_decoded: AtomicU64::new(0),
            incomplete_images: AtomicU64::new(0),
            drops: Default::default(),
            connected: AtomicBool::new(false),
        }
    }

    /// Count, decode, convert and publish one datagram
    fn ingest(&self, datagram: &[u8]) {
        let count = self.packets_received.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_rx_time_us
            .store(crate::core::timestamp_us(), Ordering::Relaxed);

        match packet::decode(datagram) {
            Ok(decoded) => {
                if let Some(seq) = decoded.sequence {
                    self.sequence.lock().observe(seq);
                }
                match point_cloud::build(&decoded.image) {
                    Some(cloud) => {
                        log::trace!("Publishing sonar snapshot with {} points", cloud.len());
                        self.store.publish(cloud);
                        self.packets_decoded.fetch_add(1, Ordering::Relaxed);
                    }
                    None => {
                        self.incomplete_images.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Err(reason) => {
                self.drops[reason.index()].fetch_add(1, Ordering::Relaxed);
                log::trace!("Dropped sonar datagram ({} bytes): {}", datagram.len(), reason);
            }
        }

        if count % STATS_LOG_INTERVAL == 0 {
            let stats = self.stats();
            log::debug!(
                "Sonar: {} packets, {} decoded, {} dropped, {} lost",
                stats.packets_received,
                stats.packets_decoded,
                stats.total_dropped(),
                stats.sequence.lost
            );
        }
    }

    fn stats(&self) -> SonarStats {
        let last_rx = self.last_rx_time_us.load(Ordering::Relaxed);
        let mut drops = [0u64; 7];
        for (slot, counter) in drops.iter_mut().zip(&self.drops) {
            *slot = counter.load(Ordering::Relaxed);
        }
        SonarStats {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            last_rx_time_us: (last_rx != 0).then_some(last_rx),
            packets_decoded: self.packets_decoded.load(Ordering::Relaxed),
            incomplete_images: self.incomplete_images.load(Ordering::Relaxed),
            drops,
            sequence: self.sequence.lock().stats(),
            connected: self.connected.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the background sonar receiver thread.
pub struct SonarReceiver {
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SonarReceiver {
    /// Validate the configuration and start the `sonar-rx` thread.
    pub fn spawn(
        config: SonarConfig,
        store: Arc<SnapshotStore<PointCloud>>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        config.validate()?;
        let mut receiver = Self::detached(config, store, running);

        let worker = Worker::new(Arc::clone(&receiver.shared));
        let worker_running = Arc::clone(&receiver.running);
        receiver.handle = Some(
            thread::Builder::new()
                .name("sonar-rx".to_string())
                .spawn(move || worker.run(worker_running))
                .map_err(|_| Error::ThreadSpawn("sonar-rx"))?,
        );

        log::info!("Sonar receiver started");
        Ok(receiver)
    }

    /// Receiver without a socket thread; datagrams arrive via [`Self::ingest`].
    pub fn detached(
        config: SonarConfig,
        store: Arc<SnapshotStore<PointCloud>>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(config, store)),
            running,
            handle: None,
        }
    }

    /// Replace socket settings.
    ///
    /// Invalid addresses are rejected here. Accepted settings force the
    /// current socket closed; the loop reconnects on its next cycle.
    pub fn apply_config(&self, config: SonarConfig) -> Result<()> {
        config.validate()?;
        let mut settings = self.shared.settings.lock();
        log::info!(
            "Sonar config: {}:{} ({})",
            config.multicast_addr,
            config.port,
            if config.enabled { "enabled" } else { "disabled" }
        );
        settings.config = config;
        settings.generation += 1;
        Ok(())
    }

    /// Current socket settings
    pub fn config(&self) -> SonarConfig {
        self.shared.settings.lock().config.clone()
    }

    pub fn stats(&self) -> SonarStats {
        self.shared.stats()
    }

    /// Process one datagram as if it had arrived on the socket (replay, tests)
    pub fn ingest(&self, datagram: &[u8]) {
        self.shared.ingest(datagram);
    }

    /// Stop the loop at its next iteration boundary and wait for it
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Sonar receiver thread panicked");
            }
        }
    }
}

impl Drop for SonarReceiver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Loop-side state: owns the socket
struct Worker {
    shared: Arc<Shared>,
    socket: Option<UdpSocket>,
    generation: u64,
    buffer: Vec<u8>,
}

impl Worker {
    fn new(shared: Arc<Shared>) -> Self {
        let generation = shared.settings.lock().generation;
        Self {
            shared,
            socket: None,
            generation,
            buffer: vec![0u8; packet::MAX_DATAGRAM_SIZE],
        }
    }

    fn run(mut self, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            match self.step() {
                LoopStep::Ok => {}
                LoopStep::Idle(delay) => thread::sleep(delay),
                LoopStep::Transient { error, backoff } => {
                    log::debug!("Sonar: {}", error);
                    thread::sleep(backoff);
                }
                LoopStep::Fatal(error) => {
                    log::warn!("Sonar socket error: {}, reconnecting", error);
                    self.teardown();
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        self.teardown();
        log::info!("Sonar receiver thread exiting");
    }

    fn step(&mut self) -> LoopStep {
        let (config, generation) = {
            let settings = self.shared.settings.lock();
            (settings.config.clone(), settings.generation)
        };
        if generation != self.generation {
            self.generation = generation;
            self.teardown();
        }

        if !config.enabled {
            return LoopStep::Idle(CONNECT_RETRY_DELAY);
        }

        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => match socket::open_multicast(&config) {
                Ok(socket) => {
                    log::info!(
                        "Sonar connected: {}:{}",
                        config.multicast_addr,
                        config.port
                    );
                    self.shared.sequence.lock().reset();
                    self.shared.connected.store(true, Ordering::Relaxed);
                    socket
                }
                Err(error) => {
                    return LoopStep::Transient {
                        error,
                        backoff: CONNECT_RETRY_DELAY,
                    };
                }
            },
        };

        let step = match socket.recv_from(&mut self.buffer) {
            Ok((len, _src)) => {
                self.shared.ingest(&self.buffer[..len]);
                LoopStep::Ok
            }
            Err(e) if socket::is_timeout(&e) => LoopStep::Ok,
            Err(e) => LoopStep::Fatal(Error::Io(e)),
        };
        self.socket = Some(socket);
        step
    }

    fn teardown(&mut self) {
        if self.socket.take().is_some() {
            log::info!("Sonar disconnected");
        }
        self.shared.connected.store(false, Ordering::Relaxed);
    }
}
