use crate::catalog::StationCatalog;
use crate::frame::{self, Reading, MAX_FRAME_SIZE};
use crate::reconcile::TimeReconciler;
use crate::store::{SeriesPoint, SeriesStore};
use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1_000;

const READ_CHUNK_SIZE: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to open serial port '{port}' at {baud_rate} baud: {source}")]
    Connect {
        port: String,
        baud_rate: u32,
        #[source]
        source: serialport::Error,
    },

    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Streaming,
    Stopping,
    Stopped,
}

impl Default for LinkState {
    fn default() -> Self {
        LinkState::Disconnected
    }
}

impl core::fmt::Display for LinkState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Streaming => write!(f, "streaming"),
            LinkState::Stopping => write!(f, "stopping"),
            LinkState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReaderStats {
    pub lines_read: u64,
    pub readings_decoded: u64,
    pub values_stored: u64,
    pub short_readings: u64,
    pub untimed_readings: u64,
}

/// One line of link input per call.
///
/// `Ok(None)` means the bounded read timed out with no complete line; the
/// caller loops again so stop requests stay responsive. An `Err` is fatal
/// to the link.
pub trait LineSource: Send {
    fn read_line(&mut self) -> Result<Option<String>, LinkError>;
}

/// Line framing over a serial port: accumulates bytes up to the frame size
/// limit, splits on newline, and drops over-long or non-UTF-8 lines with a
/// diagnostic.
pub struct SerialLineSource {
    port: Box<dyn SerialPort>,
    assembly: ArrayVec<u8, MAX_FRAME_SIZE>,
    pending: VecDeque<String>,
    discarding: bool,
}

impl SerialLineSource {
    pub fn open(settings: &LinkSettings) -> Result<Self, LinkError> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .timeout(Duration::from_millis(settings.read_timeout_ms))
            .open()
            .map_err(|source| LinkError::Connect {
                port: settings.port.clone(),
                baud_rate: settings.baud_rate,
                source,
            })?;

        Ok(Self {
            port,
            assembly: ArrayVec::new(),
            pending: VecDeque::new(),
            discarding: false,
        })
    }

    fn accept(&mut self, byte: u8) {
        if byte == b'\n' {
            if self.discarding {
                self.discarding = false;
            } else {
                match core::str::from_utf8(&self.assembly) {
                    Ok(line) => {
                        let line = line.trim_end_matches('\r');
                        if !line.is_empty() {
                            self.pending.push_back(line.to_string());
                        }
                    }
                    Err(_) => warn!("line dropped: invalid UTF-8 from link"),
                }
            }
            self.assembly.clear();
        } else if self.discarding {
            // Swallowing the rest of an over-long line
        } else if self.assembly.try_push(byte).is_err() {
            warn!(limit = MAX_FRAME_SIZE, "line dropped: exceeds frame size limit");
            self.assembly.clear();
            self.discarding = true;
        }
    }
}

impl LineSource for SerialLineSource {
    fn read_line(&mut self) -> Result<Option<String>, LinkError> {
        if let Some(line) = self.pending.pop_front() {
            return Ok(Some(line));
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match self.port.read(&mut chunk) {
            Ok(0) => Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "serial link closed",
            ))),
            Ok(read) => {
                for &byte in &chunk[..read] {
                    self.accept(byte);
                }
                Ok(self.pending.pop_front())
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Background ingestion loop: owns the link, feeds the frame decoder,
/// applies time reconciliation, and writes into the series store.
///
/// Lifecycle: `Disconnected → Connecting → Streaming → Stopping → Stopped`.
/// There is no automatic reconnect; after a fatal link error the reader
/// parks in `Stopped` and consumers keep polling whatever was buffered.
pub struct LinkReader {
    state: Arc<Mutex<LinkState>>,
    stop_flag: Arc<AtomicBool>,
    stats: Arc<Mutex<ReaderStats>>,
    handle: Option<JoinHandle<()>>,
}

impl LinkReader {
    /// Open the serial link and start streaming.
    ///
    /// A connect failure is surfaced immediately; nothing is retried.
    pub fn start(
        settings: &LinkSettings,
        catalog: Arc<StationCatalog>,
        store: Arc<SeriesStore>,
    ) -> Result<Self, LinkError> {
        info!(port = %settings.port, baud_rate = settings.baud_rate, "opening serial link");

        let source = match SerialLineSource::open(settings) {
            Ok(source) => source,
            Err(e) => {
                error!(error = %e, "serial link connect failed");
                return Err(e);
            }
        };

        Self::start_with_source(source, catalog, store)
    }

    /// Start the ingestion loop over any line transport.
    pub fn start_with_source<S: LineSource + 'static>(
        source: S,
        catalog: Arc<StationCatalog>,
        store: Arc<SeriesStore>,
    ) -> Result<Self, LinkError> {
        let state = Arc::new(Mutex::new(LinkState::Connecting));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(ReaderStats::default()));

        let handle = {
            let state = Arc::clone(&state);
            let stop_flag = Arc::clone(&stop_flag);
            let stats = Arc::clone(&stats);
            thread::Builder::new()
                .name("metbus-link-reader".to_string())
                .spawn(move || run_loop(source, catalog, store, state, stop_flag, stats))
                .map_err(LinkError::Io)?
        };

        Ok(Self {
            state,
            stop_flag,
            stats,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> LinkState {
        *lock(&self.state)
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == LinkState::Streaming
    }

    pub fn stats(&self) -> ReaderStats {
        *lock(&self.stats)
    }

    /// Request the loop to exit and block until it has.
    ///
    /// Idempotent. Bounded by the link read timeout (the loop checks the
    /// stop flag once per read). When this returns, the loop thread has
    /// exited and the connection is released.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        set_state(&self.state, LinkState::Stopping);
        self.stop_flag.store(true, Ordering::Relaxed);

        if handle.join().is_err() {
            error!("link reader thread panicked");
        }

        set_state(&self.state, LinkState::Stopped);
    }
}

impl Drop for LinkReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(
    mut source: impl LineSource,
    catalog: Arc<StationCatalog>,
    store: Arc<SeriesStore>,
    state: Arc<Mutex<LinkState>>,
    stop_flag: Arc<AtomicBool>,
    stats: Arc<Mutex<ReaderStats>>,
) {
    let mut reconciler = TimeReconciler::new(catalog.reference_station());
    set_state(&state, LinkState::Streaming);
    info!(reference = catalog.reference_station(), "link reader streaming");

    while !stop_flag.load(Ordering::Relaxed) {
        match source.read_line() {
            Ok(Some(line)) => {
                lock(&stats).lines_read += 1;

                let mut readings = frame::decode(&line, &catalog);
                reconciler.reconcile(&mut readings);

                for reading in readings {
                    store_reading(&store, &catalog, reading, &stats);
                }
            }
            Ok(None) => {
                // Timed out with no line; loop again so stop stays responsive
            }
            Err(e) => {
                error!(error = %e, "link I/O error, reader stopping");
                break;
            }
        }
    }

    // The source (and the port it owns) is released before the thread
    // exits, so a joined stop() guarantees the link is closed
    drop(source);
    set_state(&state, LinkState::Stopped);
    info!("link reader stopped");
}

fn store_reading(
    store: &SeriesStore,
    catalog: &StationCatalog,
    reading: Reading,
    stats: &Mutex<ReaderStats>,
) {
    // The decoder only emits catalog stations
    let Some(station) = catalog.station(&reading.station) else {
        debug!(station = %reading.station, "reading dropped: station vanished from catalog");
        return;
    };

    lock(stats).readings_decoded += 1;

    let Some(timestamp) = reading.timestamp else {
        debug!(station = %reading.station, "reading dropped: no timestamp available yet");
        lock(stats).untimed_readings += 1;
        return;
    };

    let stored = reading.values.len().min(station.variables.len()) as u64;
    if reading.values.len() < station.variables.len() {
        lock(stats).short_readings += 1;
    }

    // Extra values beyond the declared variables are ignored; extra
    // declared variables simply receive no point this cycle
    for (variable, value) in station.variables.iter().zip(reading.values) {
        store.append(&station.name, variable, SeriesPoint { timestamp, value });
    }

    lock(stats).values_stored += stored;
}

fn set_state(state: &Mutex<LinkState>, next: LinkState) {
    *lock(state) = next;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
