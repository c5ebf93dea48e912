use crate::catalog::StationCatalog;
use crate::frame::Value;
use chrono::NaiveDateTime;
use heapless::Deque;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Points retained per (station, variable) series.
pub const SERIES_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: NaiveDateTime,
    pub value: Value,
}

struct SeriesBuffer {
    points: Deque<SeriesPoint, SERIES_CAPACITY>,
}

impl Default for SeriesBuffer {
    fn default() -> Self {
        Self { points: Deque::new() }
    }
}

impl core::fmt::Debug for SeriesBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SeriesBuffer({}/{})", self.points.len(), SERIES_CAPACITY)
    }
}

impl SeriesBuffer {
    fn push(&mut self, point: SeriesPoint) {
        if self.points.is_full() {
            self.points.pop_front();
        }

        // Cannot fail: a slot was freed above if the buffer was full
        let _ = self.points.push_back(point);

        // NASA Rule 5: Safety assertion for series capacity
        debug_assert!(
            self.points.len() <= SERIES_CAPACITY,
            "Series buffer length {} exceeds capacity {}",
            self.points.len(),
            SERIES_CAPACITY
        );
    }

    fn snapshot(&self) -> Vec<SeriesPoint> {
        self.points.iter().cloned().collect()
    }

    fn latest(&self) -> Option<SeriesPoint> {
        self.points.back().cloned()
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StoreStats {
    pub points_appended: u64,
    pub appends_dropped: u64,
}

#[derive(Debug)]
struct StoreInner {
    buffers: HashMap<String, HashMap<String, SeriesBuffer>>,
    stats: StoreStats,
}

/// Bounded time-series buffers for every (station, variable) pair.
///
/// All buffers are created empty from the catalog at start-up. The link
/// reader is the sole writer; any number of pollers read concurrently. One
/// lock guards the whole store, so a reader never observes a buffer
/// mid-eviction.
#[derive(Debug)]
pub struct SeriesStore {
    inner: RwLock<StoreInner>,
}

impl SeriesStore {
    pub fn new(catalog: &StationCatalog) -> Self {
        let buffers = catalog
            .stations()
            .iter()
            .map(|station| {
                let series = station
                    .variables
                    .iter()
                    .map(|variable| (variable.clone(), SeriesBuffer::default()))
                    .collect();
                (station.name.clone(), series)
            })
            .collect();

        Self {
            inner: RwLock::new(StoreInner {
                buffers,
                stats: StoreStats::default(),
            }),
        }
    }

    /// Append one point; unknown (station, variable) pairs are dropped.
    pub fn append(&self, station: &str, variable: &str, point: SeriesPoint) {
        let mut guard = self.write_inner();
        let inner = &mut *guard;

        match inner
            .buffers
            .get_mut(station)
            .and_then(|series| series.get_mut(variable))
        {
            Some(buffer) => {
                buffer.push(point);
                inner.stats.points_appended += 1;
            }
            None => {
                warn!(station, variable, "append dropped: series not in catalog");
                inner.stats.appends_dropped += 1;
            }
        }
    }

    /// Copy of the buffered series, oldest point first.
    pub fn snapshot(&self, station: &str, variable: &str) -> Vec<SeriesPoint> {
        self.read_inner()
            .buffers
            .get(station)
            .and_then(|series| series.get(variable))
            .map(SeriesBuffer::snapshot)
            .unwrap_or_default()
    }

    /// Most recent point, if any.
    pub fn latest(&self, station: &str, variable: &str) -> Option<SeriesPoint> {
        self.read_inner()
            .buffers
            .get(station)
            .and_then(|series| series.get(variable))
            .and_then(SeriesBuffer::latest)
    }

    pub fn series_len(&self, station: &str, variable: &str) -> usize {
        self.read_inner()
            .buffers
            .get(station)
            .and_then(|series| series.get(variable))
            .map(SeriesBuffer::len)
            .unwrap_or(0)
    }

    pub fn stats(&self) -> StoreStats {
        self.read_inner().stats
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read-only handle for pollers: the entire surface the presentation layer
/// may call. Cheap to clone; emits no events — consumers pick their own
/// polling cadence.
#[derive(Debug, Clone)]
pub struct StoreReader {
    store: Arc<SeriesStore>,
    catalog: Arc<StationCatalog>,
}

impl StoreReader {
    pub fn new(store: Arc<SeriesStore>, catalog: Arc<StationCatalog>) -> Self {
        Self { store, catalog }
    }

    pub fn snapshot(&self, station: &str, variable: &str) -> Vec<SeriesPoint> {
        self.store.snapshot(station, variable)
    }

    pub fn latest(&self, station: &str, variable: &str) -> Option<SeriesPoint> {
        self.store.latest(station, variable)
    }

    pub fn catalog(&self) -> &StationCatalog {
        &self.catalog
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }
}
