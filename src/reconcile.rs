use crate::frame::Reading;
use chrono::NaiveDateTime;
use serde::Serialize;

/// Most recent timestamp attributed to the reference station.
///
/// Empty until the reference station's first valid reading arrives and
/// never reset afterwards, so a link hiccup does not unstamp the stream.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReferenceClock {
    last: Option<NaiveDateTime>,
}

impl ReferenceClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, timestamp: NaiveDateTime) {
        self.last = Some(timestamp);
    }

    pub fn current(&self) -> Option<NaiveDateTime> {
        self.last
    }
}

/// Stamps every reading in a decode pass with the reference station's clock.
///
/// Individual device clocks on the bus are unsynchronized; the reference
/// station is treated as the single trustworthy source, so all measurements
/// in an ingestion window share one time axis. This is a deliberate lossy
/// approximation: stored series are only as fresh as the last
/// reference-station reading.
#[derive(Debug)]
pub struct TimeReconciler {
    reference_station: String,
    clock: ReferenceClock,
}

impl TimeReconciler {
    pub fn new(reference_station: impl Into<String>) -> Self {
        Self {
            reference_station: reference_station.into(),
            clock: ReferenceClock::new(),
        }
    }

    /// Substitute timestamps in decode order.
    ///
    /// A reference-station reading with its own timestamp advances the
    /// clock first, then every reading (the reference one included) takes
    /// the clock value when one exists, falling back to its own timestamp
    /// otherwise.
    pub fn reconcile(&mut self, readings: &mut [Reading]) {
        for reading in readings {
            if reading.station == self.reference_station {
                if let Some(timestamp) = reading.timestamp {
                    self.clock.observe(timestamp);
                }
            }
            reading.timestamp = self.clock.current().or(reading.timestamp);
        }
    }

    pub fn clock(&self) -> &ReferenceClock {
        &self.clock
    }
}
