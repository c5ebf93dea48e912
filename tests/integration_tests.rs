use chrono::{NaiveTime, Timelike};
use metbus::frame::Value;
use metbus::reader::{LineSource, LinkError, LinkReader, LinkSettings, LinkState};
use metbus::{SeriesStore, StationCatalog};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Plays back a fixed set of lines, then idles (or fails) like a quiet link.
struct ScriptedSource {
    lines: VecDeque<String>,
    fail_when_empty: bool,
}

impl ScriptedSource {
    fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|line| line.to_string()).collect(),
            fail_when_empty: false,
        }
    }

    fn failing_after(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|line| line.to_string()).collect(),
            fail_when_empty: true,
        }
    }
}

impl LineSource for ScriptedSource {
    fn read_line(&mut self) -> Result<Option<String>, LinkError> {
        match self.lines.pop_front() {
            Some(line) => Ok(Some(line)),
            None if self.fail_when_empty => Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted link failure",
            ))),
            None => {
                // Behave like a read timeout on an idle link
                thread::sleep(Duration::from_millis(5));
                Ok(None)
            }
        }
    }
}

/// Always has another line ready, like a link with bytes still buffered.
struct FirehoseSource {
    counter: u64,
}

impl LineSource for FirehoseSource {
    fn read_line(&mut self) -> Result<Option<String>, LinkError> {
        self.counter += 1;
        Ok(Some(format!("|4|S4|13:11:16|{}|50.0| & |", self.counter % 100)))
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_end_to_end_ingestion() {
    let catalog = Arc::new(StationCatalog::default());
    let store = Arc::new(SeriesStore::new(&catalog));

    let source = ScriptedSource::new(&[
        "|4|S4|13:11:16|21.5|46.0| & |",
        "|5|S5|13:11:17|20.1|55.0|412| & |",
    ]);

    let mut reader =
        LinkReader::start_with_source(source, Arc::clone(&catalog), Arc::clone(&store)).unwrap();

    assert!(wait_for(|| store.stats().points_appended >= 5));
    reader.stop();

    // Wakanda's values land on its declared variables in order
    let temperature = store.latest("Wakanda", "Temperature").unwrap();
    assert_eq!(temperature.value, Value::Numeric(21.5));
    let humidity = store.latest("Wakanda", "Humidity").unwrap();
    assert_eq!(humidity.value, Value::Numeric(46.0));

    let co2 = store.latest("Thouars", "CO2").unwrap();
    assert_eq!(co2.value, Value::Numeric(412.0));

    let stats = reader.stats();
    assert_eq!(stats.lines_read, 2);
    assert_eq!(stats.readings_decoded, 2);
    assert_eq!(stats.values_stored, 5);
}

#[test]
fn test_reference_clock_stamps_other_stations() {
    let catalog = Arc::new(StationCatalog::default());
    let store = Arc::new(SeriesStore::new(&catalog));

    // Wakanda (the reference) reports 13:11:16; Rennes then reports its
    // own, different clock
    let source = ScriptedSource::new(&[
        "|4|S4|13:11:16|21.5|46.0| & |",
        "|1|S1|09:00:00|880.0| & |",
    ]);

    let mut reader =
        LinkReader::start_with_source(source, Arc::clone(&catalog), Arc::clone(&store)).unwrap();

    assert!(wait_for(|| store.stats().points_appended >= 3));
    reader.stop();

    let luminosity = store.latest("Rennes", "Luminosity").unwrap();
    assert_eq!(luminosity.value, Value::Numeric(880.0));
    assert_eq!(
        luminosity.timestamp.time(),
        NaiveTime::from_hms_opt(13, 11, 16).unwrap()
    );
}

#[test]
fn test_own_timestamp_used_before_reference_appears() {
    let catalog = Arc::new(StationCatalog::default());
    let store = Arc::new(SeriesStore::new(&catalog));

    let source = ScriptedSource::new(&["|1|S1|09:00:00|880.0| & |"]);

    let mut reader =
        LinkReader::start_with_source(source, Arc::clone(&catalog), Arc::clone(&store)).unwrap();

    assert!(wait_for(|| store.stats().points_appended >= 1));
    reader.stop();

    let luminosity = store.latest("Rennes", "Luminosity").unwrap();
    assert_eq!(luminosity.timestamp.hour(), 9);
}

#[test]
fn test_untimed_readings_are_dropped_and_counted() {
    let catalog = Arc::new(StationCatalog::default());
    let store = Arc::new(SeriesStore::new(&catalog));

    // No reference clock yet and no parseable time of its own
    let source = ScriptedSource::new(&["|1|S1|not-a-time|880.0| & |"]);

    let mut reader =
        LinkReader::start_with_source(source, Arc::clone(&catalog), Arc::clone(&store)).unwrap();

    assert!(wait_for(|| reader.stats().untimed_readings >= 1));
    reader.stop();

    assert!(store.latest("Rennes", "Luminosity").is_none());
    assert_eq!(store.stats().points_appended, 0);
}

#[test]
fn test_short_readings_fill_leading_variables_only() {
    let catalog = Arc::new(StationCatalog::default());
    let store = Arc::new(SeriesStore::new(&catalog));

    // Thouars declares [Temperature, Humidity, CO2] but reports one value
    let source = ScriptedSource::new(&["|5|S5|13:11:17|20.1| & |"]);

    let mut reader =
        LinkReader::start_with_source(source, Arc::clone(&catalog), Arc::clone(&store)).unwrap();

    assert!(wait_for(|| store.stats().points_appended >= 1));
    reader.stop();

    assert!(store.latest("Thouars", "Temperature").is_some());
    assert!(store.latest("Thouars", "Humidity").is_none());
    assert!(store.latest("Thouars", "CO2").is_none());
    assert_eq!(reader.stats().short_readings, 1);
}

#[test]
fn test_stop_is_idempotent_and_blocking() {
    let catalog = Arc::new(StationCatalog::default());
    let store = Arc::new(SeriesStore::new(&catalog));

    let source = ScriptedSource::new(&[]);
    let mut reader =
        LinkReader::start_with_source(source, Arc::clone(&catalog), Arc::clone(&store)).unwrap();

    assert!(wait_for(|| reader.state() == LinkState::Streaming));

    reader.stop();
    assert_eq!(reader.state(), LinkState::Stopped);

    // Second stop is a no-op
    reader.stop();
    assert_eq!(reader.state(), LinkState::Stopped);
}

#[test]
fn test_no_appends_after_stop_returns() {
    let catalog = Arc::new(StationCatalog::default());
    let store = Arc::new(SeriesStore::new(&catalog));

    // The source always has more lines buffered
    let source = FirehoseSource { counter: 0 };
    let mut reader =
        LinkReader::start_with_source(source, Arc::clone(&catalog), Arc::clone(&store)).unwrap();

    assert!(wait_for(|| store.stats().points_appended >= 10));
    reader.stop();

    // The loop has joined: nothing may append anymore
    let frozen = store.stats().points_appended;
    thread::sleep(Duration::from_millis(100));
    assert_eq!(store.stats().points_appended, frozen);
    assert_eq!(reader.state(), LinkState::Stopped);
}

#[test]
fn test_fatal_io_error_parks_the_reader_stopped() {
    let catalog = Arc::new(StationCatalog::default());
    let store = Arc::new(SeriesStore::new(&catalog));

    let source = ScriptedSource::failing_after(&["|4|S4|13:11:16|21.5|46.0| & |"]);
    let reader =
        LinkReader::start_with_source(source, Arc::clone(&catalog), Arc::clone(&store)).unwrap();

    // The reader ingests the line, then hits the scripted failure
    assert!(wait_for(|| reader.state() == LinkState::Stopped));
    assert_eq!(reader.stats().lines_read, 1);

    // Data ingested before the failure stays available to pollers
    assert!(store.latest("Wakanda", "Temperature").is_some());
}

#[test]
fn test_decode_errors_do_not_stop_the_stream() {
    let catalog = Arc::new(StationCatalog::default());
    let store = Arc::new(SeriesStore::new(&catalog));

    let source = ScriptedSource::new(&[
        "|9|S9|13:11:16|1.0| & |",
        "garbage with no separators at all",
        "|4|S4|13:11:16|21.5|46.0| & |",
    ]);

    let mut reader =
        LinkReader::start_with_source(source, Arc::clone(&catalog), Arc::clone(&store)).unwrap();

    assert!(wait_for(|| store.stats().points_appended >= 2));
    reader.stop();

    assert_eq!(reader.stats().lines_read, 3);
    assert!(store.latest("Wakanda", "Temperature").is_some());
}

#[test]
fn test_connect_failure_is_surfaced_without_retry() {
    let catalog = Arc::new(StationCatalog::default());
    let store = Arc::new(SeriesStore::new(&catalog));

    let settings = LinkSettings {
        port: "/dev/metbus-no-such-device".to_string(),
        ..LinkSettings::default()
    };

    let result = LinkReader::start(&settings, catalog, store);
    assert!(matches!(result, Err(LinkError::Connect { .. })));
}
