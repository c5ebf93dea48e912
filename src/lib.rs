//! # Multi-Station Weather Telemetry Bus
//!
//! An embedded-adjacent telemetry ingestion library providing serial link
//! management, delimiter-based multi-station frame decoding, cross-station
//! time reconciliation, and bounded time-series buffering for polling
//! consumers.
//!
//! ## Features
//!
//! - **Background link reader**: one thread owns the serial connection with
//!   cooperative, join-on-stop shutdown
//! - **Tolerant frame decoding**: malformed records are dropped and logged,
//!   never aborting their siblings or the stream
//! - **Reference-clock reconciliation**: all readings in a decode pass share
//!   the reference station's timestamp so series stay aligned on one axis
//! - **Bounded memory**: fixed-capacity FIFO ring per (station, variable),
//!   lossy by design
//! - **Poll-based consumption**: snapshot/latest accessors, no events
//!
//! ## Quick Start
//!
//! ```rust
//! use metbus::{frame, SeriesStore, StationCatalog};
//!
//! let catalog = StationCatalog::default();
//! let store = SeriesStore::new(&catalog);
//!
//! // Station 4 is "Wakanda" in the default catalog
//! let readings = frame::decode("|4|S4|13:11:16|21.5|46.0| & |", &catalog);
//! assert_eq!(readings[0].station, "Wakanda");
//! assert_eq!(readings[0].values.len(), 2);
//!
//! // Buffers exist for every catalog pair, empty until the reader appends
//! assert!(store.latest("Wakanda", "Temperature").is_none());
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`catalog`] - Station roster, wire indices, and units lookup
//! - [`frame`] - Pure protocol-line decoding
//! - [`reconcile`] - Reference-clock timestamp substitution
//! - [`store`] - Bounded series buffers and the poller-facing read handle
//! - [`reader`] - Serial link lifecycle and the background ingestion loop
//! - [`config`] - Optional on-disk deployment settings

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod catalog;
pub mod config;
pub mod frame;
pub mod reader;
pub mod reconcile;
pub mod store;

// Re-export main public types for convenience
pub use catalog::{Station, StationCatalog};
pub use config::Settings;
pub use frame::{Reading, Value};
pub use reader::{LinkReader, LinkSettings, LinkState};
pub use store::{SeriesPoint, SeriesStore, StoreReader};
