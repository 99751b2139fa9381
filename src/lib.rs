//! pullcord - "get ready" and "pull the cord" alerts for transit riders
//!
//! Feeds a stream of GPS fixes through a per-segment proximity ladder and
//! tells the rider when their stop is coming up and when to request it.
//!
//! - `nav`: segments, fixes, the proximity detector and the trip controller
//! - `realtime`: the tokio task that owns a controller and serialises fixes
//! - `replay`: recorded trips, trip plans and offline replays
//! - `telemetry`: per-fix records for later analysis

pub mod config;
pub mod error;
pub mod geo;
pub mod nav;
pub mod realtime;
pub mod replay;
pub mod telemetry;

pub use config::PullcordConfig;
pub use error::{NavError, PullcordError, Result};
pub use geo::GeoPoint;
pub use nav::{Classification, Fix, NavigationController, Segment};
