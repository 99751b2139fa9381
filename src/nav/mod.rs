//! The navigation engine: trip segments, the per-segment proximity ladder
//! and the controller that chains segments into a trip.

pub mod controller;
pub mod fix;
pub mod proximity;
pub mod segment;

pub use crate::error::NavError;
pub use controller::{NavigationController, TripPhase};
pub use fix::Fix;
pub use proximity::{Classification, Crossings, Distances, LadderState, ProximityDetector};
pub use segment::{Segment, SegmentBuilder};
