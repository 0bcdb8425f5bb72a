//! Market lifecycle engines
//!
//! Discovery creates markets, the collector appends snapshots while a market
//! is inside its hour, and resolution records the outcome once the venue
//! settles. The engines never call each other; they only share the
//! repository and the data source.

pub mod collector;
pub mod discovery;
pub mod resolution;

pub use collector::SnapshotCollector;
pub use discovery::{DiscoveryEngine, SlugOutcome};
pub use resolution::{Resolution, ResolutionEngine};
