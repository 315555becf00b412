//! Run Monitoring Module
//!
//! Tracks step timing during subject runs for reporting.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Step start/end timing and durations

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};
