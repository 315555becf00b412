//! Subject Execution Timeline
//!
//! Records when each pipeline step of a subject starts and finishes so the
//! run summary can report per-step durations.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Started,
    Completed,
    Failed,
}

/// A single event in the timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// 1-based step number
    pub step: usize,
    pub event_type: EventType,
    pub timestamp: Instant,
}

/// Start/finish events for the steps of one subject run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Records an event for a step.
    pub fn add_event(&mut self, step: usize, event_type: EventType) {
        self.events.push(TimelineEvent {
            step,
            event_type,
            timestamp: Instant::now(),
        });
    }

    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Time since the timeline was created.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Durations of every finished step, keyed and ordered by step number.
    ///
    /// Steps that started but never finished are left out.
    pub fn durations(&self) -> BTreeMap<usize, Duration> {
        let mut starts: BTreeMap<usize, Instant> = BTreeMap::new();
        let mut durations = BTreeMap::new();

        for event in &self.events {
            match event.event_type {
                EventType::Started => {
                    starts.insert(event.step, event.timestamp);
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = starts.get(&event.step) {
                        durations.insert(event.step, event.timestamp.duration_since(*start));
                    }
                }
            }
        }

        durations
    }

    /// The last step that finished with a failure, if any.
    pub fn failed_step(&self) -> Option<usize> {
        self.events
            .iter()
            .rev()
            .find(|e| e.event_type == EventType::Failed)
            .map(|e| e.step)
    }

    /// Renders one line per finished step with its duration.
    pub fn summary(&self) -> String {
        let mut output = String::new();
        let failed = self.failed_step();

        for (step, duration) in self.durations() {
            let marker = if Some(step) == failed { "FAILED" } else { "ok" };
            output.push_str(&format!(
                "  step {:>2}  {:>6}  {:.2?}\n",
                step, marker, duration
            ));
        }

        output.push_str(&format!("  total {:.2?}\n", self.elapsed()));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}
