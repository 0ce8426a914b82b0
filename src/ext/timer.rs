//! A `generate_events`-driven timer component (spec.md §5(b), §6).
use crate::*;
use std::time::{Duration, Instant};

/// Builds a `Timer` [`Component`]: on every tick, fires `event_kind` once
/// `interval` has elapsed since the timer's last fire (or since
/// construction, for the first one).
pub struct Timer;

impl Timer {
    /// A timer that fires `event_kind` once, `after` elapses.
    pub fn once(name: impl Into<String>, after: Duration, event_kind: impl Into<String>) -> Component {
        Self::build(name, after, event_kind, false)
    }

    /// A timer that fires `event_kind` every `interval`, indefinitely.
    pub fn repeating(
        name: impl Into<String>,
        interval: Duration,
        event_kind: impl Into<String>,
    ) -> Component {
        Self::build(name, interval, event_kind, true)
    }

    fn build(
        name: impl Into<String>,
        interval: Duration,
        event_kind: impl Into<String>,
        repeat: bool,
    ) -> Component {
        let event_kind = event_kind.into();
        let mut next_fire = Instant::now() + interval;
        let mut fired = false;
        Component::new(name.into(), Channel::ANY).with_generator(move || {
            if fired && !repeat {
                return Vec::new();
            }
            let now = Instant::now();
            if now < next_fire {
                return Vec::new();
            }
            fired = true;
            next_fire = now + interval;
            vec![Event::new(event_kind.clone()).build()]
        })
    }
}
