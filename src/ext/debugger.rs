//! A catch-all observer component, for watching dispatch order and
//! traffic without altering it (spec.md §4.5).
use crate::*;
use std::collections::HashSet;

/// Builds a `Debugger` [`Component`]: a filter-free, catch-all `(*, *)`
/// listener that logs every event it observes via [`log::info!`] and
/// never returns a value, so it never affects any other handler's
/// ordering or a filter's short-circuit.
///
/// Because it is registered like any other component (spec.md §2:
/// "Debugger / Timers ... cross-cutting helpers registered as
/// components"), it observes events in the exact order the manager
/// dispatches them.
pub struct Debugger;

impl Debugger {
    /// A debugger that logs every event.
    pub fn new() -> Component {
        Self::ignoring(std::iter::empty::<String>())
    }

    /// A debugger that logs every event except those whose kind is in
    /// `ignored`.
    pub fn ignoring(ignored: impl IntoIterator<Item = impl Into<String>>) -> Component {
        let ignored: HashSet<String> = ignored.into_iter().map(Into::into).collect();
        Component::new("debugger", Channel::ANY).handler(HandlerSpec::catch_all(move |event| {
            if ignored.contains(event.name()) {
                return Ok(None);
            }
            log::info!(
                "{:?}: {} arg(s), {} kwarg(s)",
                event.name(),
                event.args().len(),
                if event.kwargs().is_empty() { 0 } else { 1 },
            );
            Ok(None)
        }))
    }
}
