//! Handlers
use crate::*;
use std::cell::RefCell;
use std::fmt;

/// A handler's priority. Higher runs first; ties resolve in
/// registration order (spec.md §4.2).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Priority(
    /// The raw priority value; higher runs first.
    pub i32,
);

impl Priority {
    /// The default priority, `0`.
    pub const DEFAULT: Priority = Priority(0);
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority(value)
    }
}

/// What a handler invocation returns.
pub type HandlerOutcome = Option<Payload>;

/// What a handler invocation returns, including the failure case
/// (spec.md §7(b): "handler exceptions").
pub type HandlerResult = Result<HandlerOutcome, HandlerError>;

/// The callback body of a [`HandlerSpec`].
///
/// Declared as `FnMut` behind a `RefCell` (not `&mut self` on `Component`)
/// so invoking a handler never needs an exclusive borrow of the component
/// tree — only of this one closure's captured state. Component state
/// itself is typically `Rc<RefCell<_>>`-shared into the closure, per
/// spec.md §9's "builder calls at construction" design note.
pub type HandlerFn = Box<dyn FnMut(&Event) -> HandlerResult>;

/// A single handler declaration on a [`Component`].
///
/// Two equivalent declaration forms from spec.md §4.1 — an annotated
/// method with explicit event kinds, or a conventionally-named method
/// matching a kind literally — collapse to the same declarative record
/// here, per spec.md §9's design note replacing reflection with an
/// explicit registration API.
pub struct HandlerSpec {
    /// Event kinds this handler listens for. Empty means catch-all on its
    /// channel.
    pub(crate) kinds: Vec<String>,
    /// Channel override; `None` means "the owning component's channel".
    pub(crate) channel: Option<Channel>,
    /// Dispatch priority; higher runs first.
    pub(crate) priority: Priority,
    /// If true, a non-`None` return short-circuits remaining handlers for
    /// the event (spec.md §3 "Handler" — the `filter` type).
    pub(crate) filter: bool,
    pub(crate) callback: RefCell<HandlerFn>,
}

impl fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSpec")
            .field("kinds", &self.kinds)
            .field("channel", &self.channel)
            .field("priority", &self.priority)
            .field("filter", &self.filter)
            .finish()
    }
}

impl HandlerSpec {
    /// Declares a listener for specific event kinds.
    pub fn listener(
        kinds: impl IntoIterator<Item = impl Into<String>>,
        callback: impl FnMut(&Event) -> HandlerResult + 'static,
    ) -> Self {
        Self {
            kinds: kinds.into_iter().map(Into::into).collect(),
            channel: None,
            priority: Priority::DEFAULT,
            filter: false,
            callback: RefCell::new(Box::new(callback)),
        }
    }

    /// Declares a catch-all handler (no kind filter) on its channel.
    pub fn catch_all(callback: impl FnMut(&Event) -> HandlerResult + 'static) -> Self {
        Self {
            kinds: Vec::new(),
            channel: None,
            priority: Priority::DEFAULT,
            filter: false,
            callback: RefCell::new(Box::new(callback)),
        }
    }

    /// Overrides the target channel this handler listens on.
    pub fn on_channel(mut self, channel: impl Into<Channel>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Sets this handler's dispatch priority.
    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Marks this handler as a *filter*: a non-`None` return short-circuits
    /// remaining handlers for the event.
    pub fn as_filter(mut self) -> Self {
        self.filter = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_all_has_no_declared_kinds() {
        let spec = HandlerSpec::catch_all(|_| Ok(None));
        assert!(spec.kinds.is_empty());
    }

    #[test]
    fn listener_records_declared_kinds() {
        let spec = HandlerSpec::listener(["hello"], |_| Ok(None));
        assert_eq!(spec.kinds, vec!["hello".to_string()]);
    }

    #[test]
    fn builder_sets_priority_and_filter() {
        let spec = HandlerSpec::listener(["k"], |_| Ok(None))
            .with_priority(5)
            .as_filter();
        assert_eq!(spec.priority, Priority(5));
        assert!(spec.filter);
    }
}
