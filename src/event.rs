//! Events
use crate::*;
use downcast_rs::{impl_downcast, Downcast};
use std::collections::HashMap;
use std::fmt;

/// A single positional or keyword argument carried by an [`Event`].
///
/// Payloads are opaque to the core: it never inspects or compares them,
/// only stores and hands them back to handlers. Any `'static + Debug` value
/// can be carried; handlers that expect a structured payload downcast on
/// entry via [`Args::get`]/[`Kwargs::get`].
///
/// `fmt_debug` exists so `dyn PayloadValue` itself can implement
/// [`fmt::Debug`] below — forwarding straight to `fmt::Debug::fmt` from
/// inside the blanket impl (where `Self` is still the concrete type)
/// avoids the infinite recursion a direct `dyn PayloadValue: Debug` impl
/// would otherwise hit.
pub trait PayloadValue: Downcast {
    /// Forwards to the concrete value's own `Debug` impl.
    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}
impl_downcast!(PayloadValue);
impl<T: fmt::Debug + 'static> PayloadValue for T {
    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Debug for dyn PayloadValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_debug(f)
    }
}

/// A boxed, type-erased event argument.
pub type Payload = Box<dyn PayloadValue>;

/// Boxes any `'static + Debug` value as a [`Payload`].
pub fn payload<T: fmt::Debug + 'static>(value: T) -> Payload {
    Box::new(value)
}

/// The ordered positional arguments of an [`Event`].
#[derive(Default, Debug)]
pub struct Args(Vec<Payload>);

impl Args {
    /// An empty argument tuple.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of positional arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Is this argument tuple empty?
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends a positional argument, returning `self` for chaining.
    pub fn push(mut self, value: impl fmt::Debug + 'static) -> Self {
        self.0.push(payload(value));
        self
    }

    /// Returns the argument at `index`, downcast to `T`, if present and of
    /// that type.
    pub fn get<T: 'static>(&self, index: usize) -> Option<&T> {
        self.0.get(index).and_then(|p| p.downcast_ref::<T>())
    }

    /// Iterates the raw (type-erased) arguments in order.
    pub fn iter(&self) -> impl Iterator<Item = &Payload> {
        self.0.iter()
    }
}

/// The keyword arguments of an [`Event`]. Insertion order is not
/// significant (spec.md §3).
#[derive(Default, Debug)]
pub struct Kwargs(HashMap<String, Payload>);

impl Kwargs {
    /// An empty keyword mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a keyword argument, returning `self` for chaining.
    pub fn set(mut self, key: impl Into<String>, value: impl fmt::Debug + 'static) -> Self {
        self.0.insert(key.into(), payload(value));
        self
    }

    /// Returns the keyword argument named `key`, downcast to `T`, if
    /// present and of that type.
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.0.get(key).and_then(|p| p.downcast_ref::<T>())
    }

    /// Is this mapping empty?
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Lowercases the last path segment of a Rust type name, for use as the
/// default [`Event`] kind — the direct analogue of spec.md §3's "kind
/// (class name lowercased)".
pub fn kind_of<T: 'static>() -> String {
    let full = std::any::type_name::<T>();
    let simple = full.rsplit("::").next().unwrap_or(full);
    simple.to_ascii_lowercase()
}

/// A typed record of *what happened*.
///
/// Events are single-use: once fired and dispatched they should not be
/// fired a second time (their [`Value`] has already been bound and
/// completed). Equality is by identity, so `Event` intentionally does not
/// implement `PartialEq`.
#[derive(Debug)]
pub struct Event {
    name: String,
    args: Args,
    kwargs: Kwargs,
    channels: ChannelSet,
    value: Value,
    success: bool,
    failure: bool,
    notify: Option<String>,
}

impl Event {
    /// Starts building an event of the given kind.
    pub fn new(name: impl Into<String>) -> EventBuilder {
        EventBuilder::new(name.into())
    }

    /// Starts building an event whose kind defaults to `T`'s lowercased
    /// type name, e.g. `Event::of::<Hello>()` defaults to kind `"hello"`.
    pub fn of<T: 'static>() -> EventBuilder {
        EventBuilder::new(kind_of::<T>())
    }

    /// The event's kind.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The event's positional arguments.
    pub fn args(&self) -> &Args {
        &self.args
    }

    /// The event's keyword arguments.
    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// The event's explicit target channels (empty means "use the firing
    /// component's default channel").
    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// The [`Value`] bound to this event at enqueue time.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Did every handler that ran for this event complete without error?
    pub fn success(&self) -> bool {
        self.success
    }

    /// Did at least one handler for this event fail?
    pub fn failure(&self) -> bool {
        self.failure
    }

    /// The event kind to chain-fire on completion, if any.
    pub fn notify(&self) -> Option<&str> {
        self.notify.as_deref()
    }

    pub(crate) fn mark_success(&mut self) {
        self.success = true;
        self.failure = false;
    }

    pub(crate) fn mark_failure(&mut self) {
        self.failure = true;
        self.success = false;
    }
}

/// Builds an [`Event`] before it is fired.
pub struct EventBuilder {
    name: String,
    args: Args,
    kwargs: Kwargs,
    channels: ChannelSet,
    notify: Option<String>,
}

impl EventBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            args: Args::new(),
            kwargs: Kwargs::new(),
            channels: ChannelSet::new(),
            notify: None,
        }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl fmt::Debug + 'static) -> Self {
        self.args = self.args.push(value);
        self
    }

    /// Sets a keyword argument.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl fmt::Debug + 'static) -> Self {
        self.kwargs = self.kwargs.set(key, value);
        self
    }

    /// Adds an explicit target channel. May be called more than once.
    pub fn channel(mut self, channel: impl Into<Channel>) -> Self {
        self.channels.insert(channel.into());
        self
    }

    /// Sets the event kind to chain-fire, with this event's completed
    /// [`Value`] as its sole argument, once dispatch finishes.
    pub fn notify(mut self, kind: impl Into<String>) -> Self {
        self.notify = Some(kind.into());
        self
    }

    /// Finishes the builder, producing an [`Event`] bound to a fresh
    /// [`Value`].
    pub fn build(self) -> Event {
        let digest = EventDigest {
            name: self.name.clone(),
        };
        Event {
            name: self.name,
            args: self.args,
            kwargs: self.kwargs,
            channels: self.channels,
            value: Value::new(digest),
            success: false,
            failure: false,
            notify: self.notify,
        }
    }
}
