//! The deferred result of a fired event.
use crate::*;
use futures::channel::oneshot;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A lightweight snapshot of the [`Event`] a [`Value`] belongs to.
///
/// `Value` cannot hold a strong reference back to its owning `Event` — the
/// `Event` already owns the `Value`, and a strong back-reference would form
/// an ownership cycle neither side can ever free. `EventDigest` carries just
/// enough information (currently the event's kind) for diagnostics and the
/// [`crate::ext::Debugger`] to report on. See `SPEC_FULL.md` §3/§10.
#[derive(Clone, Debug)]
pub struct EventDigest {
    /// The kind of the event this value completes.
    pub name: String,
}

/// The collected handler return(s) for one dispatched event.
#[derive(Debug)]
enum Slot {
    /// No handler has completed yet.
    Empty,
    /// Exactly one handler ran; this is its return value.
    One(Payload),
    /// More than one handler ran; these are their return values, in
    /// dispatch order.
    Many(Vec<Payload>),
}

struct ValueInner {
    slot: Slot,
    errors: bool,
    handled: bool,
    complete: bool,
    digest: EventDigest,
    parent: Option<Value>,
    thens: Vec<String>,
    waiters: Vec<oneshot::Sender<()>>,
}

impl fmt::Debug for ValueInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("slot", &self.slot)
            .field("errors", &self.errors)
            .field("handled", &self.handled)
            .field("complete", &self.complete)
            .field("event", &self.digest.name)
            .finish()
    }
}

/// A settable-once-per-handler container for the result of a fired
/// [`Event`].
///
/// `Value` is cheap to clone (it is a reference-counted handle over shared
/// state) — cloning it gives a second observer of the same completion, not
/// a copy of the result.
#[derive(Clone)]
pub struct Value(Rc<RefCell<ValueInner>>);

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.borrow().fmt(f)
    }
}

impl Value {
    /// Creates a fresh, unbound `Value` for an event about to be fired.
    pub fn new(digest: EventDigest) -> Self {
        Self(Rc::new(RefCell::new(ValueInner {
            slot: Slot::Empty,
            errors: false,
            handled: false,
            complete: false,
            digest,
            parent: None,
            thens: Vec::new(),
            waiters: Vec::new(),
        })))
    }

    /// Sets the `Value`'s parent: once `self` completes, its value/errors
    /// state propagates into `parent` as well.
    pub fn with_parent(self, parent: Value) -> Self {
        self.0.borrow_mut().parent = Some(parent);
        self
    }

    /// Schedules `kind` to be fired, with `self` as its sole argument, once
    /// this value completes.
    pub fn then(&self, kind: impl Into<String>) {
        self.0.borrow_mut().thens.push(kind.into());
    }

    /// The event kind this value is completing for.
    pub fn event_name(&self) -> String {
        self.0.borrow().digest.name.clone()
    }

    /// Is at least one handler's result recorded?
    pub fn is_complete(&self) -> bool {
        self.0.borrow().complete
    }

    /// Did any handler that ran for this event fail?
    pub fn errors(&self) -> bool {
        self.0.borrow().errors
    }

    /// Was at least one matching handler found and invoked?
    pub fn handled(&self) -> bool {
        self.0.borrow().handled
    }

    /// Returns the single handler return, if exactly one handler ran and it
    /// returned `T`.
    pub fn get<T: 'static>(&self) -> Option<std::cell::Ref<'_, T>> {
        let inner = self.0.borrow();
        match &inner.slot {
            Slot::One(payload) if payload.is::<T>() => {
                Some(std::cell::Ref::map(inner, |i| match &i.slot {
                    Slot::One(p) => p.downcast_ref::<T>().expect("checked above"),
                    _ => unreachable!(),
                }))
            }
            _ => None,
        }
    }

    /// How many handler returns were recorded (0, 1, or many).
    pub fn len(&self) -> usize {
        match &self.0.borrow().slot {
            Slot::Empty => 0,
            Slot::One(_) => 1,
            Slot::Many(v) => v.len(),
        }
    }

    /// Is this value still empty (no handler recorded a return yet)?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves into a [`std::future::Future`] that completes once this
    /// `Value` is completed by the manager, for callers bridging into async
    /// code. The core's own loop stays synchronous (spec.md §5); this is
    /// purely an adapter for external callers.
    pub fn into_future(self) -> impl std::future::Future<Output = Value> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.0.borrow_mut();
            if inner.complete {
                let _ = tx.send(());
            } else {
                inner.waiters.push(tx);
            }
        }
        let value = self.clone();
        async move {
            let _ = rx.await;
            value
        }
    }

    // --- manager-internal mutation surface ---

    pub(crate) fn record(&self, result: Payload) {
        let mut inner = self.0.borrow_mut();
        inner.handled = true;
        inner.slot = match std::mem::replace(&mut inner.slot, Slot::Empty) {
            Slot::Empty => Slot::One(result),
            Slot::One(first) => Slot::Many(vec![first, result]),
            Slot::Many(mut many) => {
                many.push(result);
                Slot::Many(many)
            }
        };
    }

    pub(crate) fn mark_handled(&self) {
        self.0.borrow_mut().handled = true;
    }

    pub(crate) fn mark_error(&self) {
        self.0.borrow_mut().errors = true;
    }

    pub(crate) fn complete(&self) {
        let (parent, errors, handled, waiters) = {
            let mut inner = self.0.borrow_mut();
            inner.complete = true;
            let waiters = std::mem::take(&mut inner.waiters);
            (inner.parent.clone(), inner.errors, inner.handled, waiters)
        };

        if let Some(parent) = parent {
            if errors {
                parent.mark_error();
            }
            if handled {
                parent.mark_handled();
            }
        }

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// Drains and returns the event kinds scheduled via [`Value::then`],
    /// for the manager to fire after completion.
    pub(crate) fn take_thens(&self) -> Vec<String> {
        std::mem::take(&mut self.0.borrow_mut().thens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest() -> EventDigest {
        EventDigest { name: "test".into() }
    }

    #[test]
    fn fresh_value_is_incomplete_and_unhandled() {
        let value = Value::new(digest());
        assert!(!value.is_complete());
        assert!(!value.handled());
        assert!(!value.errors());
        assert!(value.is_empty());
    }

    #[test]
    fn single_record_is_exposed_as_get() {
        let value = Value::new(digest());
        value.record(payload(42i32));
        assert_eq!(value.len(), 1);
        assert_eq!(*value.get::<i32>().unwrap(), 42);
    }

    #[test]
    fn multiple_records_stop_exposing_get() {
        let value = Value::new(digest());
        value.record(payload(1i32));
        value.record(payload(2i32));
        assert_eq!(value.len(), 2);
        assert!(value.get::<i32>().is_none());
    }

    #[test]
    fn completion_propagates_into_parent() {
        let parent = Value::new(digest());
        let child = Value::new(digest()).with_parent(parent.clone());
        child.mark_error();
        child.mark_handled();
        child.complete();
        assert!(parent.errors());
        assert!(parent.handled());
    }

    #[test]
    fn then_registers_and_drains_once() {
        let value = Value::new(digest());
        value.then("done");
        let thens = value.take_thens();
        assert_eq!(thens, vec!["done".to_string()]);
        assert!(value.take_thens().is_empty());
    }
}
