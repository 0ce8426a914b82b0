//! The manager and its event loop (spec.md §4.3).
use crate::*;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

pub(crate) type QueueEntry = (Event, ChannelSet);

/// The root behavior of a tree: the event queue, the merged handler
/// registry, the running flag and the tick counter.
///
/// There is no separate public `Manager` type distinct from [`Component`].
/// Per spec.md §3's invariant ("any component becomes a manager when it
/// has no parent"), `ManagerState` is the private payload a root
/// `Component` carries; `Component::fire`/`tick`/`run`/`stop` delegate to
/// the free functions in this module against whichever node is currently
/// the root of the caller's tree.
pub(crate) struct ManagerState {
    pub(crate) registry: HandlerRegistry,
    pub(crate) queue: VecDeque<QueueEntry>,
    pub(crate) running: bool,
    pub(crate) ticks: u64,
    /// Resolves a registry [`registry::Entry`]'s `ComponentId` back to the
    /// live node, so dispatch can reach its handler callbacks.
    pub(crate) nodes: HashMap<ComponentId, Weak<RefCell<ComponentNode>>>,
}

impl ManagerState {
    pub(crate) fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            queue: VecDeque::new(),
            running: false,
            ticks: 0,
            nodes: HashMap::new(),
        }
    }

    /// Tick counter: how many full `tick()` calls this manager has run.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Is this manager's loop currently running?
    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Namespace for the free functions implementing the event loop against a
/// root node. Not exported: callers drive the loop through [`Component`].
pub(crate) struct Manager;

impl Manager {
    /// Appends `(event, channels)` to `root`'s queue. Never blocks.
    pub(crate) fn enqueue(
        root: &Rc<RefCell<ComponentNode>>,
        event: Event,
        channels: ChannelSet,
    ) -> Value {
        let value = event.value().clone();
        root.borrow_mut()
            .manager
            .as_mut()
            .expect("root always has a manager")
            .queue
            .push_back((event, channels));
        value
    }

    fn collect_all(node: &Rc<RefCell<ComponentNode>>) -> Vec<Rc<RefCell<ComponentNode>>> {
        let mut out = vec![Rc::clone(node)];
        let children: Vec<_> = node.borrow().children.iter().cloned().collect();
        for child in children {
            out.extend(Self::collect_all(&child));
        }
        out
    }

    /// Drains every event queued *before* this call (spec.md §4.3
    /// `flush`): events fired by a handler during this pass land in the
    /// queue for the *next* `flush`/`tick`, never this one.
    pub(crate) fn flush(root: &Rc<RefCell<ComponentNode>>) {
        let pending: Vec<QueueEntry> = {
            let mut root_mut = root.borrow_mut();
            let manager = root_mut
                .manager
                .as_mut()
                .expect("root always has a manager");
            std::mem::take(&mut manager.queue).into_iter().collect()
        };
        for (event, channels) in pending {
            Self::dispatch_one(root, event, channels);
        }
    }

    /// One pump step: flush once, poll every `generate_events` producer in
    /// the tree, return whether work remains (spec.md §4.3 `tick`).
    pub(crate) fn tick_root(root: &Rc<RefCell<ComponentNode>>) -> bool {
        Self::flush(root);

        for node in Self::collect_all(root) {
            let events: Vec<Event> = {
                let mut node_mut = node.borrow_mut();
                match node_mut.generator.as_mut() {
                    Some(generator) => generator(),
                    None => Vec::new(),
                }
            };
            if events.is_empty() {
                continue;
            }
            let channel = node.borrow().channel.clone();
            for event in events {
                Self::enqueue(root, event, std::iter::once(channel.clone()).collect());
            }
        }

        let mut root_mut = root.borrow_mut();
        let manager = root_mut
            .manager
            .as_mut()
            .expect("root always has a manager");
        manager.ticks += 1;
        !manager.queue.is_empty()
    }

    /// Loops `tick()` until [`Component::stop`] is observed, firing
    /// `Started` before the first tick and `Stopped` once the loop exits
    /// (spec.md §4.3 `run`, SPEC_FULL.md §4.3).
    pub(crate) fn run_root(root: &Rc<RefCell<ComponentNode>>) {
        root.borrow_mut()
            .manager
            .as_mut()
            .expect("root always has a manager")
            .running = true;

        let root_name = root.borrow().name.clone();
        log::info!("{root_name:?}: starting run loop");
        let started = Event::new("started").arg("run").channel(Channel::ANY).build();
        Self::enqueue(root, started, [Channel::ANY].into_iter().collect());

        loop {
            Self::tick_root(root);
            let running = root
                .borrow()
                .manager
                .as_ref()
                .expect("root always has a manager")
                .running;
            if !running {
                break;
            }
        }

        log::info!("{root_name:?}: stopped");
        let stopped = Event::new("stopped").channel(Channel::ANY).build();
        Self::enqueue(root, stopped, [Channel::ANY].into_iter().collect());
        Self::flush(root);
    }

    fn handle_error(
        root: &Rc<RefCell<ComponentNode>>,
        event_name: &str,
        value: &Value,
        err: HandlerError,
        handler_node: &Rc<RefCell<ComponentNode>>,
    ) {
        let handler_name = handler_node.borrow().name.clone();
        log::warn!("handler on {handler_name:?} failed dispatching {event_name:?}: {err}");
        let error_event = Event::new("error")
            .arg(event_name.to_string())
            .arg(value.clone())
            .arg(err.to_string())
            .arg(handler_name)
            .channel(Channel::ANY)
            .build();
        Self::enqueue(root, error_event, [Channel::ANY].into_iter().collect());
    }

    /// Dispatches one event: resolves handlers across its target channels,
    /// deduplicates, invokes them in priority order, captures returns (or
    /// errors) into the event's `Value`, honors filter short-circuiting,
    /// and chain-fires `notify`/`then` follow-up events (spec.md §4.3,
    /// steps 1-8).
    fn dispatch_one(root: &Rc<RefCell<ComponentNode>>, mut event: Event, channels: ChannelSet) {
        let kind = event.name().to_string();
        log::debug!("dispatch {kind:?} on {channels:?}");

        let mut merged: Vec<registry::Entry> = Vec::new();
        {
            let root_ref = root.borrow();
            let manager = root_ref
                .manager
                .as_ref()
                .expect("root always has a manager");
            for channel in &channels {
                merged.extend(manager.registry.lookup(channel, &kind));
            }
        }
        registry::dedup_by_handler(&mut merged);
        merged.sort_by(|a, b| b.priority.cmp(&a.priority));

        let value = event.value().clone();

        if merged.is_empty() {
            log::warn!("no handler matched ({channels:?}, {kind:?}); dropping event");
            value.complete();
            return;
        }

        let mut ran = 0usize;
        for entry in &merged {
            let node = {
                let root_ref = root.borrow();
                let manager = root_ref
                    .manager
                    .as_ref()
                    .expect("root always has a manager");
                manager.nodes.get(&entry.component).and_then(Weak::upgrade)
            };
            let Some(node) = node else { continue };

            // Clone the `Rc<HandlerSpec>` out and drop the node borrow before
            // invoking the callback: a handler that fires a new event
            // against this same (root) component would otherwise try to
            // re-borrow `node`'s `RefCell` while it was still held here.
            let spec = Rc::clone(&node.borrow().handlers[entry.handler_index]);
            let is_filter = spec.filter;
            let outcome = {
                let mut callback = spec.callback.borrow_mut();
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (*callback)(&event)))
            };
            ran += 1;

            match outcome {
                Ok(Ok(Some(payload))) => {
                    value.record(payload);
                    value.mark_handled();
                    if is_filter {
                        event.mark_success();
                        break;
                    }
                }
                Ok(Ok(None)) => {
                    value.mark_handled();
                }
                Ok(Err(handler_err)) => {
                    Self::handle_error(root, &kind, &value, handler_err, &node);
                    event.mark_failure();
                    value.mark_error();
                    if is_filter {
                        break;
                    }
                }
                Err(panic_payload) => {
                    let err = HandlerError::Panicked(panic_message(panic_payload));
                    Self::handle_error(root, &kind, &value, err, &node);
                    event.mark_failure();
                    value.mark_error();
                    if is_filter {
                        break;
                    }
                }
            }
        }

        if ran > 0 && !event.failure() {
            event.mark_success();
        }

        value.complete();

        if let Some(notify_kind) = event.notify() {
            let notify_event = Event::new(notify_kind.to_string()).arg(value.clone()).build();
            Self::enqueue(root, notify_event, channels.clone());
        }
        for then_kind in value.take_thens() {
            let then_event = Event::new(then_kind).arg(value.clone()).build();
            Self::enqueue(root, then_event, channels.clone());
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc as StdRc;

    #[test]
    fn echo_scenario_returns_args_via_value() {
        let root = Component::new("root", Channel::new("echo")).handler(HandlerSpec::listener(
            ["hello"],
            |event| Ok(Some(payload(event.args().get::<&str>(0).copied().unwrap_or("")))),
        ));
        let value = root.fire(Event::new("hello").arg("world").build(), []);
        root.tick();
        assert_eq!(*value.get::<&str>().unwrap(), "world");
        assert!(value.handled());
    }

    #[test]
    fn filter_short_circuits_remaining_handlers() {
        let second_ran = StdRc::new(Cell::new(false));
        let second_ran_clone = second_ran.clone();
        let root = Component::new("root", Channel::new("c"))
            .handler(
                HandlerSpec::listener(["k"], |_| Ok(Some(payload(1i32))))
                    .as_filter()
                    .with_priority(10),
            )
            .handler(HandlerSpec::listener(["k"], move |_| {
                second_ran_clone.set(true);
                Ok(Some(payload(2i32)))
            }).with_priority(0));
        let value = root.fire(Event::new("k").build(), []);
        root.tick();
        assert_eq!(*value.get::<i32>().unwrap(), 1);
        assert!(!second_ran.get());
    }

    #[test]
    fn dropped_event_leaves_value_unhandled() {
        let root = Component::new("root", Channel::new("echo"));
        let value = root.fire(Event::new("nobody-listens").build(), []);
        root.tick();
        assert!(!value.handled());
    }

    #[test]
    fn handler_error_fires_error_event_and_marks_value() {
        let errors_seen = StdRc::new(Cell::new(0));
        let errors_seen_clone = errors_seen.clone();
        let root = Component::new("root", Channel::new("c"))
            .handler(HandlerSpec::listener(["k"], |_| {
                Err(HandlerError::Failed("boom".into()))
            }))
            .handler(HandlerSpec::catch_all(move |event| {
                if event.name() == "error" {
                    errors_seen_clone.set(errors_seen_clone.get() + 1);
                }
                Ok(None)
            }).on_channel(Channel::ANY));
        let value = root.fire(Event::new("k").build(), []);
        root.tick(); // dispatches k, enqueues Error
        root.tick(); // dispatches Error
        assert!(value.errors());
        assert_eq!(errors_seen.get(), 1);
    }

    #[test]
    fn notify_chain_fires_after_completion() {
        let done_seen = StdRc::new(Cell::new(false));
        let done_seen_clone = done_seen.clone();
        let root = Component::new("root", Channel::new("c"))
            .handler(HandlerSpec::listener(["k"], |_| Ok(Some(payload(7i32)))))
            .handler(HandlerSpec::listener(["done"], move |_| {
                done_seen_clone.set(true);
                Ok(None)
            }));
        let event = Event::new("k").notify("done").build();
        root.fire(event, []);
        root.tick();
        root.tick();
        assert!(done_seen.get());
    }
}
