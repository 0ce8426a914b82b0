//! End-to-end dispatch scenarios (spec.md §8).
use circuits_core::prelude::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn echo() {
    let root = Component::new("root", Channel::new("echo")).handler(HandlerSpec::listener(
        ["hello"],
        |event| Ok(Some(payload(event.args().get::<&str>(0).copied().unwrap_or("")))),
    ));
    let value = root.fire(Event::new("hello").arg("world").build(), [Channel::new("echo")]);
    root.tick();
    assert_eq!(*value.get::<&str>().unwrap(), "world");
}

#[test]
fn wildcard_sink_sees_exactly_one_event() {
    let debugger_hits = Rc::new(Cell::new(0));
    let debugger_hits_clone = debugger_hits.clone();

    let debugger = Component::new("debugger", Channel::ANY).handler(HandlerSpec::catch_all(move |_| {
        debugger_hits_clone.set(debugger_hits_clone.get() + 1);
        Ok(None)
    }));
    let echo = Component::new("echo", Channel::new("echo")).handler(HandlerSpec::listener(
        ["hello"],
        |event| Ok(Some(payload(event.args().get::<&str>(0).copied().unwrap_or("")))),
    ));

    let root = debugger + echo;
    let value = root.fire(Event::new("hello").arg("a").build(), [Channel::new("echo")]);
    root.tick();

    assert_eq!(*value.get::<&str>().unwrap(), "a");
    assert_eq!(debugger_hits.get(), 1);
}

#[test]
fn filter_short_circuit() {
    let second_ran = Rc::new(Cell::new(false));
    let second_ran_clone = second_ran.clone();

    let root = Component::new("root", Channel::new("c"))
        .handler(
            HandlerSpec::listener(["k"], |_| Ok(Some(payload(1i32))))
                .as_filter()
                .with_priority(1),
        )
        .handler(HandlerSpec::listener(["k"], move |_| {
            second_ran_clone.set(true);
            Ok(Some(payload(2i32)))
        }));

    let value = root.fire(Event::new("k").build(), [Channel::new("c")]);
    root.tick();

    assert_eq!(*value.get::<i32>().unwrap(), 1);
    assert!(!second_ran.get());
}

#[test]
fn error_propagation() {
    let observed_on_wildcard = Rc::new(RefCell::new(Vec::new()));
    let observed_clone = observed_on_wildcard.clone();

    let root = Component::new("root", Channel::new("c"))
        .handler(HandlerSpec::listener(["k"], |_| {
            Err(HandlerError::Failed("boom".into()))
        }))
        .handler(
            HandlerSpec::catch_all(move |event| {
                if event.name() == "error" {
                    observed_clone.borrow_mut().push(event.name().to_string());
                }
                Ok(None)
            })
            .on_channel(Channel::ANY),
        );

    let value = root.fire(Event::new("k").build(), [Channel::new("c")]);
    root.tick(); // dispatches k, enqueues the Error event
    root.tick(); // dispatches the Error event

    assert!(value.errors());
    assert_eq!(observed_on_wildcard.borrow().as_slice(), ["error"]);
}

#[test]
fn dynamic_composition() {
    let mut a = Component::new("a", Channel::new("c"));
    let b = Component::new("b", Channel::new("c")).handler(HandlerSpec::listener(["k"], |_| {
        Ok(Some(payload(true)))
    }));

    a += b.clone();
    let value = a.fire(Event::new("k").build(), [Channel::new("c")]);
    a.tick();
    assert!(value.handled());

    b.unregister();
    let value = a.fire(Event::new("k").build(), [Channel::new("c")]);
    a.tick();
    assert!(!value.handled());
}

#[test]
fn notify_chain() {
    let notified_with = Rc::new(RefCell::new(None));
    let notified_with_clone = notified_with.clone();

    let root = Component::new("root", Channel::new("c"))
        .handler(HandlerSpec::listener(["k"], |_| Ok(Some(payload(9i32)))))
        .handler(HandlerSpec::listener(["done"], move |event| {
            let value = event.args().get::<Value>(0).cloned();
            *notified_with_clone.borrow_mut() = value.map(|v| *v.get::<i32>().unwrap());
            Ok(None)
        }));

    root.fire(Event::new("k").notify("done").build(), [Channel::new("c")]);
    root.tick(); // dispatches k, completes its value, enqueues done
    root.tick(); // dispatches done

    assert_eq!(*notified_with.borrow(), Some(9));
}

#[test]
fn register_then_unregister_restores_root_status() {
    let parent = Component::new("parent", Channel::ANY);
    let child = Component::new("child", Channel::new("echo"));
    child.register(&parent).unwrap();
    assert!(!child.is_root());
    child.unregister();
    assert!(child.is_root());
}

#[test]
fn stop_is_idempotent() {
    let root = Component::new("root", Channel::ANY);
    root.stop();
    root.stop();
}

#[test]
fn plus_is_commutative_for_handler_coverage() {
    let a_ran = Rc::new(Cell::new(false));
    let b_ran = Rc::new(Cell::new(false));
    let (a_clone, b_clone) = (a_ran.clone(), b_ran.clone());

    let a = Component::new("a", Channel::new("c")).handler(HandlerSpec::listener(["k"], move |_| {
        a_clone.set(true);
        Ok(None)
    }));
    let b = Component::new("b", Channel::new("c")).handler(HandlerSpec::listener(["k"], move |_| {
        b_clone.set(true);
        Ok(None)
    }));

    let root = b + a;
    root.fire(Event::new("k").build(), [Channel::new("c")]);
    root.tick();

    assert!(a_ran.get());
    assert!(b_ran.get());
}
