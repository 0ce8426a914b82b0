//! Error taxonomy (spec.md §7).
use thiserror::Error;

/// Errors raised synchronously by [`crate::Component::register`].
///
/// These are the only fatal errors in the core: everything handler-side is
/// recoverable by design (spec.md §7 "Fatal vs recoverable").
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The component being registered already has a parent.
    #[error("component {0:?} already has a parent; unregister it first")]
    AlreadyRegistered(String),

    /// The target parent is a descendant of the component being
    /// registered, which would create a cycle in the tree.
    #[error("registering {child:?} under {parent:?} would create a cycle")]
    Cycle {
        /// The component being registered.
        child: String,
        /// The component it was asked to register under.
        parent: String,
    },
}

/// The captured failure of a single handler invocation.
///
/// Rust has no implicit exceptions, so "a handler raises" (spec.md §4.3
/// step 6) is represented as a handler returning `Err`; a handler that
/// genuinely panics is also caught (see `Manager`'s dispatch loop) and
/// folded into this same type, so both failure modes look identical to
/// observers of the `Value`/`Error` event.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Failed(#[from] Box<dyn std::error::Error>),

    /// The handler panicked during invocation.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_registered_message_names_the_component() {
        let err = RegistrationError::AlreadyRegistered("echo".into());
        assert!(err.to_string().contains("echo"));
    }

    #[test]
    fn cycle_message_names_both_components() {
        let err = RegistrationError::Cycle {
            child: "a".into(),
            parent: "b".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains('a') && msg.contains('b'));
    }

    #[test]
    fn panicked_error_carries_message() {
        let err = HandlerError::Panicked("boom".into());
        assert!(err.to_string().contains("boom"));
    }
}
