//! Cross-cutting helper components, registered like any other component
//! rather than wired into the core (spec.md §2).

pub mod debugger;
pub mod timer;
