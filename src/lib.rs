#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

// --- Global Imports
pub(crate) use std::rc::Rc;

// --- Public Prelude
/// Everything most callers need: components, events, values, channels, and
/// the handler/error types used to declare them.
pub mod prelude {
    pub use crate::channel::{Channel, ChannelSet};
    pub use crate::component::{Component, ComponentId};
    pub use crate::error::{HandlerError, RegistrationError};
    pub use crate::event::{kind_of, payload, Args, Event, EventBuilder, Kwargs, Payload};
    pub use crate::ext::debugger::Debugger;
    pub use crate::ext::timer::Timer;
    pub use crate::handler::{HandlerFn, HandlerOutcome, HandlerResult, HandlerSpec, Priority};
    pub use crate::value::Value;
}

// --- Re-exports of used libraries.
pub use downcast_rs;
pub use futures;
pub use log;

// --- Modules
pub mod channel;
pub mod component;
pub mod error;
pub mod event;
pub mod ext;
pub mod handler;
pub mod manager;
pub mod registry;
pub mod value;

// --- Internal prelude, shared by every module in the crate via `use crate::*;`.
pub(crate) use channel::{Channel, ChannelSet};
pub(crate) use component::{Component, ComponentId, ComponentNode};
pub(crate) use error::{HandlerError, RegistrationError};
pub(crate) use event::{payload, Event, Payload};
pub(crate) use handler::HandlerSpec;
pub(crate) use manager::{Manager, ManagerState};
pub(crate) use value::Value;
