//! In-process publish/subscribe event bus with a middleware chain and a
//! bounded ring buffer of recent events.

pub mod bus;
pub mod handler;

pub use bus::EventBus;
pub use handler::{FnHandler, Handler, Middleware};
