//! Minimal reactive-stream primitive.
//!
//! - [`Observable`]: synchronous multi-subscriber push stream
//! - [`Subscription`]: idempotent membership token
//! - Operators: [`Observable::filter`], [`Observable::map`],
//!   [`Observable::take_while`], [`Observable::first`] and [`merge`]

mod observable;
mod operators;

pub use observable::{isolate, Callback, Observable, Subscription};
pub use operators::merge;
