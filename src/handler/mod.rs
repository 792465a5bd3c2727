//! Handler module - protocol handlers and per-connection dispatch.
//!
//! Provides:
//! - [`Handler`] - a unit of logic bound to a range of protocol ids
//! - [`HandlerRegistry`] - ordered, swappable handler list of one connection
//! - [`Context`] - what a handler sees while processing one frame
//!
//! # Example
//!
//! ```
//! use sessionwire::handler::{FnHandler, HandlerKind, HandlerRegistry};
//!
//! let registry = HandlerRegistry::new();
//! registry.install(FnHandler::shared(HandlerKind::new("echo"), 16..32, |ctx, payload| {
//!     ctx.reply(ctx.protocol_id(), payload);
//!     Ok(())
//! }));
//!
//! assert!(registry.resolve(20).is_some());
//! assert!(registry.resolve(40).is_none());
//! ```

mod context;
mod registry;

pub use context::Context;
pub use registry::{FnHandler, Handler, HandlerKind, HandlerRegistry, HandlerResult};
