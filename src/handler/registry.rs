//! Handler registry for resolving frames by protocol id.
//!
//! Each connection owns one registry. Handlers are kept in install order;
//! resolution walks the list and the first handler whose protocol range
//! contains the id wins. Handlers are identified by an explicit
//! [`HandlerKind`] tag, which makes install idempotent and lets a handler
//! be removed without knowing its concrete type.
//!
//! Resolution takes a shared lock, install/uninstall an exclusive one. The
//! lock is never held while a handler runs, so a handler may swap the
//! handler set of its own connection.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use parking_lot::RwLock;

use super::Context;
use crate::error::Result;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Identity tag of a handler, compared by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerKind(&'static str);

impl HandlerKind {
    /// Create a kind tag.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The tag's name.
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A protocol handler.
///
/// `handle` runs synchronously on the connection's read task, in frame
/// arrival order. Returning an error disconnects the connection.
pub trait Handler: Send + Sync + 'static {
    /// Identity used for idempotent install and for uninstall.
    fn kind(&self) -> HandlerKind;

    /// Protocol ids this handler serves (half-open).
    fn protocols(&self) -> Range<u16>;

    /// Process one complete frame.
    fn handle(&self, ctx: &Context<'_>, payload: &[u8]) -> HandlerResult;
}

/// Handler backed by a closure.
pub struct FnHandler<F>
where
    F: Fn(&Context<'_>, &[u8]) -> HandlerResult + Send + Sync + 'static,
{
    kind: HandlerKind,
    protocols: Range<u16>,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Context<'_>, &[u8]) -> HandlerResult + Send + Sync + 'static,
{
    /// Create a new closure handler.
    pub fn new(kind: HandlerKind, protocols: Range<u16>, handler: F) -> Self {
        Self {
            kind,
            protocols,
            handler,
        }
    }

    /// Create a new closure handler, ready to install.
    pub fn shared(kind: HandlerKind, protocols: Range<u16>, handler: F) -> Arc<dyn Handler> {
        Arc::new(Self::new(kind, protocols, handler))
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Context<'_>, &[u8]) -> HandlerResult + Send + Sync + 'static,
{
    fn kind(&self) -> HandlerKind {
        self.kind
    }

    fn protocols(&self) -> Range<u16> {
        self.protocols.clone()
    }

    fn handle(&self, ctx: &Context<'_>, payload: &[u8]) -> HandlerResult {
        (self.handler)(ctx, payload)
    }
}

/// Ordered, swappable list of handlers for one connection.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Vec<Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler.
    ///
    /// Returns `false` (and leaves the list unchanged) if a handler of the
    /// same kind is already installed.
    pub fn install(&self, handler: Arc<dyn Handler>) -> bool {
        let mut handlers = self.handlers.write();
        let kind = handler.kind();
        if handlers.iter().any(|h| h.kind() == kind) {
            return false;
        }
        handlers.push(handler);
        true
    }

    /// Remove the handler of the given kind, returning it.
    pub fn uninstall(&self, kind: HandlerKind) -> Option<Arc<dyn Handler>> {
        let mut handlers = self.handlers.write();
        let index = handlers.iter().position(|h| h.kind() == kind)?;
        Some(handlers.remove(index))
    }

    /// Atomically remove one kind and append a set of handlers.
    ///
    /// No resolution can observe the list between the removal and the
    /// installs. Kinds already present are skipped.
    pub fn replace(&self, remove: HandlerKind, install: &[Arc<dyn Handler>]) -> bool {
        let mut handlers = self.handlers.write();
        let removed = match handlers.iter().position(|h| h.kind() == remove) {
            Some(index) => {
                handlers.remove(index);
                true
            }
            None => false,
        };
        for handler in install {
            let kind = handler.kind();
            if !handlers.iter().any(|h| h.kind() == kind) {
                handlers.push(Arc::clone(handler));
            }
        }
        removed
    }

    /// Resolve a protocol id to the first matching handler.
    pub fn resolve(&self, protocol_id: u16) -> Option<Arc<dyn Handler>> {
        self.handlers
            .read()
            .iter()
            .find(|h| h.protocols().contains(&protocol_id))
            .cloned()
    }

    /// Check if a handler of this kind is installed.
    pub fn contains(&self, kind: HandlerKind) -> bool {
        self.handlers.read().iter().any(|h| h.kind() == kind)
    }

    /// Installed kinds, in install order.
    pub fn kinds(&self) -> Vec<HandlerKind> {
        self.handlers.read().iter().map(|h| h.kind()).collect()
    }

    /// Number of installed handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Check if no handler is installed.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
