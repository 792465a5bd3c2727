//! Session module - logical peer identities and the server-side registry.
//!
//! Provides:
//! - [`Session`] - stable endpoint that survives handler-set transitions
//! - [`SessionId`] / [`SessionIdAllocator`] - handshake-assigned identity
//! - [`SessionRegistry`] - thread-safe set of identified server sessions

mod id;
mod registry;
#[allow(clippy::module_inception)]
mod session;

pub use id::{SessionId, SessionIdAllocator};
pub use registry::SessionRegistry;
pub use session::{Session, SessionObserver};
