//! # sessionwire
//!
//! Session-oriented TCP connection engine.
//!
//! Every connection reassembles length-prefixed frames from the byte
//! stream, dispatches them to an ordered set of protocol handlers and
//! coalesces outbound segments into one vectored write at a time. A
//! one-shot handshake assigns each peer a stable [`Session`] identity and
//! switches the connection from handshake to application handlers.
//!
//! ## Architecture
//!
//! - **Connection**: socket halves, receive buffer, outbound queue, handler list
//! - **Session**: logical peer identity, owns at most one live connection
//! - **Handshake**: `ClientHello` / `ServerHello` identity negotiation
//! - **Listener**: accepts TCP streams and hands them to the core
//!
//! ## Example
//!
//! ```ignore
//! use sessionwire::{init_logging, Listener, ListenerConfig, ServerContext, SessionwireConfig};
//!
//! #[tokio::main]
//! async fn main() -> sessionwire::Result<()> {
//!     let config = SessionwireConfig::from_file("sessionwire.json")?;
//!     init_logging(&config.log);
//!
//!     let context = ServerContext::new(config.connection.clone());
//!     let listener = Listener::bind(ListenerConfig::for_server(&context, config.listener, vec![echo()])).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     listener.stop();
//!     context.shutdown();
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod listener;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod writer;

mod client;
mod connection;
mod logging;

pub use client::{Client, ClientBuilder};
pub use config::{ConnectionConfig, SessionwireConfig};
pub use connection::Connection;
pub use error::{Result, SessionwireError};
pub use handler::{Context, FnHandler, Handler, HandlerKind, HandlerResult};
pub use handshake::Handshake;
pub use listener::{Listener, ListenerConfig, ServerContext};
pub use logging::init_logging;
pub use session::{Session, SessionId, SessionObserver, SessionRegistry};
pub use writer::Segment;
