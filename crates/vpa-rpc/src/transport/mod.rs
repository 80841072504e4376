//! Transport adapters.
//!
//! Each adapter only moves bytes; all decisions are made by the
//! `Dispatcher`.
//!
//! - `server` - Sequential TCP accept loop
//! - `inetd` - One exchange on stdin/stdout
//! - `client` - One TCP connection per call, plus an in-process transport
//! - `exchange` - Framing shared by `server` and `inetd`

pub mod client;
pub mod exchange;
pub mod inetd;
pub mod server;

pub use client::{LocalTransport, RpcClient, RpcTransport};
pub use exchange::{read_frame, serve_exchange, ExchangeOutcome};
pub use inetd::{serve_once, serve_stdio, socket_peer};
pub use server::RpcServer;
