//! # vpa-rpc
//!
//! The RPC side of the VPA session layer: one dispatcher, the transports
//! that feed it, and the wake trigger.
//!
//! ## Modules
//!
//! - `config` - Environment-driven configuration
//! - `dispatch` - Request handling against the shared segment
//! - `passwd` - Password table behind the `CredentialStore` trait
//! - `services` - Service, host and address resolution
//! - `environment` - Host environment published in the segment
//! - `transport` - TCP server, inetd worker, client
//! - `session` - Client session carrying the token between calls
//! - `selftest` - Startup self-test recorded in the segment
//! - `wake` - Fire-and-forget supervisor trigger
//!
//! ## Usage
//!
//! ```ignore
//! use vpa_rpc::{RpcConfig, RpcServer, SystemDispatcher};
//!
//! let config = RpcConfig::from_env();
//! config.validate()?;
//! let dispatcher = SystemDispatcher::open(&config)?;
//! RpcServer::from_config(&config, dispatcher)?.serve();
//! ```

pub mod config;
pub mod dispatch;
pub mod environment;
pub mod error;
pub mod passwd;
pub mod selftest;
pub mod services;
pub mod session;
pub mod transport;
pub mod wake;

pub use config::{ConfigError, RpcConfig};
pub use dispatch::{Dispatcher, FrameReply, MemoryDispatcher, Reply, RequestContext};
#[cfg(unix)]
pub use dispatch::SystemDispatcher;
pub use error::{Result, RpcError};
pub use passwd::{CredentialStore, CsvCredentialStore, MemoryCredentialStore, PasswdEntry};
pub use selftest::SelfTestReport;
pub use session::{SiteUrls, VpaSession};
pub use transport::{ExchangeOutcome, LocalTransport, RpcClient, RpcServer, RpcTransport};
pub use wake::{trigger, WakePort, WAKE_PAYLOAD};
