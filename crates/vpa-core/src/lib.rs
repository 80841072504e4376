//! # vpa-core
//!
//! Core types for the VPA session/authentication coordination layer.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Shared memory and the cross-process mutex live in `vpa-shm`; the
//! dispatcher and transports live in `vpa-rpc`.
//!
//! ## Modules
//!
//! - `limits` - Fixed field capacities shared by the wire and the segment
//! - `wire` - Fixed-size RPC message contract (header, codes, messages)
//! - `error` - Wire error type
//! - `secret` - Constant-time comparison for the PSK and session token
//! - `env` - Environment variable utilities
//! - `log` - Leveled logging initialisation (stderr only)

pub mod limits;
pub mod wire;
pub mod error;
pub mod secret;
pub mod env;
pub mod log;

// Re-exports for convenience
pub use error::{WireError, WireResult};
pub use env::{env_get, env_get_bool, env_get_key, env_get_millis, env_get_opt, env_get_str};
pub use wire::{
    AuthMsg, CredsMsg, FuncCode, Header, Host2Ipv4Msg, LookupMsg, Message, ProtocolVersion,
    Status, UrlsMsg, VersionMsg, WireMessage, NO_HANDLE,
};

/// Version string reported by the `VERSION` RPC.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
