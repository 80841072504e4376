//! RPC layer errors.

use std::path::PathBuf;

use thiserror::Error;
use vpa_core::{FuncCode, Status, WireError};
use vpa_shm::ShmError;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Shm(#[from] ShmError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Neither a port number nor a known tcp/udp service.
    #[error("unknown service {0:?}")]
    UnknownService(String),

    #[error("cannot resolve host {0:?}")]
    UnresolvedHost(String),

    /// The password table could not be read.
    #[error("credential store {path}: {source}")]
    CredentialStore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The server answered with something other than `OK`.
    #[error("{} returned {status:?}", func.name())]
    Status { func: FuncCode, status: Status },

    /// A call that needs the session token was made before authenticating.
    #[error("not authenticated")]
    NotAuthenticated,
}

impl RpcError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            RpcError::Status {
                status: Status::AuthFailed,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
