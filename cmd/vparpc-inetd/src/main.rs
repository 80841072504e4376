//! VPA RPC inetd worker
//!
//! Launched by inetd/xinetd once per connection with the socket on stdin
//! and stdout. Answers exactly one request and exits. Several workers may
//! run at once; the shared segment's semaphore serialises them.
//!
//! xinetd entry:
//!     service vparpc
//!     {
//!         socket_type = stream
//!         wait        = no
//!         user        = www-data
//!         server      = /usr/local/bin/vparpc-inetd
//!     }
//!
//! Logs go to stderr only.

use std::process::ExitCode;

use vpa_rpc::transport::inetd;
use vpa_rpc::{environment, ExchangeOutcome, RpcConfig, SystemDispatcher};

fn main() -> ExitCode {
    vpa_core::log::init();

    match run() {
        Ok(ExchangeOutcome::Dropped { received }) => {
            tracing::debug!(received, "peer sent no complete request");
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "vparpc-inetd failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> vpa_rpc::Result<ExchangeOutcome> {
    let config = RpcConfig::from_env();
    config.validate()?;

    let dispatcher = SystemDispatcher::open(&config)?;
    // First process on the host: nobody else has published the environment
    if dispatcher.store().created() {
        environment::seed(dispatcher.store(), &environment::probe(&config))?;
    }

    inetd::serve_stdio(&dispatcher, config.io_timeout)
}
