//! VPA RPC Server
//!
//! Persistent, single-threaded TCP server for the VPA RPC protocol.
//! Attaches to (or creates) the shared segment, publishes the host
//! environment, then answers one connection at a time.
//!
//! Usage:
//!     vparpc-server [--self-test] [service]
//!
//! `service` is a name from the services database or a port number
//! (default: `$VPA_RPC_SERVICE`, else `vparpc`). `--self-test` runs the
//! in-process checks before listening and records them in the segment.
//!
//! Logging: `VPA_LOG_LEVEL` (off|error|warn|info|debug|trace) or `RUST_LOG`.

use vpa_rpc::{environment, selftest, RpcConfig, RpcServer, SystemDispatcher};

fn usage() {
    eprintln!("usage: vparpc-server [--self-test] [service]");
}

fn main() {
    vpa_core::log::init();

    let mut config = RpcConfig::from_env();
    let mut self_test = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--self-test" => self_test = true,
            "-h" | "--help" => {
                usage();
                return;
            }
            s if s.starts_with('-') => {
                usage();
                std::process::exit(2);
            }
            service => config = config.service(service),
        }
    }

    if let Err(e) = run(&config, self_test) {
        tracing::error!(error = %e, "vparpc-server failed");
        std::process::exit(1);
    }
}

fn run(config: &RpcConfig, self_test: bool) -> vpa_rpc::Result<()> {
    config.validate()?;
    config.log_summary();

    let dispatcher = SystemDispatcher::open(config)?;
    environment::seed(dispatcher.store(), &environment::probe(config))?;

    if self_test {
        let report = selftest::run(&dispatcher, &config.psk)?;
        if !report.passed() {
            tracing::warn!(failed = report.block.num_failed, "self-test reported failures");
        }
    }

    let server = RpcServer::from_config(config, dispatcher)?;
    tracing::info!(
        addr = %server.local_addr()?,
        version = vpa_core::VERSION,
        "vparpc-server listening"
    );
    server.serve()
}
