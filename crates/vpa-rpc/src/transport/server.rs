//! Persistent TCP server.
//!
//! Strictly sequential: one connection is accepted, answered and closed
//! before the next is accepted. Per-connection timeouts keep a silent
//! client from holding the loop forever.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

use nix::sys::socket::{
    self, sockopt, AddressFamily, Backlog, SockFlag, SockType, SockaddrIn,
};
use vpa_shm::{ProcessLock, SegmentMemory};

use super::exchange::{serve_exchange, ExchangeOutcome};
use crate::config::{defaults, RpcConfig};
use crate::dispatch::{Dispatcher, RequestContext};
use crate::error::Result;
use crate::services;

pub struct RpcServer<M: SegmentMemory, L: ProcessLock> {
    listener: TcpListener,
    dispatcher: Dispatcher<M, L>,
    io_timeout: Duration,
}

impl<M: SegmentMemory, L: ProcessLock> RpcServer<M, L> {
    /// Listen on `0.0.0.0:port`. Port 0 picks an ephemeral port.
    pub fn bind(port: u16, backlog: i32, dispatcher: Dispatcher<M, L>) -> Result<Self> {
        let listener = listen_ipv4(port, backlog)?;
        Ok(Self::from_listener(listener, dispatcher))
    }

    /// Resolve the configured service to a port and listen on it.
    pub fn from_config(config: &RpcConfig, dispatcher: Dispatcher<M, L>) -> Result<Self> {
        let port = services::svc2port(&config.service)?;
        Ok(Self::bind(port, config.listen_backlog, dispatcher)?.io_timeout(config.io_timeout))
    }

    pub fn from_listener(listener: TcpListener, dispatcher: Dispatcher<M, L>) -> Self {
        Self {
            listener,
            dispatcher,
            io_timeout: Duration::from_millis(defaults::IO_TIMEOUT_MS),
        }
    }

    pub fn io_timeout(mut self, d: Duration) -> Self {
        self.io_timeout = d;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn dispatcher(&self) -> &Dispatcher<M, L> {
        &self.dispatcher
    }

    /// Accept and answer a single connection.
    pub fn accept_one(&self) -> Result<ExchangeOutcome> {
        let (stream, peer) = self.listener.accept()?;
        self.answer(stream, peer)
    }

    /// Accept connections forever. Per-connection failures are logged and
    /// the loop moves on to the next client.
    pub fn serve(&self) -> ! {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "serving");
        loop {
            if let Err(e) = self.accept_one() {
                tracing::warn!(error = %e, "exchange failed");
            }
        }
    }

    fn answer(&self, stream: TcpStream, peer: SocketAddr) -> Result<ExchangeOutcome> {
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;

        let ctx = RequestContext::from_peer(Some(peer));
        let (mut rd, mut wr) = (&stream, &stream);
        let outcome = serve_exchange(&self.dispatcher, &mut rd, &mut wr, &ctx)?;
        tracing::debug!(%peer, ?outcome, "connection closed");
        Ok(outcome)
    }
}

fn listen_ipv4(port: u16, backlog: i32) -> io::Result<TcpListener> {
    let fd = socket::socket(
        AddressFamily::Inet,
        SockType::Stream,
        SockFlag::SOCK_CLOEXEC,
        None,
    )?;
    socket::setsockopt(&fd, sockopt::ReuseAddr, &true)?;
    let addr = SockaddrIn::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket::bind(fd.as_raw_fd(), &addr)?;
    socket::listen(&fd, Backlog::new(backlog)?)?;
    Ok(TcpListener::from(fd))
}
