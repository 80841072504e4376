//! Client side: send one request struct, get the same struct back filled in.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use vpa_core::{WireError, WireMessage};
use vpa_shm::{ProcessLock, SegmentMemory};

use crate::config::RpcConfig;
use crate::dispatch::{Dispatcher, RequestContext};
use crate::error::Result;
use crate::services;

/// Carries one request to a dispatcher and returns its reply.
///
/// # Implementors
///
/// - `RpcClient`: a fresh TCP connection per call, to the persistent
///   server or an inetd-spawned worker.
/// - `LocalTransport`: an in-process call into a `Dispatcher`, used by the
///   self-test and by tests.
pub trait RpcTransport {
    fn call<T: WireMessage>(&self, request: &T) -> Result<T>;
}

#[derive(Debug, Clone)]
pub struct RpcClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// Resolve the configured host and service.
    pub fn from_config(config: &RpcConfig) -> Result<Self> {
        let port = services::svc2port(&config.service)?;
        let addr = services::resolve(&config.host, port)?;
        Ok(Self::new(addr, config.io_timeout))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send raw bytes and read whatever comes back until the server closes.
    pub fn call_raw(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let mut stream = self.connect()?;
        stream.write_all(frame)?;
        stream.shutdown(Shutdown::Write)?;
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply)?;
        Ok(reply)
    }

    fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect_timeout(&self.addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }
}

impl RpcTransport for RpcClient {
    fn call<T: WireMessage>(&self, request: &T) -> Result<T> {
        let mut stream = self.connect()?;
        stream.write_all(&request.encode())?;

        let mut reply = vec![0u8; T::WIRE_SIZE];
        stream.read_exact(&mut reply)?;
        tracing::trace!(func = T::FUNC.name(), addr = %self.addr, "reply received");
        Ok(T::decode(&reply)?)
    }
}

/// In-process transport. Frames go through the same encode, dispatch and
/// decode path as over a socket.
pub struct LocalTransport<'a, M: SegmentMemory, L: ProcessLock> {
    dispatcher: &'a Dispatcher<M, L>,
    ctx: RequestContext,
    penalize: bool,
}

impl<'a, M: SegmentMemory, L: ProcessLock> LocalTransport<'a, M, L> {
    pub fn new(dispatcher: &'a Dispatcher<M, L>) -> Self {
        Self {
            dispatcher,
            ctx: RequestContext::local(),
            penalize: true,
        }
    }

    pub fn context(mut self, ctx: RequestContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Return failed-authentication replies immediately.
    pub fn without_penalty(mut self) -> Self {
        self.penalize = false;
        self
    }
}

impl<M: SegmentMemory, L: ProcessLock> RpcTransport for LocalTransport<'_, M, L> {
    fn call<T: WireMessage>(&self, request: &T) -> Result<T> {
        let frame = request.encode();
        let reply = self
            .dispatcher
            .handle_frame(&frame, &self.ctx)
            .ok_or(WireError::Truncated {
                needed: T::WIRE_SIZE,
                got: frame.len(),
            })?;
        if reply.penalize && self.penalize {
            thread::sleep(self.dispatcher.penalty_delay());
        }
        Ok(T::decode(&reply.bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MemoryDispatcher;
    use crate::passwd::MemoryCredentialStore;
    use crate::transport::RpcServer;
    use std::net::Ipv4Addr;
    use vpa_core::wire::codec::Writer;
    use vpa_core::wire::peek_status;
    use vpa_core::{AuthMsg, Status, UrlsMsg};
    use vpa_shm::MemoryStore;

    fn dispatcher() -> MemoryDispatcher {
        Dispatcher::new(
            MemoryStore::in_memory_with_token("tok"),
            MemoryCredentialStore::default(),
            "X",
        )
        .penalty(Duration::from_millis(10))
    }

    #[test]
    fn test_client_against_loopback_server() {
        let server = RpcServer::bind(0, 5, dispatcher()).unwrap();
        let port = server.local_addr().unwrap().port();
        let client = RpcClient::new(
            SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            Duration::from_secs(5),
        );

        let handle = thread::spawn(move || {
            let auth = client.call(&AuthMsg::request("X")).unwrap();
            let urls = client.call(&UrlsMsg::request(&auth.auth)).unwrap();

            let mut junk = AuthMsg::request("X").encode();
            Writer::at(&mut junk, 0).u32(9);
            let raw = client.call_raw(&junk).unwrap();
            (auth, urls, raw)
        });
        for _ in 0..3 {
            server.accept_one().unwrap();
        }

        let (auth, urls, raw) = handle.join().unwrap();
        assert_eq!(auth.status, Status::Ok);
        assert_eq!(auth.auth, "tok");
        assert_eq!(urls.status, Status::Ok);
        assert_eq!(peek_status(&raw), Some(Status::ProtocolError));
    }

    #[test]
    fn test_local_transport() {
        let d = dispatcher();
        let t = LocalTransport::new(&d).without_penalty();
        assert_eq!(t.call(&AuthMsg::request("X")).unwrap().auth, "tok");
        assert_eq!(
            t.call(&AuthMsg::request("Y")).unwrap().status,
            Status::AuthFailed
        );
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let l = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            l.local_addr().unwrap().port()
        };
        let client = RpcClient::new(
            SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            Duration::from_secs(1),
        );
        assert!(client.call(&AuthMsg::request("X")).is_err());
    }
}
