//! One-shot worker for inetd/xinetd.
//!
//! The supervisor accepts the connection and hands it over as stdin and
//! stdout. The worker answers exactly one request and exits. Logging goes
//! to stderr because stdout is the socket.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::RawFd;
use std::time::Duration;

use nix::sys::socket::{getpeername, SockaddrLike, SockaddrStorage};
use vpa_shm::{ProcessLock, SegmentMemory};

use super::exchange::{serve_exchange, ExchangeOutcome};
use crate::dispatch::{Dispatcher, RequestContext};
use crate::error::Result;

/// Answer one request on stdin/stdout.
///
/// When stdin is a socket its peer is recorded in the request context and
/// a receive timeout is set so a silent peer cannot hold the worker.
pub fn serve_stdio<M: SegmentMemory, L: ProcessLock>(
    dispatcher: &Dispatcher<M, L>,
    io_timeout: Duration,
) -> Result<ExchangeOutcome> {
    let peer = socket_peer(libc::STDIN_FILENO);
    if peer.is_some() {
        for opt in [libc::SO_RCVTIMEO, libc::SO_SNDTIMEO] {
            if let Err(e) = set_timeout(libc::STDIN_FILENO, opt, io_timeout) {
                tracing::warn!(error = %e, "cannot set socket timeout");
            }
        }
    }
    let ctx = RequestContext::from_peer(peer);

    let stdin = io::stdin();
    let stdout = io::stdout();
    serve_once(dispatcher, &mut stdin.lock(), &mut stdout.lock(), &ctx)
}

/// Answer one request on an arbitrary reader/writer pair.
pub fn serve_once<M, L, R, W>(
    dispatcher: &Dispatcher<M, L>,
    reader: &mut R,
    writer: &mut W,
    ctx: &RequestContext,
) -> Result<ExchangeOutcome>
where
    M: SegmentMemory,
    L: ProcessLock,
    R: Read,
    W: Write,
{
    let outcome = serve_exchange(dispatcher, reader, writer, ctx)?;
    tracing::info!(peer = ?ctx.peer, ?outcome, "request served");
    Ok(outcome)
}

/// Remote address of the socket on `fd`, if `fd` is a connected socket.
pub fn socket_peer(fd: RawFd) -> Option<SocketAddr> {
    let addr: SockaddrStorage = getpeername(fd).ok()?;
    if let Some(v4) = addr.as_sockaddr_in() {
        return Some(SocketAddr::V4(SocketAddrV4::from(*v4)));
    }
    if let Some(v6) = addr.as_sockaddr_in6() {
        return Some(SocketAddr::V6(SocketAddrV6::from(*v6)));
    }
    tracing::debug!(family = ?addr.family(), "peer is not an inet socket");
    None
}

fn set_timeout(fd: RawFd, opt: libc::c_int, d: Duration) -> io::Result<()> {
    let tv = libc::timeval {
        tv_sec: d.as_secs() as libc::time_t,
        tv_usec: d.subsec_micros() as libc::suseconds_t,
    };
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            opt,
            &tv as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::timeval>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passwd::MemoryCredentialStore;
    use std::io::Cursor;
    use std::net::{Ipv4Addr, TcpListener, TcpStream};
    use std::os::fd::AsRawFd;
    use vpa_core::{AuthMsg, FuncCode, Status, WireMessage};
    use vpa_shm::MemoryStore;

    #[test]
    fn test_serve_once() {
        let d = Dispatcher::new(
            MemoryStore::in_memory_with_token("tok"),
            MemoryCredentialStore::default(),
            "X",
        );
        let mut out = Vec::new();
        let outcome = serve_once(
            &d,
            &mut Cursor::new(AuthMsg::request("X").encode()),
            &mut out,
            &RequestContext::local(),
        )
        .unwrap();
        assert_eq!(
            outcome,
            ExchangeOutcome::Answered {
                func: Some(FuncCode::GetAuth),
                status: Status::Ok
            }
        );
        assert_eq!(AuthMsg::decode(&out).unwrap().auth, "tok");
    }

    #[test]
    fn test_socket_peer() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server_side, _) = listener.accept().unwrap();

        let peer = socket_peer(server_side.as_raw_fd()).unwrap();
        assert_eq!(peer, client.local_addr().unwrap());
        set_timeout(server_side.as_raw_fd(), libc::SO_RCVTIMEO, Duration::from_millis(250))
            .unwrap();
        // The kernel rounds to its clock tick
        let timeout = server_side.read_timeout().unwrap().unwrap();
        assert!(timeout >= Duration::from_millis(240), "{timeout:?}");
        assert!(timeout <= Duration::from_millis(270), "{timeout:?}");

        // A listening socket has no peer; a plain file is not a socket
        assert_eq!(socket_peer(listener.as_raw_fd()), None);
        let file = std::fs::File::open("/dev/null").unwrap();
        assert_eq!(socket_peer(file.as_raw_fd()), None);
    }
}
