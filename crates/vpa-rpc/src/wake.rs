//! Wake trigger.
//!
//! Connecting to one of the well-known ports below makes the service
//! supervisor start whatever it has bound there. The connection carries a
//! fixed payload and is closed without reading anything back.

use std::io::Write;
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::config::defaults;
use crate::error::Result;

/// Bytes sent on every trigger, terminating NUL included.
pub const WAKE_PAYLOAD: &[u8] = b"Wake up, sleepyhead!!\0";

/// Ports the supervisor is configured to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum WakePort {
    VpadStart = 65353,
    Netstat = 65354,
    Ip = 65355,
    Curl = 65356,
    Http = 65357,
    Https = 65358,
    Ipcs = 65359,
}

impl WakePort {
    pub const ALL: [WakePort; 7] = [
        WakePort::VpadStart,
        WakePort::Netstat,
        WakePort::Ip,
        WakePort::Curl,
        WakePort::Http,
        WakePort::Https,
        WakePort::Ipcs,
    ];

    pub fn port(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            WakePort::VpadStart => "vpad-start",
            WakePort::Netstat => "netstat",
            WakePort::Ip => "ip",
            WakePort::Curl => "curl",
            WakePort::Http => "http",
            WakePort::Https => "https",
            WakePort::Ipcs => "ipcs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

/// Poke the supervisor on `localhost:port`.
pub fn trigger(port: u16) -> Result<()> {
    trigger_addr(
        SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
        Duration::from_millis(defaults::WAKE_TIMEOUT_MS),
    )
}

pub fn trigger_addr(addr: SocketAddr, timeout: Duration) -> Result<()> {
    let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_write_timeout(Some(timeout))?;
    stream.write_all(WAKE_PAYLOAD)?;
    stream.shutdown(Shutdown::Both)?;
    tracing::debug!(%addr, "wake sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_port_names() {
        assert_eq!(WakePort::VpadStart.port(), 65353);
        assert_eq!(WakePort::Ipcs.port(), 65359);
        assert_eq!(WakePort::from_name("HTTPS"), Some(WakePort::Https));
        assert_eq!(WakePort::from_name("gopher"), None);
        for p in WakePort::ALL {
            assert_eq!(WakePort::from_name(p.name()), Some(p));
        }
    }

    #[test]
    fn test_trigger_sends_payload() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        let reader = thread::spawn(move || {
            let (mut s, _) = listener.accept().unwrap();
            let mut got = Vec::new();
            s.read_to_end(&mut got).unwrap();
            got
        });

        trigger_addr(addr, Duration::from_secs(2)).unwrap();
        assert_eq!(reader.join().unwrap(), WAKE_PAYLOAD);
    }

    #[test]
    fn test_trigger_without_listener_fails() {
        let port = {
            let l = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            l.local_addr().unwrap().port()
        };
        assert!(trigger(port).is_err());
    }
}
