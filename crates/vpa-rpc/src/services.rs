//! Service, host and address resolution.

use std::ffi::{CStr, CString};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::Path;

use crate::error::{Result, RpcError};

// <netdb.h>
const NI_MAXHOST: usize = 1025;

/// Port for `service`: a decimal port number, or a name from the services
/// database (tcp entry first, then udp).
pub fn svc2port(service: &str) -> Result<u16> {
    if let Ok(port) = service.parse::<u16>() {
        return Ok(port);
    }
    let name = CString::new(service).map_err(|_| RpcError::UnknownService(service.to_string()))?;
    for proto in [c"tcp", c"udp"] {
        // getservbyname returns a pointer into static storage; copy the port
        // out before any other netdb call.
        let ent = unsafe { libc::getservbyname(name.as_ptr(), proto.as_ptr()) };
        if !ent.is_null() {
            let raw = unsafe { (*ent).s_port };
            return Ok(u16::from_be(raw as u16));
        }
    }
    Err(RpcError::UnknownService(service.to_string()))
}

/// First address for `host:port`, preferring IPv4.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|_| RpcError::UnresolvedHost(host.to_string()))?
        .collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| RpcError::UnresolvedHost(host.to_string()))
}

/// Dotted IPv4 address for `name`.
///
/// A literal IPv4 address is returned unchanged. Otherwise the hosts file
/// is scanned for the first IPv4 line naming `name` (case-insensitive).
pub fn host2ipv4addr(name: &str, hosts_file: &Path) -> Option<String> {
    if let Ok(addr) = name.parse::<Ipv4Addr>() {
        return Some(addr.to_string());
    }
    let text = fs::read_to_string(hosts_file).ok()?;
    scan_hosts(&text, name).map(|a| a.to_string())
}

fn scan_hosts(text: &str, name: &str) -> Option<Ipv4Addr> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .find_map(|line| {
            let mut fields = line.split_whitespace();
            let addr: Ipv4Addr = fields.next()?.parse().ok()?;
            fields
                .any(|alias| alias.eq_ignore_ascii_case(name))
                .then_some(addr)
        })
}

/// Host name for `ip`, or its text form when reverse lookup fails.
pub fn reverse_lookup(ip: IpAddr) -> String {
    let sa = nix::sys::socket::SockaddrStorage::from(SocketAddr::new(ip, 0));
    let mut host = [0 as libc::c_char; NI_MAXHOST];
    let rc = unsafe {
        libc::getnameinfo(
            nix::sys::socket::SockaddrLike::as_ptr(&sa),
            nix::sys::socket::SockaddrLike::len(&sa),
            host.as_mut_ptr(),
            host.len() as libc::socklen_t,
            std::ptr::null_mut(),
            0,
            libc::NI_NAMEREQD,
        )
    };
    if rc != 0 {
        return ip.to_string();
    }
    unsafe { CStr::from_ptr(host.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// This machine's host name.
pub fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOSTS: &str = "\
127.0.0.1   localhost
::1         localhost ip6-localhost
# 10.0.0.9  hidden
192.168.4.194  Daphne.goodall.com daphne   # file server
192.168.4.200  melange
";

    #[test]
    fn test_svc2port_numeric() {
        assert_eq!(svc2port("5164").unwrap(), 5164);
        assert!(matches!(
            svc2port("no-such-service-xyz"),
            Err(RpcError::UnknownService(_))
        ));
        assert!(svc2port("bad\0name").is_err());
    }

    #[test]
    fn test_scan_hosts() {
        assert_eq!(scan_hosts(HOSTS, "DAPHNE"), Some(Ipv4Addr::new(192, 168, 4, 194)));
        assert_eq!(scan_hosts(HOSTS, "melange"), Some(Ipv4Addr::new(192, 168, 4, 200)));
        assert_eq!(scan_hosts(HOSTS, "localhost"), Some(Ipv4Addr::LOCALHOST));
        assert_eq!(scan_hosts(HOSTS, "ip6-localhost"), None);
        assert_eq!(scan_hosts(HOSTS, "hidden"), None);
        assert_eq!(scan_hosts(HOSTS, "server"), None);
    }

    #[test]
    fn test_host2ipv4addr_literal_and_missing_file() {
        let missing = Path::new("/nonexistent/vpa/hosts");
        assert_eq!(host2ipv4addr("10.1.2.3", missing).as_deref(), Some("10.1.2.3"));
        assert_eq!(host2ipv4addr("daphne", missing), None);
    }

    #[test]
    fn test_resolve_loopback() {
        let addr = resolve("127.0.0.1", 5164).unwrap();
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 5164)));
    }

    #[test]
    fn test_reverse_lookup_falls_back_to_text() {
        // TEST-NET-1 has no PTR records
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        assert_eq!(reverse_lookup(ip), "192.0.2.1");
    }
}
