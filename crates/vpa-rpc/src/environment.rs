//! Host environment published in the shared segment.
//!
//! The server fills the environment block once at start. URLS reads the
//! address and document roots back out of it.

use std::net::Ipv4Addr;

use vpa_shm::{Environment, ProcessLock, SegmentMemory, SharedStore};

use crate::config::RpcConfig;
use crate::error::Result;
use crate::services;

/// Build the environment from configuration, probing what is not set.
///
/// Unset roots are derived from the protocol, address and web user as
/// `{protocol}{ip}/~{user}/fw/{leaf}/`. With no address at all the roots
/// stay empty.
pub fn probe(config: &RpcConfig) -> Environment {
    let (ip, iface) = match &config.ip {
        Some(ip) => (ip.clone(), config.iface.clone().unwrap_or_default()),
        None => match primary_ipv4(config.iface.as_deref()) {
            Some((addr, name)) => (addr.to_string(), name),
            None => {
                tracing::warn!(iface = ?config.iface, "no IPv4 interface found");
                (String::new(), config.iface.clone().unwrap_or_default())
            }
        },
    };

    let root = |explicit: &Option<String>, leaf: &str| match explicit {
        Some(r) => r.clone(),
        None if ip.is_empty() => String::new(),
        None => derive_root(&config.protocol, &ip, &config.web_user, leaf),
    };

    Environment {
        hostname: services::hostname(),
        public_ip: config.public_ip.clone().unwrap_or_default(),
        iface,
        protocol: config.protocol.clone(),
        cgi_root: root(&config.cgi_root, "cgi-bin"),
        styles_root: root(&config.styles_root, "styles"),
        img_root: root(&config.img_root, "images"),
        ip,
    }
}

pub fn derive_root(protocol: &str, ip: &str, user: &str, leaf: &str) -> String {
    format!("{protocol}{ip}/~{user}/fw/{leaf}/")
}

/// Write `env` into the segment.
pub fn seed<M: SegmentMemory, L: ProcessLock>(
    store: &SharedStore<M, L>,
    env: &Environment,
) -> Result<()> {
    store.with_locked(|shm| shm.env.write(env))?;
    tracing::info!(
        hostname = %env.hostname,
        ip = %env.ip,
        cgi_root = %env.cgi_root,
        "environment published"
    );
    Ok(())
}

/// First non-loopback IPv4 address, optionally restricted to `iface`.
fn primary_ipv4(iface: Option<&str>) -> Option<(Ipv4Addr, String)> {
    let addrs = nix::ifaddrs::getifaddrs().ok()?;
    for ifa in addrs {
        if iface.is_some_and(|want| want != ifa.interface_name) {
            continue;
        }
        let Some(sin) = ifa.address.as_ref().and_then(|a| a.as_sockaddr_in()) else {
            continue;
        };
        let addr = Ipv4Addr::from(sin.ip());
        if !addr.is_loopback() {
            return Some((addr, ifa.interface_name));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpa_shm::MemoryStore;

    #[test]
    fn test_derive_root() {
        assert_eq!(
            derive_root("http://", "192.168.4.194", "doug", "cgi-bin"),
            "http://192.168.4.194/~doug/fw/cgi-bin/"
        );
    }

    #[test]
    fn test_probe_with_explicit_address() {
        let config = RpcConfig::new()
            .ip("192.168.4.194")
            .web_user("doug")
            .img_root("/img/");
        let env = probe(&config);
        assert_eq!(env.ip, "192.168.4.194");
        assert_eq!(env.protocol, "http://");
        assert_eq!(env.cgi_root, "http://192.168.4.194/~doug/fw/cgi-bin/");
        assert_eq!(env.styles_root, "http://192.168.4.194/~doug/fw/styles/");
        assert_eq!(env.img_root, "/img/");
    }

    #[test]
    fn test_seed() {
        let store = MemoryStore::in_memory();
        let env = Environment {
            hostname: "daphne".into(),
            ip: "10.0.0.1".into(),
            ..Default::default()
        };
        seed(&store, &env).unwrap();
        assert_eq!(store.with_locked(|shm| shm.env.read()).unwrap(), env);
    }
}
