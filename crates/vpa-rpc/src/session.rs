//! Client session.
//!
//! Wraps a transport and carries the session token between calls, so
//! callers do not thread it through by hand.
//!
//! # Usage
//!
//! ```ignore
//! let client = RpcClient::from_config(&config)?;
//! let mut session = VpaSession::new(client);
//! session.authenticate(&config.psk)?;
//! let handle = session.lookup("doug", "melange")?;
//! let cred = session.creds(handle)?;
//! ```

use vpa_core::{
    AuthMsg, CredsMsg, FuncCode, Host2Ipv4Msg, LookupMsg, Status, UrlsMsg, VersionMsg,
};
use vpa_shm::Credential;

use crate::error::{Result, RpcError};
use crate::transport::RpcTransport;

/// Addresses returned by URLS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteUrls {
    pub ip: String,
    pub cgi_root: String,
    pub styles_root: String,
}

pub struct VpaSession<T: RpcTransport> {
    transport: T,
    token: Option<String>,
}

impl<T: RpcTransport> VpaSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            token: None,
        }
    }

    /// Resume with a token obtained earlier.
    pub fn with_token(transport: T, token: impl Into<String>) -> Self {
        Self {
            transport,
            token: Some(token.into()),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Trade the pre-shared key for the session token.
    pub fn authenticate(&mut self, psk: &str) -> Result<String> {
        let reply = self.transport.call(&AuthMsg::request(psk))?;
        check(FuncCode::GetAuth, reply.status)?;
        self.token = Some(reply.auth.clone());
        Ok(reply.auth)
    }

    pub fn version(&self) -> Result<String> {
        let reply = self.transport.call(&VersionMsg::request(self.auth()?))?;
        check(FuncCode::Version, reply.status)?;
        Ok(reply.version)
    }

    /// Log a user in; returns their credential handle.
    pub fn lookup(&self, username: &str, password: &str) -> Result<i32> {
        let reply = self
            .transport
            .call(&LookupMsg::request(self.auth()?, username, password))?;
        check(FuncCode::Lookup, reply.status)?;
        Ok(reply.handle)
    }

    pub fn creds(&self, handle: i32) -> Result<Credential> {
        let r = self.transport.call(&CredsMsg::request(self.auth()?, handle))?;
        check(FuncCode::Creds, r.status)?;
        Ok(Credential {
            username: r.username,
            first_name: r.first_name,
            last_name: r.last_name,
            session_uuid: r.session_uuid,
            auth_level: r.auth_level,
            remote_host: r.remote_host,
            remote_addr: r.remote_addr,
            user_agent: r.user_agent,
        })
    }

    pub fn urls(&self) -> Result<SiteUrls> {
        let r = self.transport.call(&UrlsMsg::request(self.auth()?))?;
        check(FuncCode::Urls, r.status)?;
        Ok(SiteUrls {
            ip: r.ip,
            cgi_root: r.cgi_root,
            styles_root: r.styles_root,
        })
    }

    pub fn host2ipv4(&self, hostname: &str) -> Result<String> {
        let reply = self
            .transport
            .call(&Host2Ipv4Msg::request(self.auth()?, hostname))?;
        check(FuncCode::Host2Ipv4Addr, reply.status)?;
        Ok(reply.ipv4)
    }

    fn auth(&self) -> Result<&str> {
        self.token.as_deref().ok_or(RpcError::NotAuthenticated)
    }
}

fn check(func: FuncCode, status: Status) -> Result<()> {
    match status {
        Status::Ok => Ok(()),
        status => Err(RpcError::Status { func, status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Dispatcher, MemoryDispatcher, RequestContext};
    use crate::passwd::MemoryCredentialStore;
    use crate::transport::LocalTransport;
    use vpa_shm::MemoryStore;

    const PASSWD: &str = "\
meta
meta
active,username,password,authlevel,firstname,lastname,descr
true,doug,melange,admin,Douglas,Goodall,Site owner
";

    fn dispatcher() -> MemoryDispatcher {
        Dispatcher::new(
            MemoryStore::in_memory_with_token("session-token"),
            MemoryCredentialStore::from_csv(PASSWD),
            "X",
        )
    }

    #[test]
    fn test_full_session() {
        let d = dispatcher();
        let ctx = RequestContext {
            peer: Some("10.1.1.5:5000".parse().unwrap()),
            remote_host: Some("client.lan".into()),
            user_agent: "test-agent".into(),
        };
        let mut s = VpaSession::new(LocalTransport::new(&d).context(ctx));

        assert!(matches!(s.version(), Err(RpcError::NotAuthenticated)));
        assert_eq!(s.authenticate("X").unwrap(), "session-token");
        assert_eq!(s.token(), Some("session-token"));
        assert_eq!(s.version().unwrap(), vpa_core::VERSION);

        let handle = s.lookup("doug", "melange").unwrap();
        assert_eq!(handle, 3);
        let cred = s.creds(handle).unwrap();
        assert_eq!(cred.last_name, "Goodall");
        assert_eq!(cred.remote_addr, "10.1.1.5");
        assert_eq!(cred.remote_host, "client.lan");
        assert_eq!(cred.user_agent, "test-agent");

        assert_eq!(s.urls().unwrap(), SiteUrls::default());
        assert_eq!(s.host2ipv4("127.0.0.1").unwrap(), "127.0.0.1");
    }

    #[test]
    fn test_failures_surface_as_status() {
        let d = dispatcher().penalty(std::time::Duration::ZERO);
        let mut s = VpaSession::new(LocalTransport::new(&d));

        let err = s.authenticate("Y").unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(s.token(), None);

        let s = VpaSession::with_token(LocalTransport::new(&d), "stale");
        assert!(s.version().unwrap_err().is_auth_failure());

        let s = VpaSession::with_token(LocalTransport::new(&d), "session-token");
        assert!(matches!(
            s.creds(7),
            Err(RpcError::Status {
                func: FuncCode::Creds,
                status: Status::Error
            })
        ));
    }
}
