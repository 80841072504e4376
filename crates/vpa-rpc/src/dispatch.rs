//! RPC dispatcher.
//!
//! Turns one decoded request into one response. Every transport funnels
//! into `Dispatcher::handle_frame`, so authentication, counting and error
//! mapping behave identically whether the request arrived over the
//! persistent server, an inetd worker or an in-process call.
//!
//! The dispatcher never sleeps. A reply that must be delayed (failed
//! authentication) is flagged with `penalize` and the transport applies
//! the delay before writing it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;
use vpa_core::limits::PSK_SIZE;
use vpa_core::secret::fields_match;
use vpa_core::wire::fail_in_place;
use vpa_core::{
    AuthMsg, CredsMsg, FuncCode, Host2Ipv4Msg, LookupMsg, Message, Status, UrlsMsg, VersionMsg,
    WireMessage, NO_HANDLE,
};
use vpa_shm::{Credential, HeapSegment, LocalLock, ProcessLock, SegmentMemory, SharedStore};
#[cfg(unix)]
use vpa_shm::{NamedSemaphore, SysvSegment, SystemStore};

use crate::config::{defaults, RpcConfig};
use crate::error::Result;
use crate::passwd::{CredentialStore, CsvCredentialStore};
use crate::services;

/// Who sent the request, as recorded in a credential slot on login.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub peer: Option<SocketAddr>,
    /// Peer host name if already known. Otherwise it is resolved from
    /// `peer` when a login needs it.
    pub remote_host: Option<String>,
    pub user_agent: String,
}

impl RequestContext {
    /// Context for a request with no network peer (stdin not a socket,
    /// or an in-process call).
    pub fn local() -> Self {
        Self {
            peer: None,
            remote_host: None,
            user_agent: default_user_agent(),
        }
    }

    /// Context for a connected peer. No name lookup happens here.
    pub fn from_peer(peer: Option<SocketAddr>) -> Self {
        Self {
            peer,
            ..Self::local()
        }
    }

    /// Peer host name, doing a blocking reverse lookup if it is not known.
    pub fn resolve_remote_host(&self) -> String {
        match (&self.remote_host, self.peer) {
            (Some(name), _) => name.clone(),
            (None, Some(addr)) => services::reverse_lookup(addr.ip()),
            (None, None) => String::new(),
        }
    }

    pub fn remote_addr(&self) -> String {
        self.peer.map(|p| p.ip().to_string()).unwrap_or_default()
    }
}

fn default_user_agent() -> String {
    format!("vparpc/{}", vpa_core::VERSION)
}

/// Dispatcher output for one decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: Message,
    /// Delay this reply by the failure penalty before sending
    pub penalize: bool,
}

/// Dispatcher output for one raw frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReply {
    pub bytes: Vec<u8>,
    pub status: Status,
    /// `None` when the frame did not decode
    pub func: Option<FuncCode>,
    pub penalize: bool,
}

pub struct Dispatcher<M: SegmentMemory, L: ProcessLock> {
    shm: SharedStore<M, L>,
    creds: Box<dyn CredentialStore>,
    psk: String,
    hosts_file: PathBuf,
    penalty: Duration,
}

/// Dispatcher over the system segment and semaphore.
#[cfg(unix)]
pub type SystemDispatcher = Dispatcher<SysvSegment, NamedSemaphore>;

/// Dispatcher over a process-private segment.
pub type MemoryDispatcher = Dispatcher<HeapSegment, LocalLock>;

#[cfg(unix)]
impl SystemDispatcher {
    /// Attach to the configured segment and read credentials from the
    /// configured password file.
    pub fn open(config: &RpcConfig) -> Result<Self> {
        let shm = SystemStore::open(config.shm_key, &config.mutex_name)?;
        Ok(Self::from_config(shm, config))
    }
}

impl<M: SegmentMemory, L: ProcessLock> Dispatcher<M, L> {
    pub fn new(
        shm: SharedStore<M, L>,
        creds: impl CredentialStore + 'static,
        psk: impl Into<String>,
    ) -> Self {
        Self {
            shm,
            creds: Box::new(creds),
            psk: psk.into(),
            hosts_file: defaults::HOSTS_FILE.into(),
            penalty: Duration::from_millis(defaults::AUTH_FAIL_DELAY_MS),
        }
    }

    pub fn from_config(shm: SharedStore<M, L>, config: &RpcConfig) -> Self {
        Self::new(shm, CsvCredentialStore::new(&config.passwd_csv), config.psk.clone())
            .hosts_file(&config.hosts_file)
            .penalty(config.auth_fail_delay)
    }

    pub fn hosts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.hosts_file = path.into();
        self
    }

    pub fn penalty(mut self, d: Duration) -> Self {
        self.penalty = d;
        self
    }

    pub fn penalty_delay(&self) -> Duration {
        self.penalty
    }

    pub fn store(&self) -> &SharedStore<M, L> {
        &self.shm
    }

    // ── Frames ──

    /// Decode and dispatch one frame, answering in place.
    ///
    /// The reply is the received frame with only the status slot and the
    /// function's output fields overwritten.
    ///
    /// Frames that fail validation are answered in place with
    /// `UNKNOWN_REQUEST` or `PROTOCOL_ERROR`. Returns `None` when the frame
    /// is too short to carry a status slot; nothing should be sent back.
    pub fn handle_frame(&self, frame: &[u8], ctx: &RequestContext) -> Option<FrameReply> {
        match Message::decode(frame) {
            Ok(msg) => {
                let func = msg.func();
                let reply = self.dispatch(msg, ctx);
                let mut bytes = frame.to_vec();
                reply.message.answer_in_place(&mut bytes);
                Some(FrameReply {
                    bytes,
                    status: reply.message.status(),
                    func: Some(func),
                    penalize: reply.penalize,
                })
            }
            Err(e) => {
                let unknown = e.is_unknown_request();
                let status = if unknown {
                    Status::UnknownRequest
                } else {
                    Status::ProtocolError
                };
                tracing::debug!(error = %e, len = frame.len(), "rejecting frame");
                let counted = self.shm.with_locked(|shm| {
                    let c = &mut shm.counters;
                    if unknown {
                        c.unknown_requests += 1;
                    } else {
                        c.protocol_errors += 1;
                    }
                });
                if let Err(e) = counted {
                    tracing::error!(error = %e, "cannot update counters");
                }

                let mut bytes = frame.to_vec();
                if !fail_in_place(&mut bytes, status) {
                    return None;
                }
                Some(FrameReply {
                    bytes,
                    status,
                    func: None,
                    penalize: false,
                })
            }
        }
    }

    // ── Messages ──

    pub fn dispatch(&self, msg: Message, ctx: &RequestContext) -> Reply {
        let func = msg.func();
        let (message, penalize) = match msg {
            Message::Auth(m) => wrap(self.get_auth(m), Message::Auth),
            Message::Version(m) => wrap(self.version(m), Message::Version),
            Message::Lookup(m) => wrap(self.lookup(m, ctx), Message::Lookup),
            Message::Creds(m) => wrap(self.creds(m), Message::Creds),
            Message::Urls(m) => wrap(self.urls(m), Message::Urls),
            Message::Host2Ipv4(m) => wrap(self.host2ipv4(m), Message::Host2Ipv4),
        };
        tracing::debug!(func = func.name(), status = ?message.status(), peer = ?ctx.peer, "dispatched");
        Reply { message, penalize }
    }

    fn get_auth(&self, mut m: AuthMsg) -> (AuthMsg, bool) {
        let psk_ok = fields_match(&self.psk, &m.psk, PSK_SIZE);
        let token = self.shm.with_locked(|shm| {
            let token = psk_ok.then(|| shm.token());
            shm.counters.record(FuncCode::GetAuth);
            if !psk_ok {
                shm.counters.auth_failures += 1;
            }
            token
        });
        let status = match token {
            Ok(Some(token)) => {
                m.auth = token;
                Status::Ok
            }
            Ok(None) => Status::AuthFailed,
            Err(e) => {
                tracing::error!(error = %e, "shared segment unavailable");
                Status::Error
            }
        };
        m.status = status;
        (m, status == Status::AuthFailed)
    }

    fn version(&self, m: VersionMsg) -> (VersionMsg, bool) {
        let token = m.auth.clone();
        self.gated(m, &token, |m| {
            m.version = vpa_core::VERSION.to_string();
            Status::Ok
        })
    }

    fn lookup(&self, mut m: LookupMsg, ctx: &RequestContext) -> (LookupMsg, bool) {
        m.handle = NO_HANDLE;
        let token = m.auth.clone();
        self.gated(m, &token, |m| {
            let entry = match self.creds.lookup(&m.username, &m.password) {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    tracing::info!(user = %m.username, peer = ?ctx.peer, "login rejected");
                    self.note_auth_failure();
                    return Status::AuthFailed;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "credential store unavailable");
                    return Status::Error;
                }
            };
            let Some(handle) = entry.handle() else {
                tracing::warn!(row = entry.row, "password row beyond credential table");
                return Status::Error;
            };

            let cred = Credential {
                username: entry.username,
                first_name: entry.first_name,
                last_name: entry.last_name,
                session_uuid: Uuid::new_v4().to_string(),
                auth_level: entry.auth_level,
                remote_host: ctx.resolve_remote_host(),
                remote_addr: ctx.remote_addr(),
                user_agent: ctx.user_agent.clone(),
            };
            let written = self.shm.with_locked(|shm| match shm.slot_mut(handle) {
                Some(slot) => {
                    slot.write(handle, &cred);
                    true
                }
                None => false,
            });
            match written {
                Ok(true) => {
                    tracing::info!(user = %cred.username, handle, "login");
                    m.handle = handle;
                    Status::Ok
                }
                Ok(false) => Status::Error,
                Err(e) => {
                    tracing::error!(error = %e, "shared segment unavailable");
                    Status::Error
                }
            }
        })
    }

    fn creds(&self, m: CredsMsg) -> (CredsMsg, bool) {
        let token = m.auth.clone();
        self.gated(m, &token, |m| {
            let handle = m.handle;
            match self.shm.with_locked(|shm| shm.active_slot(handle).map(|s| s.read())) {
                Ok(Some(c)) => {
                    m.username = c.username;
                    m.first_name = c.first_name;
                    m.last_name = c.last_name;
                    m.session_uuid = c.session_uuid;
                    m.auth_level = c.auth_level;
                    m.remote_host = c.remote_host;
                    m.remote_addr = c.remote_addr;
                    m.user_agent = c.user_agent;
                    Status::Ok
                }
                Ok(None) => Status::Error,
                Err(e) => {
                    tracing::error!(error = %e, "shared segment unavailable");
                    Status::Error
                }
            }
        })
    }

    fn urls(&self, m: UrlsMsg) -> (UrlsMsg, bool) {
        let token = m.auth.clone();
        self.gated(m, &token, |m| match self.shm.with_locked(|shm| shm.env.read()) {
            Ok(env) => {
                m.ip = env.ip;
                m.cgi_root = env.cgi_root;
                m.styles_root = env.styles_root;
                Status::Ok
            }
            Err(e) => {
                tracing::error!(error = %e, "shared segment unavailable");
                Status::Error
            }
        })
    }

    fn host2ipv4(&self, m: Host2Ipv4Msg) -> (Host2Ipv4Msg, bool) {
        let token = m.auth.clone();
        self.gated(m, &token, |m| {
            match services::host2ipv4addr(&m.hostname, &self.hosts_file) {
                Some(ip) => {
                    m.ipv4 = ip;
                    Status::Ok
                }
                None => Status::Error,
            }
        })
    }

    // ── Helpers ──

    /// Check the token, then count the request, under one lock. `body`
    /// runs only if the token matched.
    fn gated<T: WireMessage>(
        &self,
        mut msg: T,
        token: &str,
        body: impl FnOnce(&mut T) -> Status,
    ) -> (T, bool) {
        let authorized = self.shm.with_locked(|shm| {
            let ok = shm.token_matches(token);
            shm.counters.record(T::FUNC);
            if !ok {
                shm.counters.auth_failures += 1;
            }
            ok
        });
        let status = match authorized {
            Ok(true) => body(&mut msg),
            Ok(false) => Status::AuthFailed,
            Err(e) => {
                tracing::error!(error = %e, "shared segment unavailable");
                Status::Error
            }
        };
        msg.set_status(status);
        (msg, status == Status::AuthFailed)
    }

    fn note_auth_failure(&self) {
        if let Err(e) = self.shm.with_locked(|shm| shm.counters.auth_failures += 1) {
            tracing::error!(error = %e, "cannot update counters");
        }
    }
}

fn wrap<T>((msg, penalize): (T, bool), f: fn(T) -> Message) -> (Message, bool) {
    (f(msg), penalize)
}
