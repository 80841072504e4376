//! Per-function message shapes.
//!
//! Field order below is the wire order. Each `WIRE_SIZE` is the header,
//! the status slot and the payload capacities added up.

use super::codec::{Reader, Writer};
use super::{FuncCode, Status, WireMessage, PREFIX_SIZE};
use crate::limits::{
    FQDN_SIZE, IPV4_SIZE, NAME_SIZE, PSK_SIZE, URL_SIZE, USER_AGENT_SIZE, UUID_SIZE, VERSION_SIZE,
};

/// Handle value meaning "no session".
pub const NO_HANDLE: i32 = -1;

// ── GET_AUTH ──

/// Trade the pre-shared key for the session token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthMsg {
    pub status: Status,
    /// In: pre-shared key
    pub psk: String,
    /// Out: session token
    pub auth: String,
}

impl AuthMsg {
    pub fn request(psk: &str) -> Self {
        Self {
            psk: psk.to_string(),
            ..Default::default()
        }
    }
}

impl WireMessage for AuthMsg {
    const FUNC: FuncCode = FuncCode::GetAuth;
    const WIRE_SIZE: usize = PREFIX_SIZE + PSK_SIZE + UUID_SIZE;

    fn status(&self) -> Status {
        self.status
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    fn encode_payload(&self, w: &mut Writer<'_>) {
        w.str(&self.psk, PSK_SIZE);
        w.str(&self.auth, UUID_SIZE);
    }

    fn decode_payload(r: &mut Reader<'_>, status: Status) -> Self {
        Self {
            status,
            psk: r.str(PSK_SIZE),
            auth: r.str(UUID_SIZE),
        }
    }

    fn encode_outputs(&self, buf: &mut [u8]) {
        Writer::at(buf, PREFIX_SIZE + PSK_SIZE).str(&self.auth, UUID_SIZE);
    }
}

// ── VERSION ──

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionMsg {
    pub status: Status,
    /// In: session token
    pub auth: String,
    /// Out: server build version
    pub version: String,
}

impl VersionMsg {
    pub fn request(auth: &str) -> Self {
        Self {
            auth: auth.to_string(),
            ..Default::default()
        }
    }
}

impl WireMessage for VersionMsg {
    const FUNC: FuncCode = FuncCode::Version;
    const WIRE_SIZE: usize = PREFIX_SIZE + UUID_SIZE + VERSION_SIZE;

    fn status(&self) -> Status {
        self.status
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    fn encode_payload(&self, w: &mut Writer<'_>) {
        w.str(&self.auth, UUID_SIZE);
        w.str(&self.version, VERSION_SIZE);
    }

    fn decode_payload(r: &mut Reader<'_>, status: Status) -> Self {
        Self {
            status,
            auth: r.str(UUID_SIZE),
            version: r.str(VERSION_SIZE),
        }
    }

    fn encode_outputs(&self, buf: &mut [u8]) {
        Writer::at(buf, PREFIX_SIZE + UUID_SIZE).str(&self.version, VERSION_SIZE);
    }
}

// ── LOOKUP ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupMsg {
    pub status: Status,
    /// In: session token
    pub auth: String,
    /// In: login name
    pub username: String,
    /// In: password
    pub password: String,
    /// Out: credential handle, or negative on failure
    pub handle: i32,
}

impl Default for LookupMsg {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            auth: String::new(),
            username: String::new(),
            password: String::new(),
            handle: NO_HANDLE,
        }
    }
}

impl LookupMsg {
    const HANDLE_OFFSET: usize = PREFIX_SIZE + UUID_SIZE + NAME_SIZE + NAME_SIZE;

    pub fn request(auth: &str, username: &str, password: &str) -> Self {
        Self {
            auth: auth.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            ..Default::default()
        }
    }
}

impl WireMessage for LookupMsg {
    const FUNC: FuncCode = FuncCode::Lookup;
    const WIRE_SIZE: usize = PREFIX_SIZE + UUID_SIZE + NAME_SIZE + NAME_SIZE + 4;

    fn status(&self) -> Status {
        self.status
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    fn encode_payload(&self, w: &mut Writer<'_>) {
        w.str(&self.auth, UUID_SIZE);
        w.str(&self.username, NAME_SIZE);
        w.str(&self.password, NAME_SIZE);
        w.i32(self.handle);
    }

    fn decode_payload(r: &mut Reader<'_>, status: Status) -> Self {
        Self {
            status,
            auth: r.str(UUID_SIZE),
            username: r.str(NAME_SIZE),
            password: r.str(NAME_SIZE),
            handle: r.i32(),
        }
    }

    fn encode_outputs(&self, buf: &mut [u8]) {
        Writer::at(buf, Self::HANDLE_OFFSET).i32(self.handle);
    }

    // A rejected login still reports NO_HANDLE
    fn encode_failure_outputs(&self, buf: &mut [u8]) {
        self.encode_outputs(buf);
    }
}

// ── CREDS ──

/// Copy of one credential slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredsMsg {
    pub status: Status,
    /// In: session token
    pub auth: String,
    /// In: handle from a previous LOOKUP
    pub handle: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// Per-session UUID issued at login
    pub session_uuid: String,
    pub auth_level: String,
    pub remote_host: String,
    pub remote_addr: String,
    pub user_agent: String,
}

impl Default for CredsMsg {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            auth: String::new(),
            handle: NO_HANDLE,
            username: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            session_uuid: String::new(),
            auth_level: String::new(),
            remote_host: String::new(),
            remote_addr: String::new(),
            user_agent: String::new(),
        }
    }
}

impl CredsMsg {
    pub fn request(auth: &str, handle: i32) -> Self {
        Self {
            auth: auth.to_string(),
            handle,
            ..Default::default()
        }
    }

    fn encode_credential(&self, w: &mut Writer<'_>) {
        w.str(&self.username, NAME_SIZE);
        w.str(&self.first_name, NAME_SIZE);
        w.str(&self.last_name, NAME_SIZE);
        w.str(&self.session_uuid, UUID_SIZE);
        w.str(&self.auth_level, NAME_SIZE);
        w.str(&self.remote_host, FQDN_SIZE);
        w.str(&self.remote_addr, FQDN_SIZE);
        w.str(&self.user_agent, USER_AGENT_SIZE);
    }
}

impl WireMessage for CredsMsg {
    const FUNC: FuncCode = FuncCode::Creds;
    const WIRE_SIZE: usize = PREFIX_SIZE
        + UUID_SIZE
        + 4
        + NAME_SIZE * 3
        + UUID_SIZE
        + NAME_SIZE
        + FQDN_SIZE * 2
        + USER_AGENT_SIZE;

    fn status(&self) -> Status {
        self.status
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    fn encode_payload(&self, w: &mut Writer<'_>) {
        w.str(&self.auth, UUID_SIZE);
        w.i32(self.handle);
        self.encode_credential(w);
    }

    fn decode_payload(r: &mut Reader<'_>, status: Status) -> Self {
        Self {
            status,
            auth: r.str(UUID_SIZE),
            handle: r.i32(),
            username: r.str(NAME_SIZE),
            first_name: r.str(NAME_SIZE),
            last_name: r.str(NAME_SIZE),
            session_uuid: r.str(UUID_SIZE),
            auth_level: r.str(NAME_SIZE),
            remote_host: r.str(FQDN_SIZE),
            remote_addr: r.str(FQDN_SIZE),
            user_agent: r.str(USER_AGENT_SIZE),
        }
    }

    fn encode_outputs(&self, buf: &mut [u8]) {
        self.encode_credential(&mut Writer::at(buf, PREFIX_SIZE + UUID_SIZE + 4));
    }
}

// ── URLS ──

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlsMsg {
    pub status: Status,
    /// In: session token
    pub auth: String,
    /// Out: host IP address
    pub ip: String,
    /// Out: CGI root path
    pub cgi_root: String,
    /// Out: styles root path
    pub styles_root: String,
}

impl UrlsMsg {
    pub fn request(auth: &str) -> Self {
        Self {
            auth: auth.to_string(),
            ..Default::default()
        }
    }
}

impl WireMessage for UrlsMsg {
    const FUNC: FuncCode = FuncCode::Urls;
    const WIRE_SIZE: usize = PREFIX_SIZE + UUID_SIZE + FQDN_SIZE + URL_SIZE + URL_SIZE;

    fn status(&self) -> Status {
        self.status
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    fn encode_payload(&self, w: &mut Writer<'_>) {
        w.str(&self.auth, UUID_SIZE);
        w.str(&self.ip, FQDN_SIZE);
        w.str(&self.cgi_root, URL_SIZE);
        w.str(&self.styles_root, URL_SIZE);
    }

    fn decode_payload(r: &mut Reader<'_>, status: Status) -> Self {
        Self {
            status,
            auth: r.str(UUID_SIZE),
            ip: r.str(FQDN_SIZE),
            cgi_root: r.str(URL_SIZE),
            styles_root: r.str(URL_SIZE),
        }
    }

    fn encode_outputs(&self, buf: &mut [u8]) {
        let mut w = Writer::at(buf, PREFIX_SIZE + UUID_SIZE);
        w.str(&self.ip, FQDN_SIZE);
        w.str(&self.cgi_root, URL_SIZE);
        w.str(&self.styles_root, URL_SIZE);
    }
}

// ── HOST2IPV4ADDR ──

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Host2Ipv4Msg {
    pub status: Status,
    /// In: session token
    pub auth: String,
    /// In: host name or dotted address
    pub hostname: String,
    /// Out: dotted IPv4 address
    pub ipv4: String,
}

impl Host2Ipv4Msg {
    pub fn request(auth: &str, hostname: &str) -> Self {
        Self {
            auth: auth.to_string(),
            hostname: hostname.to_string(),
            ..Default::default()
        }
    }
}

impl WireMessage for Host2Ipv4Msg {
    const FUNC: FuncCode = FuncCode::Host2Ipv4Addr;
    const WIRE_SIZE: usize = PREFIX_SIZE + UUID_SIZE + FQDN_SIZE + IPV4_SIZE;

    fn status(&self) -> Status {
        self.status
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    fn encode_payload(&self, w: &mut Writer<'_>) {
        w.str(&self.auth, UUID_SIZE);
        w.str(&self.hostname, FQDN_SIZE);
        w.str(&self.ipv4, IPV4_SIZE);
    }

    fn decode_payload(r: &mut Reader<'_>, status: Status) -> Self {
        Self {
            status,
            auth: r.str(UUID_SIZE),
            hostname: r.str(FQDN_SIZE),
            ipv4: r.str(IPV4_SIZE),
        }
    }

    fn encode_outputs(&self, buf: &mut [u8]) {
        Writer::at(buf, PREFIX_SIZE + UUID_SIZE + FQDN_SIZE).str(&self.ipv4, IPV4_SIZE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{peek_status, STATUS_OFFSET};

    #[test]
    fn test_wire_sizes() {
        assert_eq!(AuthMsg::WIRE_SIZE, 117);
        assert_eq!(VersionMsg::WIRE_SIZE, 85);
        assert_eq!(LookupMsg::WIRE_SIZE, 121);
        assert_eq!(CredsMsg::WIRE_SIZE, 856);
        assert_eq!(UrlsMsg::WIRE_SIZE, 4472);
        assert_eq!(Host2Ipv4Msg::WIRE_SIZE, 323);
    }

    #[test]
    fn test_encoded_length_matches_declared_size() {
        assert_eq!(AuthMsg::request("k").encode().len(), AuthMsg::WIRE_SIZE);
        assert_eq!(CredsMsg::request("t", 3).encode().len(), CredsMsg::WIRE_SIZE);
        assert_eq!(UrlsMsg::request("t").encode().len(), UrlsMsg::WIRE_SIZE);
    }

    #[test]
    fn test_creds_fields_survive_the_wire() {
        let mut msg = CredsMsg::request("tok", 4);
        msg.status = Status::Ok;
        msg.username = "doug".into();
        msg.first_name = "Douglas".into();
        msg.last_name = "Goodall".into();
        msg.session_uuid = "0b1f8c52-6a2e-4d7c-9d0e-2f4b1c8a9e10".into();
        msg.auth_level = "admin".into();
        msg.remote_host = "daphne.local".into();
        msg.remote_addr = "192.168.4.194".into();
        msg.user_agent = "curl/8.5".into();

        let back = CredsMsg::decode(&msg.encode()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_lookup_defaults_to_no_handle() {
        let msg = LookupMsg::request("tok", "doug", "melange");
        assert_eq!(msg.handle, NO_HANDLE);
        let back = LookupMsg::decode(&msg.encode()).unwrap();
        assert_eq!(back.handle, NO_HANDLE);
        assert_eq!(back.username, "doug");
    }

    #[test]
    fn test_answer_in_place_keeps_raw_input_bytes() {
        let mut frame = LookupMsg::request("tok", "", "").encode();
        let user = PREFIX_SIZE + UUID_SIZE;
        let pass = user + NAME_SIZE;
        frame[user..user + 5].copy_from_slice(&[b'r', 0xE9, b'n', b'e', 0]);
        frame[pass..pass + NAME_SIZE].fill(b'p');
        let sent = frame.clone();

        let mut reply = LookupMsg::decode(&frame).unwrap();
        reply.status = Status::Ok;
        reply.handle = 5;
        reply.answer_in_place(&mut frame);

        assert_eq!(&frame[..STATUS_OFFSET], &sent[..STATUS_OFFSET]);
        let inputs = PREFIX_SIZE..LookupMsg::HANDLE_OFFSET;
        assert_eq!(&frame[inputs.clone()], &sent[inputs]);
        assert_eq!(LookupMsg::decode(&frame).unwrap().handle, 5);
    }

    #[test]
    fn test_failed_answer_leaves_outputs_alone() {
        let mut frame = AuthMsg::request("Y").encode();
        let out = PREFIX_SIZE + PSK_SIZE;
        frame[out..out + 4].copy_from_slice(&[0xFF, 0xFE, b'z', 0]);
        let sent = frame.clone();

        let mut reply = AuthMsg::decode(&frame).unwrap();
        reply.status = Status::AuthFailed;
        reply.answer_in_place(&mut frame);

        assert_eq!(peek_status(&frame), Some(Status::AuthFailed));
        assert_eq!(&frame[PREFIX_SIZE..], &sent[PREFIX_SIZE..]);
    }

    #[test]
    fn test_oversized_field_is_truncated_not_overflowed() {
        let long = "x".repeat(NAME_SIZE * 2);
        let msg = LookupMsg::request("tok", &long, "pw");
        let back = LookupMsg::decode(&msg.encode()).unwrap();
        assert_eq!(back.username.len(), NAME_SIZE - 1);
        assert_eq!(back.password, "pw");
    }
}
