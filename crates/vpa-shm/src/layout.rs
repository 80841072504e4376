//! Shared segment layout.
//!
//! One `repr(C)` struct is mapped by every process. All fields are plain
//! integers and byte arrays, so the all-zero bit pattern is a valid value
//! and a freshly created SysV segment (which the kernel zero-fills) needs
//! only its header and token written.
//!
//! ```text
//! ShmLayout
//! ├── header     signature / version / size
//! ├── token      session token (UUID text)
//! ├── env        host, address and document roots
//! ├── creds[9]   credential table, indexed by handle (0..3 reserved)
//! ├── counters   request and failure counts
//! └── selftest   self-test progress block
//! ```

use std::alloc::{self, Layout};

use vpa_core::limits::{
    CRED_SLOTS, FIRST_HANDLE, FQDN_SIZE, IFACE_SIZE, NAME_SIZE, PROTOCOL_SIZE, TIME_SIZE,
    URL_SIZE, USER_AGENT_SIZE, UUID_SIZE,
};
use vpa_core::secret::fields_match;
use vpa_core::wire::codec::{read_cstr, write_cstr};
use vpa_core::FuncCode;

use crate::error::{Result, ShmError};

// ── Identification ──

pub const SHM_SIGNATURE: u32 = 0x5650_4131; // "VPA1"
pub const SHM_LAYOUT_VERSION: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ShmHeader {
    pub signature: u32,
    pub version: u32,
    pub size: u64,
}

// ── Credential table ──

/// One logged-in user. `handle > 0` marks the slot as in use.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CredSlot {
    pub handle: i32,
    username: [u8; NAME_SIZE],
    first_name: [u8; NAME_SIZE],
    last_name: [u8; NAME_SIZE],
    session_uuid: [u8; UUID_SIZE],
    auth_level: [u8; NAME_SIZE],
    remote_host: [u8; FQDN_SIZE],
    remote_addr: [u8; FQDN_SIZE],
    user_agent: [u8; USER_AGENT_SIZE],
}

/// Owned copy of a credential slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub session_uuid: String,
    pub auth_level: String,
    pub remote_host: String,
    pub remote_addr: String,
    pub user_agent: String,
}

impl CredSlot {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.handle > 0
    }

    pub fn read(&self) -> Credential {
        Credential {
            username: read_cstr(&self.username),
            first_name: read_cstr(&self.first_name),
            last_name: read_cstr(&self.last_name),
            session_uuid: read_cstr(&self.session_uuid),
            auth_level: read_cstr(&self.auth_level),
            remote_host: read_cstr(&self.remote_host),
            remote_addr: read_cstr(&self.remote_addr),
            user_agent: read_cstr(&self.user_agent),
        }
    }

    /// Overwrite the whole slot.
    pub fn write(&mut self, handle: i32, cred: &Credential) {
        self.handle = handle;
        write_cstr(&mut self.username, &cred.username);
        write_cstr(&mut self.first_name, &cred.first_name);
        write_cstr(&mut self.last_name, &cred.last_name);
        write_cstr(&mut self.session_uuid, &cred.session_uuid);
        write_cstr(&mut self.auth_level, &cred.auth_level);
        write_cstr(&mut self.remote_host, &cred.remote_host);
        write_cstr(&mut self.remote_addr, &cred.remote_addr);
        write_cstr(&mut self.user_agent, &cred.user_agent);
    }
}

impl std::fmt::Debug for CredSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredSlot")
            .field("handle", &self.handle)
            .field("cred", &self.read())
            .finish()
    }
}

// ── Environment ──

#[repr(C)]
#[derive(Clone, Copy)]
pub struct EnvBlock {
    hostname: [u8; FQDN_SIZE],
    ip: [u8; FQDN_SIZE],
    public_ip: [u8; FQDN_SIZE],
    iface: [u8; IFACE_SIZE],
    protocol: [u8; PROTOCOL_SIZE],
    cgi_root: [u8; URL_SIZE],
    styles_root: [u8; URL_SIZE],
    img_root: [u8; URL_SIZE],
}

/// Host facts published for `URLS` and for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub hostname: String,
    pub ip: String,
    pub public_ip: String,
    pub iface: String,
    pub protocol: String,
    pub cgi_root: String,
    pub styles_root: String,
    pub img_root: String,
}

impl EnvBlock {
    pub fn read(&self) -> Environment {
        Environment {
            hostname: read_cstr(&self.hostname),
            ip: read_cstr(&self.ip),
            public_ip: read_cstr(&self.public_ip),
            iface: read_cstr(&self.iface),
            protocol: read_cstr(&self.protocol),
            cgi_root: read_cstr(&self.cgi_root),
            styles_root: read_cstr(&self.styles_root),
            img_root: read_cstr(&self.img_root),
        }
    }

    pub fn write(&mut self, env: &Environment) {
        write_cstr(&mut self.hostname, &env.hostname);
        write_cstr(&mut self.ip, &env.ip);
        write_cstr(&mut self.public_ip, &env.public_ip);
        write_cstr(&mut self.iface, &env.iface);
        write_cstr(&mut self.protocol, &env.protocol);
        write_cstr(&mut self.cgi_root, &env.cgi_root);
        write_cstr(&mut self.styles_root, &env.styles_root);
        write_cstr(&mut self.img_root, &env.img_root);
    }
}

// ── Counters ──

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Counters {
    pub requests: u64,
    pub per_func: [u64; FuncCode::COUNT],
    pub auth_failures: u64,
    pub protocol_errors: u64,
    /// Frames with an unrecognised function code
    pub unknown_requests: u64,
}

impl Counters {
    pub fn count(&self, func: FuncCode) -> u64 {
        self.per_func[func as usize]
    }

    pub fn record(&mut self, func: FuncCode) {
        self.requests = self.requests.wrapping_add(1);
        let slot = &mut self.per_func[func as usize];
        *slot = slot.wrapping_add(1);
    }
}

// ── Self-test block ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
}

/// Progress of a self-test run. Each test owns one bit (0..32) in the
/// processed/passed/failed/skipped masks.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SelfTest {
    pub started: u8,
    pub completed: u8,
    pub overall_passed: u8,
    _pad: u8,
    pub processed_bits: u32,
    pub passed_bits: u32,
    pub failed_bits: u32,
    pub skipped_bits: u32,
    pub num_processed: u32,
    pub num_passed: u32,
    pub num_failed: u32,
    pub num_skipped: u32,
    pub time_started: i64,
    pub time_completed: i64,
    started_text: [u8; TIME_SIZE],
    completed_text: [u8; TIME_SIZE],
}

impl SelfTest {
    pub const MAX_TESTS: u32 = u32::BITS;

    /// Clear previous results and mark a run as started.
    pub fn begin(&mut self) {
        let now = chrono::Local::now();
        *self = SelfTest {
            started: 1,
            time_started: now.timestamp(),
            ..zeroed_selftest()
        };
        write_cstr(&mut self.started_text, &format_time(&now));
    }

    /// Record the outcome of test `index`. Returns `false` when the index
    /// has no bit or the test was already recorded.
    pub fn record(&mut self, index: u32, outcome: TestOutcome) -> bool {
        if index >= Self::MAX_TESTS {
            return false;
        }
        let bit = 1u32 << index;
        if self.processed_bits & bit != 0 {
            return false;
        }
        self.processed_bits |= bit;
        self.num_processed += 1;
        match outcome {
            TestOutcome::Passed => {
                self.passed_bits |= bit;
                self.num_passed += 1;
            }
            TestOutcome::Failed => {
                self.failed_bits |= bit;
                self.num_failed += 1;
            }
            TestOutcome::Skipped => {
                self.skipped_bits |= bit;
                self.num_skipped += 1;
            }
        }
        true
    }

    /// Close the run. The overall result passes when nothing failed.
    pub fn finish(&mut self) {
        let now = chrono::Local::now();
        self.completed = 1;
        self.overall_passed = u8::from(self.num_failed == 0);
        self.time_completed = now.timestamp();
        write_cstr(&mut self.completed_text, &format_time(&now));
    }

    pub fn started_text(&self) -> String {
        read_cstr(&self.started_text)
    }

    pub fn completed_text(&self) -> String {
        read_cstr(&self.completed_text)
    }
}

fn format_time(t: &chrono::DateTime<chrono::Local>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn zeroed_selftest() -> SelfTest {
    // SAFETY: SelfTest is plain integers and byte arrays
    unsafe { std::mem::zeroed() }
}

// ── Whole segment ──

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ShmLayout {
    pub header: ShmHeader,
    token: [u8; UUID_SIZE],
    pub env: EnvBlock,
    pub creds: [CredSlot; CRED_SLOTS],
    pub counters: Counters,
    pub selftest: SelfTest,
}

impl ShmLayout {
    pub const SIZE: usize = std::mem::size_of::<ShmLayout>();

    /// Allocate a zeroed layout on the heap.
    pub fn new_boxed() -> Box<ShmLayout> {
        let layout = Layout::new::<ShmLayout>();
        // SAFETY: layout is non-zero sized and every field accepts zero bytes
        unsafe {
            let ptr = alloc::alloc_zeroed(layout) as *mut ShmLayout;
            if ptr.is_null() {
                alloc::handle_alloc_error(layout);
            }
            Box::from_raw(ptr)
        }
    }

    /// Stamp the header and session token onto fresh memory.
    pub fn initialize(&mut self, token: &str) {
        self.header = ShmHeader {
            signature: SHM_SIGNATURE,
            version: SHM_LAYOUT_VERSION,
            size: Self::SIZE as u64,
        };
        write_cstr(&mut self.token, token);
    }

    /// Check that the segment was created by a build with this layout.
    pub fn validate(&self) -> Result<()> {
        let h = &self.header;
        if h.signature != SHM_SIGNATURE
            || h.version != SHM_LAYOUT_VERSION
            || h.size != Self::SIZE as u64
        {
            return Err(ShmError::StaleSegment {
                signature: h.signature,
                version: h.version,
                size: h.size,
                expected_signature: SHM_SIGNATURE,
                expected_version: SHM_LAYOUT_VERSION,
                expected_size: Self::SIZE as u64,
            });
        }
        Ok(())
    }

    pub fn token(&self) -> String {
        read_cstr(&self.token)
    }

    /// Constant-time check of a client-supplied token.
    pub fn token_matches(&self, candidate: &str) -> bool {
        fields_match(&self.token(), candidate, UUID_SIZE)
    }

    /// Slot for `handle` if it lies in the usable range.
    pub fn slot(&self, handle: i32) -> Option<&CredSlot> {
        slot_index(handle).map(|i| &self.creds[i])
    }

    pub fn slot_mut(&mut self, handle: i32) -> Option<&mut CredSlot> {
        slot_index(handle).map(move |i| &mut self.creds[i])
    }

    /// Slot for `handle` only if it is in range and in use.
    pub fn active_slot(&self, handle: i32) -> Option<&CredSlot> {
        self.slot(handle).filter(|s| s.is_active())
    }

    /// Handles currently in use, in table order.
    pub fn active_handles(&self) -> impl Iterator<Item = i32> + '_ {
        self.creds[FIRST_HANDLE..]
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.handle)
    }
}

fn slot_index(handle: i32) -> Option<usize> {
    let idx = usize::try_from(handle).ok()?;
    (FIRST_HANDLE..CRED_SLOTS).contains(&idx).then_some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Box<ShmLayout> {
        let mut l = ShmLayout::new_boxed();
        l.initialize("3f0c9a4e-9b1d-4c55-8c1e-7d2a6b0e4f11");
        l
    }

    #[test]
    fn test_zeroed_layout_is_stale() {
        let l = ShmLayout::new_boxed();
        assert!(matches!(l.validate(), Err(ShmError::StaleSegment { signature: 0, .. })));
    }

    #[test]
    fn test_initialize_then_validate() {
        let l = fresh();
        l.validate().unwrap();
        assert_eq!(l.header.size as usize, ShmLayout::SIZE);
        assert_eq!(l.token(), "3f0c9a4e-9b1d-4c55-8c1e-7d2a6b0e4f11");
    }

    #[test]
    fn test_version_bump_is_detected() {
        let mut l = fresh();
        l.header.version += 1;
        assert!(l.validate().is_err());
    }

    #[test]
    fn test_token_matching() {
        let l = fresh();
        assert!(l.token_matches("3f0c9a4e-9b1d-4c55-8c1e-7d2a6b0e4f11"));
        assert!(!l.token_matches("3f0c9a4e-9b1d-4c55-8c1e-7d2a6b0e4f12"));
        assert!(!l.token_matches(""));
        assert!(!ShmLayout::new_boxed().token_matches(""));
    }

    #[test]
    fn test_slot_range() {
        let mut l = fresh();
        assert!(l.slot(-1).is_none());
        assert!(l.slot(0).is_none());
        assert!(l.slot(2).is_none());
        assert!(l.slot(FIRST_HANDLE as i32).is_some());
        assert!(l.slot(CRED_SLOTS as i32 - 1).is_some());
        assert!(l.slot(CRED_SLOTS as i32).is_none());
        assert!(l.slot(i32::MAX).is_none());

        assert!(l.active_slot(4).is_none());
        let cred = Credential {
            username: "doug".into(),
            ..Default::default()
        };
        l.slot_mut(4).unwrap().write(4, &cred);
        assert_eq!(l.active_slot(4).unwrap().read().username, "doug");
        assert_eq!(l.active_handles().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_environment_round_trip() {
        let mut l = fresh();
        let env = Environment {
            hostname: "daphne".into(),
            ip: "192.168.4.194".into(),
            cgi_root: "/cgi-bin".into(),
            styles_root: "/styles".into(),
            ..Default::default()
        };
        l.env.write(&env);
        assert_eq!(l.env.read(), env);
    }

    #[test]
    fn test_counters() {
        let mut l = fresh();
        l.counters.record(FuncCode::Lookup);
        l.counters.record(FuncCode::Lookup);
        l.counters.record(FuncCode::GetAuth);
        assert_eq!(l.counters.requests, 3);
        assert_eq!(l.counters.count(FuncCode::Lookup), 2);
        assert_eq!(l.counters.count(FuncCode::Creds), 0);
    }

    #[test]
    fn test_selftest_progress() {
        let mut l = fresh();
        let st = &mut l.selftest;
        st.begin();
        assert_eq!(st.started, 1);
        assert!(!st.started_text().is_empty());

        assert!(st.record(0, TestOutcome::Passed));
        assert!(st.record(1, TestOutcome::Skipped));
        assert!(!st.record(1, TestOutcome::Failed));
        assert!(!st.record(SelfTest::MAX_TESTS, TestOutcome::Passed));
        st.finish();

        assert_eq!(st.processed_bits, 0b11);
        assert_eq!(st.skipped_bits, 0b10);
        assert_eq!(st.num_processed, 2);
        assert_eq!(st.overall_passed, 1);
        assert_eq!(st.completed, 1);

        st.begin();
        assert!(st.record(5, TestOutcome::Failed));
        st.finish();
        assert_eq!(st.processed_bits, 1 << 5);
        assert_eq!(st.overall_passed, 0);
    }
}
