//! Field capacities and table sizes.
//!
//! String capacities include the NUL terminator, so a field of capacity
//! `N` holds at most `N - 1` bytes of text. Changing any of these changes
//! both the wire contract and the shared segment layout.

/// UUID text (36) + NUL.
pub const UUID_SIZE: usize = 36 + 1;

/// Login and person names.
pub const NAME_SIZE: usize = 32;

/// DNS fully qualified name.
pub const FQDN_SIZE: usize = 253;

/// URL or filesystem root.
pub const URL_SIZE: usize = 2083;

/// Dotted IPv4 address ("255.255.255.255" + NUL + 1).
pub const IPV4_SIZE: usize = 17;

/// Build version string.
pub const VERSION_SIZE: usize = 32;

/// Pre-shared key.
pub const PSK_SIZE: usize = 64;

/// HTTP user agent.
pub const USER_AGENT_SIZE: usize = 128;

/// Network interface name (IFNAMSIZ).
pub const IFACE_SIZE: usize = 16;

/// Protocol name ("http", "https").
pub const PROTOCOL_SIZE: usize = 32;

/// Formatted timestamp.
pub const TIME_SIZE: usize = 32;

/// Maximum concurrently authenticated users.
pub const MAX_USERS: usize = 6;

/// First valid credential handle. Rows 0..3 of the password table are the
/// meta header, meta data and data header rows, and the credential table
/// keeps the same indexing so a handle is also a row number.
pub const FIRST_HANDLE: usize = 3;

/// Slots in the credential table, including the reserved rows.
pub const CRED_SLOTS: usize = FIRST_HANDLE + MAX_USERS;

/// Largest message accepted on any transport.
pub const MAX_MESSAGE_SIZE: usize = 8192;

/// Well-known VPA port (`vpa/tcp` in /etc/services).
pub const VPA_PORT: u16 = 5164;
