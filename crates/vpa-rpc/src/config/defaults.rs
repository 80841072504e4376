//! Compiled-in defaults for `RpcConfig`.

/// Pre-shared key clients trade for the session token.
pub const PSK: &str = "348bcdbe62fead7028c8010490b27332";

/// Service name looked up in the services database.
pub const SERVICE: &str = "vparpc";

/// Host the client connects to.
pub const HOST: &str = "localhost";

pub const SHM_KEY: i32 = vpa_shm::DEFAULT_SHM_KEY;

pub const MUTEX_NAME: &str = vpa_shm::DEFAULT_MUTEX_NAME;

pub const PASSWD_CSV: &str = "passwd.csv";

pub const HOSTS_FILE: &str = "/etc/hosts";

/// Delay before answering a failed authentication.
pub const AUTH_FAIL_DELAY_MS: u64 = 3000;

/// Per-connection read/write timeout.
pub const IO_TIMEOUT_MS: u64 = 30_000;

/// Scheme prefix for derived document roots.
pub const PROTOCOL: &str = "http://";

/// Pending connections the server socket queues.
pub const LISTEN_BACKLOG: i32 = 5;

/// Connect timeout for the wake trigger.
pub const WAKE_TIMEOUT_MS: u64 = 5000;
