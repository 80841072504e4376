//! VPA RPC configuration.
//!
//! Compile-time defaults with environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use vpa_rpc::config::RpcConfig;
//!
//! let config = RpcConfig::from_env();
//!
//! // Or adjust programmatically
//! let config = RpcConfig::from_env()
//!     .service("5164")
//!     .auth_fail_delay(Duration::from_millis(100));
//! config.validate()?;
//! ```

pub mod defaults;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use vpa_core::env::{env_get, env_get_key, env_get_millis, env_get_opt, env_get_str};
use vpa_core::limits::{FQDN_SIZE, PSK_SIZE, URL_SIZE};

#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Secret exchanged for the session token
    pub psk: String,
    /// Service name or port number the server listens on
    pub service: String,
    /// Host the client connects to
    pub host: String,
    /// SysV key of the shared segment
    pub shm_key: i32,
    /// Name of the cross-process semaphore
    pub mutex_name: String,
    /// Password table consulted by LOOKUP
    pub passwd_csv: PathBuf,
    /// Hosts file consulted by HOST2IPV4ADDR
    pub hosts_file: PathBuf,
    /// Delay applied to failed authentication replies
    pub auth_fail_delay: Duration,
    /// Socket read/write timeout
    pub io_timeout: Duration,
    pub listen_backlog: i32,
    /// Address published in the environment block (probed when unset)
    pub ip: Option<String>,
    pub iface: Option<String>,
    pub public_ip: Option<String>,
    /// Scheme prefix for derived roots
    pub protocol: String,
    /// Account whose public_html holds the web tree
    pub web_user: String,
    pub cgi_root: Option<String>,
    pub styles_root: Option<String>,
    pub img_root: Option<String>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RpcConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `VPA_RPC_PSK` - Pre-shared key
    /// - `VPA_RPC_SERVICE` - Service name or port
    /// - `VPA_RPC_HOST` - Server host for clients
    /// - `VPA_SHM_KEY` - Segment key, hex (`0x5164`) or decimal
    /// - `VPA_MUTEX_NAME` - Semaphore name
    /// - `VPA_PASSWD_CSV` - Password table path
    /// - `VPA_HOSTS_FILE` - Hosts file path
    /// - `VPA_AUTH_FAIL_DELAY_MS` - Failed-auth delay
    /// - `VPA_IO_TIMEOUT_MS` - Socket timeout
    /// - `VPA_LISTEN_BACKLOG` - Server listen backlog
    /// - `VPA_IP`, `VPA_IFACE`, `VPA_PUBLIC_IP` - Published addresses
    /// - `VPA_PROTOCOL`, `VPA_WEB_USER` - Inputs to derived roots
    /// - `VPA_CGI_ROOT`, `VPA_STYLES_ROOT`, `VPA_IMG_ROOT` - Explicit roots
    pub fn from_env() -> Self {
        Self {
            psk: env_get_str("VPA_RPC_PSK", defaults::PSK),
            service: env_get_str("VPA_RPC_SERVICE", defaults::SERVICE),
            host: env_get_str("VPA_RPC_HOST", defaults::HOST),
            shm_key: env_get_key("VPA_SHM_KEY", defaults::SHM_KEY),
            mutex_name: env_get_str("VPA_MUTEX_NAME", defaults::MUTEX_NAME),
            passwd_csv: env_get_str("VPA_PASSWD_CSV", defaults::PASSWD_CSV).into(),
            hosts_file: env_get_str("VPA_HOSTS_FILE", defaults::HOSTS_FILE).into(),
            auth_fail_delay: env_get_millis("VPA_AUTH_FAIL_DELAY_MS", defaults::AUTH_FAIL_DELAY_MS),
            io_timeout: env_get_millis("VPA_IO_TIMEOUT_MS", defaults::IO_TIMEOUT_MS),
            listen_backlog: env_get("VPA_LISTEN_BACKLOG", defaults::LISTEN_BACKLOG),
            ip: env_get_opt("VPA_IP"),
            iface: env_get_opt("VPA_IFACE"),
            public_ip: env_get_opt("VPA_PUBLIC_IP"),
            protocol: env_get_str("VPA_PROTOCOL", defaults::PROTOCOL),
            web_user: env_get_opt("VPA_WEB_USER")
                .or_else(|| env_get_opt("USER"))
                .unwrap_or_default(),
            cgi_root: env_get_opt("VPA_CGI_ROOT"),
            styles_root: env_get_opt("VPA_STYLES_ROOT"),
            img_root: env_get_opt("VPA_IMG_ROOT"),
        }
    }

    /// Defaults only, ignoring the environment.
    pub fn new() -> Self {
        Self {
            psk: defaults::PSK.to_string(),
            service: defaults::SERVICE.to_string(),
            host: defaults::HOST.to_string(),
            shm_key: defaults::SHM_KEY,
            mutex_name: defaults::MUTEX_NAME.to_string(),
            passwd_csv: defaults::PASSWD_CSV.into(),
            hosts_file: defaults::HOSTS_FILE.into(),
            auth_fail_delay: Duration::from_millis(defaults::AUTH_FAIL_DELAY_MS),
            io_timeout: Duration::from_millis(defaults::IO_TIMEOUT_MS),
            listen_backlog: defaults::LISTEN_BACKLOG,
            ip: None,
            iface: None,
            public_ip: None,
            protocol: defaults::PROTOCOL.to_string(),
            web_user: String::new(),
            cgi_root: None,
            styles_root: None,
            img_root: None,
        }
    }

    // Builder methods

    pub fn psk(mut self, psk: impl Into<String>) -> Self {
        self.psk = psk.into();
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn shm_key(mut self, key: i32) -> Self {
        self.shm_key = key;
        self
    }

    pub fn mutex_name(mut self, name: impl Into<String>) -> Self {
        self.mutex_name = name.into();
        self
    }

    pub fn passwd_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.passwd_csv = path.into();
        self
    }

    pub fn hosts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.hosts_file = path.into();
        self
    }

    pub fn auth_fail_delay(mut self, d: Duration) -> Self {
        self.auth_fail_delay = d;
        self
    }

    pub fn io_timeout(mut self, d: Duration) -> Self {
        self.io_timeout = d;
        self
    }

    pub fn listen_backlog(mut self, n: i32) -> Self {
        self.listen_backlog = n;
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn web_user(mut self, user: impl Into<String>) -> Self {
        self.web_user = user.into();
        self
    }

    pub fn cgi_root(mut self, root: impl Into<String>) -> Self {
        self.cgi_root = Some(root.into());
        self
    }

    pub fn styles_root(mut self, root: impl Into<String>) -> Self {
        self.styles_root = Some(root.into());
        self
    }

    pub fn img_root(mut self, root: impl Into<String>) -> Self {
        self.img_root = Some(root.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.psk.is_empty() {
            return Err(ConfigError::InvalidValue("psk must not be empty"));
        }
        if self.psk.len() >= PSK_SIZE {
            return Err(ConfigError::InvalidValue("psk must be shorter than 64 bytes"));
        }
        if self.service.is_empty() {
            return Err(ConfigError::InvalidValue("service must not be empty"));
        }
        if self.host.is_empty() || self.host.len() >= FQDN_SIZE {
            return Err(ConfigError::InvalidValue("host must be 1..253 bytes"));
        }
        if !self.mutex_name.starts_with('/') {
            return Err(ConfigError::InvalidValue("mutex_name must start with '/'"));
        }
        if self.io_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("io_timeout must be > 0"));
        }
        if self.listen_backlog <= 0 {
            return Err(ConfigError::InvalidValue("listen_backlog must be > 0"));
        }
        let roots = [&self.cgi_root, &self.styles_root, &self.img_root];
        if roots.iter().any(|r| r.as_ref().is_some_and(|r| r.len() >= URL_SIZE)) {
            return Err(ConfigError::InvalidValue("document roots must be shorter than 2083 bytes"));
        }
        Ok(())
    }

    /// Log the effective configuration. The PSK is never printed.
    pub fn log_summary(&self) {
        tracing::debug!(
            service = %self.service,
            host = %self.host,
            shm_key = %format!("{:#x}", self.shm_key),
            mutex = %self.mutex_name,
            passwd = %self.passwd_csv.display(),
            hosts = %self.hosts_file.display(),
            auth_fail_delay = ?self.auth_fail_delay,
            io_timeout = ?self.io_timeout,
            "configuration"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let c = RpcConfig::new();
        c.validate().unwrap();
        assert_eq!(c.shm_key, 0x5164);
        assert_eq!(c.mutex_name, "/fw_shmem_mutex");
        assert_eq!(c.auth_fail_delay, Duration::from_millis(3000));
        assert_eq!(c.listen_backlog, 5);
    }

    #[test]
    fn test_builder() {
        let c = RpcConfig::new()
            .psk("X")
            .service("15164")
            .auth_fail_delay(Duration::from_millis(10))
            .cgi_root("/cgi-bin/");
        assert_eq!(c.psk, "X");
        assert_eq!(c.service, "15164");
        assert_eq!(c.cgi_root.as_deref(), Some("/cgi-bin/"));
        c.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects() {
        assert!(RpcConfig::new().psk("").validate().is_err());
        assert!(RpcConfig::new().psk("k".repeat(64)).validate().is_err());
        assert!(RpcConfig::new().mutex_name("noslash").validate().is_err());
        assert!(RpcConfig::new().io_timeout(Duration::ZERO).validate().is_err());
        assert!(RpcConfig::new().listen_backlog(0).validate().is_err());
        assert!(RpcConfig::new().cgi_root("x".repeat(URL_SIZE)).validate().is_err());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("VPA_SHM_KEY", "0x7164");
        std::env::set_var("VPA_AUTH_FAIL_DELAY_MS", "25");
        let c = RpcConfig::from_env();
        assert_eq!(c.shm_key, 0x7164);
        assert_eq!(c.auth_fail_delay, Duration::from_millis(25));
        std::env::remove_var("VPA_SHM_KEY");
        std::env::remove_var("VPA_AUTH_FAIL_DELAY_MS");
    }
}
