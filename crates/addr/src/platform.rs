//! The platform name-resolution boundary.
//!
//! Everything that can block on DNS lives behind [`NameResolution`] so the
//! resolver can be driven by fakes in tests and so the blocking calls are
//! confined to the resolver's worker thread.

use std::net::ToSocketAddrs;

use crate::address::NetAddress;

/// A platform name-resolution failure.
///
/// Callers treat every variant identically: resolution is best-effort and a
/// failure only ever downgrades output to a numeric rendering.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("host not found: {0}")]
    HostNotFound(String),

    #[error("address has no reverse mapping: {0}")]
    NoReverseMapping(NetAddress),

    #[error("platform resolver error: {0}")]
    Platform(String),
}

/// Blocking platform name resolution.
///
/// Both calls may block for seconds (DNS); the resolver only ever invokes
/// them from its worker thread.
pub trait NameResolution: Send + Sync {
    /// Resolve a hostname to its addresses, in resolver order.
    fn resolve_host(&self, host: &str, port: u16) -> Result<Vec<NetAddress>, ResolveError>;

    /// Reverse-resolve an address to a hostname.
    fn reverse_lookup(&self, addr: &NetAddress) -> Result<String, ResolveError>;
}

/// The real system resolver: `getaddrinfo` via [`std::net::ToSocketAddrs`]
/// for forward lookups, `getnameinfo` for reverse lookups.
#[derive(Debug, Default)]
pub struct SystemNameResolution;

impl SystemNameResolution {
    pub fn new() -> Self {
        Self
    }
}

impl NameResolution for SystemNameResolution {
    fn resolve_host(&self, host: &str, port: u16) -> Result<Vec<NetAddress>, ResolveError> {
        let addrs: Vec<NetAddress> = (host, port)
            .to_socket_addrs()
            .map_err(|e| ResolveError::Platform(e.to_string()))?
            .map(NetAddress::from)
            .collect();
        if addrs.is_empty() {
            return Err(ResolveError::HostNotFound(host.to_string()));
        }
        Ok(addrs)
    }

    #[cfg(unix)]
    fn reverse_lookup(&self, addr: &NetAddress) -> Result<String, ResolveError> {
        // getnameinfo wants NI_MAXHOST output space.
        const MAX_HOST: usize = 1025;

        let raw = addr
            .to_native_sockaddr()
            .map_err(|_| ResolveError::NoReverseMapping(*addr))?;

        let mut host = [0 as libc::c_char; MAX_HOST];
        // SAFETY: raw holds a valid sockaddr image of raw.len() bytes and
        // host is a writable NUL-terminated output buffer.
        let rc = unsafe {
            libc::getnameinfo(
                raw.as_bytes().as_ptr() as *const libc::sockaddr,
                raw.len() as libc::socklen_t,
                host.as_mut_ptr(),
                host.len() as libc::socklen_t,
                std::ptr::null_mut(),
                0,
                libc::NI_NAMEREQD,
            )
        };
        if rc != 0 {
            return Err(ResolveError::Platform(format!("getnameinfo failed ({rc})")));
        }
        // SAFETY: getnameinfo NUL-terminates the output buffer on success.
        let name = unsafe { std::ffi::CStr::from_ptr(host.as_ptr()) };
        Ok(name.to_string_lossy().into_owned())
    }

    #[cfg(not(unix))]
    fn reverse_lookup(&self, addr: &NetAddress) -> Result<String, ResolveError> {
        Err(ResolveError::NoReverseMapping(*addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_resolver_parses_numeric_hosts() {
        // Numeric hosts resolve without touching DNS.
        let addrs = SystemNameResolution::new()
            .resolve_host("127.0.0.1", 8080)
            .unwrap();
        assert!(addrs.contains(&NetAddress::ipv4(127, 0, 0, 1, 8080)));
    }
}
