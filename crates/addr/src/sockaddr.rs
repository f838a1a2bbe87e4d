//! Conversion between `NetAddress` and native socket address structures.
//!
//! The resolver and transport layers only ever see sockaddr data as
//! bytes + length; this module owns the family dispatch. Unknown families
//! decode to `NetAddress::Null` with a logged warning instead of being
//! silently mishandled.

use crate::address::NetAddress;

/// Why a `NetAddress` could not be converted to a native sockaddr.
#[derive(Debug, thiserror::Error)]
pub enum SockaddrError {
    /// Null, local, and lobby-id addresses have no native representation.
    #[error("address has no native sockaddr representation: {0}")]
    NotRepresentable(NetAddress),
}

#[cfg(unix)]
mod native {
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

    use super::SockaddrError;
    use crate::address::{NetAddress, SockaddrBuf};

    /// Read the `sa_family` field from a sockaddr byte image.
    fn family(raw: &[u8]) -> Option<libc::sa_family_t> {
        if raw.len() < std::mem::size_of::<libc::sockaddr>() {
            return None;
        }
        // SAFETY: the slice is at least sockaddr-sized; read_unaligned
        // tolerates the byte buffer's alignment.
        let sa = unsafe { std::ptr::read_unaligned(raw.as_ptr() as *const libc::sockaddr) };
        Some(sa.sa_family)
    }

    /// Decode a raw sockaddr image into a std socket address, if the family
    /// is one we understand.
    pub(crate) fn decode_raw(buf: &SockaddrBuf) -> Option<SocketAddr> {
        let raw = buf.as_bytes();
        match family(raw)? as i32 {
            libc::AF_INET if raw.len() >= std::mem::size_of::<libc::sockaddr_in>() => {
                // SAFETY: length checked against sockaddr_in above.
                let sin =
                    unsafe { std::ptr::read_unaligned(raw.as_ptr() as *const libc::sockaddr_in) };
                let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
                Some(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port))))
            }
            libc::AF_INET6 if raw.len() >= std::mem::size_of::<libc::sockaddr_in6>() => {
                // SAFETY: length checked against sockaddr_in6 above.
                let sin6 =
                    unsafe { std::ptr::read_unaligned(raw.as_ptr() as *const libc::sockaddr_in6) };
                let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                Some(SocketAddr::V6(SocketAddrV6::new(
                    ip,
                    u16::from_be(sin6.sin6_port),
                    sin6.sin6_flowinfo,
                    sin6.sin6_scope_id,
                )))
            }
            _ => None,
        }
    }

    /// Encode a std socket address into sockaddr bytes.
    pub(crate) fn encode(addr: &SocketAddr) -> SockaddrBuf {
        match addr {
            SocketAddr::V4(v4) => {
                // SAFETY: zeroed sockaddr_in is a valid all-zero struct.
                let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_port = v4.port().to_be();
                sin.sin_addr.s_addr = u32::from(*v4.ip()).to_be();
                // SAFETY: sockaddr_in is plain old data; reinterpreting it as
                // bytes is well-defined.
                let raw = unsafe {
                    std::slice::from_raw_parts(
                        &sin as *const libc::sockaddr_in as *const u8,
                        std::mem::size_of::<libc::sockaddr_in>(),
                    )
                };
                SockaddrBuf::from_bytes(raw).expect("sockaddr fits in sockaddr_storage")
            }
            SocketAddr::V6(v6) => {
                // SAFETY: zeroed sockaddr_in6 is a valid all-zero struct.
                let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_port = v6.port().to_be();
                sin6.sin6_flowinfo = v6.flowinfo();
                sin6.sin6_scope_id = v6.scope_id();
                sin6.sin6_addr.s6_addr = v6.ip().octets();
                // SAFETY: sockaddr_in6 is plain old data.
                let raw = unsafe {
                    std::slice::from_raw_parts(
                        &sin6 as *const libc::sockaddr_in6 as *const u8,
                        std::mem::size_of::<libc::sockaddr_in6>(),
                    )
                };
                SockaddrBuf::from_bytes(raw).expect("sockaddr fits in sockaddr_storage")
            }
        }
    }

    impl NetAddress {
        /// Convert to native sockaddr bytes.
        ///
        /// Fails for `Null`, `Local`, and `LobbyId`, which have no native
        /// representation.
        pub fn to_native_sockaddr(&self) -> Result<SockaddrBuf, SockaddrError> {
            match self {
                NetAddress::Null | NetAddress::Local(_) | NetAddress::LobbyId(_) => {
                    Err(SockaddrError::NotRepresentable(*self))
                }
                NetAddress::Ipv4 { addr, port } => {
                    Ok(encode(&SocketAddr::V4(SocketAddrV4::new(*addr, *port))))
                }
                NetAddress::RawSockaddr(buf) => Ok(*buf),
            }
        }

        /// Build a `NetAddress` from native sockaddr bytes, dispatching on
        /// the address-family field.
        ///
        /// AF_INET becomes `Ipv4`; every other recognized family is carried
        /// as `RawSockaddr`; an unknown or truncated sockaddr becomes `Null`
        /// with a logged warning.
        pub fn from_native_sockaddr(raw: &[u8]) -> NetAddress {
            let Some(fam) = family(raw) else {
                tracing::warn!(len = raw.len(), "sockaddr too short, treating as null address");
                return NetAddress::Null;
            };
            match fam as i32 {
                libc::AF_INET => {
                    let Some(buf) = SockaddrBuf::from_bytes(raw) else {
                        tracing::warn!(len = raw.len(), "oversized sockaddr, treating as null");
                        return NetAddress::Null;
                    };
                    match decode_raw(&buf) {
                        Some(SocketAddr::V4(v4)) => NetAddress::Ipv4 {
                            addr: *v4.ip(),
                            port: v4.port(),
                        },
                        _ => {
                            tracing::warn!("truncated AF_INET sockaddr, treating as null");
                            NetAddress::Null
                        }
                    }
                }
                libc::AF_INET6 => match SockaddrBuf::from_bytes(raw) {
                    Some(buf) => NetAddress::RawSockaddr(buf),
                    None => {
                        tracing::warn!(len = raw.len(), "oversized sockaddr, treating as null");
                        NetAddress::Null
                    }
                },
                other => {
                    tracing::warn!(family = other, "unknown sockaddr family, treating as null");
                    NetAddress::Null
                }
            }
        }
    }

    impl From<SocketAddr> for NetAddress {
        fn from(addr: SocketAddr) -> Self {
            match addr {
                SocketAddr::V4(v4) => NetAddress::Ipv4 {
                    addr: *v4.ip(),
                    port: v4.port(),
                },
                SocketAddr::V6(_) => NetAddress::RawSockaddr(encode(&addr)),
            }
        }
    }
}

#[cfg(unix)]
pub(crate) use native::decode_raw;

#[cfg(not(unix))]
impl From<std::net::SocketAddr> for NetAddress {
    fn from(addr: std::net::SocketAddr) -> Self {
        match addr {
            std::net::SocketAddr::V4(v4) => NetAddress::Ipv4 {
                addr: *v4.ip(),
                port: v4.port(),
            },
            std::net::SocketAddr::V6(_) => NetAddress::Null,
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn decode_raw(_buf: &crate::address::SockaddrBuf) -> Option<std::net::SocketAddr> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};

    use super::*;

    #[test]
    fn test_ipv4_sockaddr_round_trip() {
        let addr = NetAddress::ipv4(93, 184, 216, 34, 80);
        let raw = addr.to_native_sockaddr().unwrap();
        let back = NetAddress::from_native_sockaddr(raw.as_bytes());
        assert_eq!(back, addr);
    }

    #[test]
    fn test_ipv6_round_trips_as_raw() {
        let sa = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 7777, 0, 0));
        let addr = NetAddress::from(sa);
        assert!(matches!(addr, NetAddress::RawSockaddr(_)));
        assert_eq!(addr.to_socket_addr(), Some(sa));
        assert_eq!(addr.numeric_string(), "[::1]:7777");
    }

    #[test]
    fn test_unrepresentable_variants_fail() {
        assert!(NetAddress::Null.to_native_sockaddr().is_err());
        assert!(NetAddress::Local(1).to_native_sockaddr().is_err());
        assert!(NetAddress::LobbyId(42).to_native_sockaddr().is_err());
    }

    #[test]
    fn test_unknown_family_decodes_to_null() {
        // AF_APPLETALK-ish family nobody handles.
        let mut raw = [0u8; 16];
        raw[0] = 200;
        assert_eq!(NetAddress::from_native_sockaddr(&raw), NetAddress::Null);
        // Too short to even carry a family.
        assert_eq!(NetAddress::from_native_sockaddr(&[1]), NetAddress::Null);
    }
}
