//! The `NetAddress` tagged union and its pure formatting/classification.
//!
//! A `NetAddress` is the canonical "where to send a packet" value used by the
//! resolver and the lobby connection table. It is an immutable value type with
//! a total order, so it can key ordered and hashed maps directly.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Size of a platform `sockaddr_storage`.
pub const SOCKADDR_STORAGE_LEN: usize = 128;

/// A fixed-size image of a platform sockaddr structure.
///
/// Used for address families the engine does not model directly (IPv6 in
/// particular). The unused tail is always zero-filled so the derived
/// comparisons are well-defined.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(C, align(8))]
pub struct SockaddrBuf {
    bytes: [u8; SOCKADDR_STORAGE_LEN],
    len: u8,
}

impl Serialize for SockaddrBuf {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.as_bytes())
    }
}

impl<'de> Deserialize<'de> for SockaddrBuf {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <Vec<u8>>::deserialize(deserializer)?;
        SockaddrBuf::from_bytes(&bytes).ok_or_else(|| {
            serde::de::Error::invalid_length(bytes.len(), &"at most 128 sockaddr bytes")
        })
    }
}

impl SockaddrBuf {
    /// Build a buffer from raw sockaddr bytes.
    ///
    /// Returns `None` if the slice does not fit in a sockaddr_storage.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if raw.len() > SOCKADDR_STORAGE_LEN {
            return None;
        }
        let mut bytes = [0u8; SOCKADDR_STORAGE_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Some(Self {
            bytes,
            len: raw.len() as u8,
        })
    }

    /// The meaningful prefix of the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Stored sockaddr length.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True when no bytes are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for SockaddrBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SockaddrBuf(len={})", self.len())
    }
}

/// A network destination.
///
/// Exactly one variant is active at a time; dispatch over the variants is
/// always an exhaustive `match` so that adding a variant is a compile error
/// at every switch, not a silently-taken default branch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NetAddress {
    /// No address. Failure sentinel.
    Null,
    /// An in-process loopback channel, identified by a small port-like id.
    Local(u16),
    /// IPv4 address and port, both host byte order.
    Ipv4 { addr: Ipv4Addr, port: u16 },
    /// Opaque 64-bit id assigned by a platform online service.
    LobbyId(u64),
    /// Raw platform sockaddr bytes (IPv6 and other unmodeled families).
    RawSockaddr(SockaddrBuf),
}

impl NetAddress {
    /// Shorthand constructor for an IPv4 address.
    pub fn ipv4(a: u8, b: u8, c: u8, d: u8, port: u16) -> Self {
        NetAddress::Ipv4 {
            addr: Ipv4Addr::new(a, b, c, d),
            port,
        }
    }

    /// Render the address as a numeric string.
    ///
    /// Pure and infallible: this is the guaranteed fallback used when
    /// asynchronous reverse resolution times out, so it must never perform
    /// I/O or fail.
    pub fn numeric_string(&self) -> String {
        match self {
            NetAddress::Null => "<null>".to_string(),
            NetAddress::Local(id) => format!("local:{id}"),
            NetAddress::Ipv4 { addr, port } => format!("{addr}:{port}"),
            NetAddress::LobbyId(id) => format!("lobby:{id:016x}"),
            NetAddress::RawSockaddr(buf) => match crate::sockaddr::decode_raw(buf) {
                Some(SocketAddr::V6(v6)) => format!("[{}]:{}", v6.ip(), v6.port()),
                Some(SocketAddr::V4(v4)) => format!("{}:{}", v4.ip(), v4.port()),
                None => {
                    // Unknown family: hex-group the raw bytes.
                    let mut out = String::with_capacity(buf.len() * 3);
                    for (i, byte) in buf.as_bytes().iter().enumerate() {
                        if i > 0 && i % 2 == 0 {
                            out.push(':');
                        }
                        out.push_str(&format!("{byte:02x}"));
                    }
                    out
                }
            },
        }
    }

    /// True for addresses that cannot be routed on the public internet:
    /// loopback/local channels, lobby ids, and the RFC1918 + loopback IPv4
    /// ranges. `RawSockaddr` is conservatively classified public.
    pub fn is_private(&self) -> bool {
        match self {
            NetAddress::Null => false,
            NetAddress::Local(_) => true,
            NetAddress::LobbyId(_) => true,
            NetAddress::Ipv4 { addr, .. } => {
                let [a, b, ..] = addr.octets();
                a == 127 || a == 10 || (a == 172 && (16..=31).contains(&b)) || (a == 192 && b == 168)
            }
            NetAddress::RawSockaddr(_) => false,
        }
    }

    /// Best-effort conversion to a std socket address.
    ///
    /// `None` for variants with no IP representation.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            NetAddress::Null | NetAddress::Local(_) | NetAddress::LobbyId(_) => None,
            NetAddress::Ipv4 { addr, port } => Some(SocketAddr::new((*addr).into(), *port)),
            NetAddress::RawSockaddr(buf) => crate::sockaddr::decode_raw(buf),
        }
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.numeric_string())
    }
}

impl fmt::Debug for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetAddress({})", self.numeric_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_string_variants() {
        assert_eq!(NetAddress::Null.numeric_string(), "<null>");
        assert_eq!(NetAddress::Local(7).numeric_string(), "local:7");
        assert_eq!(
            NetAddress::ipv4(192, 168, 1, 20, 64090).numeric_string(),
            "192.168.1.20:64090"
        );
        assert_eq!(
            NetAddress::LobbyId(0xdead_beef).numeric_string(),
            "lobby:00000000deadbeef"
        );
    }

    #[test]
    fn test_private_classification() {
        for port in [0u16, 80, 64090, u16::MAX] {
            assert!(NetAddress::ipv4(127, 0, 0, 1, port).is_private());
            assert!(NetAddress::ipv4(10, 1, 2, 3, port).is_private());
            assert!(NetAddress::ipv4(172, 20, 0, 1, port).is_private());
            assert!(NetAddress::ipv4(192, 168, 1, 1, port).is_private());
            assert!(!NetAddress::ipv4(8, 8, 8, 8, port).is_private());
        }
        assert!(NetAddress::Local(0).is_private());
        assert!(NetAddress::LobbyId(1).is_private());
        assert!(!NetAddress::Null.is_private());
    }

    #[test]
    fn test_172_range_bounds() {
        assert!(!NetAddress::ipv4(172, 15, 0, 1, 1).is_private());
        assert!(NetAddress::ipv4(172, 16, 0, 1, 1).is_private());
        assert!(NetAddress::ipv4(172, 31, 255, 255, 1).is_private());
        assert!(!NetAddress::ipv4(172, 32, 0, 1, 1).is_private());
    }

    #[test]
    fn test_total_order_is_stable() {
        let a = NetAddress::ipv4(1, 2, 3, 4, 100);
        let b = NetAddress::ipv4(1, 2, 3, 4, 200);
        let c = NetAddress::Local(1);
        assert!(a < b);
        assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
        // Variant tag dominates the order.
        assert!(c < a);
    }

    #[test]
    fn test_sockaddr_buf_rejects_oversized() {
        assert!(SockaddrBuf::from_bytes(&[0u8; 129]).is_none());
        let buf = SockaddrBuf::from_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(buf.as_bytes(), &[1, 2, 3]);
        assert_eq!(buf.len(), 3);
    }
}
