//! Parsing human-entered address strings.
//!
//! Server addresses typed by players arrive here, so malformed input is a
//! normal condition: it produces a diagnostic error, never a panic. Hostname
//! input invokes blocking platform resolution, so the full parse is only
//! ever run on the resolver's worker thread.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};

use crate::address::NetAddress;
use crate::platform::NameResolution;

/// Reserved token for the null address.
pub const NULL_CONNECTION_TOKEN: &str = "<null>";

/// Reserved token for an in-process local connection.
pub const LOCAL_CONNECTION_TOKEN: &str = "<local>";

/// Why an address string failed to parse.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AddressParseError {
    #[error("empty address string")]
    Empty,

    #[error("unbalanced brackets in address: {0}")]
    UnbalancedBrackets(String),

    #[error("invalid port in address: {0}")]
    InvalidPort(String),

    #[error("unexpected characters after bracketed host: {0}")]
    TrailingGarbage(String),

    #[error("could not resolve host {host}: {reason}")]
    Unresolvable { host: String, reason: String },
}

/// Parse a human-entered address string into one or more addresses.
///
/// Accepts the reserved `<null>` and `<local>` tokens, dotted-quad and IPv6
/// literals (bracketed when carrying a port), and hostnames, each with an
/// optional trailing `:port`. Hostnames go through `platform`, which blocks.
pub fn parse_address_string(
    input: &str,
    platform: &dyn NameResolution,
) -> Result<Vec<NetAddress>, AddressParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AddressParseError::Empty);
    }

    if input == NULL_CONNECTION_TOKEN {
        return Ok(vec![NetAddress::Null]);
    }
    if let Some(rest) = input.strip_prefix(LOCAL_CONNECTION_TOKEN) {
        let id = match rest.strip_prefix(':') {
            None if rest.is_empty() => 0,
            Some(id) => id
                .parse::<u16>()
                .map_err(|_| AddressParseError::InvalidPort(input.to_string()))?,
            None => return Err(AddressParseError::TrailingGarbage(input.to_string())),
        };
        return Ok(vec![NetAddress::Local(id)]);
    }

    let (host, port) = split_host_port(input)?;

    if let Ok(v4) = host.parse::<Ipv4Addr>() {
        return Ok(vec![NetAddress::Ipv4 { addr: v4, port }]);
    }
    if let Ok(v6) = host.parse::<Ipv6Addr>() {
        return Ok(vec![NetAddress::from(SocketAddr::V6(SocketAddrV6::new(
            v6, port, 0, 0,
        )))]);
    }

    platform
        .resolve_host(host, port)
        .map_err(|e| AddressParseError::Unresolvable {
            host: host.to_string(),
            reason: e.to_string(),
        })
}

/// Split an optional trailing `:port`, honoring `[bracketed]` IPv6 hosts.
fn split_host_port(input: &str) -> Result<(&str, u16), AddressParseError> {
    if let Some(rest) = input.strip_prefix('[') {
        let Some((host, after)) = rest.split_once(']') else {
            return Err(AddressParseError::UnbalancedBrackets(input.to_string()));
        };
        let port = match after.strip_prefix(':') {
            None if after.is_empty() => 0,
            Some(port) => parse_port(port, input)?,
            None => return Err(AddressParseError::TrailingGarbage(input.to_string())),
        };
        return Ok((host, port));
    }
    if input.contains(']') {
        return Err(AddressParseError::UnbalancedBrackets(input.to_string()));
    }

    // A lone colon separates a port; several colons mean a bare IPv6
    // literal, which carries no port.
    match input.bytes().filter(|&b| b == b':').count() {
        0 => Ok((input, 0)),
        1 => match input.split_once(':') {
            Some((host, port)) => Ok((host, parse_port(port, input)?)),
            None => Ok((input, 0)),
        },
        _ => Ok((input, 0)),
    }
}

fn parse_port(port: &str, input: &str) -> Result<u16, AddressParseError> {
    port.parse::<u16>()
        .map_err(|_| AddressParseError::InvalidPort(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ResolveError;

    /// Fake that refuses every lookup; literal parsing must not reach it.
    struct NoResolver;

    impl NameResolution for NoResolver {
        fn resolve_host(&self, host: &str, _port: u16) -> Result<Vec<NetAddress>, ResolveError> {
            Err(ResolveError::HostNotFound(host.to_string()))
        }

        fn reverse_lookup(&self, addr: &NetAddress) -> Result<String, ResolveError> {
            Err(ResolveError::NoReverseMapping(*addr))
        }
    }

    #[test]
    fn test_reserved_tokens() {
        assert_eq!(
            parse_address_string("<null>", &NoResolver).unwrap(),
            vec![NetAddress::Null]
        );
        assert_eq!(
            parse_address_string("<local>", &NoResolver).unwrap(),
            vec![NetAddress::Local(0)]
        );
        assert_eq!(
            parse_address_string("<local>:3", &NoResolver).unwrap(),
            vec![NetAddress::Local(3)]
        );
    }

    #[test]
    fn test_dotted_quad_literal_skips_resolver() {
        assert_eq!(
            parse_address_string("10.0.0.1:7777", &NoResolver).unwrap(),
            vec![NetAddress::ipv4(10, 0, 0, 1, 7777)]
        );
        // No port defaults to 0.
        assert_eq!(
            parse_address_string("10.0.0.1", &NoResolver).unwrap(),
            vec![NetAddress::ipv4(10, 0, 0, 1, 0)]
        );
    }

    #[test]
    fn test_numeric_round_trip() {
        // ParseAddressString(numeric_string(a)) yields a for IPv4.
        for addr in [
            NetAddress::ipv4(93, 184, 216, 34, 80),
            NetAddress::ipv4(127, 0, 0, 1, 0),
            NetAddress::ipv4(255, 255, 255, 255, u16::MAX),
        ] {
            let parsed = parse_address_string(&addr.numeric_string(), &NoResolver).unwrap();
            assert!(parsed.contains(&addr), "{addr} did not round-trip");
        }
    }

    #[test]
    fn test_malformed_input_is_an_error() {
        assert!(matches!(
            parse_address_string("", &NoResolver),
            Err(AddressParseError::Empty)
        ));
        assert!(matches!(
            parse_address_string("[::1:80", &NoResolver),
            Err(AddressParseError::UnbalancedBrackets(_))
        ));
        assert!(matches!(
            parse_address_string("::1]:80", &NoResolver),
            Err(AddressParseError::UnbalancedBrackets(_))
        ));
        assert!(matches!(
            parse_address_string("host:99999", &NoResolver),
            Err(AddressParseError::InvalidPort(_))
        ));
        assert!(matches!(
            parse_address_string("[::1]junk", &NoResolver),
            Err(AddressParseError::TrailingGarbage(_))
        ));
    }

    #[test]
    fn test_unresolvable_host_is_an_error() {
        assert!(matches!(
            parse_address_string("nosuchhost.invalid:80", &NoResolver),
            Err(AddressParseError::Unresolvable { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_bracketed_ipv6_literal() {
        let parsed = parse_address_string("[::1]:7777", &NoResolver).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].numeric_string(), "[::1]:7777");
    }
}
