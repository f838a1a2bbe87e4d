//! netlobby address types
//!
//! This crate contains the leaf value types shared by the resolver and the
//! lobby connection table:
//!
//! - [`NetAddress`] - the tagged-union network address
//! - [`parse_address_string`] - human-entered address parsing
//! - [`NameResolution`] - the blocking platform-resolution boundary
//! - sockaddr conversion to and from native byte images
//!
//! Nothing in this crate owns a thread or performs I/O on its own; the only
//! blocking entry point is [`NameResolution`], which the resolver confines
//! to its worker thread.

pub mod address;
pub mod parse;
pub mod platform;
pub mod sockaddr;

pub use address::{NetAddress, SockaddrBuf, SOCKADDR_STORAGE_LEN};
pub use parse::{
    parse_address_string, AddressParseError, LOCAL_CONNECTION_TOKEN, NULL_CONNECTION_TOKEN,
};
pub use platform::{NameResolution, ResolveError, SystemNameResolution};
pub use sockaddr::SockaddrError;
