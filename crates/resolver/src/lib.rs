//! netlobby resolver - asynchronous name and address resolution
//!
//! A [`NetAddressResolver`] owns one background worker thread, a FIFO queue
//! of outstanding requests, and two append-only caches. Callers enqueue a
//! lookup and either poll the returned request handle or block on it with a
//! timeout; a reverse lookup that cannot complete in time degrades to the
//! numeric rendering, never to an error.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use netlobby_resolver::NetAddressResolver;
//!
//! let resolver = NetAddressResolver::system();
//! let request = resolver.request_name_lookup("play.example.com:64090");
//! if request.timed_wait(Duration::from_secs(2)) {
//!     if let Some(addrs) = request.addresses() {
//!         println!("resolved to {addrs:?}");
//!     }
//! }
//! ```

mod request;
mod resolver;

pub use request::{AddressLookupRequest, LookupState, NameLookupRequest};
pub use resolver::NetAddressResolver;
