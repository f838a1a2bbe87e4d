//! netlobby lobby - connection bookkeeping
//!
//! A [`ConnectionTable`] tracks a bounded set of peer connections for the
//! session layer above it: per-peer liveness, reference counts, round-trip
//! statistics, and the bounded queue of reliable payloads awaiting
//! acknowledgment. The table performs no I/O; the transport layer calls
//! into it from the network update thread.
//!
//! Handles are generation-checked ([`ConnectionId`]), so a handle held
//! across a slot's free-and-reuse safely fails to resolve instead of
//! aliasing the new peer.

mod handle;
mod ping;
mod table;

pub use handle::ConnectionId;
pub use table::{ConnectionState, ConnectionTable, ConnectionTableConfig, LobbyError};
