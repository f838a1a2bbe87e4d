//! Generation-checked connection handles.
//!
//! A `ConnectionId` packs a slot index with a generation counter. Slots are
//! reused after freeing, so a bare index could alias a later connection; the
//! generation is bumped on every free and a stale handle simply fails to
//! resolve.
//!
//! # Handle Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          u32 raw value                          │
//! ├───────────────────────────────┬─────────────────────────────────┤
//! │     Generation (16 bits)      │      Slot Index (16 bits)       │
//! │          bits 16-31           │          bits 0-15              │
//! └───────────────────────────────┴─────────────────────────────────┘
//! ```
//!
//! Invalid handle: 0xFFFFFFFF (all bits set).

use std::fmt;

/// Number of slot-index bits.
pub const INDEX_BITS: u32 = 16;

/// Mask for extracting the slot index.
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Invalid handle sentinel value.
pub const INVALID_CONNECTION_INDEX: u32 = 0xFFFF_FFFF;

/// A handle to one connection slot.
///
/// Handles are small value types; resolving one against the table is
/// bounds- and generation-checked, so a stale or corrupt handle behaves as
/// "not found" rather than aliasing another connection.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u32);

impl ConnectionId {
    /// The invalid handle.
    pub const INVALID: ConnectionId = ConnectionId(INVALID_CONNECTION_INDEX);

    pub(crate) fn new(index: usize, generation: u16) -> Self {
        debug_assert!(index < INDEX_MASK as usize, "slot index out of range");
        ConnectionId(((generation as u32) << INDEX_BITS) | (index as u32 & INDEX_MASK))
    }

    /// Create a handle from a raw value.
    #[inline]
    pub const fn from_raw(value: u32) -> Self {
        ConnectionId(value)
    }

    /// Get the raw handle value.
    #[inline]
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Get the slot index (lower 16 bits).
    #[inline]
    pub const fn index(&self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }

    /// Get the generation (upper 16 bits).
    #[inline]
    pub const fn generation(&self) -> u16 {
        (self.0 >> INDEX_BITS) as u16
    }

    /// Check that this handle is not the invalid sentinel.
    ///
    /// A "valid" handle may still fail to resolve if its slot was freed and
    /// the generation no longer matches.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.index() != INDEX_MASK as usize
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(
                f,
                "ConnectionId(index={}, generation={})",
                self.index(),
                self.generation()
            )
        } else {
            write!(f, "ConnectionId(invalid)")
        }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}:{}", self.index(), self.generation())
        } else {
            write!(f, "invalid")
        }
    }
}
