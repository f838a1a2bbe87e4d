//! The fixed-capacity connection table.
//!
//! Bookkeeping for a bounded set of live peer connections: liveness state,
//! reference counts, send/recv timestamps, ping statistics, and the bounded
//! reliable-send queue. The table performs no I/O and takes no locks of its
//! own - it is driven from one thread (the network update thread); a caller
//! sharing it across threads must wrap it in its own lock.

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use netlobby_addr::NetAddress;

use crate::handle::ConnectionId;
use crate::ping::PingTracker;

/// Liveness of one connection slot.
///
/// Transitions run forward only: NotConnected -> Pending -> Connected ->
/// Freeing, then back to NotConnected when the slot is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    NotConnected,
    Pending,
    Connected,
    Freeing,
}

impl ConnectionState {
    fn rank(self) -> u8 {
        match self {
            ConnectionState::NotConnected => 0,
            ConnectionState::Pending => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Freeing => 3,
        }
    }
}

/// Connection table errors.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The handle is invalid, stale, or refers to a free slot.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The connection no longer accepts new outbound data.
    #[error("connection {0} is not accepting sends")]
    NotAccepting(ConnectionId),

    /// The per-connection outbound queue is at its configured depth.
    #[error("send queue full for connection {0}")]
    SendQueueFull(ConnectionId),
}

/// One outbound reliable payload awaiting acknowledgment.
#[derive(Debug)]
struct QueuedData {
    payload: Vec<u8>,
    counter: u8,
}

/// Fixed table dimensions, set at construction and never grown.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionTableConfig {
    /// Maximum simultaneous connections.
    pub capacity: usize,
    /// Number of ping samples kept per connection.
    pub ping_window: usize,
    /// Maximum queued reliable payloads per connection.
    pub send_queue_depth: usize,
}

impl Default for ConnectionTableConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            ping_window: 8,
            send_queue_depth: 16,
        }
    }
}

struct Slot {
    addr: NetAddress,
    state: ConnectionState,
    ref_count: u32,
    generation: u16,
    last_send: Option<Instant>,
    last_recv: Option<Instant>,
    ping: PingTracker,
    send_queue: VecDeque<QueuedData>,
    counter_out: u8,
}

impl Slot {
    fn new(config: &ConnectionTableConfig) -> Self {
        Self {
            addr: NetAddress::Null,
            state: ConnectionState::NotConnected,
            ref_count: 0,
            generation: 0,
            last_send: None,
            last_recv: None,
            ping: PingTracker::new(config.ping_window),
            send_queue: VecDeque::new(),
            counter_out: 0,
        }
    }

    fn is_free(&self) -> bool {
        self.state == ConnectionState::NotConnected && self.ref_count == 0
    }
}

/// Fixed-capacity array of connection slots keyed by [`ConnectionId`].
///
/// Slots are allocated by linear scan and returned to the free pool only
/// once their liveness has reached `Freeing` and their reference count has
/// dropped to zero. Every lookup is bounds- and generation-checked.
pub struct ConnectionTable {
    slots: Vec<Slot>,
    config: ConnectionTableConfig,
}

impl ConnectionTable {
    /// Build a table with the given dimensions.
    pub fn new(config: ConnectionTableConfig) -> Self {
        // The max index is the invalid-handle sentinel.
        debug_assert!(config.capacity < (1usize << crate::handle::INDEX_BITS) - 1);
        let slots = (0..config.capacity).map(|_| Slot::new(&config)).collect();
        Self { slots, config }
    }

    /// Maximum simultaneous connections.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Number of slots currently in use.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_free()).count()
    }

    /// True when no connection is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: ConnectionId) -> Option<&Slot> {
        if !id.is_valid() {
            return None;
        }
        let slot = self.slots.get(id.index())?;
        (slot.generation == id.generation() && !slot.is_free()).then_some(slot)
    }

    fn slot_mut(&mut self, id: ConnectionId) -> Option<&mut Slot> {
        if !id.is_valid() {
            return None;
        }
        let slot = self.slots.get_mut(id.index())?;
        (slot.generation == id.generation() && !slot.is_free()).then_some(slot)
    }

    /// Allocate a slot for a new connection to `addr`.
    ///
    /// The slot starts Pending with a reference count of one. Returns
    /// [`ConnectionId::INVALID`] when the table is full; callers are
    /// expected to treat that as a normal operational condition and reject
    /// the peer.
    pub fn create_connection(&mut self, addr: NetAddress) -> ConnectionId {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if !slot.is_free() {
                continue;
            }
            slot.addr = addr;
            slot.state = ConnectionState::Pending;
            slot.ref_count = 1;
            slot.last_send = None;
            slot.last_recv = None;
            slot.ping.reset();
            slot.send_queue.clear();
            slot.counter_out = 0;

            let id = ConnectionId::new(index, slot.generation);
            tracing::debug!(connection = %id, address = %addr, "created connection");
            return id;
        }

        tracing::warn!(address = %addr, capacity = self.config.capacity, "connection table full");
        ConnectionId::INVALID
    }

    /// Find the live connection bound to `addr`.
    pub fn find_connection(&self, addr: &NetAddress) -> ConnectionId {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.state != ConnectionState::NotConnected && slot.addr == *addr {
                return ConnectionId::new(index, slot.generation);
            }
        }
        ConnectionId::INVALID
    }

    /// Increment the slot's reference count.
    pub fn add_ref(&mut self, id: ConnectionId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.ref_count += 1;
            tracing::trace!(connection = %id, ref_count = slot.ref_count, "add_ref");
        }
    }

    /// Decrement the slot's reference count.
    ///
    /// Reaching zero while the slot is Freeing returns it to the free pool;
    /// reaching zero while Pending or Connected does not - freeing is driven
    /// by the explicit state transition, the reference count is only a guard
    /// against premature reuse.
    pub fn remove_ref(&mut self, id: ConnectionId) {
        let Some(slot) = self.slot_mut(id) else { return };
        if slot.ref_count == 0 {
            debug_assert!(false, "connection {id} ref count underflow");
            return;
        }
        slot.ref_count -= 1;
        tracing::trace!(connection = %id, ref_count = slot.ref_count, "remove_ref");
        if slot.ref_count == 0 && slot.state == ConnectionState::Freeing {
            self.free_slot(id.index());
        }
    }

    /// True while any component still holds a reference.
    pub fn has_reference(&self, id: ConnectionId) -> bool {
        self.slot(id).is_some_and(|slot| slot.ref_count > 0)
    }

    /// Advance the slot's liveness state.
    ///
    /// Transitions run forward only; a backwards assignment is a programming
    /// error (debug assertion) and is ignored in release builds. Entering
    /// Freeing with no outstanding references frees the slot immediately.
    pub fn set_state(&mut self, id: ConnectionId, state: ConnectionState) {
        let Some(slot) = self.slot_mut(id) else { return };
        if state.rank() < slot.state.rank() {
            debug_assert!(
                false,
                "connection {id} state may not move backwards ({:?} -> {:?})",
                slot.state, state
            );
            return;
        }
        slot.state = state;
        tracing::debug!(connection = %id, state = ?state, "connection state change");
        if state == ConnectionState::Freeing && slot.ref_count == 0 {
            self.free_slot(id.index());
        }
    }

    /// Current liveness, `NotConnected` for unknown handles.
    pub fn state(&self, id: ConnectionId) -> ConnectionState {
        self.slot(id)
            .map_or(ConnectionState::NotConnected, |slot| slot.state)
    }

    /// The bound address, meaningful only while the slot is live.
    pub fn address(&self, id: ConnectionId) -> Option<NetAddress> {
        self.slot(id).map(|slot| slot.addr)
    }

    /// Rebind the slot's address (NAT rebinding, host migration).
    pub fn set_address(&mut self, id: ConnectionId, addr: NetAddress) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.addr = addr;
                true
            }
            None => false,
        }
    }

    /// Record one round-trip sample for the connection.
    pub fn update_ping(&mut self, id: ConnectionId, sample_ms: u16) {
        if let Some(slot) = self.slot_mut(id) {
            slot.ping.push(sample_ms);
        }
    }

    /// Running ping average in milliseconds.
    pub fn ping(&self, id: ConnectionId) -> Option<f32> {
        self.slot(id).and_then(|slot| slot.ping.average())
    }

    /// Note an outbound packet on this connection.
    pub fn mark_send(&mut self, id: ConnectionId) {
        self.mark_send_at(id, Instant::now());
    }

    /// Note an inbound packet on this connection.
    pub fn mark_recv(&mut self, id: ConnectionId) {
        self.mark_recv_at(id, Instant::now());
    }

    pub(crate) fn mark_send_at(&mut self, id: ConnectionId, now: Instant) {
        if let Some(slot) = self.slot_mut(id) {
            slot.last_send = Some(now);
        }
    }

    pub(crate) fn mark_recv_at(&mut self, id: ConnectionId, now: Instant) {
        if let Some(slot) = self.slot_mut(id) {
            slot.last_recv = Some(now);
        }
    }

    /// Milliseconds since the last packet in either direction. `None` for
    /// unknown handles or before any traffic.
    pub fn time_since_packet_ms(&self, id: ConnectionId) -> Option<u64> {
        self.time_since_packet_ms_at(id, Instant::now())
    }

    pub(crate) fn time_since_packet_ms_at(&self, id: ConnectionId, now: Instant) -> Option<u64> {
        let slot = self.slot(id)?;
        let last = match (slot.last_send, slot.last_recv) {
            (Some(send), Some(recv)) => send.max(recv),
            (Some(send), None) => send,
            (None, Some(recv)) => recv,
            (None, None) => return None,
        };
        Some(now.saturating_duration_since(last).as_millis() as u64)
    }

    /// Administrative disconnect: put the slot into Freeing immediately,
    /// regardless of reference count or ping state.
    pub fn force_timeout(&mut self, id: ConnectionId) {
        let Some(slot) = self.slot_mut(id) else { return };
        if slot.state == ConnectionState::Freeing {
            return;
        }
        tracing::debug!(connection = %id, address = %slot.addr, "forcing connection timeout");
        slot.state = ConnectionState::Freeing;
        if slot.ref_count == 0 {
            self.free_slot(id.index());
        }
    }

    /// Queue a reliable payload for this connection.
    ///
    /// Each payload is stamped with the connection's outbound sequence
    /// counter. Fails when the connection is not accepting sends (Freeing or
    /// unknown) or when the queue is at its configured depth.
    pub fn queue_reliable(&mut self, id: ConnectionId, payload: Vec<u8>) -> Result<u8, LobbyError> {
        let depth = self.config.send_queue_depth;
        let Some(slot) = self.slot_mut(id) else {
            return Err(LobbyError::UnknownConnection(id));
        };
        if !matches!(
            slot.state,
            ConnectionState::Pending | ConnectionState::Connected
        ) {
            return Err(LobbyError::NotAccepting(id));
        }
        if slot.send_queue.len() >= depth {
            tracing::warn!(
                connection = %id,
                address = %slot.addr,
                queued = slot.send_queue.len(),
                "send queue full"
            );
            return Err(LobbyError::SendQueueFull(id));
        }

        let counter = slot.counter_out;
        slot.counter_out = slot.counter_out.wrapping_add(1);
        slot.send_queue.push_back(QueuedData { payload, counter });
        Ok(counter)
    }

    /// The oldest unacknowledged payload and its sequence counter.
    pub fn front_reliable(&self, id: ConnectionId) -> Option<(&[u8], u8)> {
        self.slot(id)?
            .send_queue
            .front()
            .map(|data| (data.payload.as_slice(), data.counter))
    }

    /// Acknowledge the oldest queued payload.
    ///
    /// Pops the front entry only when `counter` matches its stamp; a
    /// mismatched (duplicate or reordered) acknowledgment is ignored.
    pub fn ack_reliable(&mut self, id: ConnectionId, counter: u8) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        match slot.send_queue.front() {
            Some(front) if front.counter == counter => {
                slot.send_queue.pop_front();
                tracing::trace!(connection = %id, counter, "reliable payload acknowledged");
                true
            }
            _ => false,
        }
    }

    /// Number of payloads awaiting acknowledgment.
    pub fn reliable_backlog(&self, id: ConnectionId) -> usize {
        self.slot(id).map_or(0, |slot| slot.send_queue.len())
    }

    fn free_slot(&mut self, index: usize) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        tracing::debug!(index, address = %slot.addr, "released connection slot");
        slot.state = ConnectionState::NotConnected;
        slot.addr = NetAddress::Null;
        slot.ref_count = 0;
        slot.generation = slot.generation.wrapping_add(1);
        slot.send_queue.clear();
        slot.ping.reset();
        slot.last_send = None;
        slot.last_recv = None;
        slot.counter_out = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn small_table() -> ConnectionTable {
        ConnectionTable::new(ConnectionTableConfig {
            capacity: 4,
            ping_window: 3,
            send_queue_depth: 2,
        })
    }

    fn addr(d: u8) -> NetAddress {
        NetAddress::ipv4(10, 0, 0, d, 64090)
    }

    #[test]
    fn test_create_and_find() {
        let mut table = small_table();
        let id = table.create_connection(addr(1));
        assert!(id.is_valid());
        assert_eq!(table.state(id), ConnectionState::Pending);
        assert_eq!(table.address(id), Some(addr(1)));
        assert_eq!(table.find_connection(&addr(1)), id);
        assert_eq!(table.find_connection(&addr(9)), ConnectionId::INVALID);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let mut table = small_table();
        let ids: Vec<_> = (0..4).map(|i| table.create_connection(addr(i as u8))).collect();
        assert!(ids.iter().all(|id| id.is_valid()));

        // Table full: the fifth create fails.
        assert_eq!(table.create_connection(addr(9)), ConnectionId::INVALID);

        // Free one slot; the next create succeeds.
        table.set_state(ids[0], ConnectionState::Freeing);
        table.remove_ref(ids[0]);
        assert!(table.create_connection(addr(9)).is_valid());
    }

    #[test]
    fn test_refcount_alone_does_not_free() {
        let mut table = small_table();
        let id = table.create_connection(addr(1));
        table.set_state(id, ConnectionState::Connected);

        // Dropping the last reference while Connected keeps the slot.
        table.remove_ref(id);
        assert_eq!(table.state(id), ConnectionState::Connected);
        assert!(!table.has_reference(id));

        // Only the explicit Freeing transition releases it.
        table.set_state(id, ConnectionState::Freeing);
        assert_eq!(table.state(id), ConnectionState::NotConnected);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_freeing_waits_for_references() {
        let mut table = small_table();
        let id = table.create_connection(addr(1));
        table.add_ref(id);
        table.set_state(id, ConnectionState::Connected);
        table.set_state(id, ConnectionState::Freeing);

        // Two holders: slot survives the first release.
        table.remove_ref(id);
        assert_eq!(table.state(id), ConnectionState::Freeing);

        table.remove_ref(id);
        assert_eq!(table.state(id), ConnectionState::NotConnected);
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let mut table = small_table();
        let id = table.create_connection(addr(1));
        table.set_state(id, ConnectionState::Freeing);
        table.remove_ref(id);

        // The slot is reused with a new generation; the old handle no
        // longer resolves.
        let reused = table.create_connection(addr(2));
        assert_eq!(reused.index(), id.index());
        assert_ne!(reused, id);
        assert_eq!(table.state(id), ConnectionState::NotConnected);
        assert_eq!(table.address(id), None);
        assert_eq!(table.address(reused), Some(addr(2)));
    }

    #[test]
    fn test_state_never_moves_backwards() {
        let mut table = small_table();
        let id = table.create_connection(addr(1));
        table.set_state(id, ConnectionState::Connected);

        // Release builds ignore the bad transition; debug builds assert.
        if cfg!(not(debug_assertions)) {
            table.set_state(id, ConnectionState::Pending);
            assert_eq!(table.state(id), ConnectionState::Connected);
        }
    }

    #[test]
    fn test_ping_ring_average() {
        let mut table = small_table();
        let id = table.create_connection(addr(1));
        assert_eq!(table.ping(id), None);

        for sample in [10, 20, 30] {
            table.update_ping(id, sample);
        }
        assert!((table.ping(id).unwrap() - 20.0).abs() < f32::EPSILON);

        table.update_ping(id, 60);
        assert!((table.ping(id).unwrap() - 36.666_668).abs() < 0.001);
    }

    #[test]
    fn test_time_since_packet() {
        let mut table = small_table();
        let id = table.create_connection(addr(1));
        assert_eq!(table.time_since_packet_ms(id), None);

        let t0 = Instant::now();
        table.mark_send_at(id, t0);
        table.mark_recv_at(id, t0 + Duration::from_millis(40));
        let since = table.time_since_packet_ms_at(id, t0 + Duration::from_millis(100));
        assert_eq!(since, Some(60));
    }

    #[test]
    fn test_force_timeout() {
        let mut table = small_table();
        let id = table.create_connection(addr(1));
        table.set_state(id, ConnectionState::Connected);

        // Refcount is still 1: the slot heads to Freeing but survives.
        table.force_timeout(id);
        assert_eq!(table.state(id), ConnectionState::Freeing);

        table.remove_ref(id);
        assert_eq!(table.state(id), ConnectionState::NotConnected);
    }

    #[test]
    fn test_reliable_queue_bounds_and_acks() {
        let mut table = small_table();
        let id = table.create_connection(addr(1));
        table.set_state(id, ConnectionState::Connected);

        let c0 = table.queue_reliable(id, vec![1, 2, 3]).unwrap();
        let c1 = table.queue_reliable(id, vec![4]).unwrap();
        assert_ne!(c0, c1);
        assert!(matches!(
            table.queue_reliable(id, vec![5]),
            Err(LobbyError::SendQueueFull(_))
        ));
        assert_eq!(table.reliable_backlog(id), 2);

        // Mismatched ack is ignored; matching ack pops the front.
        assert!(!table.ack_reliable(id, c1));
        assert_eq!(table.front_reliable(id), Some((&[1u8, 2, 3][..], c0)));
        assert!(table.ack_reliable(id, c0));
        assert_eq!(table.front_reliable(id), Some((&[4u8][..], c1)));
        assert!(table.ack_reliable(id, c1));
        assert_eq!(table.reliable_backlog(id), 0);
    }

    #[test]
    fn test_freeing_connection_rejects_sends() {
        let mut table = small_table();
        let id = table.create_connection(addr(1));
        table.add_ref(id);
        table.set_state(id, ConnectionState::Freeing);
        assert!(matches!(
            table.queue_reliable(id, vec![1]),
            Err(LobbyError::NotAccepting(_))
        ));
    }

    #[test]
    fn test_invalid_handles_are_safe() {
        let mut table = small_table();
        let bogus = ConnectionId::from_raw(0x0005_0002);
        assert_eq!(table.state(ConnectionId::INVALID), ConnectionState::NotConnected);
        assert_eq!(table.state(bogus), ConnectionState::NotConnected);
        assert_eq!(table.address(bogus), None);
        assert_eq!(table.ping(bogus), None);
        assert!(!table.set_address(bogus, addr(1)));
        assert!(!table.ack_reliable(bogus, 0));
        table.add_ref(bogus);
        table.remove_ref(bogus);
        table.force_timeout(bogus);
        assert!(table.is_empty());
    }
}
