//! Resolver request objects and their completion rendezvous.
//!
//! A request does not own any synchronization of its own: completion is
//! signalled through the resolver-owned mutex and condition variable that
//! every request holds a reference to. Waiting and state transitions all
//! rendezvous through that one lock.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use netlobby_addr::{NameResolution, NetAddress};

/// The result state machine of one request.
///
/// `Pending` transitions exactly once, to `Succeeded` or `Failed`; terminal
/// states are final and a request is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupState {
    Pending,
    Succeeded,
    Failed,
}

/// What a request is asking for.
pub(crate) enum RequestKind {
    /// Hostname (or address literal) to addresses.
    NameLookup { host: String },
    /// Address to human-readable name.
    AddressToString { addr: NetAddress },
}

/// Output slot, valid only once the state is `Succeeded`.
pub(crate) enum RequestOutput {
    None,
    Addresses(Vec<NetAddress>),
    Name(String),
}

pub(crate) struct Progress {
    pub(crate) state: LookupState,
    pub(crate) output: RequestOutput,
}

/// One queued unit of resolution work.
///
/// The progress field is only ever written while holding the resolver's
/// shared state lock; its own mutex exists for interior mutability and is
/// never waited on.
pub(crate) struct RequestCell {
    pub(crate) kind: RequestKind,
    progress: Mutex<Progress>,
}

impl RequestCell {
    pub(crate) fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            progress: Mutex::new(Progress {
                state: LookupState::Pending,
                output: RequestOutput::None,
            }),
        }
    }

    pub(crate) fn state(&self) -> LookupState {
        self.progress.lock().state
    }

    /// Transition Pending -> Succeeded with the produced output.
    ///
    /// Caller must hold the resolver's shared state lock and notify the
    /// completion condvar afterwards.
    pub(crate) fn complete(&self, output: RequestOutput) {
        let mut progress = self.progress.lock();
        debug_assert_eq!(progress.state, LookupState::Pending, "request completed twice");
        progress.state = LookupState::Succeeded;
        progress.output = output;
    }

    /// Transition Pending -> Failed. Used for resolution errors and for the
    /// shutdown drain; the cache is never touched on this path.
    pub(crate) fn fail(&self) {
        let mut progress = self.progress.lock();
        debug_assert_eq!(progress.state, LookupState::Pending, "request failed twice");
        progress.state = LookupState::Failed;
        progress.output = RequestOutput::None;
    }

    pub(crate) fn addresses(&self) -> Option<Vec<NetAddress>> {
        let progress = self.progress.lock();
        match (&progress.state, &progress.output) {
            (LookupState::Succeeded, RequestOutput::Addresses(addrs)) => Some(addrs.clone()),
            _ => None,
        }
    }

    pub(crate) fn name(&self) -> Option<String> {
        let progress = self.progress.lock();
        match (&progress.state, &progress.output) {
            (LookupState::Succeeded, RequestOutput::Name(name)) => Some(name.clone()),
            _ => None,
        }
    }
}

impl Drop for RequestCell {
    fn drop(&mut self) {
        // The worker completes or fails every request before the resolver
        // goes away; a pending request at drop means a lifecycle bug.
        debug_assert_ne!(
            self.progress.get_mut().state,
            LookupState::Pending,
            "resolver request dropped while still pending"
        );
    }
}

/// State guarded by the resolver's single shared mutex: the FIFO queue and
/// both caches move together under one lock.
pub(crate) struct ResolverState {
    pub(crate) queue: VecDeque<Arc<RequestCell>>,
    pub(crate) name_cache: BTreeMap<String, Vec<NetAddress>>,
    pub(crate) addr_cache: BTreeMap<NetAddress, String>,
    pub(crate) stop: bool,
}

/// The resolver-owned synchronization block shared with every request.
pub(crate) struct ResolverShared {
    pub(crate) state: Mutex<ResolverState>,
    /// Wakes the worker when work arrives or shutdown is signalled.
    pub(crate) work_cv: Condvar,
    /// Wakes callers when any request completes.
    pub(crate) done_cv: Condvar,
    pub(crate) platform: Arc<dyn NameResolution>,
}

/// Block until the request leaves `Pending`.
pub(crate) fn wait_done(shared: &ResolverShared, cell: &RequestCell) {
    let mut guard = shared.state.lock();
    while cell.state() == LookupState::Pending {
        shared.done_cv.wait(&mut guard);
    }
}

/// Block until the request leaves `Pending` or the timeout elapses.
/// Returns false only on timeout while still pending.
pub(crate) fn timed_wait_done(
    shared: &ResolverShared,
    cell: &RequestCell,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    let mut guard = shared.state.lock();
    while cell.state() == LookupState::Pending {
        if shared.done_cv.wait_until(&mut guard, deadline).timed_out() {
            return cell.state() != LookupState::Pending;
        }
    }
    true
}

/// Handle to an in-flight name-to-addresses lookup.
///
/// Cloneable and reference-counted; the queue and any number of callers may
/// hold it independently. It never outlives the resolver's synchronization
/// block.
#[derive(Clone)]
pub struct NameLookupRequest {
    pub(crate) cell: Arc<RequestCell>,
    pub(crate) shared: Arc<ResolverShared>,
}

impl NameLookupRequest {
    /// Block until the lookup completes or fails.
    pub fn wait(&self) {
        wait_done(&self.shared, &self.cell);
    }

    /// Block up to `timeout`. Returns false only if the lookup is still
    /// pending when the timeout elapses.
    pub fn timed_wait(&self, timeout: Duration) -> bool {
        timed_wait_done(&self.shared, &self.cell, timeout)
    }

    /// Non-blocking poll of the result state.
    pub fn state(&self) -> LookupState {
        self.cell.state()
    }

    /// The resolved addresses, `Some` only once the state is `Succeeded`.
    pub fn addresses(&self) -> Option<Vec<NetAddress>> {
        self.cell.addresses()
    }
}

/// Handle to an in-flight address-to-name lookup.
#[derive(Clone)]
pub struct AddressLookupRequest {
    pub(crate) cell: Arc<RequestCell>,
    pub(crate) shared: Arc<ResolverShared>,
}

impl AddressLookupRequest {
    /// Block until the lookup completes or fails.
    pub fn wait(&self) {
        wait_done(&self.shared, &self.cell);
    }

    /// Block up to `timeout`. Returns false only if the lookup is still
    /// pending when the timeout elapses.
    pub fn timed_wait(&self, timeout: Duration) -> bool {
        timed_wait_done(&self.shared, &self.cell, timeout)
    }

    /// Non-blocking poll of the result state.
    pub fn state(&self) -> LookupState {
        self.cell.state()
    }

    /// The resolved name, `Some` only once the state is `Succeeded`.
    pub fn name(&self) -> Option<String> {
        self.cell.name()
    }
}
