//! The asynchronous address resolver.
//!
//! One `NetAddressResolver` owns one background worker thread for its whole
//! lifetime. Callers enqueue lookups; the worker services them strictly FIFO
//! and populates two append-only caches (name to addresses, address to
//! name). The resolver is an explicit dependency: whoever owns the network
//! subsystem constructs it and passes it down, there is no global instance.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use netlobby_addr::{parse_address_string, NameResolution, NetAddress, SystemNameResolution};

use crate::request::{
    AddressLookupRequest, NameLookupRequest, RequestCell, RequestKind, RequestOutput,
    ResolverShared, ResolverState,
};

/// Asynchronous name/address resolver with a single worker thread.
///
/// Dropping the resolver signals shutdown, fails every request still queued
/// (waking every waiter), and joins the worker - no detached work continues
/// after destruction.
pub struct NetAddressResolver {
    shared: Arc<ResolverShared>,
    worker: Option<JoinHandle<()>>,
}

impl NetAddressResolver {
    /// Default wait budget for [`NetAddressResolver::to_string`].
    pub const DEFAULT_TO_STRING_TIMEOUT: Duration = Duration::from_millis(10);

    /// Create a resolver driven by the given platform resolution backend.
    pub fn new(platform: Arc<dyn NameResolution>) -> Self {
        let shared = Arc::new(ResolverShared {
            state: Mutex::new(ResolverState {
                queue: VecDeque::new(),
                name_cache: BTreeMap::new(),
                addr_cache: BTreeMap::new(),
                stop: false,
            }),
            work_cv: Condvar::new(),
            done_cv: Condvar::new(),
            platform,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("netlobby-resolver".to_string())
            .spawn(move || worker_loop(worker_shared))
            .expect("failed to spawn resolver worker thread");

        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Create a resolver backed by the system DNS resolver.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemNameResolution::new()))
    }

    /// Best-effort human-readable rendering of an address.
    ///
    /// Cache hits return immediately. On a miss, a reverse lookup is queued
    /// and waited on for up to `timeout`; if it has not succeeded by then the
    /// numeric rendering is returned instead. Never blocks past the timeout
    /// and never fails.
    pub fn to_string(&self, addr: &NetAddress, timeout: Duration) -> String {
        let request = self.request_address_to_string(addr);
        if request.timed_wait(timeout) {
            if let Some(name) = request.name() {
                return name;
            }
        }
        addr.numeric_string()
    }

    /// [`NetAddressResolver::to_string`] with the default wait budget.
    pub fn display_string(&self, addr: &NetAddress) -> String {
        self.to_string(addr, Self::DEFAULT_TO_STRING_TIMEOUT)
    }

    /// Numeric rendering. No caching, no blocking.
    pub fn to_numeric_string(&self, addr: &NetAddress) -> String {
        addr.numeric_string()
    }

    /// Private-range classification. No blocking.
    pub fn is_private_addr(&self, addr: &NetAddress) -> bool {
        addr.is_private()
    }

    /// Start a name-to-addresses lookup and return immediately.
    ///
    /// A cache hit completes the request synchronously without touching the
    /// queue; the caller decides whether and how long to wait.
    pub fn request_name_lookup(&self, name: &str) -> NameLookupRequest {
        let cell = Arc::new(RequestCell::new(RequestKind::NameLookup {
            host: name.to_string(),
        }));

        let mut state = self.shared.state.lock();
        if let Some(addrs) = state.name_cache.get(name) {
            cell.complete(RequestOutput::Addresses(addrs.clone()));
            self.shared.done_cv.notify_all();
        } else if state.stop {
            cell.fail();
            self.shared.done_cv.notify_all();
        } else {
            state.queue.push_back(Arc::clone(&cell));
            self.shared.work_cv.notify_one();
            tracing::debug!(host = name, "queued name lookup");
        }
        drop(state);

        NameLookupRequest {
            cell,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Start an address-to-name lookup and return immediately.
    pub fn request_address_to_string(&self, addr: &NetAddress) -> AddressLookupRequest {
        let cell = Arc::new(RequestCell::new(RequestKind::AddressToString { addr: *addr }));

        let mut state = self.shared.state.lock();
        if let Some(name) = state.addr_cache.get(addr) {
            cell.complete(RequestOutput::Name(name.clone()));
            self.shared.done_cv.notify_all();
        } else if state.stop {
            cell.fail();
            self.shared.done_cv.notify_all();
        } else {
            state.queue.push_back(Arc::clone(&cell));
            self.shared.work_cv.notify_one();
            tracing::debug!(address = %addr, "queued reverse lookup");
        }
        drop(state);

        AddressLookupRequest {
            cell,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Signal the worker to stop. Idempotent, does not block.
    ///
    /// Requests still queued are failed by the worker's drain; requests
    /// issued afterwards fail immediately.
    pub fn signal_stop_work(&self) {
        let mut state = self.shared.state.lock();
        if !state.stop {
            state.stop = true;
            self.shared.work_cv.notify_all();
        }
    }
}

impl Drop for NetAddressResolver {
    fn drop(&mut self) {
        self.signal_stop_work();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("resolver worker panicked");
            }
        }
    }
}

fn worker_loop(shared: Arc<ResolverShared>) {
    tracing::info!("resolver worker started");
    loop {
        let cell = {
            let mut state = shared.state.lock();
            while state.queue.is_empty() && !state.stop {
                shared.work_cv.wait(&mut state);
            }
            if state.stop {
                // Drain: every queued request ends Failed, every waiter is
                // woken. Nothing is silently dropped.
                let drained = state.queue.len();
                while let Some(cell) = state.queue.pop_front() {
                    cell.fail();
                }
                if drained > 0 {
                    tracing::debug!(drained, "failed queued requests on shutdown");
                }
                shared.done_cv.notify_all();
                break;
            }
            match state.queue.pop_front() {
                Some(cell) => cell,
                None => continue,
            }
        };
        execute(&shared, &cell);
    }
    tracing::info!("resolver worker stopped");
}

/// Service one request. Runs only on the worker thread.
///
/// The cache is checked under the lock first, so a request enqueued behind
/// another for the same key observes the earlier result without I/O. On a
/// miss the lock is released around the blocking platform call.
fn execute(shared: &ResolverShared, cell: &RequestCell) {
    match &cell.kind {
        RequestKind::NameLookup { host } => {
            let state = shared.state.lock();
            if let Some(addrs) = state.name_cache.get(host) {
                cell.complete(RequestOutput::Addresses(addrs.clone()));
                shared.done_cv.notify_all();
                return;
            }
            drop(state);

            let result = parse_address_string(host, shared.platform.as_ref());

            let mut state = shared.state.lock();
            match result {
                Ok(addrs) => {
                    state.name_cache.insert(host.clone(), addrs.clone());
                    // Seed the reverse cache too; a later to_string for one
                    // of these addresses can answer from here.
                    for addr in &addrs {
                        state.addr_cache.entry(*addr).or_insert_with(|| host.clone());
                    }
                    tracing::debug!(host = %host, count = addrs.len(), "name lookup resolved");
                    cell.complete(RequestOutput::Addresses(addrs));
                }
                Err(err) => {
                    tracing::warn!(host = %host, error = %err, "name lookup failed");
                    cell.fail();
                }
            }
            shared.done_cv.notify_all();
        }
        RequestKind::AddressToString { addr } => {
            let state = shared.state.lock();
            if let Some(name) = state.addr_cache.get(addr) {
                cell.complete(RequestOutput::Name(name.clone()));
                shared.done_cv.notify_all();
                return;
            }
            drop(state);

            let result = shared.platform.reverse_lookup(addr);

            let mut state = shared.state.lock();
            match result {
                Ok(name) => {
                    state.addr_cache.insert(*addr, name.clone());
                    tracing::debug!(address = %addr, name = %name, "reverse lookup resolved");
                    cell.complete(RequestOutput::Name(name));
                }
                Err(err) => {
                    tracing::warn!(address = %addr, error = %err, "reverse lookup failed");
                    cell.fail();
                }
            }
            shared.done_cv.notify_all();
        }
    }
}
