//! Communication abstraction for intra-process (threaded) and inter-process
//! (MPI) message passing.
//!
//! Conventions shared by all backends:
//! - Payloads are raw bytes; typed records are `#[repr(C)]` and
//!   `bytemuck::Pod`-safe, cast at the call site.
//! - `isend` copies the buffer before returning; callers may reuse or drop
//!   the slice immediately.
//! - `irecv` uses the template buffer only for its length. The received
//!   message is returned by [`Wait::wait`], truncated to that length;
//!   higher layers exchange sizes first when exact lengths are required.
//! - Messages between a fixed `(source, destination, tag)` are delivered in
//!   send order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Non-blocking communication interface (minimal by design).
///
/// Implementors provide asynchronous send/receive operations and waitable
/// handles; the collective layer is built entirely from these.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Rank of this process (0..size-1)
    fn rank(&self) -> usize;
    /// Total number of ranks
    fn size(&self) -> usize;

    /// Synchronization barrier (default: no-op for single-rank comms)
    fn barrier(&self) {}
}

/// Tag newtype for safer tag arithmetic.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CommTag(u16);

impl CommTag {
    /// Create a new tag from a raw `u16`.
    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    /// Return the underlying `u16` value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Safely offset the tag by `dx`, wrapping on overflow.
    #[inline]
    pub const fn offset(self, dx: u16) -> Self {
        Self(self.0.wrapping_add(dx))
    }
}

impl From<u16> for CommTag {
    #[inline]
    fn from(x: u16) -> Self {
        CommTag::new(x)
    }
}

/// Compile-time no-op comm for pure single-rank execution and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

// --- ThreadComm: intra-process, one rank per thread ---

type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Slot {
    queue: VecDeque<Vec<u8>>,
}

/// Per-world message store. Each `ThreadComm::world` call creates its own
/// mailbox, so concurrent worlds (e.g. parallel tests) cannot cross-talk.
#[derive(Default)]
struct Mailbox {
    slots: Mutex<HashMap<Key, Arc<(Mutex<Slot>, Condvar)>>>,
}

impl Mailbox {
    fn channel(&self, key: Key) -> Arc<(Mutex<Slot>, Condvar)> {
        let mut slots = self.slots.lock().expect("mailbox lock poisoned");
        slots
            .entry(key)
            .or_insert_with(|| Arc::new((Mutex::new(Slot::default()), Condvar::new())))
            .clone()
    }
}

struct WorldBarrier {
    size: usize,
    state: Mutex<(usize, usize)>, // (arrived, epoch)
    cv: Condvar,
}

impl WorldBarrier {
    fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new((0, 0)),
            cv: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut state = self.state.lock().expect("barrier lock poisoned");
        let epoch = state.1;
        state.0 += 1;
        if state.0 == self.size {
            state.0 = 0;
            state.1 += 1;
            self.cv.notify_all();
        } else {
            while state.1 == epoch {
                state = self.cv.wait(state).expect("barrier condvar poisoned");
            }
        }
    }
}

/// Intra-process communicator: one rank per thread, backed by a mailbox of
/// FIFO channels shared by the world. Intended for tests and single-machine
/// runs of the collective layer.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    barrier: Arc<WorldBarrier>,
}

impl ThreadComm {
    /// Create all ranks of a `size`-rank world sharing one mailbox. Hand one
    /// element to each participating thread.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a communicator needs at least one rank");
        let mailbox = Arc::new(Mailbox::default());
        let barrier = Arc::new(WorldBarrier::new(size));
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

pub struct ThreadSendHandle;

impl Wait for ThreadSendHandle {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

pub struct ThreadRecvHandle {
    channel: Arc<(Mutex<Slot>, Condvar)>,
    want_len: usize,
}

impl Wait for ThreadRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let (lock, cv) = &*self.channel;
        let mut slot = lock.lock().expect("channel lock poisoned");
        while slot.queue.is_empty() {
            slot = cv.wait(slot).expect("channel condvar poisoned");
        }
        let mut msg = slot.queue.pop_front().expect("queue is non-empty");
        msg.truncate(self.want_len.min(msg.len()));
        Some(msg)
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ThreadSendHandle;
    type RecvHandle = ThreadRecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let entry = self.mailbox.channel((self.rank, peer, tag));
        let (lock, cv) = &*entry;
        {
            let mut slot = lock.lock().expect("channel lock poisoned");
            slot.queue.push_back(buf.to_vec());
        }
        cv.notify_all();
        ThreadSendHandle
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        ThreadRecvHandle {
            channel: self.mailbox.channel((peer, self.rank, tag)),
            want_len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.barrier.wait();
    }
}

// --- MPI backend ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use core::ptr::NonNull;
    use mpi::collective::CommunicatorCollectives;
    use mpi::environment::Universe;
    use mpi::point_to_point::{Destination, Source};
    use mpi::request::StaticScope;
    use mpi::topology::{Communicator as _, SimpleCommunicator};

    /// Inter-process backend over MPI. Owns the universe so that the
    /// communicator is torn down before library finalization.
    pub struct MpiComm {
        _universe: Universe,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl Default for MpiComm {
        fn default() -> Self {
            let universe = mpi::initialize().expect("MPI was already initialized");
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                _universe: universe,
                world,
                rank,
                size,
            }
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
            let owned = buf.to_vec().into_boxed_slice();
            let raw: *mut [u8] = Box::into_raw(owned);
            let view: &[u8] = unsafe { &*raw };
            let request = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, view, tag as i32);
            MpiSendHandle {
                request: Some(request),
                storage: Some(unsafe { NonNull::new_unchecked(raw) }),
            }
        }

        fn irecv(&self, peer: usize, tag: u16, template: &mut [u8]) -> Self::RecvHandle {
            let len = template.len();
            let owned = vec![0u8; len].into_boxed_slice();
            let raw: *mut [u8] = Box::into_raw(owned);
            let view: &mut [u8] = unsafe { &mut *raw };
            let request = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, view, tag as i32);
            MpiRecvHandle {
                request: Some(request),
                storage: Some(unsafe { NonNull::new_unchecked(raw) }),
                len,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }

    pub struct MpiSendHandle {
        request: Option<mpi::request::Request<'static, [u8], StaticScope>>,
        storage: Option<NonNull<[u8]>>,
    }

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(request) = self.request.take() {
                let _ = request.wait();
            }
            if let Some(ptr) = self.storage.take() {
                unsafe { drop(Box::from_raw(ptr.as_ptr())) };
            }
            None
        }
    }

    impl Drop for MpiSendHandle {
        fn drop(&mut self) {
            if let Some(request) = self.request.take() {
                let _ = request.test();
            }
            if let Some(ptr) = self.storage.take() {
                unsafe { drop(Box::from_raw(ptr.as_ptr())) };
            }
        }
    }

    pub struct MpiRecvHandle {
        request: Option<mpi::request::Request<'static, [u8], StaticScope>>,
        storage: Option<NonNull<[u8]>>,
        len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(request) = self.request.take() {
                let _ = request.wait();
            }
            let ptr = self.storage.take().expect("receive buffer missing");
            let owned: Box<[u8]> = unsafe { Box::from_raw(ptr.as_ptr()) };
            let mut data = Vec::from(owned);
            data.truncate(self.len);
            Some(data)
        }
    }

    impl Drop for MpiRecvHandle {
        fn drop(&mut self) {
            if let Some(request) = self.request.take() {
                let _ = request.test();
            }
            if let Some(ptr) = self.storage.take() {
                unsafe { drop(Box::from_raw(ptr.as_ptr())) };
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
