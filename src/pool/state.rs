//! Bookkeeping shared by every pool operation
//!
//! All transitions happen through short synchronous methods so that callers
//! hold the lock for one statement and never across an `.await`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::SemaphorePermit;

/// Mutable pool state guarded by a single lock
pub(super) struct PoolState<C> {
    /// Connections owned by the pool
    pub(super) idle: VecDeque<C>,
    /// Idle + checked out
    pub(super) num_open: usize,
    /// Slots reserved for a connect still in flight
    pub(super) pending: usize,
    /// Set once by shutdown, never cleared
    pub(super) closed: bool,
}

/// Outcome of an acquire that already holds a permit
pub(super) enum Checkout<C> {
    /// Reuse an idle connection
    Idle(C),
    /// A new slot was counted in `pending`; the caller must connect
    Reserved,
    /// The pool was shut down
    Closed,
}

/// Outcome of handing a connection back
pub(super) enum CheckIn<C> {
    /// Back in the idle buffer
    Recycled,
    /// Above the floor: uncounted, caller must close it
    Shed(C),
    /// Nothing is checked out, so the handle cannot belong to this pool
    Untracked(C),
    /// The pool was shut down; the handle is returned untouched
    Closed(C),
}

/// Outcome of removing a connection from the tracked total
pub(super) enum Detach {
    /// `num_open` was decremented
    Counted,
    /// Nothing is checked out, so the handle cannot belong to this pool
    Untracked,
    /// The pool was shut down
    Closed,
}

impl<C> PoolState<C> {
    pub(super) fn new(idle: VecDeque<C>) -> Self {
        let num_open = idle.len();
        Self {
            idle,
            num_open,
            pending: 0,
            closed: false,
        }
    }

    /// Pop an idle connection or reserve a new slot in one step
    ///
    /// Callers hold a permit, which guarantees `num_open + pending < max_open`
    /// whenever the idle buffer is empty.
    pub(super) fn checkout(&mut self) -> Checkout<C> {
        if self.closed {
            return Checkout::Closed;
        }

        if let Some(conn) = self.idle.pop_front() {
            return Checkout::Idle(conn);
        }

        self.pending += 1;
        Checkout::Reserved
    }

    /// A reserved connect succeeded: the slot becomes an open connection
    pub(super) fn finish_connect(&mut self) {
        self.pending = self.pending.saturating_sub(1);
        self.num_open += 1;
    }

    /// A reserved connect failed or was cancelled
    pub(super) fn abandon_connect(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }

    /// Connections currently held by callers
    pub(super) fn checked_out(&self) -> usize {
        self.num_open.saturating_sub(self.idle.len())
    }

    /// Return a connection, shedding it when the pool is above `min_open`
    pub(super) fn check_in(&mut self, conn: C, min_open: usize) -> CheckIn<C> {
        if self.closed {
            return CheckIn::Closed(conn);
        }

        if self.checked_out() == 0 {
            return CheckIn::Untracked(conn);
        }

        if self.num_open > min_open {
            self.num_open -= 1;
            return CheckIn::Shed(conn);
        }

        self.idle.push_back(conn);
        CheckIn::Recycled
    }

    /// Stop tracking one checked-out connection
    pub(super) fn detach(&mut self) -> Detach {
        if self.closed {
            return Detach::Closed;
        }

        if self.checked_out() == 0 {
            return Detach::Untracked;
        }

        self.num_open -= 1;
        Detach::Counted
    }

    /// Mark the pool closed and take every idle connection
    ///
    /// Returns `None` if the pool was already closed.
    pub(super) fn shut_down(&mut self) -> Option<Vec<C>> {
        if self.closed {
            return None;
        }

        self.closed = true;
        let drained: Vec<C> = self.idle.drain(..).collect();
        self.num_open -= drained.len();
        Some(drained)
    }
}

/// Lock the state, recovering it if a previous holder panicked
///
/// Every critical section is a single non-panicking transition, so the
/// state is consistent even when the lock is poisoned.
pub(super) fn lock<C>(state: &Mutex<PoolState<C>>) -> MutexGuard<'_, PoolState<C>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A reserved slot whose connect has not finished yet
///
/// Dropping it without [`SlotReservation::commit`] gives the slot and the
/// permit back, which covers both factory failure and a cancelled acquire.
pub(super) struct SlotReservation<'a, C> {
    state: &'a Mutex<PoolState<C>>,
    permit: Option<SemaphorePermit<'a>>,
}

impl<'a, C> SlotReservation<'a, C> {
    pub(super) fn new(state: &'a Mutex<PoolState<C>>, permit: SemaphorePermit<'a>) -> Self {
        Self {
            state,
            permit: Some(permit),
        }
    }

    /// The connection was created; the caller now owns the slot
    pub(super) fn commit(mut self) {
        if let Some(permit) = self.permit.take() {
            lock(self.state).finish_connect();
            permit.forget();
        }
    }
}

impl<C> Drop for SlotReservation<'_, C> {
    fn drop(&mut self) {
        if self.permit.is_some() {
            lock(self.state).abandon_connect();
        }
        // remaining permit is released after the slot is uncounted
    }
}
