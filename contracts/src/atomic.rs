//! # All-or-Nothing Execution
//!
//! A loan operation touches several independent components: the currency
//! ledger, the collateral vault, LoanCore's book, two note ledgers. If the
//! fourth step fails, the first three must look as if they never happened.
//!
//! Each stateful component keeps its state in a [`Checkpointed`] cell and
//! implements [`Transactional`]. [`run`] opens a frame on every participant,
//! runs the operation, and either commits or rolls every participant back.
//! Frames nest: LoanCore opens its own frame inside an orchestrator's, and
//! an outer rollback still restores the state from before the outer frame.
//!
//! Execution is sequential (one mutating operation at a time), so a frame
//! never has to reconcile with a concurrent writer.

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// A component whose state can be checkpointed and restored.
pub trait Transactional: Send + Sync {
    /// Push a checkpoint of the current state.
    fn begin(&self);
    /// Drop the most recent checkpoint, keeping current state.
    fn commit(&self);
    /// Restore and drop the most recent checkpoint.
    fn rollback(&self);
}

impl<T: Transactional + ?Sized> Transactional for Arc<T> {
    fn begin(&self) {
        (**self).begin();
    }

    fn commit(&self) {
        (**self).commit();
    }

    fn rollback(&self) {
        (**self).rollback();
    }
}

/// State cell with a stack of snapshots.
///
/// The snapshot stack is shared by everyone holding the cell. Frames assume
/// a single caller at a time: two threads opening frames on the same cell
/// interleave their checkpoints, and a rollback may restore the other
/// thread's snapshot.
#[derive(Debug, Default)]
pub struct Checkpointed<T: Clone> {
    current: RwLock<T>,
    checkpoints: Mutex<Vec<T>>,
}

impl<T: Clone> Checkpointed<T> {
    pub fn new(state: T) -> Self {
        Self {
            current: RwLock::new(state),
            checkpoints: Mutex::new(Vec::new()),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.current.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.current.write()
    }

    /// Number of open frames. Zero outside any operation.
    pub fn depth(&self) -> usize {
        self.checkpoints.lock().len()
    }
}

impl<T: Clone + Send + Sync> Transactional for Checkpointed<T> {
    fn begin(&self) {
        let snapshot = self.current.read().clone();
        self.checkpoints.lock().push(snapshot);
    }

    fn commit(&self) {
        self.checkpoints.lock().pop();
    }

    fn rollback(&self) {
        if let Some(snapshot) = self.checkpoints.lock().pop() {
            *self.current.write() = snapshot;
        }
    }
}

/// Open frame over a set of participants. Rolls back on drop unless
/// committed, so a panic inside the operation unwinds state too.
struct Frame<'a> {
    participants: &'a [&'a dyn Transactional],
    finished: bool,
}

impl<'a> Frame<'a> {
    fn open(participants: &'a [&'a dyn Transactional]) -> Self {
        for p in participants {
            p.begin();
        }
        Self {
            participants,
            finished: false,
        }
    }

    fn commit(mut self) {
        for p in self.participants.iter().rev() {
            p.commit();
        }
        self.finished = true;
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        if !self.finished {
            for p in self.participants.iter().rev() {
                p.rollback();
            }
        }
    }
}

/// Run `op` atomically across `participants`.
///
/// `Ok` commits every participant; `Err` (or a panic) restores every
/// participant to its state before the call.
///
/// Callers must serialize operations on shared participants; see
/// [`Checkpointed`].
pub fn run<R, E>(
    participants: &[&dyn Transactional],
    op: impl FnOnce() -> Result<R, E>,
) -> Result<R, E> {
    let frame = Frame::open(participants);
    let result = op();
    if result.is_ok() {
        frame.commit();
    } else {
        tracing::debug!(participants = participants.len(), "operation failed; rolling back");
        drop(frame);
    }
    result
}
