//! Admission control for concurrently running jobs.
//!
//! A full [`JobSlots`] rejects immediately instead of queueing. The slot is
//! released when the returned [`JobSlot`] guard is dropped, so every exit
//! path of a job gives it back exactly once.

use super::SecurityError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bounded job counter shared by everything that submits work.
#[derive(Debug)]
pub struct JobSlots {
    max: usize,
    current: AtomicUsize,
}

impl JobSlots {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            max,
            current: AtomicUsize::new(0),
        })
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Number of jobs currently holding a slot.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    /// Take a slot, or fail with [`SecurityError::TooManyJobs`] when all
    /// `max` slots are held.
    pub fn acquire(self: &Arc<Self>) -> Result<JobSlot, SecurityError> {
        self.current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .map_err(|_| SecurityError::TooManyJobs { max: self.max })?;
        Ok(JobSlot {
            slots: Arc::clone(self),
        })
    }

    /// Give one slot back; never goes below zero.
    pub fn release(&self) {
        // fetch_update only fails when the closure returns None, i.e. at zero.
        let _ = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// A held slot; dropping it releases the slot.
#[derive(Debug)]
#[must_use = "dropping the slot releases it immediately"]
pub struct JobSlot {
    slots: Arc<JobSlots>,
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        self.slots.release();
    }
}
