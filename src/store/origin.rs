//! Single-slot broadcast cell for the origin dimension.
//!
//! Holds the current value, the one-shot waiters parked until the next
//! [`OriginCell::set`], and the persistent watchers called on every set.
//! Waiting once and watching are separate operations.

use super::StoreError;
use super::observers::{SubscriptionId, Subscribers};
use crate::types::ImageDimension;
use futures::FutureExt;
use futures::channel::oneshot;
use std::pin::Pin;
use std::task::{Context, Poll};

#[derive(Debug, Default)]
pub struct OriginCell {
    value: Option<ImageDimension>,
    waiters: Vec<oneshot::Sender<ImageDimension>>,
    watchers: Subscribers<ImageDimension>,
}

impl OriginCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&ImageDimension> {
        self.value.as_ref()
    }

    /// Store `value`, resolve every pending waiter with it, then call the
    /// watchers in subscription order.
    pub fn set(&mut self, value: ImageDimension) {
        let value = self.value.insert(value);
        for waiter in self.waiters.drain(..) {
            // A dropped receiver just means nobody is waiting anymore.
            let _ = waiter.send(value.clone());
        }
        self.watchers.notify(value);
    }

    /// Resolves immediately with the current value, or with the value of
    /// the next [`set`](Self::set).
    pub fn wait(&mut self) -> OriginWait {
        match &self.value {
            Some(value) => OriginWait {
                state: WaitState::Ready(Some(value.clone())),
            },
            None => {
                let (tx, rx) = oneshot::channel();
                self.waiters.push(tx);
                OriginWait {
                    state: WaitState::Pending(rx),
                }
            }
        }
    }

    /// Call `callback` now if a value exists, then on every future set.
    pub fn watch(
        &mut self,
        mut callback: impl FnMut(&ImageDimension) + Send + 'static,
    ) -> SubscriptionId {
        if let Some(value) = &self.value {
            callback(value);
        }
        self.watchers.subscribe(callback)
    }

    pub fn unwatch(&mut self, id: SubscriptionId) -> bool {
        self.watchers.unsubscribe(id)
    }

    pub fn pending_waiters(&self) -> usize {
        self.waiters.len()
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Forget the value, drop pending waiters (they resolve with
    /// [`StoreError::OriginWaitCancelled`]) and remove all watchers.
    pub fn reset(&mut self) {
        self.value = None;
        self.waiters.clear();
        self.watchers.clear();
    }
}

#[derive(Debug)]
enum WaitState {
    Ready(Option<ImageDimension>),
    Pending(oneshot::Receiver<ImageDimension>),
}

/// Future returned by [`OriginCell::wait`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct OriginWait {
    state: WaitState,
}

impl Future for OriginWait {
    type Output = Result<ImageDimension, StoreError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            WaitState::Ready(value) => Poll::Ready(value.take().ok_or(StoreError::OriginWaitCancelled)),
            WaitState::Pending(rx) => rx
                .poll_unpin(cx)
                .map(|result| result.map_err(|_| StoreError::OriginWaitCancelled)),
        }
    }
}
