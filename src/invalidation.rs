use crate::entry::{FeedEntry, FeedWindow};
use crate::error::*;
use futures::Stream;
use futures::task::{Context, Poll, Waker};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

/// Change counter shared between a backing collection and the window streams
/// reading from it.
#[derive(Clone, Debug, Default)]
pub struct Invalidation {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    generation: u64,
    closed: bool,
    next_slot: u64,
    /// At most one waker per live stream, keyed by its slot.
    wakers: HashMap<u64, Waker>,
}

impl Invalidation {
    pub fn new() -> Self {
        Invalidation::default()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Marks every window derived so far as stale.
    pub fn invalidate(&self) {
        let wakers = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            ::std::mem::replace(&mut inner.wakers, HashMap::new())
        };

        for (_, waker) in wakers {
            waker.wake();
        }
    }

    /// Ends all window streams. Further invalidations are ignored by them.
    pub fn close(&self) {
        let wakers = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            ::std::mem::replace(&mut inner.wakers, HashMap::new())
        };

        for (_, waker) in wakers {
            waker.wake();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    fn subscribe(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.next_slot += 1;
        inner.next_slot
    }

    fn unsubscribe(&self, slot: u64) {
        self.inner.lock().wakers.remove(&slot);
    }

    /// Stores `waker` in `slot` unless the tracker is closed. Returns whether
    /// it is closed.
    fn register(&self, slot: u64, waker: &Waker) -> bool {
        let mut inner = self.inner.lock();
        if !inner.closed {
            inner.register(slot, waker);
        }
        inner.closed
    }

    #[cfg(test)]
    fn waker_count(&self) -> usize {
        self.inner.lock().wakers.len()
    }
}

impl Inner {
    fn register(&mut self, slot: u64, waker: &Waker) {
        let current = self.wakers.get(&slot).map_or(false, |w| w.will_wake(waker));
        if !current {
            self.wakers.insert(slot, waker.clone());
        }
    }
}

type Loader = Box<dyn FnMut() -> Result<Vec<FeedEntry>> + Send>;

/// Lazily re-derived windows over a backing collection.
///
/// The first poll yields the current window. After that a new window is
/// produced only once the backing has been invalidated; any number of
/// invalidations between two polls collapse into one window. The stream ends
/// when the invalidation tracker is closed.
#[must_use = "streams do nothing unless polled"]
pub struct Windows {
    invalidation: Invalidation,
    slot: u64,
    stop: Option<(Invalidation, u64)>,
    seen: Option<u64>,
    load: Loader,
}

impl Windows {
    pub fn new<F>(invalidation: Invalidation, load: F) -> Windows
    where
        F: FnMut() -> Result<Vec<FeedEntry>> + Send + 'static,
    {
        Windows {
            slot: invalidation.subscribe(),
            invalidation,
            stop: None,
            seen: None,
            load: Box::new(load),
        }
    }

    /// Also ends the stream once `stop` is closed, for backings that outlive
    /// the session reading them.
    pub fn until(mut self, stop: Invalidation) -> Windows {
        let slot = stop.subscribe();
        if let Some((previous, slot)) = self.stop.replace((stop, slot)) {
            previous.unsubscribe(slot);
        }
        self
    }
}

impl Drop for Windows {
    fn drop(&mut self) {
        self.invalidation.unsubscribe(self.slot);
        if let Some((ref stop, slot)) = self.stop {
            stop.unsubscribe(slot);
        }
    }
}

impl Stream for Windows {
    type Item = Result<FeedWindow>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some((ref stop, slot)) = this.stop {
            if stop.register(slot, cx.waker()) {
                return Poll::Ready(None);
            }
        }

        let generation = {
            let mut inner = this.invalidation.inner.lock();
            if inner.closed {
                return Poll::Ready(None);
            }

            if this.seen == Some(inner.generation) {
                inner.register(this.slot, cx.waker());
                return Poll::Pending;
            }

            inner.generation
        };

        this.seen = Some(generation);
        let window = (this.load)().map(|entries| FeedWindow { entries, generation });
        Poll::Ready(Some(window))
    }
}
