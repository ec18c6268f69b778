// ── Reactive entry streams ──
//
// Subscription type for consuming cache entry changes from the CacheStore.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::CacheEntry;

/// A subscription to one cache entry.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed`](Self::changed) or by converting into a `Stream`.
/// Holding one keeps the entry observed, which exempts it from garbage
/// collection and makes it eligible for background refetch.
pub struct EntryStream {
    current: Arc<CacheEntry>,
    receiver: watch::Receiver<Arc<CacheEntry>>,
}

impl EntryStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<CacheEntry>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The entry as of creation or the last [`changed`](Self::changed).
    pub fn current(&self) -> &Arc<CacheEntry> {
        &self.current
    }

    /// The latest entry (may have changed since creation).
    pub fn latest(&self) -> Arc<CacheEntry> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new entry.
    /// Returns `None` once the entry was removed from the store.
    pub async fn changed(&mut self) -> Option<Arc<CacheEntry>> {
        self.receiver.changed().await.ok()?;
        let entry = self.receiver.borrow_and_update().clone();
        self.current = entry.clone();
        Some(entry)
    }

    /// Wait until `predicate` holds for the latest entry.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<Arc<CacheEntry>>
    where
        F: FnMut(&CacheEntry) -> bool,
    {
        let entry = self.receiver.wait_for(|e| predicate(e)).await.ok()?.clone();
        self.current = entry.clone();
        Some(entry)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    /// The first item is the current entry.
    pub fn into_stream(self) -> EntryWatchStream {
        EntryWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct EntryWatchStream {
    inner: WatchStream<Arc<CacheEntry>>,
}

impl Stream for EntryWatchStream {
    type Item = Arc<CacheEntry>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
