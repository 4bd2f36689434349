//! Live listing of stored samples.
//!
//! [`SampleFeed`] yields the full listing once on subscription and again
//! after every store change, for display surfaces that want to follow the
//! queue as it fills and drains.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, Stream};
use tokio::sync::watch;

use geotrack_store::Sample;

use crate::SharedStore;
use crate::error::Result;

type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Vec<Sample>>> + Send>>;

/// Stream of full sample listings, newest first.
///
/// Bursts of changes may be coalesced into one snapshot. Dropping the feed
/// detaches it from the store.
pub struct SampleFeed {
    inner: SnapshotStream,
}

impl SampleFeed {
    /// Subscribe to `store`.
    pub async fn subscribe(store: SharedStore) -> Self {
        let changes = store.lock().await.subscribe();

        let inner = stream::unfold(
            (store, changes, true),
            |(store, mut changes, first): (SharedStore, watch::Receiver<u64>, bool)| async move {
                if first {
                    changes.borrow_and_update();
                } else if changes.changed().await.is_err() {
                    return None;
                }
                let snapshot = store.lock().await.list_all().map_err(Into::into);
                Some((snapshot, (store, changes, false)))
            },
        );

        Self {
            inner: Box::pin(inner),
        }
    }
}

impl Stream for SampleFeed {
    type Item = Result<Vec<Sample>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared;
    use futures::StreamExt;
    use geotrack_store::{NewSample, Store};
    use std::time::Duration;

    fn sample(n: i64) -> NewSample {
        NewSample {
            device_id: "device_feed".to_string(),
            latitude: 1.0,
            longitude: 2.0,
            accuracy: None,
            altitude: None,
            speed: None,
            bearing: None,
            provider: "gps".to_string(),
            fix_timestamp: n,
        }
    }

    #[tokio::test]
    async fn test_initial_snapshot_then_updates() {
        let store = shared(Store::open_in_memory().unwrap());
        store.lock().await.append(&sample(1)).unwrap();

        let mut feed = SampleFeed::subscribe(store.clone()).await;
        let first = feed.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        let id = store.lock().await.append(&sample(2)).unwrap();
        let second = feed.next().await.unwrap().unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].id, id);

        store.lock().await.mark_uploaded(&[id]).unwrap();
        let third = feed.next().await.unwrap().unwrap();
        assert!(third[0].uploaded);
    }

    #[tokio::test]
    async fn test_no_snapshot_without_change() {
        let store = shared(Store::open_in_memory().unwrap());
        let mut feed = SampleFeed::subscribe(store.clone()).await;
        assert!(feed.next().await.unwrap().unwrap().is_empty());

        // Marking nothing does not notify.
        store.lock().await.mark_uploaded(&[42]).unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(50), feed.next()).await;
        assert!(pending.is_err());
    }
}
