//! Streaming iteration over query results.
//!
//! A [`QueryIter`] owns a server-side cursor. Calling [`QueryIter::iter`] hands
//! the cursor to a background task that decodes documents one at a time and
//! passes them through a channel with room for a single item, so the cursor is
//! only advanced as fast as the consumer drains it.
//!
//! The cursor is released exactly once: when it is exhausted, when the
//! caller's token is cancelled, when the receiver is dropped, or on
//! [`QueryIter::close`].

use crate::{Error, Model, Result};
use futures_util::{StreamExt, stream::BoxStream};
use mongodb::{
    Cursor,
    bson::{self, Document},
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

pub(crate) type DocumentStream = BoxStream<'static, mongodb::error::Result<Document>>;

pub(crate) type Decoder<T> = fn(Document) -> std::result::Result<T, bson::de::Error>;

enum State {
    Created(DocumentStream),
    Streaming {
        stop: CancellationToken,
        worker: JoinHandle<()>,
    },
    Closed,
}

/// A lazy, finite, non-restartable sequence of models read from a cursor.
///
/// Documents that fail to decode are skipped; the last such failure is kept
/// in [`err`](Self::err). The iterator is meant for a single consumer.
pub struct QueryIter<T> {
    collection: &'static str,
    decode: Decoder<T>,
    state: State,
    last_error: Arc<Mutex<Option<Error>>>,
}

impl<M: Model> QueryIter<M> {
    pub fn new(cursor: Cursor<M>) -> Self {
        Self::from_stream(
            M::COLLECTION_NAME,
            cursor.with_type::<Document>().boxed(),
            bson::from_document::<M>,
        )
    }
}

impl<T: Send + 'static> QueryIter<T> {
    pub(crate) fn from_stream(
        collection: &'static str,
        source: DocumentStream,
        decode: Decoder<T>,
    ) -> Self {
        Self {
            collection,
            decode,
            state: State::Created(source),
            last_error: Arc::default(),
        }
    }

    pub fn collection_name(&self) -> &'static str {
        self.collection
    }

    /// Starts streaming. Items arrive on the returned receiver until the
    /// cursor is exhausted or `cancel` fires, after which the receiver yields
    /// `None`.
    ///
    /// Fails with [`Error::IteratorConsumed`] when called more than once or
    /// after [`close`](Self::close).
    pub fn iter(&mut self, cancel: &CancellationToken) -> Result<mpsc::Receiver<T>> {
        let source = match std::mem::replace(&mut self.state, State::Closed) {
            State::Created(source) => source,
            state => {
                self.state = state;
                return Err(Error::IteratorConsumed {
                    collection: self.collection,
                });
            }
        };

        let (tx, rx) = mpsc::channel(1);
        let stop = cancel.child_token();

        let worker = tokio::spawn(produce(
            self.collection,
            source,
            self.decode,
            tx,
            stop.clone(),
            Arc::clone(&self.last_error),
        ));

        self.state = State::Streaming { stop, worker };

        Ok(rx)
    }

    /// Releases the cursor. If streaming has started, stops the worker and
    /// waits for it to let go of the cursor.
    pub async fn close(&mut self) {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Created(source) => drop(source),
            State::Streaming { stop, worker } => {
                stop.cancel();
                if let Err(err) = worker.await {
                    tracing::error!(
                        collection = self.collection,
                        error = %err,
                        "query iterator worker did not shut down cleanly"
                    );
                }
            }
            State::Closed => {}
        }
    }

    /// The last error seen while streaming, if any.
    pub fn err(&self) -> Option<Error> {
        self.last_error.lock().clone()
    }
}

impl<T> std::fmt::Debug for QueryIter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Created(_) => "created",
            State::Streaming { .. } => "streaming",
            State::Closed => "closed",
        };

        f.debug_struct("QueryIter")
            .field("collection", &self.collection)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

async fn produce<T: Send + 'static>(
    collection: &'static str,
    mut source: DocumentStream,
    decode: Decoder<T>,
    tx: mpsc::Sender<T>,
    stop: CancellationToken,
    last_error: Arc<Mutex<Option<Error>>>,
) {
    let mut position = 0_u64;

    loop {
        let next = tokio::select! {
            biased;
            () = stop.cancelled() => {
                tracing::debug!(collection, position, "query iteration cancelled");
                break;
            }
            next = source.next() => next,
        };

        let document = match next {
            Some(Ok(document)) => document,
            Some(Err(err)) => {
                tracing::error!(collection, position, error = %err, "cursor failed while iterating");
                *last_error.lock() = Some(err.into());
                break;
            }
            None => break,
        };

        position += 1;

        if stop.is_cancelled() {
            tracing::debug!(collection, position, "query iteration cancelled");
            break;
        }

        let item = match decode(document) {
            Ok(item) => item,
            Err(source) => {
                tracing::warn!(collection, position, error = %source, "skipping undecodable document");
                *last_error.lock() = Some(Error::IterationDecode {
                    collection,
                    position,
                    source,
                });
                continue;
            }
        };

        tokio::select! {
            biased;
            () = stop.cancelled() => {
                tracing::debug!(collection, position, "query iteration cancelled");
                break;
            }
            sent = tx.send(item) => {
                if sent.is_err() {
                    tracing::debug!(collection, position, "query iterator receiver dropped");
                    break;
                }
            }
        }
    }

    // Release the cursor before the receiver observes the end of the stream.
    drop(source);
    drop(tx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use serde::{Deserialize, Serialize};
    use std::{
        pin::Pin,
        sync::atomic::{AtomicUsize, Ordering},
        task::{Context, Poll},
    };

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        n: i32,
    }

    struct Tracked<S> {
        inner: S,
        polled: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl<S: futures_util::Stream + Unpin> futures_util::Stream for Tracked<S> {
        type Item = S::Item;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
            let poll = Pin::new(&mut self.inner).poll_next(cx);
            if poll.is_ready() {
                self.polled.fetch_add(1, Ordering::SeqCst);
            }
            poll
        }
    }

    impl<S> Drop for Tracked<S> {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Probe {
        polled: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    fn iter_over(documents: Vec<Document>) -> (QueryIter<Point>, Probe) {
        let polled = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));

        let source = Tracked {
            inner: futures_util::stream::iter(documents.into_iter().map(Ok)),
            polled: Arc::clone(&polled),
            released: Arc::clone(&released),
        };

        let iter = QueryIter::from_stream("points", source.boxed(), bson::from_document::<Point>);

        (iter, Probe { polled, released })
    }

    fn points(n: i32) -> Vec<Document> {
        (1..=n).map(|n| doc! { "n": n }).collect()
    }

    async fn drain(rx: &mut mpsc::Receiver<Point>) -> Vec<i32> {
        let mut seen = vec![];
        while let Some(point) = rx.recv().await {
            seen.push(point.n);
        }
        seen
    }

    #[tokio::test]
    async fn test_streams_all_documents_in_order() {
        let (mut iter, probe) = iter_over(points(5));

        let mut rx = iter.iter(&CancellationToken::new()).unwrap();

        assert_eq!(drain(&mut rx).await, vec![1, 2, 3, 4, 5]);
        assert!(iter.err().is_none());
        assert_eq!(probe.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skips_malformed_document_and_records_error() {
        let mut documents = points(4);
        documents[1] = doc! { "n": "two" };
        let (mut iter, probe) = iter_over(documents);

        let mut rx = iter.iter(&CancellationToken::new()).unwrap();

        assert_eq!(drain(&mut rx).await, vec![1, 3, 4]);
        assert!(matches!(
            iter.err(),
            Some(Error::IterationDecode {
                collection: "points",
                position: 2,
                ..
            })
        ));
        assert_eq!(probe.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_production_and_releases_cursor() {
        let (mut iter, probe) = iter_over(points(100));
        let cancel = CancellationToken::new();

        let mut rx = iter.iter(&cancel).unwrap();

        assert_eq!(rx.recv().await.unwrap().n, 1);
        assert_eq!(rx.recv().await.unwrap().n, 2);
        cancel.cancel();

        let rest = drain(&mut rx).await;
        assert!(rest.len() <= 1, "at most the in-flight item survives: {rest:?}");
        assert_eq!(probe.released.load(Ordering::SeqCst), 1);
        assert!(probe.polled.load(Ordering::SeqCst) < 100);
        assert!(iter.err().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_yields_nothing() {
        let (mut iter, probe) = iter_over(points(3));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut rx = iter.iter(&cancel).unwrap();

        assert!(drain(&mut rx).await.is_empty());
        assert_eq!(probe.polled.load(Ordering::SeqCst), 0);
        assert_eq!(probe.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_worker() {
        let (mut iter, probe) = iter_over(points(100));

        let mut rx = iter.iter(&CancellationToken::new()).unwrap();
        assert_eq!(rx.recv().await.unwrap().n, 1);
        drop(rx);

        iter.close().await;

        assert_eq!(probe.released.load(Ordering::SeqCst), 1);
        assert!(probe.polled.load(Ordering::SeqCst) < 100);
    }

    #[tokio::test]
    async fn test_backpressure_keeps_one_item_in_flight() {
        let (mut iter, probe) = iter_over(points(10));

        let _rx = iter.iter(&CancellationToken::new()).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // One item buffered in the channel, one held by the blocked send.
        assert_eq!(probe.polled.load(Ordering::SeqCst), 2);

        iter.close().await;
        assert_eq!(probe.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cannot_iterate_twice() {
        let (mut iter, _probe) = iter_over(points(1));

        let _rx = iter.iter(&CancellationToken::new()).unwrap();
        let err = iter.iter(&CancellationToken::new()).unwrap_err();

        assert!(matches!(err, Error::IteratorConsumed { collection: "points" }));
    }

    #[tokio::test]
    async fn test_close_before_iterating_releases_cursor() {
        let (mut iter, probe) = iter_over(points(3));

        iter.close().await;
        iter.close().await;

        assert_eq!(probe.released.load(Ordering::SeqCst), 1);
        assert_eq!(probe.polled.load(Ordering::SeqCst), 0);
        assert!(iter.iter(&CancellationToken::new()).is_err());
    }

    #[tokio::test]
    async fn test_close_while_streaming_closes_channel() {
        let (mut iter, probe) = iter_over(points(10));

        let mut rx = iter.iter(&CancellationToken::new()).unwrap();
        assert_eq!(rx.recv().await.unwrap().n, 1);

        iter.close().await;

        assert_eq!(probe.released.load(Ordering::SeqCst), 1);
        assert!(drain(&mut rx).await.len() <= 1);
    }
}
