//! Per-subscriber streaming state.
//!
//! A [`Subscription`] is a FIFO of wire-encoded versions plus a one-way
//! `Active -> Closed` state. Producers [`push`](Subscription::push) onto it;
//! the consumer drains it through [`Subscription::stream`], suspending on a
//! [`Notify`] while the queue is empty instead of polling.
//!
//! Closing is explicit. A [`SubscriptionStream`] built with
//! [`close_on_drop`](SubscriptionStream::close_on_drop) closes its subscription
//! when the transport drops the response body, which is how a peer
//! disconnect or failed write reaches the registry.

use super::registry::SubscriberId;
use crate::protocol::MAX_HEARTBEAT;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Notify;
use tokio::time::{interval, Duration, Interval};

/// Lifecycle state of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Accepting and delivering updates
    Active,
    /// Terminal; pushes are dropped and streams end once drained
    Closed,
}

type ClosedCallback = Box<dyn FnOnce() + Send>;

/// Outcome of [`Subscription::offer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Offer {
    Queued,
    Closed,
    Overflow,
}

struct QueueState {
    queue: VecDeque<Bytes>,
    status: SubscriptionStatus,
    on_closed: Option<ClosedCallback>,
}

struct Shared {
    id: SubscriberId,
    resource: String,
    serial: u64,
    // 0 = unbounded
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
    attached: AtomicBool,
}

/// A live, addressable stream target for one subscriber on one resource.
///
/// Cloning yields another handle to the same subscription.
#[derive(Clone)]
pub struct Subscription {
    shared: Arc<Shared>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        resource: String,
        serial: u64,
        capacity: usize,
        on_closed: impl FnOnce() + Send + 'static,
    ) -> Self {
        Subscription {
            shared: Arc::new(Shared {
                id,
                resource,
                serial,
                capacity,
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    status: SubscriptionStatus::Active,
                    on_closed: Some(Box::new(on_closed)),
                }),
                notify: Notify::new(),
                attached: AtomicBool::new(false),
            }),
        }
    }

    /// Subscriber identity.
    pub fn id(&self) -> &SubscriberId {
        &self.shared.id
    }

    /// Path of the watched resource.
    pub fn resource(&self) -> &str {
        &self.shared.resource
    }

    pub(crate) fn serial(&self) -> u64 {
        self.shared.serial
    }

    /// Current lifecycle state.
    pub fn status(&self) -> SubscriptionStatus {
        self.shared.state.lock().status
    }

    /// Returns `true` until the subscription is closed.
    pub fn is_active(&self) -> bool {
        self.status() == SubscriptionStatus::Active
    }

    /// Whether a response body has taken ownership of this subscription.
    pub(crate) fn is_attached(&self) -> bool {
        self.shared.attached.load(Ordering::Acquire)
    }

    /// Number of chunks waiting for the consumer.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Largest number of undelivered chunks before the subscription is
    /// closed (0 = unbounded).
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Queue a wire chunk for delivery.
    ///
    /// Returns `false` if the subscription is already closed; the chunk is
    /// dropped. Racing a concurrent close is expected and not an error.
    ///
    /// A subscriber whose queue is already at [`capacity`](Self::capacity) is
    /// not keeping up; it is closed as if it had disconnected and the chunk
    /// is dropped.
    pub fn push(&self, data: impl Into<Bytes>) -> bool {
        match self.offer(data.into()) {
            Offer::Queued => true,
            Offer::Closed => false,
            Offer::Overflow => {
                self.close();
                false
            }
        }
    }

    /// Queue without closing on overflow; the caller decides when to close.
    pub(crate) fn offer(&self, data: Bytes) -> Offer {
        {
            let mut state = self.shared.state.lock();
            if state.status == SubscriptionStatus::Closed {
                return Offer::Closed;
            }
            if self.shared.capacity > 0 && state.queue.len() >= self.shared.capacity {
                tracing::warn!(
                    subscriber = %self.shared.id,
                    queued = state.queue.len(),
                    "subscription queue full, dropping subscriber"
                );
                return Offer::Overflow;
            }
            state.queue.push_back(data);
        }
        self.shared.notify.notify_waiters();
        Offer::Queued
    }

    /// Close the subscription.
    ///
    /// Idempotent. The first call flips the state to `Closed`, wakes every
    /// waiting consumer and then runs the close callback exactly once.
    pub fn close(&self) {
        let on_closed = {
            let mut state = self.shared.state.lock();
            if state.status == SubscriptionStatus::Closed {
                return;
            }
            state.status = SubscriptionStatus::Closed;
            state.on_closed.take()
        };
        self.shared.notify.notify_waiters();
        if let Some(on_closed) = on_closed {
            on_closed();
        }
    }

    /// A lazy stream of queued chunks.
    ///
    /// Each call returns a fresh stream draining the shared queue. The stream
    /// suspends while the queue is empty, resumes on `push` or `close`, and
    /// ends once the subscription is closed and drained.
    pub fn stream(&self) -> SubscriptionStream {
        let inner = futures::stream::unfold(Arc::clone(&self.shared), |shared| async move {
            loop {
                let notified = shared.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                {
                    let mut state = shared.state.lock();
                    if let Some(chunk) = state.queue.pop_front() {
                        drop(state);
                        return Some((chunk, Arc::clone(&shared)));
                    }
                    if state.status == SubscriptionStatus::Closed {
                        return None;
                    }
                }

                notified.await;
            }
        })
        .boxed();

        SubscriptionStream {
            inner,
            close_guard: None,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.shared.id)
            .field("resource", &self.shared.resource)
            .field("status", &self.status())
            .finish()
    }
}

/// Stream of wire chunks produced by [`Subscription::stream`].
pub struct SubscriptionStream {
    inner: BoxStream<'static, Bytes>,
    close_guard: Option<Subscription>,
}

impl SubscriptionStream {
    /// Close the owning subscription when this stream is dropped.
    ///
    /// Used for response bodies: the transport drops the body when the peer
    /// disconnects or a write fails.
    #[must_use]
    pub fn close_on_drop(mut self, subscription: &Subscription) -> Self {
        subscription.shared.attached.store(true, Ordering::Release);
        self.close_guard = Some(subscription.clone());
        self
    }
}

impl Stream for SubscriptionStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        if let Some(subscription) = self.close_guard.take() {
            if subscription.is_active() {
                tracing::debug!(subscriber = %subscription.id(), "subscription stream dropped, closing");
            }
            subscription.close();
        }
    }
}

/// A stream wrapper that injects heartbeat blank lines into a Braid subscription.
///
/// Whenever the inner stream has been idle for the interval, a bare `\r\n`
/// is yielded. Blank lines are ignorable in the framing, and writing them
/// surfaces disconnects of otherwise silent peers.
pub struct HeartbeatStream<S> {
    inner: S,
    heartbeat: Interval,
}

impl<S> HeartbeatStream<S> {
    /// Wrap `inner`, emitting a heartbeat after every idle `delay`.
    ///
    /// `delay` is clamped between one millisecond and [`MAX_HEARTBEAT`].
    /// Must be called within a Tokio runtime.
    pub fn new(inner: S, delay: Duration) -> Self {
        let delay = delay.clamp(Duration::from_millis(1), MAX_HEARTBEAT);
        let mut heartbeat = interval(delay);
        // The first tick happens immediately, we skip it
        heartbeat.reset();
        Self { inner, heartbeat }
    }
}

impl<S, T> Stream for HeartbeatStream<S>
where
    S: Stream<Item = T> + Unpin,
    T: From<Bytes>,
{
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(item)) => {
                self.heartbeat.reset();
                return Poll::Ready(Some(item));
            }
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => {}
        }

        match self.heartbeat.poll_tick(cx) {
            Poll::Ready(_) => Poll::Ready(Some(T::from(Bytes::from_static(b"\r\n")))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;

    fn subscription() -> (Subscription, Arc<AtomicUsize>) {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        let sub = Subscription::new(
            SubscriberId::new("peer", "/post/1"),
            "/post/1".to_string(),
            0,
            0,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        (sub, closed)
    }

    #[test]
    fn test_new_subscription_is_active() {
        let (sub, _) = subscription();
        assert_eq!(sub.status(), SubscriptionStatus::Active);
        assert_eq!(sub.resource(), "/post/1");
    }

    #[test]
    fn test_close_is_idempotent() {
        let (sub, closed) = subscription();
        sub.close();
        sub.close();
        assert_eq!(sub.status(), SubscriptionStatus::Closed);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_push_after_close_is_dropped() {
        let (sub, _) = subscription();
        sub.close();
        assert!(!sub.push("late"));
        assert_eq!(sub.queued(), 0);
    }

    #[tokio::test]
    async fn test_stream_preserves_fifo_order() {
        let (sub, _) = subscription();
        sub.push("a");
        sub.push("b");
        sub.push("c");
        sub.close();

        let chunks: Vec<Bytes> = sub.stream().collect().await;
        assert_eq!(chunks, vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]);
    }

    #[tokio::test]
    async fn test_stream_wakes_on_push() {
        let (sub, _) = subscription();
        let mut stream = sub.stream();

        let producer = sub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push("late arrival");
        });

        let chunk = timeout(Duration::from_secs(2), stream.next()).await.unwrap();
        assert_eq!(chunk, Some(Bytes::from("late arrival")));
    }

    #[tokio::test]
    async fn test_stream_ends_promptly_on_close() {
        let (sub, _) = subscription();
        let mut stream = sub.stream();

        let closer = sub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close();
        });

        let end = timeout(Duration::from_secs(2), stream.next()).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_stream_is_restartable() {
        let (sub, _) = subscription();
        sub.push("first");
        let mut first = sub.stream();
        assert_eq!(first.next().await, Some(Bytes::from("first")));
        drop(first);

        assert!(sub.is_active());
        sub.push("second");
        let mut second = sub.stream();
        assert_eq!(second.next().await, Some(Bytes::from("second")));
    }

    #[tokio::test]
    async fn test_close_on_drop() {
        let (sub, closed) = subscription();
        let stream = sub.stream().close_on_drop(&sub);
        assert!(sub.is_attached());
        drop(stream);
        assert!(!sub.is_active());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_injection() {
        let data = vec![Bytes::from("data")];
        let inner = futures::stream::iter(data).chain(futures::stream::pending());
        let mut hb_stream = HeartbeatStream::new(Box::pin(inner), Duration::from_millis(10));

        let first: Bytes = hb_stream.next().await.unwrap();
        assert_eq!(first, Bytes::from("data"));

        let second: Bytes = timeout(Duration::from_secs(2), hb_stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, Bytes::from("\r\n"));
    }

    #[test]
    fn test_full_queue_closes_subscription() {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        let sub = Subscription::new(
            SubscriberId::new("slow", "/post/1"),
            "/post/1".to_string(),
            0,
            2,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert!(sub.push("a"));
        assert!(sub.push("b"));
        assert!(!sub.push("c"));
        assert!(!sub.is_active());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        // Already-queued chunks are still drained
        assert_eq!(sub.queued(), 2);
    }

    #[test]
    fn test_unbounded_queue() {
        let (sub, _) = subscription();
        assert_eq!(sub.capacity(), 0);
        for i in 0..5000 {
            assert!(sub.push(i.to_string()));
        }
        assert_eq!(sub.queued(), 5000);
    }

    #[tokio::test]
    async fn test_heartbeat_extreme_delays_do_not_panic() {
        let inner = futures::stream::pending::<Bytes>();
        let _huge = HeartbeatStream::new(Box::pin(inner), Duration::from_secs(u64::MAX));

        let inner = futures::stream::pending::<Bytes>();
        let mut zero = HeartbeatStream::new(Box::pin(inner), Duration::ZERO);
        let beat = timeout(Duration::from_secs(2), zero.next()).await.unwrap();
        assert_eq!(beat, Some(Bytes::from("\r\n")));
    }
}
