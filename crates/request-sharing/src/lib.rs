use {
    futures::{
        FutureExt,
        future::{BoxFuture, Shared, WeakShared},
    },
    prometheus::{IntCounterVec, IntGaugeVec},
    std::{
        collections::HashMap,
        future::Future,
        hash::Hash,
        sync::{Arc, Mutex},
    },
};

/// Share an expensive to compute response with multiple requests that occur
/// while one of them is already in flight.
pub struct RequestSharing<Request, Fut: Future> {
    in_flight: Arc<Cache<Request, Fut>>,
    request_label: String,
}

/// Request sharing for boxed futures.
pub type BoxRequestSharing<Request, Response> =
    RequestSharing<Request, BoxFuture<'static, Response>>;

/// A boxed shared future.
pub type BoxShared<T> = Shared<BoxFuture<'static, T>>;

/// Cache mapping a request type to a shared future that returns the respective
/// response.
#[derive(Debug)]
struct Cache<Request, Response: Future>(Mutex<HashMap<Request, WeakShared<Response>>>);

impl<Request, Response: Future> Default for Cache<Request, Response> {
    fn default() -> Self {
        Self(Mutex::new(HashMap::default()))
    }
}

impl<Request, Fut: Future> RequestSharing<Request, Fut> {
    pub fn labelled(request_label: impl Into<String>) -> Self {
        Self {
            in_flight: Default::default(),
            request_label: request_label.into(),
        }
    }
}

/// Returns a shallow copy (without any pending requests)
impl<Request, Fut: Future> Clone for RequestSharing<Request, Fut> {
    fn clone(&self) -> Self {
        Self {
            in_flight: Default::default(),
            request_label: self.request_label.clone(),
        }
    }
}

impl<Request, Fut> RequestSharing<Request, Fut>
where
    Request: Eq + Hash,
    Fut: Future,
    Fut::Output: Clone,
{
    /// Returns an existing in flight future or creates and uses a new future
    /// from the specified closure.
    pub fn shared_or_else<F>(&self, request: Request, future: F) -> Shared<Fut>
    where
        F: FnOnce(&Request) -> Fut,
    {
        let mut in_flight = self.in_flight.0.lock().unwrap();

        // Futures that completed or got dropped by all their waiters can't be
        // upgraded anymore.
        in_flight.retain(|_request, weak| weak.upgrade().is_some());

        let existing = in_flight.get(&request).and_then(WeakShared::upgrade);

        if let Some(existing) = existing {
            Metrics::get()
                .request_sharing_access
                .with_label_values(&[&self.request_label, "hits"])
                .inc();
            return existing;
        }

        Metrics::get()
            .request_sharing_access
            .with_label_values(&[&self.request_label, "misses"])
            .inc();

        let shared = future(&request).shared();
        // unwrap because downgrade only returns None if the Shared has already
        // completed which cannot be the case because we haven't polled it yet.
        in_flight.insert(request, shared.downgrade().unwrap());
        Metrics::get()
            .request_sharing_in_flight
            .with_label_values(&[&self.request_label])
            .set(i64::try_from(in_flight.len()).unwrap_or(i64::MAX));
        shared
    }

    /// Always starts a new future for the request. Later calls to
    /// [`Self::shared_or_else`] join the new future while existing waiters of
    /// the superseded one keep polling it to completion.
    pub fn replace<F>(&self, request: Request, future: F) -> Shared<Fut>
    where
        F: FnOnce(&Request) -> Fut,
    {
        let mut in_flight = self.in_flight.0.lock().unwrap();
        in_flight.retain(|_request, weak| weak.upgrade().is_some());
        Metrics::get()
            .request_sharing_access
            .with_label_values(&[&self.request_label, "replaced"])
            .inc();
        let shared = future(&request).shared();
        // unwrap because the future was never polled.
        in_flight.insert(request, shared.downgrade().unwrap());
        Metrics::get()
            .request_sharing_in_flight
            .with_label_values(&[&self.request_label])
            .set(i64::try_from(in_flight.len()).unwrap_or(i64::MAX));
        shared
    }

    /// Number of requests that are currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .0
            .lock()
            .unwrap()
            .values()
            .filter(|weak| weak.upgrade().is_some())
            .count()
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
struct Metrics {
    /// Request sharing hits & misses
    #[metric(labels("request_label", "result"))]
    request_sharing_access: IntCounterVec,

    /// Number of requests in flight at the time of the last miss
    #[metric(labels("request_label"))]
    request_sharing_in_flight: IntGaugeVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shares_request() {
        let sharing: BoxRequestSharing<u64, u64> = RequestSharing::labelled("test");

        let shared0 = sharing.shared_or_else(0, |_| futures::future::ready(0).boxed());
        let shared1 = sharing.shared_or_else(0, |_| async { panic!() }.boxed());

        assert!(shared0.ptr_eq(&shared1));
        assert_eq!(shared0.strong_count().unwrap(), 2);
        assert_eq!(sharing.in_flight(), 1);

        // complete first shared
        assert_eq!(shared0.now_or_never().unwrap(), 0);
        assert_eq!(shared1.strong_count().unwrap(), 1);
        assert_eq!(sharing.in_flight(), 1);

        // complete second shared
        assert_eq!(shared1.now_or_never().unwrap(), 0);
        assert_eq!(sharing.in_flight(), 0);
    }

    #[tokio::test]
    async fn different_requests_are_not_shared() {
        let sharing: BoxRequestSharing<u64, u64> = RequestSharing::labelled("test");

        let shared0 = sharing.shared_or_else(0, |_| futures::future::ready(0).boxed());
        let shared1 = sharing.shared_or_else(1, |_| futures::future::ready(1).boxed());

        assert!(!shared0.ptr_eq(&shared1));
        assert_eq!(shared0.await, 0);
        assert_eq!(shared1.await, 1);
    }

    #[tokio::test]
    async fn replaced_request_is_joined_by_later_callers() {
        let sharing: BoxRequestSharing<u64, u64> = RequestSharing::labelled("test");

        let old = sharing.shared_or_else(0, |_| futures::future::ready(1).boxed());
        let new = sharing.replace(0, |_| futures::future::ready(2).boxed());
        let joined = sharing.shared_or_else(0, |_| async { panic!() }.boxed());

        assert!(!old.ptr_eq(&new));
        assert!(new.ptr_eq(&joined));
        assert_eq!(old.await, 1);
        assert_eq!(joined.await, 2);
    }

    #[tokio::test]
    async fn completed_requests_are_started_again() {
        let sharing: BoxRequestSharing<u64, u64> = RequestSharing::labelled("test");

        let first = sharing.shared_or_else(0, |_| futures::future::ready(1).boxed());
        assert_eq!(first.await, 1);

        let second = sharing.shared_or_else(0, |_| futures::future::ready(2).boxed());
        assert_eq!(second.await, 2);
    }

    #[tokio::test]
    async fn replacing_prunes_dropped_requests() {
        let sharing: BoxRequestSharing<u64, u64> = RequestSharing::labelled("test");

        for request in 0..10 {
            drop(sharing.replace(request, |_| futures::future::ready(0).boxed()));
        }
        let live = sharing.replace(10, |_| futures::future::ready(10).boxed());

        assert_eq!(sharing.in_flight.0.lock().unwrap().len(), 1);
        assert_eq!(live.await, 10);
    }
}
