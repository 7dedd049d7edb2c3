//! Collapses bursts of concurrent requests into one UI refresh.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use prometheus_client::metrics::gauge::Gauge;

type IdleCallback = Box<dyn Fn() + Send + Sync>;

/// Counts in-flight requests and fires a callback each time the count
/// drops back to zero.
pub struct QuiescenceCoordinator {
    in_flight: AtomicUsize,
    on_idle: IdleCallback,
    gauge: Option<Gauge>,
}

impl QuiescenceCoordinator {
    pub fn new(on_idle: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            on_idle: Box::new(on_idle),
            gauge: None,
        }
    }

    /// Mirror the in-flight count into a metrics gauge.
    pub fn with_gauge(mut self, gauge: Gauge) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Mark a request as started. The request counts until the guard drops.
    pub fn begin(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        if let Some(gauge) = &self.gauge {
            gauge.inc();
        }
        InFlightGuard {
            coordinator: Arc::clone(self),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn end(&self) {
        if let Some(gauge) = &self.gauge {
            gauge.dec();
        }
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            (self.on_idle)();
        }
    }
}

/// Held for the duration of one request.
#[must_use = "the request stops counting as soon as the guard is dropped"]
pub struct InFlightGuard {
    coordinator: Arc<QuiescenceCoordinator>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.coordinator.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting() -> (Arc<QuiescenceCoordinator>, Arc<AtomicUsize>) {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&refreshes);
        let coordinator = Arc::new(QuiescenceCoordinator::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        (coordinator, refreshes)
    }

    #[test]
    fn burst_triggers_one_refresh() {
        let (q, refreshes) = counting();
        let guards: Vec<_> = (0..5).map(|_| q.begin()).collect();
        assert_eq!(q.in_flight(), 5);
        drop(guards);
        assert_eq!(q.in_flight(), 0);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn each_return_to_zero_refreshes() {
        let (q, refreshes) = counting();
        drop(q.begin());
        let a = q.begin();
        let b = q.begin();
        drop(a);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        drop(b);
        assert_eq!(refreshes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn out_of_order_completion_refreshes_once() {
        let (q, refreshes) = counting();
        let first = q.begin();
        let second = q.begin();
        let third = q.begin();

        drop(second);
        drop(third);
        assert_eq!(q.in_flight(), 1);
        assert_eq!(refreshes.load(Ordering::SeqCst), 0);

        drop(first);
        assert_eq!(q.in_flight(), 0);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn gauge_mirrors_count() {
        let gauge = Gauge::default();
        let q = Arc::new(QuiescenceCoordinator::new(|| {}).with_gauge(gauge.clone()));
        let guard = q.begin();
        assert_eq!(gauge.get(), 1);
        drop(guard);
        assert_eq!(gauge.get(), 0);
    }

    #[tokio::test]
    async fn cancelled_task_releases_guard() {
        let (q, refreshes) = counting();
        let guard = q.begin();
        let task = tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
        tokio::task::yield_now().await;
        task.abort();
        let _ = task.await;
        assert_eq!(q.in_flight(), 0);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }
}
