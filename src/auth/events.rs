//! Authentication signals
//!
//! A [`Signal`] is a payload-free observer list. Handlers run synchronously
//! on [`Signal::trigger`], over a snapshot of the list, and each one is
//! isolated: an error or panic in one handler is logged and the rest still
//! run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;

type Handler = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Handle returned by [`Signal::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct Signal {
    name: &'static str,
    handlers: Mutex<Vec<(SubscriptionId, Handler)>>,
    next_id: AtomicU64,
}

impl Signal {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Invoke every current handler once. Returns how many completed without
    /// error.
    pub fn trigger(&self) -> usize {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };

        tracing::debug!("{} fired ({} subscribers)", self.name, snapshot.len());

        let mut ok = 0;
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler())) {
                Ok(Ok(())) => ok += 1,
                Ok(Err(e)) => tracing::warn!("{} handler failed: {:#}", self.name, e),
                Err(_) => tracing::error!("{} handler panicked", self.name),
            }
        }
        ok
    }
}

/// The two process-wide session signals.
pub struct AuthEvents {
    /// Fired once per successful login or registration.
    pub authenticated: Signal,
    /// Fired after the local session has been cleared.
    pub signed_out: Signal,
}

impl AuthEvents {
    pub fn new() -> Self {
        Self {
            authenticated: Signal::new("authenticated"),
            signed_out: Signal::new("signed_out"),
        }
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter(signal: &Signal) -> (Arc<AtomicUsize>, SubscriptionId) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let id = signal.subscribe(move || {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (hits, id)
    }

    #[test]
    fn test_all_subscribers_notified_once() {
        let signal = Signal::new("test");
        let subs: Vec<_> = (0..3).map(|_| counter(&signal)).collect();

        assert_eq!(signal.trigger(), 3);
        for (hits, _) in &subs {
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_failing_handlers_are_isolated() {
        let signal = Signal::new("test");
        let (first, _) = counter(&signal);
        signal.subscribe(|| anyhow::bail!("loader exploded"));
        signal.subscribe(|| panic!("handler panic"));
        let (last, _) = counter(&signal);

        assert_eq!(signal.trigger(), 2);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let signal = Signal::new("test");
        let (hits, id) = counter(&signal);
        assert!(signal.unsubscribe(id));
        assert!(!signal.unsubscribe(id));
        assert_eq!(signal.subscriber_count(), 0);

        assert_eq!(signal.trigger(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_may_subscribe_during_trigger() {
        let signal = Arc::new(Signal::new("test"));
        let inner = Arc::clone(&signal);
        signal.subscribe(move || {
            inner.subscribe(|| Ok(()));
            Ok(())
        });

        // The snapshot excludes the handler added mid-delivery.
        assert_eq!(signal.trigger(), 1);
        assert_eq!(signal.subscriber_count(), 2);
    }
}
