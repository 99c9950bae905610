//! Auto-loading of per-domain data once a session exists
//!
//! Each [`AutoLoader`] owns one data domain. It loads as soon as it starts if
//! a valid token is already present, reacts to the `authenticated` signal,
//! and keeps polling on a fixed interval so a signal fired before the loader
//! existed is never lost. Loads are "fetch if empty": a populated set or a
//! fetch already in flight turns any further trigger into a no-op.

pub mod remote;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthEvents, SubscriptionId, TokenManager};

pub use remote::RemoteCollection;

/// A data domain that can be fetched with a bearer token.
pub trait DomainSource: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    fn name(&self) -> &str;

    fn fetch(
        &self,
        token: &str,
    ) -> impl Future<Output = anyhow::Result<Vec<Self::Item>>> + Send;
}

/// Timing of the background recheck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoLoadSettings {
    /// Pause before the first poll, so sibling components can finish setup.
    pub initial_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for AutoLoadSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Uninitialized,
    AwaitingAuth,
    Loaded,
}

/// What a single load attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(usize),
    NoToken,
    AlreadyLoaded,
    InFlight,
    /// The session changed while fetching; the result was dropped.
    Discarded,
    Failed,
}

struct LoaderState<T> {
    phase: LoadPhase,
    items: Vec<T>,
    in_flight: bool,
}

struct Shared<S: DomainSource> {
    source: S,
    session: Arc<TokenManager>,
    state: Mutex<LoaderState<S::Item>>,
    wake: Notify,
}

/// Clears the in-flight flag however the fetch ends, including cancellation.
struct InFlightGuard<'a, T> {
    state: &'a Mutex<LoaderState<T>>,
}

impl<T> Drop for InFlightGuard<'_, T> {
    fn drop(&mut self) {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.in_flight = false;
    }
}

impl<S: DomainSource> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, LoaderState<S::Item>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reset(&self) {
        let mut st = self.lock();
        st.items.clear();
        if st.phase == LoadPhase::Loaded {
            st.phase = LoadPhase::AwaitingAuth;
            tracing::info!("{}: session ended, data dropped", self.source.name());
        }
    }

    async fn load_if_empty(&self) -> LoadOutcome {
        let name = self.source.name();

        if !self.session.has_valid_token() {
            self.reset();
            tracing::debug!("{}: no valid token, nothing to load", name);
            return LoadOutcome::NoToken;
        }

        {
            let mut st = self.lock();
            if !st.items.is_empty() {
                return LoadOutcome::AlreadyLoaded;
            }
            if st.in_flight {
                return LoadOutcome::InFlight;
            }
            st.in_flight = true;
        }
        let _guard = InFlightGuard { state: &self.state };

        let generation = self.session.generation();
        let Some(token) = self.session.get_token() else {
            return LoadOutcome::NoToken;
        };

        tracing::debug!("{}: fetching", name);
        let result = AssertUnwindSafe(self.source.fetch(&token))
            .catch_unwind()
            .await;

        if self.session.generation() != generation {
            tracing::info!("{}: session changed during fetch, discarding result", name);
            return LoadOutcome::Discarded;
        }

        match result {
            Ok(Ok(items)) => {
                let count = items.len();
                let mut st = self.lock();
                st.items = items;
                st.phase = LoadPhase::Loaded;
                tracing::info!("{}: loaded {} items", name, count);
                LoadOutcome::Loaded(count)
            }
            Ok(Err(e)) => {
                tracing::warn!("{}: fetch failed: {:#}", name, e);
                LoadOutcome::Failed
            }
            Err(_) => {
                tracing::error!("{}: fetch panicked", name);
                LoadOutcome::Failed
            }
        }
    }
}

/// Background loop: immediate load, initial delay, then poll until cancelled.
async fn run<S: DomainSource>(
    shared: Arc<Shared<S>>,
    settings: AutoLoadSettings,
    cancel: CancellationToken,
) {
    let name = shared.source.name().to_string();

    if shared.session.has_valid_token() {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = shared.load_if_empty() => {}
        }
    }

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = time::sleep(settings.initial_delay) => {}
        _ = shared.wake.notified() => {
            tracing::debug!("{}: authenticated during startup delay", name);
        }
    }

    let mut ticker = time::interval(settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // skip first immediate tick

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = shared.load_if_empty() => {
                tracing::trace!("{}: poll outcome {:?}", name, outcome);
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            _ = shared.wake.notified() => {
                tracing::debug!("{}: woken by authentication", name);
            }
        }
    }

    tracing::debug!("{}: auto-load stopped", name);
}

/// Self-healing loader for one data domain.
pub struct AutoLoader<S: DomainSource> {
    shared: Arc<Shared<S>>,
    events: Arc<AuthEvents>,
    settings: AutoLoadSettings,
    subscriptions: Option<(SubscriptionId, SubscriptionId)>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<S: DomainSource> AutoLoader<S> {
    pub fn new(
        source: S,
        session: Arc<TokenManager>,
        events: Arc<AuthEvents>,
        settings: AutoLoadSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                session,
                state: Mutex::new(LoaderState {
                    phase: LoadPhase::Uninitialized,
                    items: Vec::new(),
                    in_flight: false,
                }),
                wake: Notify::new(),
            }),
            events,
            settings,
            subscriptions: None,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn name(&self) -> &str {
        self.shared.source.name()
    }

    /// Subscribe to the session signals and spawn the background loop.
    ///
    /// Must be called from within a tokio runtime. Calling it twice is a no-op.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }

        let weak: Weak<Shared<S>> = Arc::downgrade(&self.shared);
        let on_auth = self.events.authenticated.subscribe(move || {
            if let Some(shared) = weak.upgrade() {
                shared.wake.notify_one();
            }
            Ok(())
        });
        let weak: Weak<Shared<S>> = Arc::downgrade(&self.shared);
        let on_signout = self.events.signed_out.subscribe(move || {
            if let Some(shared) = weak.upgrade() {
                shared.reset();
            }
            Ok(())
        });
        self.subscriptions = Some((on_auth, on_signout));

        {
            let mut st = self.shared.lock();
            if st.phase == LoadPhase::Uninitialized {
                st.phase = LoadPhase::AwaitingAuth;
            }
        }

        self.task = Some(tokio::spawn(run(
            Arc::clone(&self.shared),
            self.settings,
            self.cancel.clone(),
        )));
        tracing::debug!("{}: auto-load started", self.name());
    }

    fn unsubscribe(&mut self) {
        if let Some((on_auth, on_signout)) = self.subscriptions.take() {
            self.events.authenticated.unsubscribe(on_auth);
            self.events.signed_out.unsubscribe(on_signout);
        }
    }

    /// Stop the background loop and drop the subscriptions.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        self.unsubscribe();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("{}: auto-load task ended abnormally: {}", self.name(), e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Fetch now if the data set is empty and a valid token exists.
    pub async fn load_if_empty(&self) -> LoadOutcome {
        self.shared.load_if_empty().await
    }

    pub fn items(&self) -> Vec<S::Item> {
        self.shared.lock().items.clone()
    }

    pub fn phase(&self) -> LoadPhase {
        self.shared.lock().phase
    }
}

impl<S: DomainSource> Drop for AutoLoader<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.unsubscribe();
    }
}
