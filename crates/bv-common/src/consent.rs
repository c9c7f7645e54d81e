//! Tracking consent state and change notification.
//!
//! The host application owns a [`ConsentProvider`] and passes it to every
//! storage instance. Storage instances subscribe to transitions and keep
//! the returned [`Subscription`] alive for as long as they want to be
//! notified; dropping it unregisters the observer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tracking consent as decided by the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentState {
    /// Data may be collected and uploaded.
    Granted,
    /// Data may be collected but must not leave the device yet.
    #[default]
    Pending,
    /// Data must not be collected at all.
    NotGranted,
}

impl ConsentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentState::Granted => "granted",
            ConsentState::Pending => "pending",
            ConsentState::NotGranted => "not_granted",
        }
    }
}

impl std::fmt::Display for ConsentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConsentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "granted" => Ok(ConsentState::Granted),
            "pending" => Ok(ConsentState::Pending),
            "not_granted" | "not-granted" | "denied" => Ok(ConsentState::NotGranted),
            _ => Err(format!("unknown consent state: {}", s)),
        }
    }
}

/// Receives consent transitions.
///
/// Called on the thread that changed the consent, in the order the changes
/// were made; implementations must hand heavy work off to their own queue
/// and must not call [`ConsentProvider::set_consent`] themselves.
pub trait ConsentObserver: Send + Sync {
    fn on_consent_updated(&self, previous: ConsentState, current: ConsentState);
}

/// Owner of the current consent value and of the observer list.
#[derive(Default)]
pub struct ConsentProvider {
    state: RwLock<ConsentState>,
    observers: Mutex<Vec<(u64, Arc<dyn ConsentObserver>)>>,
    next_id: AtomicU64,
    /// Serializes updates with their fan-out.
    notify: Mutex<()>,
}

impl ConsentProvider {
    /// Create a provider with an initial consent value.
    pub fn new(initial: ConsentState) -> Arc<Self> {
        Arc::new(ConsentProvider {
            state: RwLock::new(initial),
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            notify: Mutex::new(()),
        })
    }

    /// Current consent value.
    pub fn current(&self) -> ConsentState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Update the consent and notify observers when it actually changed.
    pub fn set_consent(&self, consent: ConsentState) {
        let _notifying = self.notify.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, consent)
        };

        if previous == consent {
            return;
        }

        // Snapshot so observers may subscribe/unsubscribe while being notified
        let observers: Vec<Arc<dyn ConsentObserver>> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        debug!(
            previous = %previous,
            current = %consent,
            observers = observers.len(),
            "Tracking consent updated"
        );

        for observer in observers {
            observer.on_consent_updated(previous, consent);
        }
    }

    /// Register an observer; it stays registered while the handle lives.
    pub fn subscribe(self: &Arc<Self>, observer: Arc<dyn ConsentObserver>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        Subscription {
            provider: Arc::downgrade(self),
            id,
        }
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn unsubscribe(&self, id: u64) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(observer_id, _)| *observer_id != id);
    }
}

impl std::fmt::Debug for ConsentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentProvider")
            .field("consent", &self.current())
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Registration handle returned by [`ConsentProvider::subscribe`].
#[derive(Debug)]
#[must_use = "dropping the subscription unregisters the observer"]
pub struct Subscription {
    provider: Weak<ConsentProvider>,
    id: u64,
}

impl Subscription {
    /// Explicitly unregister (same as dropping).
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.upgrade() {
            provider.unsubscribe(self.id);
        }
    }
}
