//! Lifecycle event bus
//!
//! Every registry transition publishes a [`EventPayload`] describing what
//! happened to which module. Subscribers attach synchronous callbacks,
//! either for a single event kind or for all of them; delivery happens on
//! the emitting task after all bus locks are released, and a panicking
//! subscriber never takes down the transition that fired the event.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::utils::current_timestamp;

/// Lifecycle event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleEvent {
    Installed,
    Uninstalled,
    Enabled,
    Disabled,
    Upgraded,
    Error,
    ConfigChanged,
}

impl ModuleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleEvent::Installed => "installed",
            ModuleEvent::Uninstalled => "uninstalled",
            ModuleEvent::Enabled => "enabled",
            ModuleEvent::Disabled => "disabled",
            ModuleEvent::Upgraded => "upgraded",
            ModuleEvent::Error => "error",
            ModuleEvent::ConfigChanged => "config-changed",
        }
    }
}

impl fmt::Display for ModuleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload delivered to event subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    /// Module the event concerns
    pub module_id: String,
    /// What happened
    pub event: ModuleEvent,
    /// Event-specific detail (error message, config key, versions)
    #[serde(default)]
    pub data: Option<Value>,
    /// Unix timestamp in seconds
    pub timestamp: u64,
}

impl EventPayload {
    pub fn new(module_id: impl Into<String>, event: ModuleEvent) -> Self {
        Self {
            module_id: module_id.into(),
            event,
            data: None,
            timestamp: current_timestamp(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Handle returned by subscribe calls, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Subscriber callback
pub type EventHandler = Arc<dyn Fn(&EventPayload) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    handler: EventHandler,
    once: bool,
}

/// Pub/sub fan-out for lifecycle events
///
/// Subscribers are keyed by event kind; the `None` slot holds wildcard
/// subscribers that receive every event.
pub struct EventBus {
    subscribers: Arc<TokioMutex<HashMap<Option<ModuleEvent>, Vec<Subscriber>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(TokioMutex::new(HashMap::new())),
        }
    }

    /// Subscribe to one event kind
    pub async fn subscribe<F>(&self, event: ModuleEvent, handler: F) -> SubscriptionId
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        self.add_subscriber(Some(event), Arc::new(handler), false)
            .await
    }

    /// Subscribe to every event kind
    pub async fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        self.add_subscriber(None, Arc::new(handler), false).await
    }

    /// Subscribe to one event kind for a single delivery
    pub async fn subscribe_once<F>(&self, event: ModuleEvent, handler: F) -> SubscriptionId
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        self.add_subscriber(Some(event), Arc::new(handler), true)
            .await
    }

    async fn add_subscriber(
        &self,
        key: Option<ModuleEvent>,
        handler: EventHandler,
        once: bool,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        let mut subscribers = self.subscribers.lock().await;
        subscribers.entry(key).or_default().push(Subscriber {
            id,
            handler,
            once,
        });
        debug!("Event subscription added: {:?} ({})", key, id);
        id
    }

    /// Remove a subscription; returns false if it was already gone
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().await;
        let mut removed = false;
        for list in subscribers.values_mut() {
            let before = list.len();
            list.retain(|s| s.id != id);
            removed |= list.len() != before;
        }
        removed
    }

    /// Publish an event to matching and wildcard subscribers
    ///
    /// Handlers run on the calling task after the subscriber lock is
    /// dropped. A panicking handler is logged and skipped; remaining
    /// handlers still run.
    pub async fn emit(&self, payload: EventPayload) {
        debug!("Publishing event: {} ({})", payload.event, payload.module_id);

        let handlers: Vec<(SubscriptionId, EventHandler)> = {
            let mut subscribers = self.subscribers.lock().await;
            let mut snapshot = Vec::new();

            for key in [Some(payload.event), None] {
                if let Some(list) = subscribers.get_mut(&key) {
                    for sub in list.iter() {
                        snapshot.push((sub.id, Arc::clone(&sub.handler)));
                    }
                    list.retain(|s| !s.once);
                }
            }

            snapshot
        };

        for (id, handler) in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler(&payload)));
            if result.is_err() {
                error!(
                    "Event handler panicked: {} ({} for {})",
                    id, payload.event, payload.module_id
                );
            }
        }
    }

    /// Number of live subscriptions across all event kinds
    pub async fn subscriber_count(&self) -> usize {
        let subscribers = self.subscribers.lock().await;
        subscribers.values().map(Vec::len).sum()
    }

    /// Drop every subscription for one event kind, or all of them
    ///
    /// `remove_all(Some(event))` leaves wildcard subscribers in place;
    /// `remove_all(None)` empties the bus.
    pub async fn remove_all(&self, event: Option<ModuleEvent>) {
        let mut subscribers = self.subscribers.lock().await;
        match event {
            Some(event) => {
                subscribers.remove(&Some(event));
            }
            None => subscribers.clear(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
