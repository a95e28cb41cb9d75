//! Event bus and its process-wide instance.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::{AppEvent, EventCategory};

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Which events a handler is called for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event
    #[default]
    All,
    /// Events in any of these categories
    Categories(Vec<EventCategory>),
    /// Connection events about one port path
    Port(String),
}

impl EventFilter {
    /// Check if `event` passes this filter
    pub fn matches(&self, event: &AppEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
            EventFilter::Port(path) => event.port() == Some(path.as_str()),
        }
    }
}

type Handler = Arc<dyn Fn(&AppEvent) + Send + Sync>;

/// Event bus sizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBusConfig {
    /// Events a lagging broadcast receiver may fall behind by
    pub channel_capacity: usize,
    /// Number of recent events kept for [`EventBus::history`]; `None` keeps none
    pub history_capacity: Option<usize>,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            history_capacity: None,
        }
    }
}

/// Error types for event bus operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventBusError {
    /// Nobody received the event
    #[error("No active subscribers")]
    NoSubscribers,
}

/// Fan-out of [`AppEvent`]s to handlers and broadcast receivers
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
    handlers: RwLock<HashMap<SubscriptionId, (EventFilter, Handler)>>,
    history: RwLock<VecDeque<AppEvent>>,
    config: EventBusConfig,
}

impl EventBus {
    /// Create a bus with default sizing
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a bus with the given sizing
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            handlers: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            config,
        }
    }

    /// Deliver `event` to matching handlers and to every receiver.
    ///
    /// Returns how many handlers and receivers got it. Handlers run on the
    /// publishing thread, outside the bus's locks, so they may subscribe or
    /// unsubscribe.
    pub fn publish(&self, event: AppEvent) -> Result<usize, EventBusError> {
        tracing::trace!("event: {}", event.description());

        if let Some(capacity) = self.config.history_capacity {
            let mut history = self.history.write();
            history.push_back(event.clone());
            while history.len() > capacity {
                history.pop_front();
            }
        }

        let matching: Vec<Handler> = self
            .handlers
            .read()
            .values()
            .filter(|(filter, _)| filter.matches(&event))
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in &matching {
            handler(&event);
        }

        let received = self.sender.send(event).unwrap_or(0);
        match matching.len() + received {
            0 => Err(EventBusError::NoSubscribers),
            delivered => Ok(delivered),
        }
    }

    /// Call `handler` for every event passing `filter`
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&AppEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.handlers.write().insert(id, (filter, Arc::new(handler)));
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Receiver for polling events from async code
    pub fn receiver(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Drop a subscription; false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.handlers.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Recent events, oldest first
    pub fn history(&self) -> Vec<AppEvent> {
        self.history.read().iter().cloned().collect()
    }

    /// Forget recorded events
    pub fn clear_history(&self) {
        self.history.write().clear();
    }

    /// Sizing this bus was built with
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("receivers", &self.sender.receiver_count())
            .field("config", &self.config)
            .finish()
    }
}

static EVENT_BUS: OnceLock<EventBus> = OnceLock::new();

/// The process-wide bus, created with default sizing on first use
pub fn event_bus() -> &'static EventBus {
    EVENT_BUS.get_or_init(EventBus::new)
}

/// Create the process-wide bus with custom sizing.
///
/// Fails, handing the configuration back, once the bus exists.
pub fn init_event_bus(config: EventBusConfig) -> Result<(), EventBusConfig> {
    EVENT_BUS
        .set(EventBus::with_config(config))
        .map_err(|bus| bus.config)
}

/// Publish to the process-wide bus; an event nobody hears is not an error
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::event_bus::event_bus().publish($event).ok()
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::events::{ConnectionEvent, DisconnectReason, SettingsEvent};
    use crate::port::PortKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn connected(port: &str) -> AppEvent {
        AppEvent::Connection(ConnectionEvent::Connected {
            port: port.to_string(),
            kind: PortKind::Serial,
        })
    }

    fn counter(bus: &EventBus, filter: EventFilter) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe(filter, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();

        let id = bus.subscribe(EventFilter::All, |_| {});
        assert_eq!(bus.subscriber_count(), 1);

        assert!(bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(
            bus.publish(connected("/dev/ttyUSB0")),
            Err(EventBusError::NoSubscribers)
        );
    }

    #[test]
    fn test_category_filter() {
        let bus = EventBus::new();
        let connection = counter(&bus, EventFilter::Categories(vec![EventCategory::Connection]));
        let settings = counter(&bus, EventFilter::Categories(vec![EventCategory::Settings]));

        bus.publish(connected("/dev/ttyUSB0")).ok();
        bus.publish(AppEvent::Connection(ConnectionEvent::Disconnected {
            port: "/dev/ttyUSB0".to_string(),
            reason: DisconnectReason::ConnectionLost,
        }))
        .ok();
        bus.publish(AppEvent::Settings(SettingsEvent::Saved)).ok();

        assert_eq!(connection.load(Ordering::SeqCst), 2);
        assert_eq!(settings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_port_filter() {
        let bus = EventBus::new();
        let usb0 = counter(&bus, EventFilter::Port("/dev/ttyUSB0".to_string()));

        bus.publish(connected("/dev/ttyUSB0")).ok();
        bus.publish(connected("/dev/ttyACM0")).ok();
        bus.publish(AppEvent::Settings(SettingsEvent::Saved)).ok();

        assert_eq!(usb0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<parking_lot::Mutex<Option<SubscriptionId>>> = Arc::default();

        let (b, s) = (bus.clone(), slot.clone());
        let id = bus.subscribe(EventFilter::All, move |_| {
            if let Some(id) = s.lock().take() {
                b.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        assert_eq!(bus.publish(connected("/dev/ttyUSB0")), Ok(1));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_history_is_bounded() {
        let bus = EventBus::with_config(EventBusConfig {
            history_capacity: Some(3),
            ..Default::default()
        });

        for _ in 0..5 {
            bus.publish(AppEvent::Settings(SettingsEvent::Saved)).ok();
        }
        assert_eq!(bus.history().len(), 3);

        bus.clear_history();
        assert!(bus.history().is_empty());
    }

    #[test]
    fn test_history_disabled_by_default() {
        let bus = EventBus::new();
        bus.publish(AppEvent::Settings(SettingsEvent::Saved)).ok();
        assert!(bus.history().is_empty());
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let bus = EventBus::new();
        let mut receiver = bus.receiver();

        assert_eq!(bus.publish(connected("/dev/ttyUSB0")), Ok(1));

        match receiver.recv().await {
            Ok(AppEvent::Connection(ConnectionEvent::Connected { port, kind })) => {
                assert_eq!(port, "/dev/ttyUSB0");
                assert_eq!(kind, PortKind::Serial);
            }
            other => panic!("Wrong event received: {:?}", other),
        }
    }
}
