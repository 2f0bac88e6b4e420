//! Event Publisher Adapters
//!
//! - [`LoggingEventPublisher`]: one structured log line per event; failures
//!   (mount, unmount, quota) are raised to `warn`
//! - [`InMemoryEventCollector`]: keeps events for inspection
//! - [`CompositeEventPublisher`]: fans out to several publishers

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn, Level};

use crate::domain::events::DomainEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

// =============================================================================
// Logging
// =============================================================================

/// Writes domain events to the tracing subscriber.
#[derive(Debug, Clone)]
pub struct LoggingEventPublisher {
    level: Level,
}

impl Default for LoggingEventPublisher {
    fn default() -> Self {
        Self::debug_level()
    }
}

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routine events at `info`.
    pub fn info_level() -> Self {
        Self { level: Level::INFO }
    }

    /// Routine events at `debug`.
    pub fn debug_level() -> Self {
        Self { level: Level::DEBUG }
    }

    fn is_failure(event: &DomainEvent) -> bool {
        matches!(
            event,
            DomainEvent::MountFailed { .. } | DomainEvent::UnmountFailed { .. } | DomainEvent::QuotaRejected { .. }
        )
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let payload = serde_json::to_string(&event)?;
        let tenant = event.tenant_id();
        let event_type = event.event_type();

        if Self::is_failure(&event) {
            warn!(tenant = %tenant, event_type, event = %payload, "Tenant event");
        } else if self.level == Level::INFO {
            info!(tenant = %tenant, event_type, event = %payload, "Tenant event");
        } else {
            debug!(tenant = %tenant, event_type, event = %payload, "Tenant event");
        }
        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

// =============================================================================
// In-Memory
// =============================================================================

/// Keeps every published event in order.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: Mutex<Vec<DomainEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn matching(&self, keep: impl Fn(&DomainEvent) -> bool) -> Vec<DomainEvent> {
        self.events.lock().iter().filter(|e| keep(e)).cloned().collect()
    }

    /// Events about one tenant, in publication order.
    pub fn events_for(&self, tenant: &str) -> Vec<DomainEvent> {
        self.matching(|e| e.tenant_id() == tenant)
    }

    /// Events whose `event_type()` equals `event_type`.
    pub fn events_of_type(&self, event_type: &str) -> Vec<DomainEvent> {
        self.matching(|e| e.event_type() == event_type)
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        self.events.lock().extend(events);
        Ok(())
    }
}

// =============================================================================
// Composite
// =============================================================================

/// Delivers each event to every publisher; the first error is returned
/// after all of them have been tried.
#[derive(Default)]
pub struct CompositeEventPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl CompositeEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_publisher<P: EventPublisher + 'static>(self, publisher: P) -> Self {
        self.with_shared(Arc::new(publisher))
    }

    /// Add a publisher that is also held elsewhere.
    pub fn with_shared(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }
}

impl std::fmt::Debug for CompositeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeEventPublisher")
            .field("publishers", &self.publishers.len())
            .finish()
    }
}

#[async_trait]
impl EventPublisher for CompositeEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        self.publish_all(vec![event]).await
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        let mut first_error = None;
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish_all(events.clone()).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
