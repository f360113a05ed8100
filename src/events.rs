//! Warning and violation events for external subscribers.
//!
//! Notification delivery is out of scope; this channel only publishes.
//! Each `EventBus` is owned by one tracker instance, so tests can run
//! isolated engines without shared global state. Dropping a receiver
//! unsubscribes it.

use crate::model::keys::{ModuleKey, TenantId, UsageType};
use tokio::sync::broadcast;

/// A usage event published by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageEvent {
    /// Usage crossed the warning threshold for a limit.
    LimitWarning {
        /// Affected tenant.
        tenant_id: TenantId,
        /// Metered module.
        module: ModuleKey,
        /// Usage type approaching its limit.
        limit_type: UsageType,
        /// Usage after the accepted increment.
        current_usage: u64,
        /// The limit in force.
        limit: u64,
        /// Usage as a rounded percentage of the limit.
        percentage: u32,
    },
    /// An increment was blocked because it would exceed a limit.
    LimitExceeded {
        /// Affected tenant.
        tenant_id: TenantId,
        /// Metered module.
        module: ModuleKey,
        /// Usage type that was capped.
        limit_type: UsageType,
        /// Usage at the moment of the blocked attempt.
        current_usage: u64,
        /// The limit in force.
        limit: u64,
        /// The amount the caller tried to add.
        attempted_amount: u64,
    },
}

/// Broadcast channel for usage events.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<UsageEvent>,
}

impl EventBus {
    /// Create a bus holding at most `capacity` undelivered events per
    /// subscriber. Slow subscribers that fall further behind observe a
    /// lag error, not engine backpressure.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<UsageEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A send error only means nobody is currently
    /// subscribed, which is fine.
    pub fn publish(&self, event: UsageEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning_event() -> UsageEvent {
        UsageEvent::LimitWarning {
            tenant_id: TenantId::new("acme"),
            module: ModuleKey::Attendance,
            limit_type: UsageType::Employees,
            current_usage: 80,
            limit: 100,
            percentage: 80,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(warning_event());
        assert_eq!(rx.recv().await.unwrap(), warning_event());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        bus.publish(warning_event());
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(warning_event());
        assert_eq!(rx1.recv().await.unwrap(), warning_event());
        assert_eq!(rx2.recv().await.unwrap(), warning_event());
    }
}
