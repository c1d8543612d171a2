//! Saved-location events between the saved-locations list and whoever is
//! planning a delivery.
//!
//! One bridge per navigation flow. Subscribers see events published after
//! they subscribed; dropping the bridge closes every subscription.

use tokio::sync::broadcast;

use crate::models::SavedLocation;

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// The user picked a saved location to deliver to.
    Selected(SavedLocation),
    /// The saved-locations list was modified and should be reloaded.
    Changed,
}

#[derive(Debug, Clone)]
pub struct LocationBridge {
    sender: broadcast::Sender<BridgeEvent>,
}

impl LocationBridge {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    /// Returns how many subscribers received the event. Zero is fine.
    pub fn notify_selection(&self, location: SavedLocation) -> usize {
        tracing::debug!(name = %location.name, "saved location selected");
        self.publish(BridgeEvent::Selected(location))
    }

    pub fn notify_change(&self) -> usize {
        self.publish(BridgeEvent::Changed)
    }

    fn publish(&self, event: BridgeEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for LocationBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn depot() -> SavedLocation {
        SavedLocation {
            name: "Depot".into(),
            address: "1 rue du Port".into(),
            lat: 45.0,
            lon: 5.0,
        }
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bridge = LocationBridge::new();
        assert_eq!(bridge.notify_selection(depot()), 0);
        assert_eq!(bridge.notify_change(), 0);
    }

    #[tokio::test]
    async fn every_subscriber_sees_events_in_order() {
        let bridge = LocationBridge::new();
        let mut first = bridge.subscribe();
        let mut second = bridge.subscribe();

        assert_eq!(bridge.notify_selection(depot()), 2);
        bridge.notify_change();

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.recv().await.unwrap(), BridgeEvent::Selected(depot()));
            assert_eq!(rx.recv().await.unwrap(), BridgeEvent::Changed);
        }
    }

    #[test]
    fn late_subscribers_miss_earlier_events() {
        let bridge = LocationBridge::new();
        bridge.notify_change();
        let mut rx = bridge.subscribe();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn dropping_the_bridge_closes_subscriptions() {
        let bridge = LocationBridge::new();
        let mut rx = bridge.subscribe();
        drop(bridge);
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }
}
