//! Message bus contract.
//!
//! The agent consumes a publisher owned by the hosting process; the
//! transport itself (broker client, reconnect handling, topic prefixes)
//! stays on the host side of the boundary. Inbound messages arrive through
//! `AgentService::handle_message`.

use serde::Serialize;

/// Outbound publishing surface provided by the host.
pub trait BusPublisher: Send + Sync {
    /// Publish a payload on a topic relative to the host's topic root.
    fn publish(&self, topic: &str, payload: &str);

    /// Publish an entity discovery announcement for a sensor topic.
    fn publish_discovery(&self, topic: &str, options: &DiscoveryOptions);
}

/// Home Assistant style discovery announcement for one entity.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryOptions {
    pub id: String,
    pub name: String,
    pub unit: String,
    pub icon: String,
    pub component: Component,
}

/// Entity kind for discovery announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Sensor,
    BinarySensor,
    Switch,
}
