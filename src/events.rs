//! Rule change events
//!
//! Administrative writes publish a [`RuleEvent`] naming every rule they
//! touched, including rules shifted to make room for a new priority.
//! Publishing is synchronous and fire-and-forget.

use crate::model::RuleId;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tokio::sync::broadcast;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

/// Which rule set an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSet {
    Rules,
    AdminRules,
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSet::Rules => write!(f, "rules"),
            RuleSet::AdminRules => write!(f, "admin_rules"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleEvent {
    pub kind: EventKind,
    pub rule_set: RuleSet,
    pub ids: BTreeSet<RuleId>,
}

impl RuleEvent {
    pub fn new(kind: EventKind, rule_set: RuleSet, ids: impl IntoIterator<Item = RuleId>) -> Self {
        Self {
            kind,
            rule_set,
            ids: ids.into_iter().collect(),
        }
    }
}

/// Receiver of rule change events
pub trait EventSink: Send + Sync {
    fn publish(&self, event: RuleEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: RuleEvent) {}
}

/// Writes every event as a structured log line
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: RuleEvent) {
        info!(
            kind = ?event.kind,
            rule_set = %event.rule_set,
            ids = ?event.ids,
            "Rule change"
        );
    }
}

/// Fans events out to any number of subscribers
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<RuleEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<RuleEvent>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuleEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event: RuleEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_delivers() {
        let (sink, mut rx) = BroadcastEventSink::new(8);
        sink.publish(RuleEvent::new(
            EventKind::Created,
            RuleSet::Rules,
            [RuleId::new(1), RuleId::new(2)],
        ));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::Created);
        assert_eq!(event.ids.len(), 2);
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let (sink, rx) = BroadcastEventSink::new(1);
        drop(rx);
        sink.publish(RuleEvent::new(EventKind::Deleted, RuleSet::AdminRules, []));
    }

    #[test]
    fn test_event_serializes() {
        let event = RuleEvent::new(EventKind::Updated, RuleSet::Rules, [RuleId::new(3)]);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "UPDATED");
        assert_eq!(json["rule_set"], "rules");
        assert_eq!(json["ids"][0], 3);
    }
}
