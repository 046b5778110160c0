//! Audit and event sink implementations.

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, QueryOrder, prelude::*};
use tokio::sync::{Mutex, broadcast};

use crate::audit::{self, AuditEntry, AuditSink};
use crate::events::{self, DomainEvent, EventSink};
use crate::ResultLedger;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Keeps audit entries and events in memory and fans events out to
/// subscribers.
///
/// Publishing never fails because nobody is listening.
#[derive(Debug)]
pub struct MemorySink {
    audit: Mutex<Vec<AuditEntry>>,
    events: Mutex<Vec<DomainEvent>>,
    sender: broadcast::Sender<DomainEvent>,
}

impl Default for MemorySink {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            audit: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            sender,
        }
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.lock().await.clone()
    }

    pub async fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn record(&self, entry: AuditEntry) -> ResultLedger<()> {
        self.audit.lock().await.push(entry);
        Ok(())
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn publish(&self, event: DomainEvent) -> ResultLedger<()> {
        self.events.lock().await.push(event.clone());
        // Err only means there are no receivers.
        let _ = self.sender.send(event);
        Ok(())
    }
}

/// Appends to the `audit_log` and `domain_events` tables.
#[derive(Debug, Clone)]
pub struct SeaSink {
    database: DatabaseConnection,
}

impl SeaSink {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    pub async fn audit_entries(&self) -> ResultLedger<Vec<AuditEntry>> {
        audit::Entity::find()
            .order_by_asc(audit::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(AuditEntry::try_from)
            .collect()
    }

    pub async fn events(&self) -> ResultLedger<Vec<DomainEvent>> {
        events::Entity::find()
            .order_by_asc(events::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(DomainEvent::try_from)
            .collect()
    }
}

#[async_trait]
impl AuditSink for SeaSink {
    async fn record(&self, entry: AuditEntry) -> ResultLedger<()> {
        audit::ActiveModel::from(&entry)
            .insert(&self.database)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for SeaSink {
    async fn publish(&self, event: DomainEvent) -> ResultLedger<()> {
        events::ActiveModel::from(&event)
            .insert(&self.database)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::events::EventType;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let sink = MemorySink::new();
        let mut rx = sink.subscribe();
        sink.publish(DomainEvent::new(
            EventType::ProjectBudgetUpdated,
            "p1",
            json!({"project_id": "p1"}),
        ))
        .await
        .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.entity_id, "p1");
        assert_eq!(sink.events().await.len(), 1);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        let sink = MemorySink::new();
        sink.publish(DomainEvent::new(EventType::ExpenseCreated, "x", json!({})))
            .await
            .unwrap();
        assert_eq!(sink.events().await.len(), 1);
    }
}
