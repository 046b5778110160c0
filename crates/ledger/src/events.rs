//! Domain events published after ledger writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{LedgerError, ResultLedger};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "expense.created")]
    ExpenseCreated,
    #[serde(rename = "expense.status_changed")]
    ExpenseStatusChanged,
    #[serde(rename = "project_budget.updated")]
    ProjectBudgetUpdated,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExpenseCreated => "expense.created",
            Self::ExpenseStatusChanged => "expense.status_changed",
            Self::ProjectBudgetUpdated => "project_budget.updated",
        }
    }

    fn parse(value: &str) -> ResultLedger<Self> {
        match value {
            "expense.created" => Ok(Self::ExpenseCreated),
            "expense.status_changed" => Ok(Self::ExpenseStatusChanged),
            "project_budget.updated" => Ok(Self::ProjectBudgetUpdated),
            other => Err(LedgerError::Storage(format!("unknown event type: {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub entity_id: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(event_type: EventType, entity_id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            entity_id: entity_id.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> ResultLedger<()>;
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "domain_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub event_type: String,
    pub entity_id: String,
    pub payload: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&DomainEvent> for ActiveModel {
    fn from(event: &DomainEvent) -> Self {
        Self {
            id: ActiveValue::Set(event.id.to_string()),
            event_type: ActiveValue::Set(event.event_type.as_str().to_string()),
            entity_id: ActiveValue::Set(event.entity_id.clone()),
            payload: ActiveValue::Set(event.payload.to_string()),
            created_at: ActiveValue::Set(event.created_at),
        }
    }
}

impl TryFrom<Model> for DomainEvent {
    type Error = LedgerError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: crate::util::parse_uuid(&model.id, "event")?,
            event_type: EventType::parse(&model.event_type)?,
            payload: serde_json::from_str(&model.payload)
                .map_err(|err| LedgerError::Storage(format!("invalid event payload: {err}")))?,
            entity_id: model.entity_id,
            created_at: model.created_at,
        })
    }
}
