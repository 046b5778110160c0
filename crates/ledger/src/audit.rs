//! Append-only audit trail of ledger writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{LedgerError, ResultLedger};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "expense.created")]
    ExpenseCreated,
    #[serde(rename = "expense.updated")]
    ExpenseUpdated,
    #[serde(rename = "expense.status_changed")]
    ExpenseStatusChanged,
    #[serde(rename = "project_budget.updated")]
    ProjectBudgetUpdated,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExpenseCreated => "expense.created",
            Self::ExpenseUpdated => "expense.updated",
            Self::ExpenseStatusChanged => "expense.status_changed",
            Self::ProjectBudgetUpdated => "project_budget.updated",
        }
    }

    fn parse(value: &str) -> ResultLedger<Self> {
        match value {
            "expense.created" => Ok(Self::ExpenseCreated),
            "expense.updated" => Ok(Self::ExpenseUpdated),
            "expense.status_changed" => Ok(Self::ExpenseStatusChanged),
            "project_budget.updated" => Ok(Self::ProjectBudgetUpdated),
            other => Err(LedgerError::Storage(format!("unknown audit action: {other}"))),
        }
    }
}

/// What an audit entry is about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: String,
}

impl EntityRef {
    pub fn expense(id: Uuid) -> Self {
        Self {
            entity_type: "expense".to_string(),
            id: id.to_string(),
        }
    }

    pub fn project_budget(project_id: &str) -> Self {
        Self {
            entity_type: "project_budget".to_string(),
            id: project_id.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: String,
    pub action: AuditAction,
    pub entity: EntityRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    #[must_use]
    pub fn new(actor_id: impl Into<String>, action: AuditAction, entity: EntityRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id: actor_id.into(),
            action,
            entity,
            project_id: None,
            workspace_id: None,
            before: None,
            after: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    #[must_use]
    pub fn workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// Snapshot of the entity before the write. Serialization failures drop
    /// the snapshot rather than the entry.
    #[must_use]
    pub fn before(mut self, value: &impl Serialize) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    #[must_use]
    pub fn after(mut self, value: &impl Serialize) -> Self {
        self.after = serde_json::to_value(value).ok();
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> ResultLedger<()>;
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub actor_id: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub project_id: Option<String>,
    pub workspace_id: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&AuditEntry> for ActiveModel {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            id: ActiveValue::Set(entry.id.to_string()),
            actor_id: ActiveValue::Set(entry.actor_id.clone()),
            action: ActiveValue::Set(entry.action.as_str().to_string()),
            entity_type: ActiveValue::Set(entry.entity.entity_type.clone()),
            entity_id: ActiveValue::Set(entry.entity.id.clone()),
            project_id: ActiveValue::Set(entry.project_id.clone()),
            workspace_id: ActiveValue::Set(entry.workspace_id.clone()),
            before: ActiveValue::Set(entry.before.as_ref().map(Value::to_string)),
            after: ActiveValue::Set(entry.after.as_ref().map(Value::to_string)),
            created_at: ActiveValue::Set(entry.created_at),
        }
    }
}

fn json_column(raw: Option<&str>) -> ResultLedger<Option<Value>> {
    raw.map(|raw| {
        serde_json::from_str(raw)
            .map_err(|err| LedgerError::Storage(format!("invalid audit payload: {err}")))
    })
    .transpose()
}

impl TryFrom<Model> for AuditEntry {
    type Error = LedgerError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: crate::util::parse_uuid(&model.id, "audit entry")?,
            action: AuditAction::parse(&model.action)?,
            entity: EntityRef {
                entity_type: model.entity_type,
                id: model.entity_id,
            },
            before: json_column(model.before.as_deref())?,
            after: json_column(model.after.as_deref())?,
            actor_id: model.actor_id,
            project_id: model.project_id,
            workspace_id: model.workspace_id,
            created_at: model.created_at,
        })
    }
}
