//! Opaque file references owned by an expense.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::parse_uuid;
use crate::LedgerError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseAttachment {
    pub id: Uuid,
    pub expense_id: Uuid,
    pub filename: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Attachment supplied when creating an expense.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAttachment {
    pub filename: String,
    pub url: String,
}

impl NewAttachment {
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: url.into(),
        }
    }

    pub(crate) fn into_attachment(self, expense_id: Uuid, now: DateTime<Utc>) -> ExpenseAttachment {
        ExpenseAttachment {
            id: Uuid::new_v4(),
            expense_id,
            filename: self.filename,
            url: self.url,
            uploaded_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expense_attachments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub expense_id: String,
    pub filename: String,
    pub url: String,
    pub uploaded_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::expenses::Entity",
        from = "Column::ExpenseId",
        to = "super::expenses::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Expenses,
}

impl Related<super::expenses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&ExpenseAttachment> for ActiveModel {
    fn from(attachment: &ExpenseAttachment) -> Self {
        Self {
            id: ActiveValue::Set(attachment.id.to_string()),
            expense_id: ActiveValue::Set(attachment.expense_id.to_string()),
            filename: ActiveValue::Set(attachment.filename.clone()),
            url: ActiveValue::Set(attachment.url.clone()),
            uploaded_at: ActiveValue::Set(attachment.uploaded_at),
        }
    }
}

impl TryFrom<Model> for ExpenseAttachment {
    type Error = LedgerError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "attachment")?,
            expense_id: parse_uuid(&model.expense_id, "expense")?,
            filename: model.filename,
            url: model.url,
            uploaded_at: model.uploaded_at,
        })
    }
}
