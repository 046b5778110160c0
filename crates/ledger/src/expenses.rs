//! Expense records.
//!
//! An `Expense` is created once, then mutated in place through an
//! [`ExpensePatch`] or a status change. The ledger never hard-deletes it.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::{parse_date, parse_uuid};
use crate::{Currency, ExpenseStatus, LedgerError, MoneyCents};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub workspace_id: String,
    pub project_id: String,
    pub task_id: Option<String>,
    pub date: NaiveDate,
    pub amount: MoneyCents,
    pub currency: Currency,
    pub category: String,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<MoneyCents>,
    pub status: ExpenseStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    /// Aggregation key: categories compare case-insensitively.
    #[must_use]
    pub fn category_key(&self) -> String {
        category_key(&self.category)
    }
}

pub(crate) fn category_key(category: &str) -> String {
    category.trim().to_lowercase()
}

/// A validated expense ready to be stored.
///
/// Identity and timestamps are assigned by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewExpense {
    pub workspace_id: String,
    pub project_id: String,
    pub task_id: Option<String>,
    pub date: NaiveDate,
    pub amount: MoneyCents,
    pub currency: Currency,
    pub category: String,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub payment_method: Option<String>,
    pub tax_amount: Option<MoneyCents>,
    pub status: ExpenseStatus,
}

impl NewExpense {
    pub(crate) fn into_expense(self, actor_id: &str, now: DateTime<Utc>) -> Expense {
        Expense {
            id: Uuid::new_v4(),
            workspace_id: self.workspace_id,
            project_id: self.project_id,
            task_id: self.task_id,
            date: self.date,
            amount: self.amount,
            currency: self.currency,
            category: self.category,
            description: self.description,
            vendor: self.vendor,
            payment_method: self.payment_method,
            tax_amount: self.tax_amount,
            status: self.status,
            created_by: actor_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of an expense.
///
/// `None` leaves a field alone. For clearable fields `Some(None)` clears it.
/// Identity, ownership and creation metadata are not part of the patch, so
/// they cannot be changed through it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpensePatch {
    pub task_id: Option<Option<String>>,
    pub date: Option<NaiveDate>,
    pub amount: Option<MoneyCents>,
    pub currency: Option<Currency>,
    pub category: Option<String>,
    pub description: Option<Option<String>>,
    pub vendor: Option<Option<String>>,
    pub payment_method: Option<Option<String>>,
    pub tax_amount: Option<Option<MoneyCents>>,
    pub status: Option<ExpenseStatus>,
}

impl ExpensePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Writes the patch into `expense` and bumps `updated_at`.
    pub(crate) fn apply(self, expense: &mut Expense, now: DateTime<Utc>) {
        if let Some(task_id) = self.task_id {
            expense.task_id = task_id;
        }
        if let Some(date) = self.date {
            expense.date = date;
        }
        if let Some(amount) = self.amount {
            expense.amount = amount;
        }
        if let Some(currency) = self.currency {
            expense.currency = currency;
        }
        if let Some(category) = self.category {
            expense.category = category;
        }
        if let Some(description) = self.description {
            expense.description = description;
        }
        if let Some(vendor) = self.vendor {
            expense.vendor = vendor;
        }
        if let Some(payment_method) = self.payment_method {
            expense.payment_method = payment_method;
        }
        if let Some(tax_amount) = self.tax_amount {
            expense.tax_amount = tax_amount;
        }
        if let Some(status) = self.status {
            expense.status = status;
        }
        expense.updated_at = now;
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub workspace_id: String,
    pub project_id: String,
    pub task_id: Option<String>,
    // ISO `YYYY-MM-DD`, range filters compare lexicographically.
    pub date: String,
    pub amount_minor: i64,
    pub currency: String,
    pub category: String,
    pub category_norm: String,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub payment_method: Option<String>,
    pub tax_minor: Option<i64>,
    pub status: String,
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::attachments::Entity")]
    Attachments,
}

impl Related<super::attachments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Attachments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Expense> for ActiveModel {
    fn from(expense: &Expense) -> Self {
        Self {
            id: ActiveValue::Set(expense.id.to_string()),
            workspace_id: ActiveValue::Set(expense.workspace_id.clone()),
            project_id: ActiveValue::Set(expense.project_id.clone()),
            task_id: ActiveValue::Set(expense.task_id.clone()),
            date: ActiveValue::Set(expense.date.to_string()),
            amount_minor: ActiveValue::Set(expense.amount.cents()),
            currency: ActiveValue::Set(expense.currency.code().to_string()),
            category: ActiveValue::Set(expense.category.clone()),
            category_norm: ActiveValue::Set(expense.category_key()),
            description: ActiveValue::Set(expense.description.clone()),
            vendor: ActiveValue::Set(expense.vendor.clone()),
            payment_method: ActiveValue::Set(expense.payment_method.clone()),
            tax_minor: ActiveValue::Set(expense.tax_amount.map(MoneyCents::cents)),
            status: ActiveValue::Set(expense.status.as_str().to_string()),
            created_by: ActiveValue::Set(expense.created_by.clone()),
            created_at: ActiveValue::Set(expense.created_at),
            updated_at: ActiveValue::Set(expense.updated_at),
        }
    }
}

impl TryFrom<Model> for Expense {
    type Error = LedgerError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| LedgerError::Storage(format!("expense {}: {what}", model.id));
        Ok(Self {
            id: parse_uuid(&model.id, "expense")?,
            date: parse_date(&model.date).map_err(|_| corrupt("bad date"))?,
            currency: Currency::parse(&model.currency).map_err(|_| corrupt("bad currency"))?,
            status: ExpenseStatus::parse(&model.status).map_err(|_| corrupt("bad status"))?,
            workspace_id: model.workspace_id,
            project_id: model.project_id,
            task_id: model.task_id,
            amount: MoneyCents::new(model.amount_minor),
            category: model.category,
            description: model.description,
            vendor: model.vendor,
            payment_method: model.payment_method,
            tax_amount: model.tax_minor.map(MoneyCents::new),
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
