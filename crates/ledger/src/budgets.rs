//! Project budgets and their derived snapshots.
//!
//! A project has at most one budget record. It is either the bare
//! configuration written by `upsert_budget`, or the latest snapshot computed
//! from it ([`BudgetRecord`]). Snapshots replace the record wholesale; they
//! are never patched.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{Currency, LedgerError, MoneyCents, ResultLedger};

/// Per-category allowance declared on a budget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetCategory {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<MoneyCents>,
}

/// Budget configuration for one project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectBudget {
    pub project_id: String,
    pub currency: Currency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<MoneyCents>,
    /// Fraction of `total` in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn_threshold: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<BudgetCategory>>,
    pub updated_at: DateTime<Utc>,
}

/// Spend against one category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUsage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<MoneyCents>,
    pub spent: MoneyCents,
}

/// Budget configuration plus the numbers derived from the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectBudgetSnapshot {
    #[serde(flatten)]
    pub budget: ProjectBudget,
    pub spent_total: MoneyCents,
    /// `total - spent_total`; negative once the budget is overspent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_total: Option<MoneyCents>,
    pub categories_usage: Vec<CategoryUsage>,
    /// Set when both `total` and `warn_threshold` are configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn_reached: Option<bool>,
    pub computed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BudgetRecord {
    Config(ProjectBudget),
    Snapshot(ProjectBudgetSnapshot),
}

impl BudgetRecord {
    pub fn budget(&self) -> &ProjectBudget {
        match self {
            Self::Config(budget) => budget,
            Self::Snapshot(snapshot) => &snapshot.budget,
        }
    }

    pub fn into_budget(self) -> ProjectBudget {
        match self {
            Self::Config(budget) => budget,
            Self::Snapshot(snapshot) => snapshot.budget,
        }
    }

    pub fn snapshot(&self) -> Option<&ProjectBudgetSnapshot> {
        match self {
            Self::Config(_) => None,
            Self::Snapshot(snapshot) => Some(snapshot),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "project_budgets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub project_id: String,
    pub currency: String,
    pub total_minor: Option<i64>,
    pub warn_threshold: Option<String>,
    pub categories: Option<String>,
    pub updated_at: DateTimeUtc,
    pub spent_total_minor: Option<i64>,
    pub remaining_total_minor: Option<i64>,
    pub categories_usage: Option<String>,
    pub warn_reached: Option<bool>,
    pub computed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn to_json<T: Serialize>(value: &T) -> ResultLedger<String> {
    serde_json::to_string(value).map_err(|err| LedgerError::Storage(err.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str, label: &str) -> ResultLedger<T> {
    serde_json::from_str(raw)
        .map_err(|err| LedgerError::Storage(format!("invalid {label} column: {err}")))
}

impl TryFrom<&BudgetRecord> for ActiveModel {
    type Error = LedgerError;

    fn try_from(record: &BudgetRecord) -> Result<Self, Self::Error> {
        let budget = record.budget();
        let snapshot = record.snapshot();
        Ok(Self {
            project_id: ActiveValue::Set(budget.project_id.clone()),
            currency: ActiveValue::Set(budget.currency.code().to_string()),
            total_minor: ActiveValue::Set(budget.total.map(MoneyCents::cents)),
            warn_threshold: ActiveValue::Set(budget.warn_threshold.map(|t| t.to_string())),
            categories: ActiveValue::Set(budget.categories.as_ref().map(to_json).transpose()?),
            updated_at: ActiveValue::Set(budget.updated_at),
            spent_total_minor: ActiveValue::Set(snapshot.map(|s| s.spent_total.cents())),
            remaining_total_minor: ActiveValue::Set(
                snapshot.and_then(|s| s.remaining_total.map(MoneyCents::cents)),
            ),
            categories_usage: ActiveValue::Set(
                snapshot.map(|s| to_json(&s.categories_usage)).transpose()?,
            ),
            warn_reached: ActiveValue::Set(snapshot.and_then(|s| s.warn_reached)),
            computed_at: ActiveValue::Set(snapshot.map(|s| s.computed_at)),
        })
    }
}

impl TryFrom<Model> for BudgetRecord {
    type Error = LedgerError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let budget = ProjectBudget {
            currency: Currency::parse(&model.currency)
                .map_err(|_| LedgerError::Storage(format!("invalid budget currency: {}", model.currency)))?,
            total: model.total_minor.map(MoneyCents::new),
            warn_threshold: model
                .warn_threshold
                .as_deref()
                .map(|raw| {
                    Decimal::from_str(raw)
                        .map_err(|_| LedgerError::Storage(format!("invalid warn threshold: {raw}")))
                })
                .transpose()?,
            categories: model
                .categories
                .as_deref()
                .map(|raw| from_json(raw, "categories"))
                .transpose()?,
            updated_at: model.updated_at,
            project_id: model.project_id,
        };

        let (Some(spent), Some(computed_at)) = (model.spent_total_minor, model.computed_at) else {
            return Ok(Self::Config(budget));
        };
        Ok(Self::Snapshot(ProjectBudgetSnapshot {
            budget,
            spent_total: MoneyCents::new(spent),
            remaining_total: model.remaining_total_minor.map(MoneyCents::new),
            categories_usage: model
                .categories_usage
                .as_deref()
                .map(|raw| from_json(raw, "categories_usage"))
                .transpose()?
                .unwrap_or_default(),
            warn_reached: model.warn_reached,
            computed_at,
        }))
    }
}
