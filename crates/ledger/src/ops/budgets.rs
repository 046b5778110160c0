use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::audit::{AuditAction, AuditEntry, EntityRef};
use crate::events::{DomainEvent, EventType};
use crate::money::parse_amount;
use crate::util::require_non_empty;
use crate::{
    BudgetCategory, BudgetCategoryInput, BudgetRecord, LedgerError, NumericInput, ProjectBudget,
    ProjectBudgetSnapshot, ResultLedger, UpsertBudgetCmd, normalize_currency,
};

use super::{FinanceService, payload};

/// Exact fraction in `[0, 1]`.
fn parse_warn_threshold(input: &NumericInput) -> ResultLedger<Decimal> {
    let value = match input {
        NumericInput::Number(value) => *value,
        NumericInput::Text(raw) => Decimal::from_str(raw.trim()).map_err(|_| {
            LedgerError::InvalidWarnThreshold(format!("\"{raw}\" is not a decimal"))
        })?,
    };
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(LedgerError::InvalidWarnThreshold(format!(
            "{value} is outside [0, 1]"
        )));
    }
    Ok(value.normalize())
}

fn parse_category(input: BudgetCategoryInput) -> ResultLedger<BudgetCategory> {
    let name = require_non_empty(&input.name, "budget category name")?;
    let limit = input.limit.as_ref().map(parse_amount).transpose()?;
    if let Some(limit) = limit
        && limit.is_negative()
    {
        return Err(LedgerError::InvalidInput(format!(
            "limit of category \"{name}\" must not be negative"
        )));
    }
    Ok(BudgetCategory { name, limit })
}

impl FinanceService {
    pub async fn get_budget(&self, project_id: &str) -> ResultLedger<Option<BudgetRecord>> {
        self.budgets.get(project_id.trim()).await
    }

    /// Replaces the project's budget configuration and returns the
    /// recomputed snapshot.
    pub async fn upsert_budget(
        &self,
        project_id: &str,
        cmd: UpsertBudgetCmd,
        actor_id: &str,
    ) -> ResultLedger<ProjectBudgetSnapshot> {
        let project_id = require_non_empty(project_id, "project_id")?;
        let _project = self.project_locks.acquire(&project_id).await;

        let currency = normalize_currency(&cmd.currency)?;
        let total = match &cmd.total {
            Some(raw) => {
                let total = parse_amount(raw)?;
                if !total.is_positive() {
                    return Err(LedgerError::AmountNotPositive(total.to_string()));
                }
                Some(total)
            }
            None => None,
        };
        let warn_threshold = cmd
            .warn_threshold
            .as_ref()
            .map(parse_warn_threshold)
            .transpose()?;
        let categories = cmd
            .categories
            .map(|rows| rows.into_iter().map(parse_category).collect::<ResultLedger<Vec<_>>>())
            .transpose()?;

        let used = self.engine.expense_currencies(&project_id).await?;
        if let Some(other) = used.keys().filter(|c| **c != currency).min() {
            if self.config.enforce_budget_currency_on_upsert {
                return Err(LedgerError::BudgetCurrencyMismatch {
                    budget: currency.code().to_string(),
                    expense: other.code().to_string(),
                });
            }
            tracing::warn!(
                project_id = %project_id,
                budget_currency = %currency,
                expense_currency = %other,
                "budget currency differs from recorded expenses"
            );
        }

        let before = self.budgets.get(&project_id).await?;
        let budget = ProjectBudget {
            project_id: project_id.clone(),
            currency,
            total,
            warn_threshold,
            categories,
            updated_at: Utc::now(),
        };
        self.budgets
            .put(BudgetRecord::Config(budget.clone()))
            .await?;

        let mut entry = AuditEntry::new(
            actor_id,
            AuditAction::ProjectBudgetUpdated,
            EntityRef::project_budget(&project_id),
        )
        .project(&project_id)
        .after(&budget);
        if let Some(before) = &before {
            entry = entry.before(before.budget());
        }
        self.audit.record(entry).await?;
        self.events
            .publish(DomainEvent::new(
                EventType::ProjectBudgetUpdated,
                project_id.clone(),
                payload(&budget)?,
            ))
            .await?;

        let snapshot = self.engine.refresh(budget).await?;
        tracing::info!(
            project_id = %project_id,
            spent_total = %snapshot.spent_total,
            "project budget updated"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warn_threshold_bounds() {
        assert_eq!(
            parse_warn_threshold(&NumericInput::from("0.80")).unwrap(),
            Decimal::new(8, 1)
        );
        assert_eq!(parse_warn_threshold(&NumericInput::from(1_i64)).unwrap(), Decimal::ONE);
        assert!(parse_warn_threshold(&NumericInput::from("0")).is_ok());
        assert!(matches!(
            parse_warn_threshold(&NumericInput::from("1.01")),
            Err(LedgerError::InvalidWarnThreshold(_))
        ));
        assert!(matches!(
            parse_warn_threshold(&NumericInput::from(-1_i64)),
            Err(LedgerError::InvalidWarnThreshold(_))
        ));
        assert!(matches!(
            parse_warn_threshold(&NumericInput::from("most")),
            Err(LedgerError::InvalidWarnThreshold(_))
        ));
    }

    #[test]
    fn category_rows_are_validated() {
        assert!(matches!(
            parse_category(BudgetCategoryInput::new("  ")),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_category(BudgetCategoryInput::new("Travel").limit(-5_i64)),
            Err(LedgerError::InvalidInput(_))
        ));
        let row = parse_category(BudgetCategoryInput::new(" Travel ").limit("250")).unwrap();
        assert_eq!(row.name, "Travel");
        assert_eq!(row.limit.map(|l| l.cents()), Some(25_000));
    }
}
