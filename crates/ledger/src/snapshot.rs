//! Budget engine: derives spend snapshots from the ledger.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;

use crate::expenses::category_key;
use crate::store::{BudgetStore, ExpenseStore};
use crate::{
    BudgetRecord, CategoryUsage, Currency, Expense, ExpenseFilter, LedgerError, MoneyCents,
    ProjectBudget, ProjectBudgetSnapshot, ResultLedger,
};

/// Recomputes a snapshot for `budget` from `expenses`.
///
/// Only expenses in a final status count. Expenses of other projects are
/// ignored, so callers may pass a wider list.
pub fn build_snapshot(
    budget: ProjectBudget,
    expenses: &[Expense],
) -> ResultLedger<ProjectBudgetSnapshot> {
    let overflow = || LedgerError::InvalidAmount("budget spend overflows".to_string());

    let mut spent_total = MoneyCents::ZERO;
    // lowercased category -> (first label seen, spent)
    let mut by_category: BTreeMap<String, (String, MoneyCents)> = BTreeMap::new();
    for expense in expenses
        .iter()
        .filter(|e| e.project_id == budget.project_id && e.status.is_final())
    {
        spent_total = spent_total.checked_add(expense.amount).ok_or_else(overflow)?;
        let entry = by_category
            .entry(expense.category_key())
            .or_insert_with(|| (expense.category.clone(), MoneyCents::ZERO));
        entry.1 = entry.1.checked_add(expense.amount).ok_or_else(overflow)?;
    }

    let categories_usage = match &budget.categories {
        Some(declared) => declared
            .iter()
            .map(|category| CategoryUsage {
                name: category.name.clone(),
                limit: category.limit,
                spent: by_category
                    .get(&category_key(&category.name))
                    .map_or(MoneyCents::ZERO, |(_, spent)| *spent),
            })
            .collect(),
        None => by_category
            .into_values()
            .map(|(name, spent)| CategoryUsage {
                name,
                limit: None,
                spent,
            })
            .collect(),
    };

    let remaining_total = budget
        .total
        .map(|total| total.checked_sub(spent_total).ok_or_else(overflow))
        .transpose()?;

    let warn_reached = match (budget.total, budget.warn_threshold) {
        (Some(total), Some(threshold)) => {
            Some(spent_total.to_decimal() >= total.to_decimal() * threshold)
        }
        _ => None,
    };

    Ok(ProjectBudgetSnapshot {
        budget,
        spent_total,
        remaining_total,
        categories_usage,
        warn_reached,
        computed_at: Utc::now(),
    })
}

/// Fails when a budget exists and uses another currency.
pub fn ensure_budget_currency(
    budget: Option<&ProjectBudget>,
    currency: Currency,
) -> ResultLedger<()> {
    match budget {
        Some(budget) if budget.currency != currency => Err(LedgerError::BudgetCurrencyMismatch {
            budget: budget.currency.code().to_string(),
            expense: currency.code().to_string(),
        }),
        _ => Ok(()),
    }
}

/// Reads the ledger and keeps each project's budget record up to date.
#[derive(Clone)]
pub struct BudgetEngine {
    expenses: Arc<dyn ExpenseStore>,
    budgets: Arc<dyn BudgetStore>,
}

impl BudgetEngine {
    pub fn new(expenses: Arc<dyn ExpenseStore>, budgets: Arc<dyn BudgetStore>) -> Self {
        Self { expenses, budgets }
    }

    pub async fn budget(&self, project_id: &str) -> ResultLedger<Option<BudgetRecord>> {
        self.budgets.get(project_id).await
    }

    /// Builds a snapshot for `budget` from the current ledger, without
    /// persisting it.
    pub async fn build_snapshot(
        &self,
        budget: ProjectBudget,
    ) -> ResultLedger<ProjectBudgetSnapshot> {
        let expenses = self
            .expenses
            .list(&ExpenseFilter::new().project(budget.project_id.clone()))
            .await?;
        build_snapshot(budget, &expenses)
    }

    /// Rebuilds and stores the snapshot for `project_id`.
    ///
    /// Returns `None` when the project has no budget yet.
    pub async fn recalculate_budget(
        &self,
        project_id: &str,
    ) -> ResultLedger<Option<ProjectBudgetSnapshot>> {
        let Some(record) = self.budgets.get(project_id).await? else {
            return Ok(None);
        };
        self.refresh(record.into_budget()).await.map(Some)
    }

    /// Builds the snapshot for `budget` and stores it in place of the
    /// project's current record.
    pub async fn refresh(&self, budget: ProjectBudget) -> ResultLedger<ProjectBudgetSnapshot> {
        let snapshot = self.build_snapshot(budget).await?;
        self.budgets
            .put(BudgetRecord::Snapshot(snapshot.clone()))
            .await?;
        tracing::debug!(
            project_id = %snapshot.budget.project_id,
            spent_total = %snapshot.spent_total,
            "budget snapshot recomputed"
        );
        Ok(snapshot)
    }

    /// Currencies used by the project's expenses, with how many use each.
    pub async fn expense_currencies(&self, project_id: &str) -> ResultLedger<HashMap<Currency, usize>> {
        let expenses = self
            .expenses
            .list(&ExpenseFilter::new().project(project_id))
            .await?;
        let mut counts = HashMap::new();
        for expense in expenses {
            *counts.entry(expense.currency).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;
    use crate::{BudgetCategory, ExpenseStatus};

    fn usd() -> Currency {
        Currency::parse("USD").unwrap()
    }

    fn budget(total: Option<i64>) -> ProjectBudget {
        ProjectBudget {
            project_id: "p1".to_string(),
            currency: usd(),
            total: total.map(MoneyCents::new),
            warn_threshold: None,
            categories: None,
            updated_at: Utc::now(),
        }
    }

    fn expense(category: &str, cents: i64, status: ExpenseStatus) -> Expense {
        let now = Utc::now();
        Expense {
            id: Uuid::new_v4(),
            workspace_id: "ws".to_string(),
            project_id: "p1".to_string(),
            task_id: None,
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            amount: MoneyCents::new(cents),
            currency: usd(),
            category: category.to_string(),
            description: None,
            vendor: None,
            payment_method: None,
            tax_amount: None,
            status,
            created_by: "alice".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_final_statuses_count() {
        let expenses = vec![
            expense("Travel", 10_000, ExpenseStatus::Draft),
            expense("Travel", 20_000, ExpenseStatus::Pending),
            expense("Travel", 1_000, ExpenseStatus::Approved),
            expense("Travel", 2_000, ExpenseStatus::Payable),
            expense("Travel", 3_000, ExpenseStatus::Closed),
        ];
        let snapshot = build_snapshot(budget(None), &expenses).unwrap();
        assert_eq!(snapshot.spent_total, MoneyCents::new(6_000));
        assert_eq!(snapshot.remaining_total, None);
    }

    #[test]
    fn observed_categories_are_merged_case_insensitively() {
        let expenses = vec![
            expense("Travel", 1_000, ExpenseStatus::Approved),
            expense("travel ", 500, ExpenseStatus::Approved),
            expense("Meals", 250, ExpenseStatus::Approved),
        ];
        let snapshot = build_snapshot(budget(Some(100_000)), &expenses).unwrap();
        assert_eq!(
            snapshot.categories_usage,
            vec![
                CategoryUsage {
                    name: "Meals".to_string(),
                    limit: None,
                    spent: MoneyCents::new(250),
                },
                CategoryUsage {
                    name: "Travel".to_string(),
                    limit: None,
                    spent: MoneyCents::new(1_500),
                },
            ]
        );
        assert_eq!(snapshot.remaining_total, Some(MoneyCents::new(98_250)));
    }

    #[test]
    fn declared_categories_default_to_zero() {
        let mut config = budget(Some(1_000));
        config.categories = Some(vec![
            BudgetCategory {
                name: "TRAVEL".to_string(),
                limit: Some(MoneyCents::new(800)),
            },
            BudgetCategory {
                name: "Software".to_string(),
                limit: None,
            },
        ]);
        let expenses = vec![
            expense("travel", 1_200, ExpenseStatus::Approved),
            expense("Hardware", 300, ExpenseStatus::Approved),
        ];
        let snapshot = build_snapshot(config, &expenses).unwrap();
        assert_eq!(snapshot.categories_usage.len(), 2);
        assert_eq!(snapshot.categories_usage[0].spent, MoneyCents::new(1_200));
        assert_eq!(snapshot.categories_usage[0].limit, Some(MoneyCents::new(800)));
        assert_eq!(snapshot.categories_usage[1].spent, MoneyCents::ZERO);
        // Undeclared spend still counts toward the total.
        assert_eq!(snapshot.spent_total, MoneyCents::new(1_500));
        assert_eq!(snapshot.remaining_total, Some(MoneyCents::new(-500)));
    }

    #[test]
    fn warn_threshold_uses_exact_ratio() {
        let mut config = budget(Some(10_000));
        config.warn_threshold = Some(Decimal::new(8, 1));
        let below = build_snapshot(
            config.clone(),
            &[expense("Travel", 7_999, ExpenseStatus::Approved)],
        )
        .unwrap();
        assert_eq!(below.warn_reached, Some(false));
        let at = build_snapshot(config, &[expense("Travel", 8_000, ExpenseStatus::Approved)])
            .unwrap();
        assert_eq!(at.warn_reached, Some(true));
    }

    #[test]
    fn currency_guard() {
        let config = budget(None);
        assert!(ensure_budget_currency(None, Currency::parse("EUR").unwrap()).is_ok());
        assert!(ensure_budget_currency(Some(&config), usd()).is_ok());
        assert_eq!(
            ensure_budget_currency(Some(&config), Currency::parse("EUR").unwrap()),
            Err(LedgerError::BudgetCurrencyMismatch {
                budget: "USD".to_string(),
                expense: "EUR".to_string(),
            })
        );
    }
}
