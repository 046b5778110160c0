use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry, EntityRef};
use crate::events::{DomainEvent, EventType};
use crate::money::parse_amount;
use crate::snapshot::ensure_budget_currency;
use crate::store::{IdempotentOutcome, PendingCreate, PrepareFn, PrepareFuture};
use crate::util::{ensure_not_future, normalize_date, normalize_optional_text, require_non_empty};
use crate::{
    BudgetRecord, CreateExpenseCmd, Currency, Expense, ExpenseAttachment, ExpenseFilter,
    ExpensePatch, ExpenseStatus, LedgerError, MoneyCents, NewAttachment, NewExpense,
    NumericInput, ResultLedger, UpdateExpenseCmd, assert_transition, normalize_currency,
};

use super::{FinanceService, payload};

fn positive_amount(input: &NumericInput) -> ResultLedger<MoneyCents> {
    let amount = parse_amount(input)?;
    if !amount.is_positive() {
        return Err(LedgerError::AmountNotPositive(amount.to_string()));
    }
    Ok(amount)
}

/// Tax may be zero but never negative.
fn parse_tax(input: &NumericInput) -> ResultLedger<MoneyCents> {
    let tax = parse_amount(input).map_err(|_| {
        LedgerError::InvalidTax(format!("\"{input}\" is not a non-negative decimal"))
    })?;
    if tax.is_negative() {
        return Err(LedgerError::InvalidTax(format!("{tax} is negative")));
    }
    Ok(tax)
}

impl FinanceService {
    /// Records an expense and recomputes the project's budget.
    ///
    /// With an idempotency key, a retry returns the expense created by the
    /// first call and has no further side effects.
    pub async fn create_expense(
        &self,
        cmd: CreateExpenseCmd,
        actor_id: &str,
    ) -> ResultLedger<Expense> {
        // A known key replays before anything else is looked at.
        if let Some(key) = cmd.idempotency_key.as_deref()
            && let Some(existing) = self.expenses.find_by_idempotency_key(key).await?
        {
            tracing::debug!(expense_id = %existing.id, "idempotent replay");
            return Ok(existing);
        }

        let project_id = require_non_empty(&cmd.project_id, "project_id")?;
        let _project = self.project_locks.acquire(&project_id).await;

        let key = cmd.idempotency_key.clone();
        let prepare: PrepareFn<'_> =
            Box::new(move || Box::pin(self.prepare_expense(cmd, actor_id)) as PrepareFuture<'_>);
        let expense = match self.expenses.with_idempotency(key.as_deref(), prepare).await? {
            IdempotentOutcome::Replayed(existing) => {
                tracing::debug!(expense_id = %existing.id, "idempotent replay");
                return Ok(existing);
            }
            IdempotentOutcome::Created(expense) => expense,
        };

        self.audit
            .record(
                AuditEntry::new(actor_id, AuditAction::ExpenseCreated, EntityRef::expense(expense.id))
                    .project(&expense.project_id)
                    .workspace(&expense.workspace_id)
                    .after(&expense),
            )
            .await?;
        self.events
            .publish(DomainEvent::new(
                EventType::ExpenseCreated,
                expense.id.to_string(),
                payload(&expense)?,
            ))
            .await?;
        self.engine.recalculate_budget(&expense.project_id).await?;

        tracing::info!(
            expense_id = %expense.id,
            project_id = %expense.project_id,
            amount = %expense.amount,
            status = %expense.status,
            "expense created"
        );
        Ok(expense)
    }

    /// Validates a create command into what the store will write.
    async fn prepare_expense(
        &self,
        cmd: CreateExpenseCmd,
        actor_id: &str,
    ) -> ResultLedger<PendingCreate> {
        let workspace_id = require_non_empty(&cmd.workspace_id, "workspace_id")?;
        let project_id = require_non_empty(&cmd.project_id, "project_id")?;
        let amount = positive_amount(&cmd.amount)?;
        let currency = normalize_currency(&cmd.currency)?;
        let tax_amount = cmd.tax_amount.as_ref().map(parse_tax).transpose()?;
        let date = normalize_date(&cmd.date)?;
        let status = cmd
            .status
            .as_deref()
            .map(ExpenseStatus::parse)
            .transpose()?
            .unwrap_or_default();
        ensure_not_future(date, Utc::now(), self.config.future_date_tolerance())?;
        self.ensure_project_currency(&project_id, currency).await?;

        let attachments = cmd
            .attachments
            .into_iter()
            .map(|a| {
                Ok(NewAttachment::new(
                    require_non_empty(&a.filename, "attachment filename")?,
                    require_non_empty(&a.url, "attachment url")?,
                ))
            })
            .collect::<ResultLedger<Vec<_>>>()?;

        let expense = NewExpense {
            workspace_id,
            project_id,
            task_id: normalize_optional_text(cmd.task_id.as_deref()),
            date,
            amount,
            currency,
            category: require_non_empty(&cmd.category, "category")?,
            description: normalize_optional_text(cmd.description.as_deref()),
            vendor: normalize_optional_text(cmd.vendor.as_deref()),
            payment_method: normalize_optional_text(cmd.payment_method.as_deref()),
            tax_amount,
            status,
        };
        Ok(PendingCreate::new(expense, attachments, actor_id))
    }

    async fn ensure_project_currency(&self, project_id: &str, currency: Currency) -> ResultLedger<()> {
        let record = self.budgets.get(project_id).await?;
        ensure_budget_currency(record.as_ref().map(BudgetRecord::budget), currency)
    }

    async fn require_expense(&self, id: Uuid) -> ResultLedger<Expense> {
        self.expenses
            .get_by_id(id)
            .await?
            .ok_or_else(|| LedgerError::ExpenseNotFound(id.to_string()))
    }

    /// Applies a partial update.
    ///
    /// Every touched field is validated on its own. A status change goes
    /// through the transition table and is audited as
    /// `expense.status_changed`.
    pub async fn update_expense(
        &self,
        id: Uuid,
        cmd: UpdateExpenseCmd,
        actor_id: &str,
    ) -> ResultLedger<Expense> {
        let project_id = self.require_expense(id).await?.project_id;
        let _project = self.project_locks.acquire(&project_id).await;
        // Re-read under the lock.
        let before = self.require_expense(id).await?;

        let patch = self.build_patch(&before, cmd).await?;
        if patch.is_empty() {
            return Ok(before);
        }
        let affects_budget = patch.date.is_some()
            || patch.amount.is_some()
            || patch.currency.is_some()
            || patch.category.is_some()
            || patch.tax_amount.is_some()
            || patch.status.is_some();

        let after = self
            .expenses
            .update(id, patch)
            .await?
            .ok_or_else(|| LedgerError::ExpenseNotFound(id.to_string()))?;

        let status_changed = before.status != after.status;
        let action = if status_changed {
            AuditAction::ExpenseStatusChanged
        } else {
            AuditAction::ExpenseUpdated
        };
        self.audit
            .record(
                AuditEntry::new(actor_id, action, EntityRef::expense(id))
                    .project(&after.project_id)
                    .workspace(&after.workspace_id)
                    .before(&before)
                    .after(&after),
            )
            .await?;
        if status_changed {
            self.publish_status_change(&before, &after).await?;
        }
        if affects_budget {
            self.engine.recalculate_budget(&after.project_id).await?;
        }

        tracing::info!(expense_id = %id, status_changed, "expense updated");
        Ok(after)
    }

    async fn build_patch(&self, current: &Expense, cmd: UpdateExpenseCmd) -> ResultLedger<ExpensePatch> {
        let mut patch = ExpensePatch {
            task_id: cmd.task_id.map(|t| normalize_optional_text(t.as_deref())),
            description: cmd.description.map(|d| normalize_optional_text(d.as_deref())),
            vendor: cmd.vendor.map(|v| normalize_optional_text(v.as_deref())),
            payment_method: cmd
                .payment_method
                .map(|p| normalize_optional_text(p.as_deref())),
            ..ExpensePatch::default()
        };
        if let Some(raw) = cmd.date {
            let date = normalize_date(&raw)?;
            ensure_not_future(date, Utc::now(), self.config.future_date_tolerance())?;
            patch.date = Some(date);
        }
        if let Some(amount) = cmd.amount {
            patch.amount = Some(positive_amount(&amount)?);
        }
        if let Some(raw) = cmd.currency {
            let currency = normalize_currency(&raw)?;
            self.ensure_project_currency(&current.project_id, currency)
                .await?;
            patch.currency = Some(currency);
        }
        if let Some(category) = cmd.category {
            patch.category = Some(require_non_empty(&category, "category")?);
        }
        if let Some(tax) = cmd.tax_amount {
            patch.tax_amount = Some(tax.as_ref().map(parse_tax).transpose()?);
        }
        if let Some(raw) = cmd.status {
            let next = ExpenseStatus::parse(&raw)?;
            assert_transition(current.status, next)?;
            patch.status = Some(next);
        }
        Ok(patch)
    }

    /// Moves an expense to `next` through the transition table.
    ///
    /// Asking for the current status returns the record unchanged and
    /// records nothing.
    pub async fn change_expense_status(
        &self,
        id: Uuid,
        next: ExpenseStatus,
        actor_id: &str,
    ) -> ResultLedger<Expense> {
        let project_id = self.require_expense(id).await?.project_id;
        let _project = self.project_locks.acquire(&project_id).await;
        let before = self.require_expense(id).await?;
        if before.status == next {
            return Ok(before);
        }
        assert_transition(before.status, next)?;

        let after = self
            .expenses
            .change_status(id, next, actor_id)
            .await?
            .ok_or_else(|| LedgerError::ExpenseNotFound(id.to_string()))?;

        self.audit
            .record(
                AuditEntry::new(actor_id, AuditAction::ExpenseStatusChanged, EntityRef::expense(id))
                    .project(&after.project_id)
                    .workspace(&after.workspace_id)
                    .before(&before)
                    .after(&after),
            )
            .await?;
        self.publish_status_change(&before, &after).await?;
        self.engine.recalculate_budget(&after.project_id).await?;

        tracing::info!(expense_id = %id, from = %before.status, to = %next, "expense status changed");
        Ok(after)
    }

    async fn publish_status_change(&self, before: &Expense, after: &Expense) -> ResultLedger<()> {
        self.events
            .publish(DomainEvent::new(
                EventType::ExpenseStatusChanged,
                after.id.to_string(),
                serde_json::json!({
                    "project_id": after.project_id,
                    "from": before.status.as_str(),
                    "to": after.status.as_str(),
                }),
            ))
            .await
    }

    pub async fn get_expense(&self, id: Uuid) -> ResultLedger<Expense> {
        self.require_expense(id).await
    }

    /// Expenses matching `filter`, ordered by date then creation time.
    pub async fn list_expenses(&self, filter: &ExpenseFilter) -> ResultLedger<Vec<Expense>> {
        self.expenses.list(filter).await
    }

    pub async fn expense_attachments(&self, id: Uuid) -> ResultLedger<Vec<ExpenseAttachment>> {
        self.require_expense(id).await?;
        self.expenses.attachments(id).await
    }

    /// Spend per lowercased category over the expenses matching `filter`.
    ///
    /// Results may be served from the aggregation cache.
    pub async fn spend_by_category(
        &self,
        filter: &ExpenseFilter,
    ) -> ResultLedger<BTreeMap<String, MoneyCents>> {
        Ok(self
            .expenses
            .aggregate_by_category(filter)
            .await?
            .into_iter()
            .map(|(category, cents)| (category, MoneyCents::new(cents)))
            .collect())
    }
}
