use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::locks::KeyedLocks;
use crate::{
    BudgetRecord, Expense, ExpenseAttachment, ExpenseFilter, ExpensePatch, ExpenseStatus,
    NewAttachment, NewExpense, ResultLedger,
};

use super::{
    BudgetStore, ExpenseStore, IdempotentOutcome, PrepareFn, sum_by_category, usable_key,
};

/// Resident expense ledger.
///
/// Reads are a linear scan over the records, which is also why this backend
/// does not need an aggregation cache.
#[derive(Debug, Default)]
pub struct MemoryExpenseStore {
    expenses: RwLock<Vec<Expense>>,
    attachments: RwLock<Vec<ExpenseAttachment>>,
    idempotency: RwLock<HashMap<String, Uuid>>,
    key_locks: KeyedLocks,
}

impl MemoryExpenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored expenses.
    pub async fn len(&self) -> usize {
        self.expenses.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.expenses.read().await.is_empty()
    }
}

#[async_trait]
impl ExpenseStore for MemoryExpenseStore {
    async fn create(
        &self,
        expense: NewExpense,
        attachments: Vec<NewAttachment>,
        actor_id: &str,
    ) -> ResultLedger<Expense> {
        let now = Utc::now();
        let expense = expense.into_expense(actor_id, now);
        let rows: Vec<ExpenseAttachment> = attachments
            .into_iter()
            .map(|a| a.into_attachment(expense.id, now))
            .collect();

        // Both locks are held together so readers never see a half-created
        // expense.
        let mut expenses = self.expenses.write().await;
        let mut stored = self.attachments.write().await;
        expenses.push(expense.clone());
        stored.extend(rows);
        Ok(expense)
    }

    async fn get_by_id(&self, id: Uuid) -> ResultLedger<Option<Expense>> {
        Ok(self
            .expenses
            .read()
            .await
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn attachments(&self, expense_id: Uuid) -> ResultLedger<Vec<ExpenseAttachment>> {
        Ok(self
            .attachments
            .read()
            .await
            .iter()
            .filter(|a| a.expense_id == expense_id)
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &ExpenseFilter) -> ResultLedger<Vec<Expense>> {
        let mut found: Vec<Expense> = self
            .expenses
            .read()
            .await
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        found.sort_by(|a, b| (a.date, a.created_at).cmp(&(b.date, b.created_at)));
        Ok(found)
    }

    async fn update(&self, id: Uuid, patch: ExpensePatch) -> ResultLedger<Option<Expense>> {
        let mut expenses = self.expenses.write().await;
        let Some(expense) = expenses.iter_mut().find(|e| e.id == id) else {
            return Ok(None);
        };
        patch.apply(expense, Utc::now());
        Ok(Some(expense.clone()))
    }

    async fn change_status(
        &self,
        id: Uuid,
        next: ExpenseStatus,
        _actor_id: &str,
    ) -> ResultLedger<Option<Expense>> {
        let mut expenses = self.expenses.write().await;
        let Some(expense) = expenses.iter_mut().find(|e| e.id == id) else {
            return Ok(None);
        };
        if expense.status != next {
            expense.status = next;
            expense.updated_at = Utc::now();
        }
        Ok(Some(expense.clone()))
    }

    async fn aggregate_by_category(
        &self,
        filter: &ExpenseFilter,
    ) -> ResultLedger<BTreeMap<String, i64>> {
        let matching = self.list(filter).await?;
        sum_by_category(&matching)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> ResultLedger<Option<Expense>> {
        let Some(key) = usable_key(Some(key)) else {
            return Ok(None);
        };
        let recorded = self.idempotency.read().await.get(key).copied();
        match recorded {
            Some(id) => self.get_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn with_idempotency<'a>(
        &'a self,
        key: Option<&'a str>,
        prepare: PrepareFn<'a>,
    ) -> ResultLedger<IdempotentOutcome> {
        let Some(key) = usable_key(key) else {
            let pending = prepare().await?;
            return self
                .create(pending.expense, pending.attachments, &pending.actor_id)
                .await
                .map(IdempotentOutcome::Created);
        };

        let _guard = self.key_locks.acquire(key).await;
        if let Some(existing) = self.find_by_idempotency_key(key).await? {
            return Ok(IdempotentOutcome::Replayed(existing));
        }

        let pending = prepare().await?;
        let expense = self
            .create(pending.expense, pending.attachments, &pending.actor_id)
            .await?;
        // A key left pointing at a missing expense is overwritten.
        self.idempotency
            .write()
            .await
            .insert(key.to_string(), expense.id);
        Ok(IdempotentOutcome::Created(expense))
    }
}

/// Resident budget records, one per project.
#[derive(Debug, Default)]
pub struct MemoryBudgetStore {
    budgets: RwLock<HashMap<String, BudgetRecord>>,
}

impl MemoryBudgetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BudgetStore for MemoryBudgetStore {
    async fn get(&self, project_id: &str) -> ResultLedger<Option<BudgetRecord>> {
        Ok(self.budgets.read().await.get(project_id).cloned())
    }

    async fn put(&self, record: BudgetRecord) -> ResultLedger<()> {
        let project_id = record.budget().project_id.clone();
        self.budgets.write().await.insert(project_id, record);
        Ok(())
    }
}
