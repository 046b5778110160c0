//! Storage contracts and their implementations.
//!
//! - [`MemoryExpenseStore`] / [`MemoryBudgetStore`]: resident, per-instance
//!   state. Useful for tests and single-process hosts.
//! - [`SeaExpenseStore`] / [`SeaBudgetStore`]: durable, on a sea-orm
//!   connection migrated by the `migration` crate.
//! - [`CachedAggregates`]: decorator adding a TTL cache in front of
//!   [`ExpenseStore::aggregate_by_category`].

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    BudgetRecord, Expense, ExpenseAttachment, ExpenseFilter, ExpensePatch, ExpenseStatus,
    NewAttachment, NewExpense, ResultLedger,
};

mod cached;
mod memory;
mod sea;

pub use cached::CachedAggregates;
pub use memory::{MemoryBudgetStore, MemoryExpenseStore};
pub use sea::{SeaBudgetStore, SeaExpenseStore};

/// A validated expense, produced only once the idempotency key is known to
/// be unused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCreate {
    pub expense: NewExpense,
    pub attachments: Vec<NewAttachment>,
    pub actor_id: String,
}

impl PendingCreate {
    pub fn new(
        expense: NewExpense,
        attachments: Vec<NewAttachment>,
        actor_id: impl Into<String>,
    ) -> Self {
        Self {
            expense,
            attachments,
            actor_id: actor_id.into(),
        }
    }
}

pub type PrepareFuture<'a> = Pin<Box<dyn Future<Output = ResultLedger<PendingCreate>> + Send + 'a>>;

/// Deferred validation, run at most once by [`ExpenseStore::with_idempotency`].
pub type PrepareFn<'a> = Box<dyn FnOnce() -> PrepareFuture<'a> + Send + 'a>;

/// Result of an idempotent create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdempotentOutcome {
    /// The expense was stored and recorded under the key.
    Created(Expense),
    /// The key already resolved to this expense; nothing was stored.
    Replayed(Expense),
}

impl IdempotentOutcome {
    pub fn expense(&self) -> &Expense {
        match self {
            Self::Created(expense) | Self::Replayed(expense) => expense,
        }
    }

    pub fn into_expense(self) -> Expense {
        match self {
            Self::Created(expense) | Self::Replayed(expense) => expense,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Replayed(_))
    }
}

/// Persistence contract for the expense ledger.
///
/// Lookups that miss return `Ok(None)`; errors are reserved for the backend
/// itself failing.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Stores the expense and its attachments as one unit.
    async fn create(
        &self,
        expense: NewExpense,
        attachments: Vec<NewAttachment>,
        actor_id: &str,
    ) -> ResultLedger<Expense>;

    async fn get_by_id(&self, id: Uuid) -> ResultLedger<Option<Expense>>;

    async fn attachments(&self, expense_id: Uuid) -> ResultLedger<Vec<ExpenseAttachment>>;

    /// Expenses matching `filter`, ordered by `(date, created_at)`.
    async fn list(&self, filter: &ExpenseFilter) -> ResultLedger<Vec<Expense>>;

    async fn update(&self, id: Uuid, patch: ExpensePatch) -> ResultLedger<Option<Expense>>;

    /// Returns the record untouched when it already has `next`.
    async fn change_status(
        &self,
        id: Uuid,
        next: ExpenseStatus,
        actor_id: &str,
    ) -> ResultLedger<Option<Expense>>;

    /// Cents per lowercased category over the expenses matching `filter`.
    async fn aggregate_by_category(
        &self,
        filter: &ExpenseFilter,
    ) -> ResultLedger<BTreeMap<String, i64>>;

    /// Expense recorded under `key`, if any. Blank keys resolve to nothing.
    async fn find_by_idempotency_key(&self, key: &str) -> ResultLedger<Option<Expense>>;

    /// Stores the expense `prepare` yields, at most once per non-blank `key`.
    ///
    /// `prepare` only runs when the key is unused. The expense and its key
    /// are recorded together: a caller that loses a race on the same key
    /// gets `Replayed` and leaves nothing behind.
    async fn with_idempotency<'a>(
        &'a self,
        key: Option<&'a str>,
        prepare: PrepareFn<'a>,
    ) -> ResultLedger<IdempotentOutcome>;
}

/// Persistence contract for project budgets.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn get(&self, project_id: &str) -> ResultLedger<Option<BudgetRecord>>;

    /// Replaces whatever is stored for the record's project.
    async fn put(&self, record: BudgetRecord) -> ResultLedger<()>;
}

/// Blank keys disable idempotency.
pub(crate) fn usable_key(key: Option<&str>) -> Option<&str> {
    key.map(str::trim).filter(|k| !k.is_empty())
}

pub(crate) fn sum_by_category(expenses: &[Expense]) -> ResultLedger<BTreeMap<String, i64>> {
    let mut totals: BTreeMap<String, i64> = BTreeMap::new();
    for expense in expenses {
        let entry = totals.entry(expense.category_key()).or_insert(0);
        *entry = entry.checked_add(expense.amount.cents()).ok_or_else(|| {
            crate::LedgerError::InvalidAmount("category total overflows".to_string())
        })?;
    }
    Ok(totals)
}
