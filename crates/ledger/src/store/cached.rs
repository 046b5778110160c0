use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    Expense, ExpenseAttachment, ExpenseFilter, ExpensePatch, ExpenseStatus, NewAttachment,
    NewExpense, ResultLedger,
};

use super::{ExpenseStore, IdempotentOutcome, PrepareFn};

#[derive(Clone, Debug)]
struct CachedTotals {
    totals: BTreeMap<String, i64>,
    created_at: Instant,
}

/// TTL cache in front of [`ExpenseStore::aggregate_by_category`].
///
/// Entries are keyed by the serialized filter. Every write that goes
/// through the decorator clears the whole cache; writes that reach the
/// inner store another way are only picked up once entries expire.
#[derive(Debug)]
pub struct CachedAggregates<S> {
    inner: S,
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CachedTotals>>,
}

impl<S: ExpenseStore> CachedAggregates<S> {
    pub fn new(inner: S, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            ttl,
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub async fn invalidate(&self) {
        self.entries.lock().await.clear();
    }

    async fn lookup(&self, key: &str) -> Option<BTreeMap<String, i64>> {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, v| v.created_at.elapsed() <= self.ttl);
        entries.get(key).map(|e| e.totals.clone())
    }

    async fn remember(&self, key: String, totals: BTreeMap<String, i64>) {
        if self.max_entries == 0 {
            return;
        }
        let mut entries = self.entries.lock().await;
        entries.retain(|_, v| v.created_at.elapsed() <= self.ttl);
        if entries.len() >= self.max_entries
            && let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, v)| v.created_at)
                .map(|(k, _)| k.clone())
        {
            entries.remove(&oldest);
        }
        entries.insert(
            key,
            CachedTotals {
                totals,
                created_at: Instant::now(),
            },
        );
    }
}

#[async_trait]
impl<S: ExpenseStore> ExpenseStore for CachedAggregates<S> {
    async fn create(
        &self,
        expense: NewExpense,
        attachments: Vec<NewAttachment>,
        actor_id: &str,
    ) -> ResultLedger<Expense> {
        let created = self.inner.create(expense, attachments, actor_id).await?;
        self.invalidate().await;
        Ok(created)
    }

    async fn get_by_id(&self, id: Uuid) -> ResultLedger<Option<Expense>> {
        self.inner.get_by_id(id).await
    }

    async fn attachments(&self, expense_id: Uuid) -> ResultLedger<Vec<ExpenseAttachment>> {
        self.inner.attachments(expense_id).await
    }

    async fn list(&self, filter: &ExpenseFilter) -> ResultLedger<Vec<Expense>> {
        self.inner.list(filter).await
    }

    async fn update(&self, id: Uuid, patch: ExpensePatch) -> ResultLedger<Option<Expense>> {
        let updated = self.inner.update(id, patch).await?;
        self.invalidate().await;
        Ok(updated)
    }

    async fn change_status(
        &self,
        id: Uuid,
        next: ExpenseStatus,
        actor_id: &str,
    ) -> ResultLedger<Option<Expense>> {
        let updated = self.inner.change_status(id, next, actor_id).await?;
        self.invalidate().await;
        Ok(updated)
    }

    async fn aggregate_by_category(
        &self,
        filter: &ExpenseFilter,
    ) -> ResultLedger<BTreeMap<String, i64>> {
        let key = filter.cache_key();
        if let Some(totals) = self.lookup(&key).await {
            tracing::debug!(key, "aggregate served from cache");
            return Ok(totals);
        }
        let totals = self.inner.aggregate_by_category(filter).await?;
        self.remember(key, totals.clone()).await;
        Ok(totals)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> ResultLedger<Option<Expense>> {
        self.inner.find_by_idempotency_key(key).await
    }

    async fn with_idempotency<'a>(
        &'a self,
        key: Option<&'a str>,
        prepare: PrepareFn<'a>,
    ) -> ResultLedger<IdempotentOutcome> {
        let outcome = self.inner.with_idempotency(key, prepare).await?;
        if !outcome.is_replay() {
            self.invalidate().await;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::store::MemoryExpenseStore;
    use crate::{Currency, MoneyCents};

    fn travel(cents: i64) -> NewExpense {
        NewExpense {
            workspace_id: "ws".to_string(),
            project_id: "p1".to_string(),
            task_id: None,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            amount: MoneyCents::new(cents),
            currency: Currency::parse("USD").unwrap(),
            category: "Travel".to_string(),
            description: None,
            vendor: None,
            payment_method: None,
            tax_amount: None,
            status: ExpenseStatus::Approved,
        }
    }

    #[tokio::test]
    async fn repeated_aggregates_hit_the_cache() {
        let store = CachedAggregates::new(MemoryExpenseStore::new(), Duration::from_secs(60), 8);
        store.create(travel(1_000), Vec::new(), "alice").await.unwrap();

        let filter = ExpenseFilter::new().project("p1");
        let first = store.aggregate_by_category(&filter).await.unwrap();
        assert_eq!(first.get("travel"), Some(&1_000));

        // Bypasses the decorator, so the cached value survives.
        store.inner().create(travel(500), Vec::new(), "alice").await.unwrap();
        let cached = store.aggregate_by_category(&filter).await.unwrap();
        assert_eq!(cached, first);

        store.create(travel(250), Vec::new(), "alice").await.unwrap();
        let fresh = store.aggregate_by_category(&filter).await.unwrap();
        assert_eq!(fresh.get("travel"), Some(&1_750));
    }

    #[tokio::test]
    async fn expired_entries_are_recomputed() {
        let store = CachedAggregates::new(MemoryExpenseStore::new(), Duration::ZERO, 8);
        let filter = ExpenseFilter::new();
        assert!(store.aggregate_by_category(&filter).await.unwrap().is_empty());

        store.inner().create(travel(300), Vec::new(), "alice").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let totals = store.aggregate_by_category(&filter).await.unwrap();
        assert_eq!(totals.get("travel"), Some(&300));
    }

    #[tokio::test]
    async fn oldest_entry_is_evicted_at_capacity() {
        let store = CachedAggregates::new(MemoryExpenseStore::new(), Duration::from_secs(60), 2);
        for project in ["a", "b", "c"] {
            store
                .aggregate_by_category(&ExpenseFilter::new().project(project))
                .await
                .unwrap();
        }
        assert_eq!(store.entries.lock().await.len(), 2);
    }
}
