use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::Value;

use crate::audit::AuditSink;
use crate::events::EventSink;
use crate::locks::KeyedLocks;
use crate::sinks::{MemorySink, SeaSink};
use crate::snapshot::BudgetEngine;
use crate::store::{
    BudgetStore, CachedAggregates, ExpenseStore, MemoryBudgetStore, MemoryExpenseStore,
    SeaBudgetStore, SeaExpenseStore,
};
use crate::{LedgerConfig, LedgerError, ResultLedger};

mod budgets;
mod expenses;

/// Entry point for every ledger operation.
///
/// Writes to one project run one at a time: the mutation, its audit entry
/// and event, and the budget recompute happen under the project's lock.
pub struct FinanceService {
    expenses: Arc<dyn ExpenseStore>,
    budgets: Arc<dyn BudgetStore>,
    audit: Arc<dyn AuditSink>,
    events: Arc<dyn EventSink>,
    engine: BudgetEngine,
    config: LedgerConfig,
    project_locks: KeyedLocks,
}

impl FinanceService {
    /// Return a builder for `FinanceService`. Help to build the struct.
    pub fn builder() -> FinanceServiceBuilder {
        FinanceServiceBuilder::default()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn budget_engine(&self) -> &BudgetEngine {
        &self.engine
    }
}

fn payload(value: &impl Serialize) -> ResultLedger<Value> {
    serde_json::to_value(value).map_err(|err| LedgerError::Storage(err.to_string()))
}

/// The builder for `FinanceService`.
///
/// Without a database the service runs on resident stores. With one it
/// uses the sea-orm stores, with the aggregation cache in front of the
/// expense ledger. Explicitly set stores and sinks win over both.
#[derive(Default)]
pub struct FinanceServiceBuilder {
    database: Option<DatabaseConnection>,
    config: LedgerConfig,
    expense_store: Option<Arc<dyn ExpenseStore>>,
    budget_store: Option<Arc<dyn BudgetStore>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl FinanceServiceBuilder {
    /// Pass the database the durable stores run on.
    pub fn database(mut self, db: DatabaseConnection) -> FinanceServiceBuilder {
        self.database = Some(db);
        self
    }

    pub fn config(mut self, config: LedgerConfig) -> FinanceServiceBuilder {
        self.config = config;
        self
    }

    pub fn expense_store(mut self, store: Arc<dyn ExpenseStore>) -> FinanceServiceBuilder {
        self.expense_store = Some(store);
        self
    }

    pub fn budget_store(mut self, store: Arc<dyn BudgetStore>) -> FinanceServiceBuilder {
        self.budget_store = Some(store);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> FinanceServiceBuilder {
        self.audit_sink = Some(sink);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> FinanceServiceBuilder {
        self.event_sink = Some(sink);
        self
    }

    /// Construct `FinanceService`
    pub async fn build(self) -> ResultLedger<FinanceService> {
        let config = self.config;
        let (expenses, budgets, audit, events): (
            Arc<dyn ExpenseStore>,
            Arc<dyn BudgetStore>,
            Arc<dyn AuditSink>,
            Arc<dyn EventSink>,
        ) = match self.database {
            Some(db) => {
                db.ping().await?;
                let sink = Arc::new(SeaSink::new(db.clone()));
                let expenses: Arc<dyn ExpenseStore> = Arc::new(CachedAggregates::new(
                    SeaExpenseStore::new(db.clone()),
                    config.aggregate_cache_ttl(),
                    config.aggregate_cache_max_entries,
                ));
                let budgets: Arc<dyn BudgetStore> = Arc::new(SeaBudgetStore::new(db));
                let audit: Arc<dyn AuditSink> = sink.clone();
                let events: Arc<dyn EventSink> = sink;
                (expenses, budgets, audit, events)
            }
            None => {
                let sink = Arc::new(MemorySink::new());
                let expenses: Arc<dyn ExpenseStore> = Arc::new(MemoryExpenseStore::new());
                let budgets: Arc<dyn BudgetStore> = Arc::new(MemoryBudgetStore::new());
                let audit: Arc<dyn AuditSink> = sink.clone();
                let events: Arc<dyn EventSink> = sink;
                (expenses, budgets, audit, events)
            }
        };

        let expenses = self.expense_store.unwrap_or(expenses);
        let budgets = self.budget_store.unwrap_or(budgets);
        Ok(FinanceService {
            engine: BudgetEngine::new(Arc::clone(&expenses), Arc::clone(&budgets)),
            expenses,
            budgets,
            audit: self.audit_sink.unwrap_or(audit),
            events: self.event_sink.unwrap_or(events),
            config,
            project_locks: KeyedLocks::new(),
        })
    }
}
