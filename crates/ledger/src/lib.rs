//! Expense ledger and budget tracking.
//!
//! [`FinanceService`] is the entry point. It records expenses against
//! projects, moves them through the approval lifecycle
//! (`draft → pending → approved → payable → closed`) and keeps a budget
//! snapshot per project in step with the ledger. Amounts are integer cents
//! ([`MoneyCents`]) end to end.
//!
//! Storage is pluggable through [`store::ExpenseStore`] and
//! [`store::BudgetStore`]; resident and sea-orm backed implementations are
//! provided.

pub use attachments::{ExpenseAttachment, NewAttachment};
pub use audit::{AuditAction, AuditEntry, AuditSink, EntityRef};
pub use budgets::{
    BudgetCategory, BudgetRecord, CategoryUsage, ProjectBudget, ProjectBudgetSnapshot,
};
pub use commands::{BudgetCategoryInput, CreateExpenseCmd, UpdateExpenseCmd, UpsertBudgetCmd};
pub use config::LedgerConfig;
pub use currency::{Currency, normalize_currency};
pub use error::LedgerError;
pub use events::{DomainEvent, EventSink, EventType};
pub use expenses::{Expense, ExpensePatch, NewExpense};
pub use filters::ExpenseFilter;
pub use money::{
    MoneyCents, NumericInput, amount_to_cents, cents_to_amount, normalize_amount, parse_amount,
};
pub use ops::{FinanceService, FinanceServiceBuilder};
pub use sinks::{MemorySink, SeaSink};
pub use snapshot::{BudgetEngine, build_snapshot, ensure_budget_currency};
pub use status::{ExpenseStatus, assert_transition};

mod attachments;
mod audit;
mod budgets;
mod commands;
mod config;
mod currency;
mod error;
mod events;
mod expenses;
mod filters;
mod idempotency_keys;
mod locks;
mod money;
mod ops;
mod sinks;
mod snapshot;
mod status;
pub mod store;
mod util;

pub type ResultLedger<T> = Result<T, LedgerError>;
