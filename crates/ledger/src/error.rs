//! The module contains the errors the ledger can return.
//!
//! Validation failures carry a short human readable reason. Misses at the
//! store level are reported as `Option::None` and only become
//! [`ExpenseNotFound`] at the service boundary.
//!
//!  [`ExpenseNotFound`]: LedgerError::ExpenseNotFound
use sea_orm::DbErr;
use thiserror::Error;

use crate::ExpenseStatus;

/// Ledger custom errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),
    #[error("Invalid tax amount: {0}")]
    InvalidTax(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Invalid warn threshold: {0}")]
    InvalidWarnThreshold(String),
    #[error("Invalid status: {0}")]
    InvalidStatus(String),
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: ExpenseStatus,
        to: ExpenseStatus,
    },
    #[error("Amount must be positive: {0}")]
    AmountNotPositive(String),
    #[error("Budget currency is {budget}, got {expense}")]
    BudgetCurrencyMismatch { budget: String, expense: String },
    #[error("\"{0}\" expense not found!")]
    ExpenseNotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for LedgerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidCurrency(a), Self::InvalidCurrency(b)) => a == b,
            (Self::InvalidTax(a), Self::InvalidTax(b)) => a == b,
            (Self::InvalidDate(a), Self::InvalidDate(b)) => a == b,
            (Self::InvalidWarnThreshold(a), Self::InvalidWarnThreshold(b)) => a == b,
            (Self::InvalidStatus(a), Self::InvalidStatus(b)) => a == b,
            (
                Self::InvalidStatusTransition { from: f1, to: t1 },
                Self::InvalidStatusTransition { from: f2, to: t2 },
            ) => f1 == f2 && t1 == t2,
            (Self::AmountNotPositive(a), Self::AmountNotPositive(b)) => a == b,
            (
                Self::BudgetCurrencyMismatch {
                    budget: b1,
                    expense: e1,
                },
                Self::BudgetCurrencyMismatch {
                    budget: b2,
                    expense: e2,
                },
            ) => b1 == b2 && e1 == e2,
            (Self::ExpenseNotFound(a), Self::ExpenseNotFound(b)) => a == b,
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (Self::Storage(a), Self::Storage(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
