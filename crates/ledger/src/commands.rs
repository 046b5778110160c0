//! Command structs for service operations.
//!
//! Fields carry caller input as received (amounts as [`NumericInput`], dates
//! and statuses as text). The service normalizes and validates them.

use crate::{NewAttachment, NumericInput};

/// Record a new expense.
#[derive(Clone, Debug)]
pub struct CreateExpenseCmd {
    pub workspace_id: String,
    pub project_id: String,
    pub amount: NumericInput,
    pub currency: String,
    pub category: String,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp.
    pub date: String,
    pub task_id: Option<String>,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub payment_method: Option<String>,
    pub tax_amount: Option<NumericInput>,
    /// Defaults to `draft`.
    pub status: Option<String>,
    pub attachments: Vec<NewAttachment>,
    pub idempotency_key: Option<String>,
}

impl CreateExpenseCmd {
    #[must_use]
    pub fn new(
        workspace_id: impl Into<String>,
        project_id: impl Into<String>,
        amount: impl Into<NumericInput>,
        currency: impl Into<String>,
        category: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            project_id: project_id.into(),
            amount: amount.into(),
            currency: currency.into(),
            category: category.into(),
            date: date.into(),
            task_id: None,
            description: None,
            vendor: None,
            payment_method: None,
            tax_amount: None,
            status: None,
            attachments: Vec::new(),
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    #[must_use]
    pub fn payment_method(mut self, payment_method: impl Into<String>) -> Self {
        self.payment_method = Some(payment_method.into());
        self
    }

    #[must_use]
    pub fn tax_amount(mut self, tax: impl Into<NumericInput>) -> Self {
        self.tax_amount = Some(tax.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    #[must_use]
    pub fn attachment(mut self, attachment: NewAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Partial update of an expense.
///
/// `None` leaves a field untouched; `Some(None)` clears a clearable field.
#[derive(Clone, Debug, Default)]
pub struct UpdateExpenseCmd {
    pub task_id: Option<Option<String>>,
    pub date: Option<String>,
    pub amount: Option<NumericInput>,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub description: Option<Option<String>>,
    pub vendor: Option<Option<String>>,
    pub payment_method: Option<Option<String>>,
    pub tax_amount: Option<Option<NumericInput>>,
    pub status: Option<String>,
}

impl UpdateExpenseCmd {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn task_id(mut self, task_id: Option<String>) -> Self {
        self.task_id = Some(task_id);
        self
    }

    #[must_use]
    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    #[must_use]
    pub fn amount(mut self, amount: impl Into<NumericInput>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    #[must_use]
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    #[must_use]
    pub fn vendor(mut self, vendor: Option<String>) -> Self {
        self.vendor = Some(vendor);
        self
    }

    #[must_use]
    pub fn payment_method(mut self, payment_method: Option<String>) -> Self {
        self.payment_method = Some(payment_method);
        self
    }

    #[must_use]
    pub fn tax_amount(mut self, tax: Option<NumericInput>) -> Self {
        self.tax_amount = Some(tax);
        self
    }

    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// A category row of a budget upsert.
#[derive(Clone, Debug)]
pub struct BudgetCategoryInput {
    pub name: String,
    pub limit: Option<NumericInput>,
}

impl BudgetCategoryInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limit: None,
        }
    }

    #[must_use]
    pub fn limit(mut self, limit: impl Into<NumericInput>) -> Self {
        self.limit = Some(limit.into());
        self
    }
}

/// Create or replace a project's budget configuration.
#[derive(Clone, Debug)]
pub struct UpsertBudgetCmd {
    pub currency: String,
    pub total: Option<NumericInput>,
    /// Fraction of `total` in `[0, 1]`.
    pub warn_threshold: Option<NumericInput>,
    pub categories: Option<Vec<BudgetCategoryInput>>,
}

impl UpsertBudgetCmd {
    #[must_use]
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            total: None,
            warn_threshold: None,
            categories: None,
        }
    }

    #[must_use]
    pub fn total(mut self, total: impl Into<NumericInput>) -> Self {
        self.total = Some(total.into());
        self
    }

    #[must_use]
    pub fn warn_threshold(mut self, threshold: impl Into<NumericInput>) -> Self {
        self.warn_threshold = Some(threshold.into());
        self
    }

    #[must_use]
    pub fn categories(mut self, categories: impl IntoIterator<Item = BudgetCategoryInput>) -> Self {
        self.categories = Some(categories.into_iter().collect());
        self
    }
}
