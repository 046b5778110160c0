use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::expenses::category_key;
use crate::{Expense, ExpenseStatus};

/// Filters for listing and aggregating expenses.
///
/// Every present field must match (conjunction). `date_from` and `date_to`
/// are both inclusive. `category` compares case-insensitively and `search`
/// is a case-insensitive substring match over `vendor + " " + description`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseFilter {
    pub workspace_id: Option<String>,
    pub project_id: Option<String>,
    /// If present, acts as an allow-list of statuses to return.
    pub statuses: Option<Vec<ExpenseStatus>>,
    pub category: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
}

impl ExpenseFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    #[must_use]
    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: ExpenseStatus) -> Self {
        self.statuses = Some(vec![status]);
        self
    }

    #[must_use]
    pub fn statuses(mut self, statuses: impl IntoIterator<Item = ExpenseStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn date_from(mut self, date: NaiveDate) -> Self {
        self.date_from = Some(date);
        self
    }

    #[must_use]
    pub fn date_to(mut self, date: NaiveDate) -> Self {
        self.date_to = Some(date);
        self
    }

    #[must_use]
    pub fn search(mut self, needle: impl Into<String>) -> Self {
        self.search = Some(needle.into());
        self
    }

    /// Stable textual form, used as the aggregation cache key.
    pub(crate) fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }

    pub fn matches(&self, expense: &Expense) -> bool {
        if let Some(workspace_id) = &self.workspace_id
            && &expense.workspace_id != workspace_id
        {
            return false;
        }
        if let Some(project_id) = &self.project_id
            && &expense.project_id != project_id
        {
            return false;
        }
        if let Some(statuses) = &self.statuses
            && !statuses.contains(&expense.status)
        {
            return false;
        }
        if let Some(category) = &self.category
            && category_key(category) != expense.category_key()
        {
            return false;
        }
        if self.date_from.is_some_and(|from| expense.date < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| expense.date > to) {
            return false;
        }
        if let Some(needle) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let haystack = format!(
                "{} {}",
                expense.vendor.as_deref().unwrap_or_default(),
                expense.description.as_deref().unwrap_or_default()
            )
            .to_lowercase();
            if !haystack.contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::{Currency, MoneyCents};

    fn expense(project: &str, status: ExpenseStatus, date: (i32, u32, u32)) -> Expense {
        let now = Utc::now();
        Expense {
            id: Uuid::new_v4(),
            workspace_id: "ws".to_string(),
            project_id: project.to_string(),
            task_id: None,
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            amount: MoneyCents::new(1000),
            currency: Currency::parse("USD").unwrap(),
            category: "Travel".to_string(),
            description: Some("Flight to Berlin".to_string()),
            vendor: Some("Lufthansa".to_string()),
            payment_method: None,
            tax_amount: None,
            status,
            created_by: "alice".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn all_predicates_must_hold() {
        let filter = ExpenseFilter::new()
            .project("p1")
            .status(ExpenseStatus::Approved)
            .date_from(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .date_to(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());

        assert!(filter.matches(&expense("p1", ExpenseStatus::Approved, (2024, 1, 1))));
        assert!(filter.matches(&expense("p1", ExpenseStatus::Approved, (2024, 1, 31))));
        assert!(!filter.matches(&expense("p2", ExpenseStatus::Approved, (2024, 1, 10))));
        assert!(!filter.matches(&expense("p1", ExpenseStatus::Pending, (2024, 1, 10))));
        assert!(!filter.matches(&expense("p1", ExpenseStatus::Approved, (2024, 2, 1))));
        assert!(!filter.matches(&expense("p1", ExpenseStatus::Approved, (2023, 12, 31))));
    }

    #[test]
    fn search_spans_vendor_and_description() {
        let e = expense("p1", ExpenseStatus::Draft, (2024, 1, 5));
        assert!(ExpenseFilter::new().search("lufthansa").matches(&e));
        assert!(ExpenseFilter::new().search("BERLIN").matches(&e));
        assert!(ExpenseFilter::new().search("hansa flight").matches(&e));
        assert!(!ExpenseFilter::new().search("hotel").matches(&e));
    }

    #[test]
    fn category_is_case_insensitive() {
        let e = expense("p1", ExpenseStatus::Draft, (2024, 1, 5));
        assert!(ExpenseFilter::new().category("travel").matches(&e));
        assert!(!ExpenseFilter::new().category("meals").matches(&e));
    }
}
