//! Expense lifecycle.
//!
//! ```text
//! draft <-> pending <-> approved <-> payable -> closed
//! ```
//!
//! Forward edges approve, backward edges correct. `closed` is terminal.

use serde::{Deserialize, Serialize};

use crate::{LedgerError, ResultLedger};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    #[default]
    Draft,
    Pending,
    Approved,
    Payable,
    Closed,
}

impl ExpenseStatus {
    pub const ALL: [ExpenseStatus; 5] = [
        Self::Draft,
        Self::Pending,
        Self::Approved,
        Self::Payable,
        Self::Closed,
    ];

    /// Statuses whose amount counts toward budget spend.
    pub const FINAL: [ExpenseStatus; 3] = [Self::Approved, Self::Payable, Self::Closed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Payable => "payable",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> ResultLedger<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "payable" => Ok(Self::Payable),
            "closed" => Ok(Self::Closed),
            other => Err(LedgerError::InvalidStatus(format!(
                "unknown expense status: {other}"
            ))),
        }
    }

    #[must_use]
    pub fn is_final(self) -> bool {
        Self::FINAL.contains(&self)
    }

    /// Statuses reachable from `self` in one step.
    #[must_use]
    pub fn allowed_next(self) -> &'static [ExpenseStatus] {
        match self {
            Self::Draft => &[Self::Pending],
            Self::Pending => &[Self::Approved, Self::Draft],
            Self::Approved => &[Self::Payable, Self::Pending],
            Self::Payable => &[Self::Closed, Self::Approved],
            Self::Closed => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: ExpenseStatus) -> bool {
        self == next || self.allowed_next().contains(&next)
    }
}

impl core::fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ExpenseStatus {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

/// Checks a lifecycle move. Staying in the same status is always allowed.
pub fn assert_transition(from: ExpenseStatus, to: ExpenseStatus) -> ResultLedger<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(LedgerError::InvalidStatusTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_transition_is_noop() {
        for status in ExpenseStatus::ALL {
            assert!(assert_transition(status, status).is_ok());
        }
    }

    #[test]
    fn table_matches_lifecycle() {
        use ExpenseStatus::*;
        let allowed = [
            (Draft, Pending),
            (Pending, Approved),
            (Pending, Draft),
            (Approved, Payable),
            (Approved, Pending),
            (Payable, Closed),
            (Payable, Approved),
        ];
        for from in ExpenseStatus::ALL {
            for to in ExpenseStatus::ALL {
                let expected = from == to || allowed.contains(&(from, to));
                assert_eq!(assert_transition(from, to).is_ok(), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn skipping_approval_is_rejected() {
        assert_eq!(
            assert_transition(ExpenseStatus::Draft, ExpenseStatus::Approved),
            Err(LedgerError::InvalidStatusTransition {
                from: ExpenseStatus::Draft,
                to: ExpenseStatus::Approved,
            })
        );
    }

    #[test]
    fn closed_is_terminal() {
        assert!(ExpenseStatus::Closed.allowed_next().is_empty());
        assert!(assert_transition(ExpenseStatus::Payable, ExpenseStatus::Closed).is_ok());
    }

    #[test]
    fn parse_rejects_unknown_labels() {
        assert_eq!(ExpenseStatus::parse(" Approved ").unwrap(), ExpenseStatus::Approved);
        assert!(matches!(
            ExpenseStatus::parse("rejected"),
            Err(LedgerError::InvalidStatus(_))
        ));
    }
}
