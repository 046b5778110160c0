use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue, DatabaseConnection, QueryFilter, QueryOrder, SqlErr, TransactionTrait,
    prelude::*,
};
use uuid::Uuid;

use crate::locks::KeyedLocks;
use crate::util::parse_uuid;
use crate::{
    BudgetRecord, Expense, ExpenseAttachment, ExpenseFilter, ExpensePatch, ExpenseStatus,
    LedgerError, NewAttachment, NewExpense, ResultLedger, attachments, budgets, expenses,
    idempotency_keys,
};

use super::{
    BudgetStore, ExpenseStore, IdempotentOutcome, PrepareFn, sum_by_category, usable_key,
};

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                $tx.rollback().await?;
                Err(err)
            }
        }
    }};
}

/// Expense ledger on a sea-orm connection.
///
/// Expects the schema created by the `migration` crate.
#[derive(Debug)]
pub struct SeaExpenseStore {
    database: DatabaseConnection,
    key_locks: KeyedLocks,
}

impl SeaExpenseStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self {
            database,
            key_locks: KeyedLocks::new(),
        }
    }

    async fn find_model(&self, id: Uuid) -> ResultLedger<Option<expenses::Model>> {
        Ok(expenses::Entity::find_by_id(id.to_string())
            .one(&self.database)
            .await?)
    }

    async fn resolve_key(&self, key: &str) -> ResultLedger<KeyState> {
        let Some(row) = idempotency_keys::Entity::find_by_id(key.to_string())
            .one(&self.database)
            .await?
        else {
            return Ok(KeyState::Unused);
        };
        Ok(match self.get_by_id(parse_uuid(&row.expense_id, "expense")?).await? {
            Some(expense) => KeyState::Recorded(expense),
            None => KeyState::Stale,
        })
    }
}

enum KeyState {
    Unused,
    Recorded(Expense),
    /// The row points at an expense that no longer exists.
    Stale,
}

#[async_trait]
impl ExpenseStore for SeaExpenseStore {
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

        with_tx!(self, |db_tx| {
            expenses::ActiveModel::from(&expense).insert(&db_tx).await?;
            for row in &rows {
                attachments::ActiveModel::from(row).insert(&db_tx).await?;
            }
            Ok(expense)
        })
    }

    async fn get_by_id(&self, id: Uuid) -> ResultLedger<Option<Expense>> {
        self.find_model(id)
            .await?
            .map(Expense::try_from)
            .transpose()
    }

    async fn attachments(&self, expense_id: Uuid) -> ResultLedger<Vec<ExpenseAttachment>> {
        attachments::Entity::find()
            .filter(attachments::Column::ExpenseId.eq(expense_id.to_string()))
            .order_by_asc(attachments::Column::UploadedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(ExpenseAttachment::try_from)
            .collect()
    }

    async fn list(&self, filter: &ExpenseFilter) -> ResultLedger<Vec<Expense>> {
        let mut query = expenses::Entity::find();
        if let Some(workspace_id) = &filter.workspace_id {
            query = query.filter(expenses::Column::WorkspaceId.eq(workspace_id.clone()));
        }
        if let Some(project_id) = &filter.project_id {
            query = query.filter(expenses::Column::ProjectId.eq(project_id.clone()));
        }
        if let Some(statuses) = &filter.statuses {
            query = query.filter(expenses::Column::Status.is_in(statuses.iter().map(|s| s.as_str())));
        }
        if let Some(category) = &filter.category {
            query = query.filter(expenses::Column::CategoryNorm.eq(expenses::category_key(category)));
        }
        if let Some(from) = filter.date_from {
            query = query.filter(expenses::Column::Date.gte(from.to_string()));
        }
        if let Some(to) = filter.date_to {
            query = query.filter(expenses::Column::Date.lte(to.to_string()));
        }

        let models = query
            .order_by_asc(expenses::Column::Date)
            .order_by_asc(expenses::Column::CreatedAt)
            .all(&self.database)
            .await?;

        // `search` needs Unicode-aware case folding, so it runs here.
        let mut found = Vec::with_capacity(models.len());
        for model in models {
            let expense = Expense::try_from(model)?;
            if filter.matches(&expense) {
                found.push(expense);
            }
        }
        Ok(found)
    }

    async fn update(&self, id: Uuid, patch: ExpensePatch) -> ResultLedger<Option<Expense>> {
        let Some(model) = self.find_model(id).await? else {
            return Ok(None);
        };
        let mut expense = Expense::try_from(model)?;
        patch.apply(&mut expense, Utc::now());
        expenses::ActiveModel::from(&expense)
            .update(&self.database)
            .await?;
        Ok(Some(expense))
    }

    async fn change_status(
        &self,
        id: Uuid,
        next: ExpenseStatus,
        _actor_id: &str,
    ) -> ResultLedger<Option<Expense>> {
        let Some(model) = self.find_model(id).await? else {
            return Ok(None);
        };
        let mut expense = Expense::try_from(model)?;
        if expense.status == next {
            return Ok(Some(expense));
        }
        expense.status = next;
        expense.updated_at = Utc::now();
        let changed = expenses::ActiveModel {
            id: ActiveValue::Set(expense.id.to_string()),
            status: ActiveValue::Set(next.as_str().to_string()),
            updated_at: ActiveValue::Set(expense.updated_at),
            ..Default::default()
        };
        changed.update(&self.database).await?;
        Ok(Some(expense))
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
        Ok(match self.resolve_key(key).await? {
            KeyState::Recorded(expense) => Some(expense),
            KeyState::Unused | KeyState::Stale => None,
        })
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
        let stale = match self.resolve_key(key).await? {
            KeyState::Recorded(existing) => return Ok(IdempotentOutcome::Replayed(existing)),
            KeyState::Stale => true,
            KeyState::Unused => false,
        };

        let pending = prepare().await?;
        let now = Utc::now();
        let expense = pending.expense.into_expense(&pending.actor_id, now);
        let rows: Vec<ExpenseAttachment> = pending
            .attachments
            .into_iter()
            .map(|a| a.into_attachment(expense.id, now))
            .collect();
        let record = idempotency_keys::ActiveModel {
            key: ActiveValue::Set(key.to_string()),
            expense_id: ActiveValue::Set(expense.id.to_string()),
            created_at: ActiveValue::Set(now),
        };

        // The key row commits with the expense, so a store that loses the
        // race on the key rolls its expense back too.
        let written: ResultLedger<Expense> = with_tx!(self, |db_tx| {
            async {
                if stale {
                    idempotency_keys::Entity::delete_by_id(key.to_string())
                        .exec(&db_tx)
                        .await?;
                }
                expenses::ActiveModel::from(&expense).insert(&db_tx).await?;
                for row in &rows {
                    attachments::ActiveModel::from(row).insert(&db_tx).await?;
                }
                record.insert(&db_tx).await?;
                Ok::<_, LedgerError>(expense)
            }
            .await
        });

        match written {
            Ok(expense) => Ok(IdempotentOutcome::Created(expense)),
            Err(LedgerError::Database(err))
                if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
            {
                match self.resolve_key(key).await? {
                    KeyState::Recorded(existing) => {
                        tracing::debug!(
                            key,
                            expense_id = %existing.id,
                            "idempotency key recorded by another store"
                        );
                        Ok(IdempotentOutcome::Replayed(existing))
                    }
                    KeyState::Unused | KeyState::Stale => Err(err.into()),
                }
            }
            Err(err) => Err(err),
        }
    }
}

/// Budget records on a sea-orm connection, one row per project.
#[derive(Debug, Clone)]
pub struct SeaBudgetStore {
    database: DatabaseConnection,
}

impl SeaBudgetStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }
}

#[async_trait]
impl BudgetStore for SeaBudgetStore {
    async fn get(&self, project_id: &str) -> ResultLedger<Option<BudgetRecord>> {
        budgets::Entity::find_by_id(project_id.to_string())
            .one(&self.database)
            .await?
            .map(BudgetRecord::try_from)
            .transpose()
    }

    async fn put(&self, record: BudgetRecord) -> ResultLedger<()> {
        let model = budgets::ActiveModel::try_from(&record)?;
        budgets::Entity::insert(model)
            .on_conflict(
                OnConflict::column(budgets::Column::ProjectId)
                    .update_columns([
                        budgets::Column::Currency,
                        budgets::Column::TotalMinor,
                        budgets::Column::WarnThreshold,
                        budgets::Column::Categories,
                        budgets::Column::UpdatedAt,
                        budgets::Column::SpentTotalMinor,
                        budgets::Column::RemainingTotalMinor,
                        budgets::Column::CategoriesUsage,
                        budgets::Column::WarnReached,
                        budgets::Column::ComputedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.database)
            .await?;
        Ok(())
    }
}
