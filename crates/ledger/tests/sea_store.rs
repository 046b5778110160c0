use std::time::Duration;

use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use uuid::Uuid;

use ledger::store::{
    CachedAggregates, ExpenseStore, IdempotentOutcome, MemoryExpenseStore, PendingCreate,
    PrepareFn, PrepareFuture, SeaExpenseStore,
};
use ledger::{
    AuditAction, CreateExpenseCmd, Currency, EventType, ExpenseFilter, ExpensePatch,
    ExpenseStatus, FinanceService, LedgerError, MoneyCents, NewAttachment, NewExpense, SeaSink,
    UpsertBudgetCmd,
};
use migration::MigratorTrait;

async fn db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

fn file_db_url() -> String {
    let root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/test_dbs");
    std::fs::create_dir_all(&root).unwrap();
    let path = root.join(format!("ledger_{}.db", Uuid::new_v4()));
    format!("sqlite:{}?mode=rwc", path.display())
}

async fn service_with_db() -> (FinanceService, DatabaseConnection) {
    let db = db().await;
    let service = FinanceService::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (service, db)
}

fn date(raw: &str) -> NaiveDate {
    raw.parse().unwrap()
}

fn new_expense(project: &str, day: &str, category: &str, cents: i64) -> NewExpense {
    NewExpense {
        workspace_id: "ws".to_string(),
        project_id: project.to_string(),
        task_id: None,
        date: date(day),
        amount: MoneyCents::new(cents),
        currency: Currency::parse("USD").unwrap(),
        category: category.to_string(),
        description: Some("Hotel Müller".to_string()),
        vendor: None,
        payment_method: None,
        tax_amount: None,
        status: ExpenseStatus::Draft,
    }
}

fn prepare<'a>(expense: NewExpense) -> PrepareFn<'a> {
    Box::new(move || -> PrepareFuture<'a> {
        Box::pin(async move {
            Ok::<_, LedgerError>(PendingCreate::new(expense, Vec::new(), "alice"))
        })
    })
}

/// Like `prepare`, but slow enough for concurrent callers to overlap.
fn prepare_slowly<'a>(expense: NewExpense) -> PrepareFn<'a> {
    Box::new(move || -> PrepareFuture<'a> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, LedgerError>(PendingCreate::new(expense, Vec::new(), "alice"))
        })
    })
}

/// Behaviour every `ExpenseStore` must share.
async fn store_contract(store: &dyn ExpenseStore) {
    let first = store
        .create(
            new_expense("p1", "2024-01-20", "Travel", 1_000),
            vec![NewAttachment::new("receipt.pdf", "https://files.example/r1")],
            "alice",
        )
        .await
        .unwrap();
    let second = store
        .create(new_expense("p1", "2024-01-05", "travel", 250), Vec::new(), "alice")
        .await
        .unwrap();
    store
        .create(new_expense("p2", "2024-01-10", "Meals", 700), Vec::new(), "bob")
        .await
        .unwrap();

    assert_eq!(store.get_by_id(first.id).await.unwrap(), Some(first.clone()));
    assert_eq!(store.get_by_id(Uuid::new_v4()).await.unwrap(), None);

    let attachments = store.attachments(first.id).await.unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].expense_id, first.id);
    assert!(store.attachments(second.id).await.unwrap().is_empty());

    let listed = store
        .list(&ExpenseFilter::new().project("p1"))
        .await
        .unwrap();
    let ids: Vec<Uuid> = listed.iter().map(|e| e.id).collect();
    assert_eq!(ids, [second.id, first.id]);

    let ranged = store
        .list(
            &ExpenseFilter::new()
                .category("TRAVEL")
                .date_from(date("2024-01-06"))
                .date_to(date("2024-01-31")),
        )
        .await
        .unwrap();
    assert_eq!(ranged.len(), 1);
    assert_eq!(ranged[0].id, first.id);

    let searched = store
        .list(&ExpenseFilter::new().search("MÜLLER"))
        .await
        .unwrap();
    assert_eq!(searched.len(), 3);

    let totals = store
        .aggregate_by_category(&ExpenseFilter::new())
        .await
        .unwrap();
    assert_eq!(totals.get("travel"), Some(&1_250));
    assert_eq!(totals.get("meals"), Some(&700));

    let patched = store
        .update(
            second.id,
            ExpensePatch {
                amount: Some(MoneyCents::new(300)),
                description: Some(None),
                tax_amount: Some(Some(MoneyCents::new(20))),
                ..ExpensePatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patched.amount, MoneyCents::new(300));
    assert_eq!(patched.description, None);
    assert_eq!(patched.tax_amount, Some(MoneyCents::new(20)));
    assert_eq!(patched.created_at, second.created_at);
    assert_eq!(store.get_by_id(second.id).await.unwrap(), Some(patched));
    assert_eq!(
        store
            .update(Uuid::new_v4(), ExpensePatch::default())
            .await
            .unwrap(),
        None
    );

    let pending = store
        .change_status(first.id, ExpenseStatus::Pending, "bob")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.status, ExpenseStatus::Pending);
    let approved = store
        .list(&ExpenseFilter::new().statuses([ExpenseStatus::Pending, ExpenseStatus::Approved]))
        .await
        .unwrap();
    assert_eq!(approved.len(), 1);

    let replayed = {
        let created = store
            .with_idempotency(Some("req-1"), prepare(new_expense("p3", "2024-01-01", "Fees", 5)))
            .await
            .unwrap();
        assert!(matches!(created, IdempotentOutcome::Created(_)));
        let again = store
            .with_idempotency(
                Some(" req-1 "),
                prepare(new_expense("p3", "2024-02-01", "Fees", 9)),
            )
            .await
            .unwrap();
        assert!(again.is_replay());
        assert_eq!(again.expense(), created.expense());
        again
    };
    assert_eq!(
        store.find_by_idempotency_key("req-1").await.unwrap().as_ref(),
        Some(replayed.expense())
    );
    assert_eq!(store.find_by_idempotency_key("  ").await.unwrap(), None);
    assert_eq!(store.find_by_idempotency_key("req-2").await.unwrap(), None);
    assert_eq!(
        store
            .list(&ExpenseFilter::new().project("p3"))
            .await
            .unwrap(),
        vec![replayed.into_expense()]
    );
}

#[tokio::test]
async fn memory_store_honours_the_contract() {
    store_contract(&MemoryExpenseStore::new()).await;
}

#[tokio::test]
async fn sea_store_honours_the_contract() {
    let db = db().await;
    store_contract(&SeaExpenseStore::new(db)).await;
}

#[tokio::test]
async fn racing_stores_record_one_expense_per_key() {
    let db = db().await;
    let first = SeaExpenseStore::new(db.clone());
    let second = SeaExpenseStore::new(db.clone());
    let approved = || NewExpense {
        status: ExpenseStatus::Approved,
        ..new_expense("p1", "2024-01-10", "Travel", 10_000)
    };

    // Separate stores do not share key locks; only the database decides.
    let (a, b) = tokio::join!(
        first.with_idempotency(Some("req-1"), prepare_slowly(approved())),
        second.with_idempotency(Some("req-1"), prepare_slowly(approved())),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.expense().id, b.expense().id);
    assert_ne!(a.is_replay(), b.is_replay());

    assert_eq!(first.list(&ExpenseFilter::new()).await.unwrap().len(), 1);
    let spend = second
        .aggregate_by_category(&ExpenseFilter::new().status(ExpenseStatus::Approved))
        .await
        .unwrap();
    assert_eq!(spend.get("travel"), Some(&10_000));
}

#[tokio::test]
async fn stale_idempotency_key_is_replaced() {
    let db = db().await;
    let backend = db.get_database_backend();
    db.execute(Statement::from_string(backend, "PRAGMA foreign_keys = OFF"))
        .await
        .unwrap();
    db.execute(Statement::from_sql_and_values(
        backend,
        "INSERT INTO idempotency_keys (key, expense_id, created_at) VALUES (?, ?, ?)",
        vec![
            "req-1".into(),
            Uuid::new_v4().to_string().into(),
            "2024-01-01T00:00:00Z".into(),
        ],
    ))
    .await
    .unwrap();

    let store = SeaExpenseStore::new(db);
    assert_eq!(store.find_by_idempotency_key("req-1").await.unwrap(), None);

    let outcome = store
        .with_idempotency(Some("req-1"), prepare(new_expense("p1", "2024-01-10", "Travel", 100)))
        .await
        .unwrap();
    assert!(matches!(outcome, IdempotentOutcome::Created(_)));
    assert_eq!(
        store.find_by_idempotency_key("req-1").await.unwrap().as_ref(),
        Some(outcome.expense())
    );
}

#[tokio::test]
async fn idempotency_keys_survive_a_new_connection() {
    let url = file_db_url();
    let db = Database::connect(&url).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();

    let cmd = || {
        CreateExpenseCmd::new("ws", "p1", "42", "USD", "Travel", "2024-01-10")
            .idempotency_key("req-42")
    };
    let first = FinanceService::builder()
        .database(db)
        .build()
        .await
        .unwrap()
        .create_expense(cmd(), "alice")
        .await
        .unwrap();

    // A second process sees the recorded key.
    let db = Database::connect(&url).await.unwrap();
    let service = FinanceService::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    let second = service.create_expense(cmd(), "alice").await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(service.list_expenses(&ExpenseFilter::new()).await.unwrap().len(), 1);

    let backend = db.get_database_backend();
    let row = db
        .query_one(Statement::from_sql_and_values(
            backend,
            "SELECT expense_id FROM idempotency_keys WHERE key = ?",
            vec!["req-42".into()],
        ))
        .await
        .unwrap()
        .unwrap();
    let stored: String = row.try_get("", "expense_id").unwrap();
    assert_eq!(stored, first.id.to_string());
}

#[tokio::test]
async fn budget_records_round_trip_through_the_database() {
    let (service, _db) = service_with_db().await;
    service
        .create_expense(
            CreateExpenseCmd::new("ws", "p1", "150.5", "usd", "Travel", "2024-01-10")
                .status("approved"),
            "alice",
        )
        .await
        .unwrap();

    let snapshot = service
        .upsert_budget(
            "p1",
            UpsertBudgetCmd::new("USD")
                .total("1000.00")
                .warn_threshold("0.15"),
            "alice",
        )
        .await
        .unwrap();
    assert_eq!(snapshot.warn_reached, Some(true));

    let stored = service.get_budget("p1").await.unwrap().unwrap();
    let stored = stored.snapshot().unwrap();
    assert_eq!(stored, &snapshot);
    assert_eq!(stored.spent_total.to_string(), "150.50");
    assert_eq!(stored.remaining_total.unwrap().to_string(), "849.50");
    assert_eq!(stored.budget.warn_threshold.unwrap().to_string(), "0.15");

    // A second upsert replaces the row.
    service
        .upsert_budget("p1", UpsertBudgetCmd::new("USD").total("100"), "alice")
        .await
        .unwrap();
    let stored = service.get_budget("p1").await.unwrap().unwrap();
    assert_eq!(stored.budget().warn_threshold, None);
    assert_eq!(
        stored.snapshot().unwrap().remaining_total,
        Some("-50.50".parse().unwrap())
    );
}

#[tokio::test]
async fn service_writes_audit_and_events_to_the_database() {
    let (service, db) = service_with_db().await;
    let expense = service
        .create_expense(
            CreateExpenseCmd::new("ws", "p1", "12", "EUR", "Meals", "2024-01-10"),
            "alice",
        )
        .await
        .unwrap();
    service
        .change_expense_status(expense.id, ExpenseStatus::Pending, "bob")
        .await
        .unwrap();

    let sink = SeaSink::new(db);
    let entries = sink.audit_entries().await.unwrap();
    let actions: Vec<AuditAction> = entries.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        [AuditAction::ExpenseCreated, AuditAction::ExpenseStatusChanged]
    );
    assert_eq!(entries[0].entity.id, expense.id.to_string());
    assert_eq!(entries[1].actor_id, "bob");
    assert_eq!(entries[1].project_id.as_deref(), Some("p1"));
    assert_eq!(entries[1].workspace_id.as_deref(), Some("ws"));

    let events = sink.events().await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, EventType::ExpenseStatusChanged);
    assert_eq!(events[1].payload["from"], "draft");
    assert_eq!(events[1].payload["to"], "pending");
}

#[tokio::test]
async fn cached_aggregates_serve_until_a_write_passes_through() {
    let store = CachedAggregates::new(SeaExpenseStore::new(db().await), Duration::from_secs(60), 8);
    let filter = ExpenseFilter::new().project("p1");

    store
        .create(new_expense("p1", "2024-01-10", "Travel", 100), Vec::new(), "alice")
        .await
        .unwrap();
    assert_eq!(
        store.aggregate_by_category(&filter).await.unwrap().get("travel"),
        Some(&100)
    );

    // Bypassing the decorator leaves the cached totals in place.
    store
        .inner()
        .create(new_expense("p1", "2024-01-11", "Travel", 50), Vec::new(), "alice")
        .await
        .unwrap();
    assert_eq!(
        store.aggregate_by_category(&filter).await.unwrap().get("travel"),
        Some(&100)
    );

    store
        .create(new_expense("p1", "2024-01-12", "Travel", 25), Vec::new(), "alice")
        .await
        .unwrap();
    assert_eq!(
        store.aggregate_by_category(&filter).await.unwrap().get("travel"),
        Some(&175)
    );
}
