use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use ledger::{
    BudgetCategoryInput, CreateExpenseCmd, ExpenseFilter, ExpenseStatus, FinanceService,
    NewAttachment, UpdateExpenseCmd, UpsertBudgetCmd,
};
use serde_json::{Value, json};
use uuid::Uuid;

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "expense_ledger")]
#[command(about = "Record project expenses and track them against budgets")]
pub struct Cli {
    /// Optional settings file (TOML). Defaults to `settings.toml` if present.
    #[arg(long)]
    pub config: Option<String>,

    /// Actor recorded on every write.
    #[arg(long, env = "LEDGER_ACTOR", default_value = "cli")]
    pub actor: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Expense(Expense),
    Budget(Budget),
}

#[derive(Args, Debug)]
pub struct Expense {
    #[command(subcommand)]
    command: ExpenseCommand,
}

#[derive(Subcommand, Debug)]
enum ExpenseCommand {
    Add(ExpenseAddArgs),
    Update(ExpenseUpdateArgs),
    List(FilterArgs),
    /// Spend per category over the matching expenses.
    Spend(FilterArgs),
    Status(ExpenseStatusArgs),
}

#[derive(Args, Debug)]
struct ExpenseAddArgs {
    #[arg(long)]
    workspace: String,
    #[arg(long)]
    project: String,
    /// Decimal amount, e.g. `150.50`.
    #[arg(long)]
    amount: String,
    #[arg(long)]
    currency: String,
    #[arg(long)]
    category: String,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp.
    #[arg(long)]
    date: String,
    #[arg(long)]
    task: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    vendor: Option<String>,
    #[arg(long)]
    payment_method: Option<String>,
    #[arg(long)]
    tax: Option<String>,
    #[arg(long)]
    status: Option<String>,
    /// `filename=url`, repeatable.
    #[arg(long = "attachment")]
    attachments: Vec<String>,
    #[arg(long)]
    idempotency_key: Option<String>,
}

#[derive(Args, Debug)]
struct ExpenseUpdateArgs {
    id: Uuid,
    #[arg(long)]
    date: Option<String>,
    #[arg(long)]
    amount: Option<String>,
    #[arg(long)]
    currency: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    task: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    vendor: Option<String>,
    #[arg(long)]
    payment_method: Option<String>,
    #[arg(long)]
    tax: Option<String>,
    #[arg(long)]
    status: Option<String>,
    /// Field to clear: task, description, vendor, payment-method or tax.
    /// Repeatable.
    #[arg(long = "clear", value_enum)]
    clear: Vec<Clearable>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Clearable {
    Task,
    Description,
    Vendor,
    PaymentMethod,
    Tax,
}

#[derive(Args, Debug)]
struct FilterArgs {
    #[arg(long)]
    workspace: Option<String>,
    #[arg(long)]
    project: Option<String>,
    /// Repeatable.
    #[arg(long = "status")]
    statuses: Vec<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    search: Option<String>,
}

#[derive(Args, Debug)]
struct ExpenseStatusArgs {
    id: Uuid,
    status: String,
}

#[derive(Args, Debug)]
pub struct Budget {
    #[command(subcommand)]
    command: BudgetCommand,
}

#[derive(Subcommand, Debug)]
enum BudgetCommand {
    Set(BudgetSetArgs),
    Show(BudgetShowArgs),
}

#[derive(Args, Debug)]
struct BudgetSetArgs {
    project: String,
    #[arg(long)]
    currency: String,
    #[arg(long)]
    total: Option<String>,
    /// Fraction of the total, e.g. `0.8`.
    #[arg(long)]
    warn_threshold: Option<String>,
    /// `name` or `name=limit`, repeatable.
    #[arg(long = "category")]
    categories: Vec<String>,
}

#[derive(Args, Debug)]
struct BudgetShowArgs {
    project: String,
}

fn attachment(raw: &str) -> CliResult<NewAttachment> {
    let (filename, url) = raw
        .split_once('=')
        .ok_or_else(|| format!("attachment `{raw}` is not `filename=url`"))?;
    Ok(NewAttachment::new(filename, url))
}

fn budget_category(raw: &str) -> BudgetCategoryInput {
    match raw.split_once('=') {
        Some((name, limit)) => BudgetCategoryInput::new(name).limit(limit),
        None => BudgetCategoryInput::new(raw),
    }
}

fn filter(args: FilterArgs) -> CliResult<ExpenseFilter> {
    let statuses = if args.statuses.is_empty() {
        None
    } else {
        Some(
            args.statuses
                .iter()
                .map(|s| ExpenseStatus::parse(s))
                .collect::<Result<Vec<_>, _>>()?,
        )
    };
    Ok(ExpenseFilter {
        workspace_id: args.workspace,
        project_id: args.project,
        statuses,
        category: args.category,
        date_from: args.from,
        date_to: args.to,
        search: args.search,
    })
}

/// Set flags overwrite, `--clear` flags empty the field.
fn update_cmd(args: ExpenseUpdateArgs) -> UpdateExpenseCmd {
    let clears = |field| args.clear.contains(&field);
    let clearable = |value: Option<String>, field| {
        if clears(field) { Some(None) } else { value.map(Some) }
    };
    UpdateExpenseCmd {
        task_id: clearable(args.task.clone(), Clearable::Task),
        date: args.date.clone(),
        amount: args.amount.clone().map(Into::into),
        currency: args.currency.clone(),
        category: args.category.clone(),
        description: clearable(args.description.clone(), Clearable::Description),
        vendor: clearable(args.vendor.clone(), Clearable::Vendor),
        payment_method: clearable(args.payment_method.clone(), Clearable::PaymentMethod),
        tax_amount: if clears(Clearable::Tax) {
            Some(None)
        } else {
            args.tax.clone().map(|tax| Some(tax.into()))
        },
        status: args.status.clone(),
    }
}

/// Runs one subcommand and returns what should be printed.
pub async fn run(service: &FinanceService, command: Command, actor: &str) -> CliResult<Value> {
    let output = match command {
        Command::Expense(Expense { command }) => match command {
            ExpenseCommand::Add(args) => {
                let mut cmd = CreateExpenseCmd::new(
                    args.workspace,
                    args.project,
                    args.amount,
                    args.currency,
                    args.category,
                    args.date,
                );
                cmd.task_id = args.task;
                cmd.description = args.description;
                cmd.vendor = args.vendor;
                cmd.payment_method = args.payment_method;
                cmd.tax_amount = args.tax.map(Into::into);
                cmd.status = args.status;
                cmd.idempotency_key = args.idempotency_key;
                cmd.attachments = args
                    .attachments
                    .iter()
                    .map(|raw| attachment(raw))
                    .collect::<CliResult<Vec<_>>>()?;
                serde_json::to_value(service.create_expense(cmd, actor).await?)?
            }
            ExpenseCommand::Update(args) => {
                let id = args.id;
                serde_json::to_value(service.update_expense(id, update_cmd(args), actor).await?)?
            }
            ExpenseCommand::List(args) => {
                let filter = filter(args)?;
                let expenses = service.list_expenses(&filter).await?;
                let spend = service.spend_by_category(&filter).await?;
                json!({ "expenses": expenses, "by_category": spend })
            }
            ExpenseCommand::Spend(args) => {
                serde_json::to_value(service.spend_by_category(&filter(args)?).await?)?
            }
            ExpenseCommand::Status(args) => {
                let next = ExpenseStatus::parse(&args.status)?;
                serde_json::to_value(service.change_expense_status(args.id, next, actor).await?)?
            }
        },
        Command::Budget(Budget { command }) => match command {
            BudgetCommand::Set(args) => {
                let mut cmd = UpsertBudgetCmd::new(args.currency);
                cmd.total = args.total.map(Into::into);
                cmd.warn_threshold = args.warn_threshold.map(Into::into);
                if !args.categories.is_empty() {
                    cmd = cmd.categories(args.categories.iter().map(|raw| budget_category(raw)));
                }
                serde_json::to_value(service.upsert_budget(&args.project, cmd, actor).await?)?
            }
            BudgetCommand::Show(args) => match service.get_budget(&args.project).await? {
                Some(record) => serde_json::to_value(record)?,
                None => Value::Null,
            },
        },
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_subcommands() {
        let cli = Cli::try_parse_from([
            "expense_ledger",
            "expense",
            "add",
            "--workspace",
            "ws",
            "--project",
            "p1",
            "--amount",
            "150.5",
            "--currency",
            "usd",
            "--category",
            "Travel",
            "--date",
            "2024-01-10",
            "--attachment",
            "receipt.pdf=https://files.example/r.pdf",
        ])
        .unwrap();
        assert_eq!(cli.actor, "cli");
        assert!(matches!(cli.command, Command::Expense(_)));
    }

    #[test]
    fn category_rows_take_optional_limits() {
        let row = budget_category("Travel=250");
        assert_eq!(row.name, "Travel");
        assert!(row.limit.is_some());
        assert!(budget_category("Meals").limit.is_none());
        assert!(attachment("no-separator").is_err());
    }

    #[test]
    fn update_flags_set_or_clear_fields() {
        let cli = Cli::try_parse_from([
            "expense_ledger",
            "expense",
            "update",
            "0b6f8a43-3c4f-4c3e-9d8b-3c1f3a9c2d11",
            "--amount",
            "120",
            "--vendor",
            "Acme",
            "--clear",
            "tax",
            "--clear",
            "payment-method",
        ])
        .unwrap();
        let Command::Expense(Expense { command: ExpenseCommand::Update(args) }) = cli.command else {
            panic!("expected expense update");
        };
        let cmd = update_cmd(args);
        assert!(cmd.amount.is_some());
        assert_eq!(cmd.vendor, Some(Some("Acme".to_string())));
        assert_eq!(cmd.payment_method, Some(None));
        assert!(matches!(cmd.tax_amount, Some(None)));
        assert!(cmd.description.is_none());
        assert!(cmd.status.is_none());
    }

    #[tokio::test]
    async fn update_then_spend_reflects_new_category() {
        let service = FinanceService::builder().build().await.unwrap();
        let parse = |args: &[&str]| {
            let mut argv = vec!["expense_ledger", "expense"];
            argv.extend_from_slice(args);
            Cli::try_parse_from(argv).unwrap().command
        };

        let added = run(
            &service,
            parse(&[
                "add", "--workspace", "ws", "--project", "p1", "--amount", "100", "--currency",
                "usd", "--category", "Travel", "--date", "2024-01-10", "--vendor", "Acme",
                "--status", "approved",
            ]),
            "alice",
        )
        .await
        .unwrap();
        let id = added["id"].as_str().unwrap().to_string();

        let updated = run(
            &service,
            parse(&["update", &id, "--amount", "120", "--category", "Meals", "--clear", "vendor"]),
            "bob",
        )
        .await
        .unwrap();
        assert_eq!(updated["amount"], "120.00");
        assert_eq!(updated["category"], "Meals");
        assert!(updated["vendor"].is_null());

        let spend = run(&service, parse(&["spend", "--project", "p1"]), "bob").await.unwrap();
        assert_eq!(spend, json!({ "meals": "120.00" }));
    }
}
