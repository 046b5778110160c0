//! Ledger schema.
//!
//! - `expenses`: the expense ledger, amounts in minor units
//! - `expense_attachments`: file references owned by an expense
//! - `project_budgets`: one budget record per project (config or snapshot)
//! - `idempotency_keys`: client keys resolved to the expense they created
//! - `audit_log`: append-only audit trail
//! - `domain_events`: published domain events

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Expenses {
    Table,
    Id,
    WorkspaceId,
    ProjectId,
    TaskId,
    Date,
    AmountMinor,
    Currency,
    Category,
    CategoryNorm,
    Description,
    Vendor,
    PaymentMethod,
    TaxMinor,
    Status,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ExpenseAttachments {
    Table,
    Id,
    ExpenseId,
    Filename,
    Url,
    UploadedAt,
}

#[derive(Iden)]
enum ProjectBudgets {
    Table,
    ProjectId,
    Currency,
    TotalMinor,
    WarnThreshold,
    Categories,
    UpdatedAt,
    SpentTotalMinor,
    RemainingTotalMinor,
    CategoriesUsage,
    WarnReached,
    ComputedAt,
}

#[derive(Iden)]
enum IdempotencyKeys {
    Table,
    Key,
    ExpenseId,
    CreatedAt,
}

#[derive(Iden)]
enum AuditLog {
    Table,
    Id,
    ActorId,
    Action,
    EntityType,
    EntityId,
    ProjectId,
    WorkspaceId,
    Before,
    After,
    CreatedAt,
}

#[derive(Iden)]
enum DomainEvents {
    Table,
    Id,
    EventType,
    EntityId,
    Payload,
    CreatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Expenses::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Expenses::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Expenses::WorkspaceId).string().not_null())
                    .col(ColumnDef::new(Expenses::ProjectId).string().not_null())
                    .col(ColumnDef::new(Expenses::TaskId).string())
                    .col(ColumnDef::new(Expenses::Date).string().not_null())
                    .col(
                        ColumnDef::new(Expenses::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Expenses::Currency).string().not_null())
                    .col(ColumnDef::new(Expenses::Category).string().not_null())
                    .col(ColumnDef::new(Expenses::CategoryNorm).string().not_null())
                    .col(ColumnDef::new(Expenses::Description).string())
                    .col(ColumnDef::new(Expenses::Vendor).string())
                    .col(ColumnDef::new(Expenses::PaymentMethod).string())
                    .col(ColumnDef::new(Expenses::TaxMinor).big_integer())
                    .col(
                        ColumnDef::new(Expenses::Status)
                            .string()
                            .not_null()
                            .default("draft"),
                    )
                    .col(ColumnDef::new(Expenses::CreatedBy).string().not_null())
                    .col(ColumnDef::new(Expenses::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Expenses::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expenses-project_id-date")
                    .table(Expenses::Table)
                    .col(Expenses::ProjectId)
                    .col(Expenses::Date)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expenses-workspace_id")
                    .table(Expenses::Table)
                    .col(Expenses::WorkspaceId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ExpenseAttachments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExpenseAttachments::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ExpenseAttachments::ExpenseId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExpenseAttachments::Filename)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExpenseAttachments::Url).string().not_null())
                    .col(
                        ColumnDef::new(ExpenseAttachments::UploadedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-expense_attachments-expense_id")
                            .from(ExpenseAttachments::Table, ExpenseAttachments::ExpenseId)
                            .to(Expenses::Table, Expenses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expense_attachments-expense_id")
                    .table(ExpenseAttachments::Table)
                    .col(ExpenseAttachments::ExpenseId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProjectBudgets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProjectBudgets::ProjectId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProjectBudgets::Currency).string().not_null())
                    .col(ColumnDef::new(ProjectBudgets::TotalMinor).big_integer())
                    .col(ColumnDef::new(ProjectBudgets::WarnThreshold).string())
                    .col(ColumnDef::new(ProjectBudgets::Categories).text())
                    .col(
                        ColumnDef::new(ProjectBudgets::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProjectBudgets::SpentTotalMinor).big_integer())
                    .col(ColumnDef::new(ProjectBudgets::RemainingTotalMinor).big_integer())
                    .col(ColumnDef::new(ProjectBudgets::CategoriesUsage).text())
                    .col(ColumnDef::new(ProjectBudgets::WarnReached).boolean())
                    .col(ColumnDef::new(ProjectBudgets::ComputedAt).timestamp())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdempotencyKeys::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdempotencyKeys::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IdempotencyKeys::ExpenseId).string().not_null())
                    .col(
                        ColumnDef::new(IdempotencyKeys::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-idempotency_keys-expense_id")
                            .from(IdempotencyKeys::Table, IdempotencyKeys::ExpenseId)
                            .to(Expenses::Table, Expenses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuditLog::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AuditLog::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(AuditLog::ActorId).string().not_null())
                    .col(ColumnDef::new(AuditLog::Action).string().not_null())
                    .col(ColumnDef::new(AuditLog::EntityType).string().not_null())
                    .col(ColumnDef::new(AuditLog::EntityId).string().not_null())
                    .col(ColumnDef::new(AuditLog::ProjectId).string())
                    .col(ColumnDef::new(AuditLog::WorkspaceId).string())
                    .col(ColumnDef::new(AuditLog::Before).text())
                    .col(ColumnDef::new(AuditLog::After).text())
                    .col(ColumnDef::new(AuditLog::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-audit_log-entity")
                    .table(AuditLog::Table)
                    .col(AuditLog::EntityType)
                    .col(AuditLog::EntityId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DomainEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DomainEvents::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DomainEvents::EventType).string().not_null())
                    .col(ColumnDef::new(DomainEvents::EntityId).string().not_null())
                    .col(ColumnDef::new(DomainEvents::Payload).text().not_null())
                    .col(
                        ColumnDef::new(DomainEvents::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reverse order of creation.
        manager
            .drop_table(Table::drop().table(DomainEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuditLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdempotencyKeys::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProjectBudgets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ExpenseAttachments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Expenses::Table).to_owned())
            .await?;
        Ok(())
    }
}
